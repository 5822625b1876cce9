//! # Inbound Ports
//!
//! API trait defining what callers (a UI, a runtime, a test harness) can ask
//! of the orchestrator.
//!
//! Every operation is fire-and-forget: dispatch returns at once, either
//! rejected as a no-op or with a task handle the caller may ignore.
//! Progress is observed through the status and state observers.

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::application::StatusSnapshot;
use crate::domain::{
    AccountAddress, AssessmentError, AssessmentHandles, AssessmentSnapshot, ChainId,
    ContractAddress, InFlight, Rejection, ResultField, TxHash,
};

/// Handle of a dispatched operation.
pub type OperationTask<T> = JoinHandle<Result<T, AssessmentError>>;

/// Result of dispatching an operation.
pub type Dispatch<T> = Result<OperationTask<T>, Rejection>;

/// Final state of a submit that reached the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Mined and succeeded; the follow-up refresh ran after any refresh
    /// already in flight.
    Confirmed {
        /// Transaction hash
        transaction: TxHash,
        /// Outcome of the chained refresh
        refresh: Result<RefreshOutcome, AssessmentError>,
    },
    /// Mined but reported failure.
    Reverted {
        /// Transaction hash
        transaction: TxHash,
    },
}

/// Final state of a refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    /// Handles read from the ledger.
    pub handles: AssessmentHandles,
    /// The read was requested before a submission confirmed and was not
    /// applied.
    pub superseded: bool,
}

/// Final state of a decrypt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecryptOutcome {
    /// Fields whose value was revealed and committed.
    pub revealed: Vec<ResultField>,
}

/// Assessment orchestrator - inbound port.
pub trait AssessmentApi: Send + Sync {
    /// Encrypt and submit 15 answers.
    fn submit_assessment(&self, answers: &[u32]) -> Dispatch<SubmitOutcome>;

    /// Re-read the result handles from the ledger.
    fn refresh_assessment(&self) -> Dispatch<RefreshOutcome>;

    /// Reveal the present result handles.
    fn decrypt_results(&self) -> Dispatch<DecryptOutcome>;

    /// Ask the ledger whether the account already has an assessment.
    fn check_has_assessment(&self) -> Dispatch<bool>;

    /// Apply an externally-driven network switch.
    fn switch_network(&self, network: Option<ChainId>) -> Option<ContractAddress>;

    /// Apply an externally-driven account switch.
    fn switch_account(&self, account: Option<AccountAddress>);

    /// Latest status.
    fn status(&self) -> StatusSnapshot;

    /// Point-in-time copy of the assessment state.
    fn snapshot(&self) -> AssessmentSnapshot;

    /// Current in-flight set.
    fn in_flight(&self) -> InFlight;

    /// Whether an assessment exists for the account.
    fn has_assessment(&self) -> bool;

    /// Whether a contract is deployed on the current network.
    fn is_deployed(&self) -> bool;

    /// Whether a submit would be admitted now.
    fn can_submit(&self) -> bool;

    /// Whether a decrypt would be admitted now.
    fn can_decrypt(&self) -> bool;

    /// Whether a refresh would be admitted now.
    fn can_refresh(&self) -> bool;
}
