//! Deadline-bounded collaborators.
//!
//! The orchestrator itself never times out; a collaborator that hangs is cut
//! off here, at the port boundary, and surfaces as an ordinary
//! [`CollaboratorError`] with `timed_out` set.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{
    AccountAddress, AssessmentRecord, CollaboratorError, CollaboratorKind, ContractAddress,
    Handle, TxHash,
};
use crate::ports::{
    Collaborators, DecryptionEngine, DecryptionSignature, EncryptedInput, EncryptionEngine,
    HandleContractPair, InputBatch, LedgerClient, PendingTransaction, SignatureProvider,
    TxReceipt,
};

async fn within<T>(
    kind: CollaboratorKind,
    limit: Duration,
    call: impl Future<Output = Result<T, CollaboratorError>>,
) -> Result<T, CollaboratorError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(collaborator = %kind, limit_ms = limit.as_millis() as u64, "Collaborator call timed out");
            Err(CollaboratorError::timeout(kind, limit.as_secs()))
        }
    }
}

/// Wraps a collaborator and bounds every async call by `limit`.
pub struct Bounded<T: ?Sized> {
    inner: Arc<T>,
    limit: Duration,
}

impl<T: ?Sized> Bounded<T> {
    /// Bound `inner` by `limit`.
    pub fn new(inner: Arc<T>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    /// Deadline per call.
    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl Collaborators {
    /// Bound every collaborator by `limit`.
    pub fn bounded(self, limit: Duration) -> Self {
        Self {
            encryption: Arc::new(Bounded::new(self.encryption, limit)),
            ledger: Arc::new(Bounded::new(self.ledger, limit)),
            signatures: Arc::new(Bounded::new(self.signatures, limit)),
            decryption: Arc::new(Bounded::new(self.decryption, limit)),
        }
    }
}

impl<T: EncryptionEngine + ?Sized> EncryptionEngine for Bounded<T> {
    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn new_input_batch(&self, contract: ContractAddress, user: AccountAddress) -> Box<dyn InputBatch> {
        Box::new(BoundedBatch {
            inner: self.inner.new_input_batch(contract, user),
            limit: self.limit,
        })
    }
}

struct BoundedBatch {
    inner: Box<dyn InputBatch>,
    limit: Duration,
}

#[async_trait]
impl InputBatch for BoundedBatch {
    fn add_u32(&mut self, value: u32) {
        self.inner.add_u32(value);
    }

    async fn encrypt(&mut self) -> Result<EncryptedInput, CollaboratorError> {
        within(CollaboratorKind::Encryption, self.limit, self.inner.encrypt()).await
    }
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Bounded<T> {
    async fn submit_assessment(
        &self,
        contract: ContractAddress,
        signer: AccountAddress,
        input: &EncryptedInput,
    ) -> Result<Box<dyn PendingTransaction>, CollaboratorError> {
        let pending = within(
            CollaboratorKind::Ledger,
            self.limit,
            self.inner.submit_assessment(contract, signer, input),
        )
        .await?;
        Ok(Box::new(BoundedPending {
            inner: pending,
            limit: self.limit,
        }))
    }

    async fn read_assessment(
        &self,
        contract: ContractAddress,
        account: AccountAddress,
    ) -> Result<AssessmentRecord, CollaboratorError> {
        within(
            CollaboratorKind::Ledger,
            self.limit,
            self.inner.read_assessment(contract, account),
        )
        .await
    }

    async fn has_assessment(
        &self,
        contract: ContractAddress,
        account: AccountAddress,
    ) -> Result<bool, CollaboratorError> {
        within(
            CollaboratorKind::Ledger,
            self.limit,
            self.inner.has_assessment(contract, account),
        )
        .await
    }
}

struct BoundedPending {
    inner: Box<dyn PendingTransaction>,
    limit: Duration,
}

#[async_trait]
impl PendingTransaction for BoundedPending {
    fn hash(&self) -> TxHash {
        self.inner.hash()
    }

    async fn wait(&mut self, confirmations: u32) -> Result<TxReceipt, CollaboratorError> {
        within(
            CollaboratorKind::Ledger,
            self.limit,
            self.inner.wait(confirmations),
        )
        .await
    }
}

#[async_trait]
impl<T: SignatureProvider + ?Sized> SignatureProvider for Bounded<T> {
    async fn load_or_create(
        &self,
        contracts: &[ContractAddress],
        signer: AccountAddress,
    ) -> Result<Option<DecryptionSignature>, CollaboratorError> {
        within(
            CollaboratorKind::Signature,
            self.limit,
            self.inner.load_or_create(contracts, signer),
        )
        .await
    }
}

#[async_trait]
impl<T: DecryptionEngine + ?Sized> DecryptionEngine for Bounded<T> {
    async fn user_decrypt(
        &self,
        requests: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<Handle, u64>, CollaboratorError> {
        within(
            CollaboratorKind::Decryption,
            self.limit,
            self.inner.user_decrypt(requests, signature),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssessmentHandles;
    use crate::ports::{Gate, MockDecryption, MockLedger};

    const CONTRACT: ContractAddress = ContractAddress([0xC0; 20]);
    const ALICE: AccountAddress = AccountAddress([0xA1; 20]);

    #[tokio::test(start_paused = true)]
    async fn test_hung_read_times_out() {
        let ledger = Arc::new(MockLedger::default());
        ledger.set_read_gate(Gate::new());
        let bounded = Bounded::new(ledger, Duration::from_secs(30));

        let err = bounded.read_assessment(CONTRACT, ALICE).await.unwrap_err();
        assert!(err.timed_out);
        assert_eq!(err.kind, CollaboratorKind::Ledger);
        assert_eq!(err.message, "no response within 30s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_call_passes_through() {
        let ledger = Arc::new(MockLedger::default());
        let handles = AssessmentHandles {
            stress: Handle([1; 32]),
            extroversion: Handle([2; 32]),
            intuition: Handle([3; 32]),
        };
        ledger.set_handles(handles);
        let bounded = Bounded::new(ledger, Duration::from_secs(30));
        let record = bounded.read_assessment(CONTRACT, ALICE).await.unwrap();
        assert_eq!(record.handles, handles);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_wait_is_bounded() {
        let ledger = Arc::new(MockLedger::default());
        ledger.set_confirm_gate(Gate::new());
        let bounded = Bounded::new(ledger, Duration::from_secs(5));
        let input = EncryptedInput {
            handles: vec![Handle([1; 32])],
            input_proof: vec![0xAA],
        };
        let mut pending = bounded.submit_assessment(CONTRACT, ALICE, &input).await.unwrap();
        let err = pending.wait(1).await.unwrap_err();
        assert!(err.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decryption_timeout_classified_generic() {
        let decryption = Arc::new(MockDecryption::default());
        decryption.set_gate(Gate::new());
        let bounded = Bounded::new(decryption, Duration::from_secs(1));
        let signature = DecryptionSignature {
            public_key: vec![],
            private_key: vec![],
            signature: vec![],
            contract_addresses: vec![CONTRACT],
            user_address: ALICE,
            start_timestamp: 0,
            duration_days: 1,
        };
        let err = bounded.user_decrypt(&[], &signature).await.unwrap_err();
        assert_eq!(err.class(), crate::domain::ErrorClass::Generic);
    }
}
