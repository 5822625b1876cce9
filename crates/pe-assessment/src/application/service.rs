//! # Assessment Service
//!
//! Orchestrates submit, refresh and decrypt against the collaborators.
//!
//! ## Protocol
//!
//! ```text
//! dispatch ─ capture context ─ acquire guard ─ spawn
//!    task ─ call collaborator ─ await ─ stale? ─┬─ yes ─ discard, report cancellation
//!                                               └─ no ─ next step / commit
//!    permit dropped on every exit path
//! ```
//!
//! A successful submit chains exactly one refresh: it waits for any refresh
//! already in flight, and the refresh permit is taken before the submit
//! permit is released. Ledger answers requested before the confirmation are
//! not committed (see [`AssessmentState`]).

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::context::ContextTracker;
use super::status::{StatusMessage, StatusReporter, StatusSnapshot};
use crate::config::AssessmentConfig;
use crate::domain::{
    AccountAddress, Answers, AssessmentError, AssessmentHandles, AssessmentSnapshot,
    AssessmentState, ChainId, ClearValue, ContractAddress, ExecutionContext, GuardPermit,
    InFlight, OperationGuard, OperationKind, Rejection,
};
use crate::ports::{
    AssessmentApi, Collaborators, DecryptOutcome, Dispatch, HandleContractPair, OperationTask,
    RefreshOutcome, SubmitOutcome,
};

/// Assessment orchestrator handle. Cheap to clone.
#[derive(Clone)]
pub struct AssessmentService {
    inner: Arc<Orchestrator>,
}

struct Orchestrator {
    config: AssessmentConfig,
    context: Arc<ContextTracker>,
    guard: Arc<OperationGuard>,
    state: Mutex<AssessmentState>,
    status: StatusReporter,
    collaborators: Collaborators,
}

fn spawn_operation<T, F>(kind: OperationKind, operation: F) -> OperationTask<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, AssessmentError>> + Send + 'static,
{
    let operation_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "assessment_operation",
        kind = %kind,
        operation_id = %operation_id
    );
    tokio::spawn(operation.instrument(span))
}

impl AssessmentService {
    /// Create a service with nothing connected.
    pub fn new(config: AssessmentConfig, collaborators: Collaborators) -> Self {
        let context = Arc::new(ContextTracker::new(config.deployments.clone()));
        Self {
            inner: Arc::new(Orchestrator {
                config,
                context,
                guard: OperationGuard::new(),
                state: Mutex::new(AssessmentState::new()),
                status: StatusReporter::new(),
                collaborators,
            }),
        }
    }

    /// The context tracker.
    pub fn context(&self) -> Arc<ContextTracker> {
        Arc::clone(&self.inner.context)
    }

    /// Follow status overwrites.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.inner.status.subscribe()
    }

    /// Follow changes of the in-flight set.
    pub fn subscribe_in_flight(&self) -> watch::Receiver<InFlight> {
        self.inner.guard.subscribe()
    }

    /// Contract bound right now.
    pub fn contract_address(&self) -> Option<ContractAddress> {
        self.inner.context.contract()
    }

    /// Configuration in use.
    pub fn config(&self) -> &AssessmentConfig {
        &self.inner.config
    }
}

impl Orchestrator {
    fn bound_signer(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<(ContractAddress, AccountAddress), Rejection> {
        let contract = ctx.contract.ok_or(Rejection::ContractUnavailable)?;
        let signer = ctx.account.ok_or(Rejection::SignerUnavailable)?;
        Ok((contract, signer))
    }

    fn engine_ready(&self) -> Result<(), Rejection> {
        if self.collaborators.encryption.is_ready() {
            Ok(())
        } else {
            Err(Rejection::EngineUnavailable)
        }
    }

    fn acquire(&self, kind: OperationKind) -> Result<GuardPermit, Rejection> {
        self.guard.try_acquire(kind).map_err(|rejection| {
            debug!(%rejection, "Operation dispatch ignored");
            rejection
        })
    }

    /// Admit `kind` once the operations blocking it have finished.
    async fn acquire_when_free(&self, kind: OperationKind) -> Result<GuardPermit, Rejection> {
        let mut changes = self.guard.subscribe();
        loop {
            let rejection = match self.guard.try_acquire(kind) {
                Ok(permit) => return Ok(permit),
                Err(rejection) => rejection,
            };
            debug!(%rejection, "Waiting for in-flight operation");
            if changes
                .wait_for(|in_flight| in_flight.blocker_for(kind).is_none())
                .await
                .is_err()
            {
                return Err(rejection);
            }
        }
    }

    fn ensure_current(
        &self,
        captured: &ExecutionContext,
        operation: OperationKind,
        stage: &'static str,
    ) -> Result<(), AssessmentError> {
        if self.context.is_stale(captured) {
            info!(%operation, stage, "Context changed mid-flight, discarding");
            return Err(AssessmentError::StaleContext { operation, stage });
        }
        Ok(())
    }

    /// Outermost handler of every operation: turn failures into status.
    fn settle<T>(
        &self,
        kind: OperationKind,
        result: Result<T, AssessmentError>,
    ) -> Result<T, AssessmentError> {
        if let Err(err) = &result {
            match err {
                AssessmentError::Validation(validation) => {
                    warn!(%validation, "Answers rejected");
                    self.status
                        .report(StatusMessage::InvalidAnswers(validation.clone()));
                }
                AssessmentError::Authorization => {
                    warn!("Decryption signature unavailable");
                    self.status.report(StatusMessage::SignatureUnavailable);
                }
                AssessmentError::StaleContext { .. } | AssessmentError::StaleCheck { .. } => {
                    self.status.report(StatusMessage::cancelled(kind));
                }
                AssessmentError::Collaborator(failure) => {
                    let class = failure.class();
                    error!(
                        collaborator = %failure.kind,
                        class = class.as_str(),
                        timed_out = failure.timed_out,
                        error = %failure.message,
                        "{kind} failed"
                    );
                    self.status
                        .report_error(StatusMessage::for_failure(kind, class), class);
                }
            }
        }
        result
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    fn dispatch_submit(self: &Arc<Self>, answers: &[u32]) -> Dispatch<SubmitOutcome> {
        let captured = self.context.capture();
        let (contract, signer) = self.bound_signer(&captured)?;
        self.engine_ready()?;
        let permit = self.acquire(OperationKind::Submit)?;

        let this = Arc::clone(self);
        let answers = answers.to_vec();
        Ok(spawn_operation(OperationKind::Submit, async move {
            let result = this
                .submit(permit, captured, contract, signer, &answers)
                .await;
            this.settle(OperationKind::Submit, result)
        }))
    }

    fn dispatch_refresh(self: &Arc<Self>) -> Dispatch<RefreshOutcome> {
        let captured = self.context.capture();
        if captured.contract.is_none() {
            self.state.lock().clear_handles();
            return Err(Rejection::ContractUnavailable);
        }
        let (contract, account) = self.bound_signer(&captured)?;
        let permit = self.acquire(OperationKind::Refresh)?;

        let this = Arc::clone(self);
        Ok(spawn_operation(OperationKind::Refresh, async move {
            this.refresh(permit, captured, contract, account).await
        }))
    }

    fn dispatch_decrypt(self: &Arc<Self>) -> Dispatch<DecryptOutcome> {
        let captured = self.context.capture();
        let (contract, signer) = self.bound_signer(&captured)?;
        self.engine_ready()?;
        let handles = match self.state.lock().handles() {
            Some(handles) if !handles.primary().is_empty() => handles,
            _ => return Err(Rejection::NothingToDecrypt),
        };
        let permit = self.acquire(OperationKind::Decrypt)?;

        let this = Arc::clone(self);
        Ok(spawn_operation(OperationKind::Decrypt, async move {
            let result = this
                .decrypt(permit, captured, contract, signer, handles)
                .await;
            this.settle(OperationKind::Decrypt, result)
        }))
    }

    fn dispatch_has_assessment(self: &Arc<Self>) -> Dispatch<bool> {
        let captured = self.context.capture();
        let (contract, account) = self.bound_signer(&captured)?;
        let requested_at = self.state.lock().generation();

        let this = Arc::clone(self);
        let operation_id = Uuid::new_v4();
        let span = tracing::info_span!("assessment_check", operation_id = %operation_id);
        Ok(tokio::spawn(
            async move {
                let exists = match this
                    .collaborators
                    .ledger
                    .has_assessment(contract, account)
                    .await
                {
                    Ok(exists) => exists,
                    Err(err) => {
                        warn!(error = %err, "Error checking assessment");
                        return Err(AssessmentError::from(err));
                    }
                };
                if this.context.is_stale(&captured) {
                    debug!("Assessment check answered for a previous context");
                    return Err(AssessmentError::StaleCheck {
                        stage: "after existence check",
                    });
                }
                {
                    let mut state = this.state.lock();
                    if !state.set_has_assessment_read_at(requested_at, exists) {
                        debug!(exists, "Existence check predates a confirmed submission");
                        return Ok(state.has_assessment());
                    }
                }
                if exists {
                    // A rejection here means a refresh is already running.
                    let _ = this.dispatch_refresh();
                }
                Ok(exists)
            }
            .instrument(span),
        ))
    }

    // -------------------------------------------------------------------------
    // Procedures
    // -------------------------------------------------------------------------

    async fn submit(
        &self,
        permit: GuardPermit,
        captured: ExecutionContext,
        contract: ContractAddress,
        signer: AccountAddress,
        raw: &[u32],
    ) -> Result<SubmitOutcome, AssessmentError> {
        let answers = Answers::new(raw)?;

        self.status.report(StatusMessage::PreparingSubmission);
        let mut batch = self
            .collaborators
            .encryption
            .new_input_batch(contract, signer);
        for value in answers.values() {
            batch.add_u32(*value);
        }

        self.status.report(StatusMessage::Encrypting);
        let encrypted = batch.encrypt().await?;
        self.ensure_current(&captured, OperationKind::Submit, "after encryption")?;

        self.status.report(StatusMessage::Sending);
        let mut pending = self
            .collaborators
            .ledger
            .submit_assessment(contract, signer, &encrypted)
            .await?;
        let transaction = pending.hash();
        info!(%transaction, "Assessment transaction accepted");

        self.status.report(StatusMessage::AwaitingConfirmation);
        let receipt = pending.wait(self.config.required_confirmations).await?;
        self.ensure_current(&captured, OperationKind::Submit, "after confirmation")?;

        if !receipt.succeeded {
            warn!(%transaction, "Transaction mined with failure status");
            self.status.report(StatusMessage::SubmittedUnverified);
            return Ok(SubmitOutcome::Reverted { transaction });
        }

        info!(%transaction, block = receipt.block_number, "Assessment confirmed");
        self.status.report(StatusMessage::Submitted);
        self.state.lock().record_submission();

        // A refresh never waits on a submit; holding the submit permit here
        // cannot deadlock.
        let refresh_permit = self.acquire_when_free(OperationKind::Refresh).await;
        drop(permit);
        let refresh = match refresh_permit {
            Ok(refresh_permit) => {
                self.refresh(refresh_permit, captured, contract, signer)
                    .await
            }
            Err(rejection) => {
                warn!(%rejection, "Refresh after submission could not start");
                Err(AssessmentError::StaleContext {
                    operation: OperationKind::Refresh,
                    stage: "before refresh after submission",
                })
            }
        };

        Ok(SubmitOutcome::Confirmed {
            transaction,
            refresh,
        })
    }

    async fn refresh(
        &self,
        permit: GuardPermit,
        captured: ExecutionContext,
        contract: ContractAddress,
        account: AccountAddress,
    ) -> Result<RefreshOutcome, AssessmentError> {
        let _permit = permit;
        let result = self.read_and_apply(captured, contract, account).await;
        self.settle(OperationKind::Refresh, result)
    }

    async fn read_and_apply(
        &self,
        captured: ExecutionContext,
        contract: ContractAddress,
        account: AccountAddress,
    ) -> Result<RefreshOutcome, AssessmentError> {
        let requested_at = self.state.lock().generation();
        let record = self
            .collaborators
            .ledger
            .read_assessment(contract, account)
            .await?;
        self.ensure_current(&captured, OperationKind::Refresh, "after ledger read")?;
        if !self
            .state
            .lock()
            .apply_handles_read_at(requested_at, record.handles)
        {
            debug!("Ledger read predates a confirmed submission, discarding");
            return Ok(RefreshOutcome {
                handles: record.handles,
                superseded: true,
            });
        }
        debug!(
            stress = %record.handles.stress.short(),
            extroversion = %record.handles.extroversion.short(),
            intuition = %record.handles.intuition.short(),
            "Assessment handles refreshed"
        );
        Ok(RefreshOutcome {
            handles: record.handles,
            superseded: false,
        })
    }

    async fn decrypt(
        &self,
        _permit: GuardPermit,
        captured: ExecutionContext,
        contract: ContractAddress,
        signer: AccountAddress,
        handles: AssessmentHandles,
    ) -> Result<DecryptOutcome, AssessmentError> {
        self.status.report(StatusMessage::PreparingDecryption);
        let signature = self
            .collaborators
            .signatures
            .load_or_create(&[contract], signer)
            .await?
            .ok_or(AssessmentError::Authorization)?;
        self.ensure_current(&captured, OperationKind::Decrypt, "after authorization")?;

        self.status.report(StatusMessage::Decrypting);
        let present = handles.present();
        let requests: Vec<HandleContractPair> = present
            .iter()
            .map(|(_, handle)| HandleContractPair {
                handle: *handle,
                contract,
            })
            .collect();
        let values = self
            .collaborators
            .decryption
            .user_decrypt(&requests, &signature)
            .await?;
        self.ensure_current(&captured, OperationKind::Decrypt, "after reveal")?;

        let mut revealed = Vec::with_capacity(present.len());
        {
            let mut state = self.state.lock();
            for (field, handle) in present {
                if let Some(value) = values.get(&handle) {
                    state.record_clear(
                        field,
                        ClearValue {
                            handle,
                            value: *value,
                        },
                    );
                    revealed.push(field);
                }
            }
        }

        info!(revealed = revealed.len(), "Results decrypted");
        self.status.report(StatusMessage::Decrypted);
        Ok(DecryptOutcome { revealed })
    }

    // -------------------------------------------------------------------------
    // Identity changes
    // -------------------------------------------------------------------------

    fn switch_network(&self, network: Option<ChainId>) -> Option<ContractAddress> {
        let previous = self.context.capture();
        let contract = self.context.set_network(network);
        if previous.network != network || previous.contract != contract {
            self.state.lock().invalidate();
        }
        if network.is_some() && contract.is_none() {
            self.status.report(StatusMessage::NotDeployed);
        }
        contract
    }

    fn switch_account(&self, account: Option<AccountAddress>) {
        let previous = self.context.capture();
        self.context.set_account(account);
        if previous.account != account {
            self.state.lock().invalidate();
        }
    }

    // -------------------------------------------------------------------------
    // Observers
    // -------------------------------------------------------------------------

    fn can_submit(&self) -> bool {
        let ctx = self.context.capture();
        self.bound_signer(&ctx).is_ok()
            && self.engine_ready().is_ok()
            && self.guard.would_admit(OperationKind::Submit)
    }

    fn can_decrypt(&self) -> bool {
        let ctx = self.context.capture();
        let has_primary = self
            .state
            .lock()
            .handles()
            .is_some_and(|h| !h.primary().is_empty());
        self.bound_signer(&ctx).is_ok()
            && self.engine_ready().is_ok()
            && has_primary
            && self.guard.would_admit(OperationKind::Decrypt)
    }

    fn can_refresh(&self) -> bool {
        let ctx = self.context.capture();
        self.bound_signer(&ctx).is_ok() && self.guard.would_admit(OperationKind::Refresh)
    }
}

impl AssessmentApi for AssessmentService {
    fn submit_assessment(&self, answers: &[u32]) -> Dispatch<SubmitOutcome> {
        self.inner.dispatch_submit(answers)
    }

    fn refresh_assessment(&self) -> Dispatch<RefreshOutcome> {
        self.inner.dispatch_refresh()
    }

    fn decrypt_results(&self) -> Dispatch<DecryptOutcome> {
        self.inner.dispatch_decrypt()
    }

    fn check_has_assessment(&self) -> Dispatch<bool> {
        self.inner.dispatch_has_assessment()
    }

    fn switch_network(&self, network: Option<ChainId>) -> Option<ContractAddress> {
        self.inner.switch_network(network)
    }

    fn switch_account(&self, account: Option<AccountAddress>) {
        self.inner.switch_account(account)
    }

    fn status(&self) -> StatusSnapshot {
        self.inner.status.current()
    }

    fn snapshot(&self) -> AssessmentSnapshot {
        self.inner.state.lock().snapshot()
    }

    fn in_flight(&self) -> InFlight {
        self.inner.guard.snapshot()
    }

    fn has_assessment(&self) -> bool {
        self.inner.state.lock().has_assessment()
    }

    fn is_deployed(&self) -> bool {
        self.inner.context.contract().is_some()
    }

    fn can_submit(&self) -> bool {
        self.inner.can_submit()
    }

    fn can_decrypt(&self) -> bool {
        self.inner.can_decrypt()
    }

    fn can_refresh(&self) -> bool {
        self.inner.can_refresh()
    }
}
