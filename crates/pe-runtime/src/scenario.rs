//! Questionnaire scenario against the simulated collaborators.
//!
//! ## Flow
//!
//! ```text
//! connect(network, account)
//!    └─→ check existing assessment
//!          └─→ submit answers ─→ (chained refresh)
//!                └─→ decrypt ─→ report
//! ```
//!
//! Every status overwrite is forwarded to the log by [`Scenario::follow_status`].

use std::fmt;
use std::time::Duration;

use pe_assessment::{
    AccountAddress, AssessmentApi, AssessmentService, AssessmentSnapshot, ChainId,
    ContractAddress, Dispatch, OperationKind, ResultField, SimulatedBackend, SubmitOutcome,
    TxHash,
};
use pe_telemetry::{record_context_switch, record_operation, OperationTimer, STATUS_UPDATES};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::questionnaire::field_title;
use crate::RuntimeError;

/// Await a dispatched operation, recording its outcome and duration.
async fn track<T>(kind: OperationKind, dispatch: Dispatch<T>) -> Result<T, RuntimeError> {
    let _timer = OperationTimer::start(kind.as_str());
    let task = match dispatch {
        Ok(task) => task,
        Err(rejection) => {
            record_operation(kind.as_str(), "rejected");
            return Err(RuntimeError::Rejected {
                operation: kind.as_str(),
                rejection,
            });
        }
    };
    let result = task
        .await
        .map_err(|e| RuntimeError::Join(e.to_string()))?;
    match &result {
        Ok(_) => record_operation(kind.as_str(), "ok"),
        Err(err) => record_operation(kind.as_str(), err.outcome_label()),
    }
    Ok(result?)
}

/// What one scenario run produced.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Network used.
    pub chain_id: ChainId,
    /// Contract bound on that network.
    pub contract: ContractAddress,
    /// Signer.
    pub account: AccountAddress,
    /// Whether an assessment existed before this run.
    pub existing: bool,
    /// Submission transaction.
    pub transaction: TxHash,
    /// Final assessment state.
    pub snapshot: AssessmentSnapshot,
}

impl ScenarioReport {
    /// Revealed value of a field.
    pub fn value(&self, field: ResultField) -> Option<u64> {
        self.snapshot.clear(field)
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Assessment of {} on chain {} (contract {})",
            self.account, self.chain_id, self.contract
        )?;
        writeln!(f, "  transaction: {}", self.transaction)?;
        for field in ResultField::ALL {
            match (self.snapshot.clear(field), self.snapshot.handles) {
                (Some(value), _) => writeln!(f, "  {}: {}", field_title(field), value)?,
                (None, Some(handles)) if !handles.get(field).is_empty() => writeln!(
                    f,
                    "  {}: Encrypted ({}...)",
                    field_title(field),
                    handles.get(field).short()
                )?,
                (None, _) => writeln!(f, "  {}: -", field_title(field))?,
            }
        }
        Ok(())
    }
}

/// Orchestrator wired to simulated collaborators.
pub struct Scenario {
    config: RuntimeConfig,
    backend: SimulatedBackend,
    service: AssessmentService,
}

impl Scenario {
    /// Wire the orchestrator; every collaborator is bounded by the
    /// configured deadline.
    pub fn new(config: RuntimeConfig) -> Self {
        let block_time = config.block_time;
        let backend = SimulatedBackend::with_ledger(|ledger| ledger.with_block_time(block_time));
        let limit = Duration::from_secs(config.assessment.collaborator_timeout_secs);
        let service = AssessmentService::new(
            config.assessment.clone(),
            backend.collaborators().bounded(limit),
        );
        Self {
            config,
            backend,
            service,
        }
    }

    /// The orchestrator.
    pub fn service(&self) -> &AssessmentService {
        &self.service
    }

    /// The simulated collaborators.
    pub fn backend(&self) -> &SimulatedBackend {
        &self.backend
    }

    /// Log every status overwrite until the service is dropped.
    pub fn follow_status(&self) -> JoinHandle<()> {
        let mut updates = self.service.subscribe_status();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let status = updates.borrow_and_update().clone();
                STATUS_UPDATES.inc();
                match status.error {
                    Some(class) => warn!(status = %status.text(), class = class.as_str(), "Status"),
                    None => info!(status = %status.text(), "Status"),
                }
            }
        })
    }

    /// Apply the configured network and account.
    pub fn connect(&self) -> Option<ContractAddress> {
        let contract = self.service.switch_network(Some(self.config.chain_id));
        record_context_switch("network");
        self.service.switch_account(Some(self.config.account));
        record_context_switch("account");
        contract
    }

    /// Wait until no operation is in flight, at most one collaborator
    /// deadline.
    pub async fn wait_idle(&self) {
        let limit = Duration::from_secs(self.config.assessment.collaborator_timeout_secs);
        let mut in_flight = self.service.subscribe_in_flight();
        let idle = async { in_flight.wait_for(|f| f.is_idle()).await.is_ok() };
        if !matches!(tokio::time::timeout(limit, idle).await, Ok(true)) {
            warn!(in_flight = ?self.service.in_flight(), "Operations still in flight");
        }
    }

    /// Connect, submit, refresh and decrypt.
    pub async fn run(&self) -> Result<ScenarioReport, RuntimeError> {
        let chain_id = self.config.chain_id;
        let contract = self
            .connect()
            .ok_or_else(|| RuntimeError::Config(format!("no contract deployed on chain {chain_id}")))?;
        info!(chain = %chain_id, %contract, account = %self.config.account, "Connected");

        let existing = match self.service.check_has_assessment() {
            Ok(task) => task
                .await
                .map_err(|e| RuntimeError::Join(e.to_string()))?
                .unwrap_or_else(|err| {
                    warn!(error = %err, "Existence check failed");
                    false
                }),
            Err(rejection) => {
                return Err(RuntimeError::Rejected {
                    operation: "check",
                    rejection,
                })
            }
        };
        if existing {
            info!("An assessment is already stored; submitting replaces it");
            // The check chains a refresh that would block the submit.
            self.wait_idle().await;
        }

        let transaction = match track(
            OperationKind::Submit,
            self.service.submit_assessment(&self.config.answers),
        )
        .await?
        {
            SubmitOutcome::Confirmed {
                transaction,
                refresh,
            } => {
                if let Err(err) = refresh {
                    warn!(error = %err, "Refresh after submit failed");
                }
                transaction
            }
            SubmitOutcome::Reverted { transaction } => {
                return Err(RuntimeError::Reverted(transaction))
            }
        };

        if self.service.snapshot().handles.is_none() {
            track(OperationKind::Refresh, self.service.refresh_assessment()).await?;
        }
        let decrypted = track(OperationKind::Decrypt, self.service.decrypt_results()).await?;
        info!(revealed = decrypted.revealed.len(), "Scenario finished");

        Ok(ScenarioReport {
            chain_id,
            contract,
            account: self.config.account,
            existing,
            transaction,
            snapshot: self.service.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pe_assessment::Rejection;

    #[tokio::test]
    async fn test_default_scenario_reveals_neutral_scores() {
        let scenario = Scenario::new(RuntimeConfig::default());
        let report = scenario.run().await.unwrap();

        assert!(!report.existing);
        for field in ResultField::ALL {
            assert_eq!(report.value(field), Some(15));
        }
        assert!(scenario.service().has_assessment());
        assert!(report.to_string().contains("Stress Level: 15"));
    }

    #[tokio::test]
    async fn test_scenario_sums_per_field() {
        let config = RuntimeConfig {
            answers: vec![3, 3, 3, 3, 3, 5, 5, 5, 5, 5, 1, 1, 1, 1, 1],
            ..RuntimeConfig::default()
        };
        let report = Scenario::new(config).run().await.unwrap();
        assert_eq!(report.value(ResultField::Stress), Some(15));
        assert_eq!(report.value(ResultField::Extroversion), Some(25));
        assert_eq!(report.value(ResultField::Intuition), Some(5));
    }

    #[tokio::test]
    async fn test_second_run_sees_existing_assessment() {
        let scenario = Scenario::new(RuntimeConfig::default());
        scenario.run().await.unwrap();
        let report = scenario.run().await.unwrap();
        assert!(report.existing);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_once_operations_finish() {
        let scenario = Scenario::new(RuntimeConfig::default());
        scenario.connect();
        let refresh = scenario.service().refresh_assessment().unwrap();
        scenario.wait_idle().await;
        assert!(scenario.service().in_flight().is_idle());
        refresh.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_undeployed_chain_fails_fast() {
        let config = RuntimeConfig {
            chain_id: ChainId(1),
            ..RuntimeConfig::default()
        };
        let err = Scenario::new(config).run().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[tokio::test]
    async fn test_invalid_answers_surface_as_operation_error() {
        let config = RuntimeConfig {
            answers: vec![3; 14],
            ..RuntimeConfig::default()
        };
        let scenario = Scenario::new(config);
        let err = scenario.run().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Operation(_)));
        assert!(scenario.backend().ledger.block_number() == 0);
    }

    #[tokio::test]
    async fn test_rejection_is_recorded() {
        let scenario = Scenario::new(RuntimeConfig::default());
        let err = track(
            OperationKind::Decrypt,
            scenario.service().decrypt_results(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Rejected {
                rejection: Rejection::ContractUnavailable,
                ..
            }
        ));
        assert!(
            pe_telemetry::OPERATIONS
                .with_label_values(&["decrypt", "rejected"])
                .get()
                >= 1.0
        );
    }
}
