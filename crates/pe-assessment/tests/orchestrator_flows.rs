//! # Orchestrator Flow Tests
//!
//! Drive the assessment service through its operations against scripted
//! collaborators, injecting identity switches while operations are
//! suspended.
//!
//! ## Test Categories
//!
//! 1. **Admission** - validation before external calls, single-flight, cross-exclusion
//! 2. **Staleness** - results from a previous identity are discarded
//! 3. **State** - refresh idempotence, partial reveals, failure preservation
//! 4. **Ordering** - ledger answers requested before a confirmation never land after it
//! 5. **Status** - exact texts and error classification
//! 6. **End-to-end** - mocked and simulated collaborator stacks

use std::sync::Arc;
use std::time::Duration;

use pe_assessment::ports::{
    Gate, MockDecryption, MockEncryption, MockLedger, MockSignatureProvider,
};
use pe_assessment::{
    AccountAddress, AssessmentApi, AssessmentConfig, AssessmentError, AssessmentHandles,
    AssessmentService, ChainId, Collaborators, ContractAddress, DeploymentRegistry, ErrorClass,
    Handle, OperationKind, Rejection, ResultField, SimulatedBackend, StatusMessage,
    SubmitOutcome,
};

// =============================================================================
// TEST HELPERS
// =============================================================================

const CHAIN: ChainId = ChainId(31337);
const UNDEPLOYED: ChainId = ChainId(11155111);
const CONTRACT: ContractAddress = ContractAddress([0xC0; 20]);
const ALICE: AccountAddress = AccountAddress([0xA1; 20]);
const BOB: AccountAddress = AccountAddress([0xB0; 20]);

const H1: Handle = Handle([0x01; 32]);
const H2: Handle = Handle([0x02; 32]);
const H3: Handle = Handle([0x03; 32]);

const ANSWERS: [u32; 15] = [3, 3, 3, 3, 3, 5, 5, 5, 5, 5, 1, 1, 1, 1, 1];

struct Harness {
    service: AssessmentService,
    encryption: Arc<MockEncryption>,
    ledger: Arc<MockLedger>,
    signatures: Arc<MockSignatureProvider>,
    decryption: Arc<MockDecryption>,
}

fn config() -> AssessmentConfig {
    let mut config = AssessmentConfig::for_testing();
    config.deployments = DeploymentRegistry::default().with_deployment(CHAIN, CONTRACT);
    config
}

fn harness() -> Harness {
    let encryption = Arc::new(MockEncryption::default());
    let ledger = Arc::new(MockLedger::default());
    let signatures = Arc::new(MockSignatureProvider::default());
    let decryption = Arc::new(MockDecryption::default());
    let service = AssessmentService::new(
        config(),
        Collaborators {
            encryption: encryption.clone(),
            ledger: ledger.clone(),
            signatures: signatures.clone(),
            decryption: decryption.clone(),
        },
    );
    service.switch_network(Some(CHAIN));
    service.switch_account(Some(ALICE));
    Harness {
        service,
        encryption,
        ledger,
        signatures,
        decryption,
    }
}

/// Handles the ledger holds once the test submission confirms.
fn submitted_handles() -> AssessmentHandles {
    AssessmentHandles {
        stress: Handle([0x42; 32]),
        extroversion: Handle([0x43; 32]),
        intuition: Handle([0x44; 32]),
    }
}

fn all_handles() -> AssessmentHandles {
    AssessmentHandles {
        stress: H1,
        extroversion: H2,
        intuition: H3,
    }
}

/// Harness whose state already holds H1/H2/H3.
async fn harness_with_handles() -> Harness {
    let h = harness();
    h.ledger.set_handles(all_handles());
    h.service
        .refresh_assessment()
        .expect("refresh admitted")
        .await
        .expect("task joined")
        .expect("refresh succeeded");
    h
}

// =============================================================================
// ADMISSION
// =============================================================================

#[tokio::test]
async fn test_out_of_range_answer_rejected_before_encryption() {
    let h = harness();
    let mut answers = ANSWERS;
    answers[4] = 6;

    let err = h.service.submit_assessment(&answers).unwrap().await.unwrap().unwrap_err();

    assert!(matches!(err, AssessmentError::Validation(_)));
    assert!(h.encryption.encrypted_batches().is_empty());
    assert!(h.ledger.submissions().is_empty());
    assert_eq!(h.service.status().text(), "Answer 4 must be between 1 and 5");
    assert!(!h.service.has_assessment());
}

#[tokio::test]
async fn test_wrong_answer_count_rejected() {
    let h = harness();
    let err = h.service.submit_assessment(&[3; 14]).unwrap().await.unwrap().unwrap_err();
    assert!(matches!(err, AssessmentError::Validation(_)));
    assert_eq!(h.service.status().text(), "Expected 15 answers, got 14");
    assert!(h.encryption.encrypted_batches().is_empty());
}

#[tokio::test]
async fn test_double_submit_is_single_flight() {
    let h = harness();
    let gate = Gate::new();
    h.encryption.set_gate(gate.clone());

    let first = h.service.submit_assessment(&ANSWERS).expect("first admitted");
    assert_eq!(
        h.service.submit_assessment(&ANSWERS).unwrap_err(),
        Rejection::Busy {
            requested: OperationKind::Submit,
            blocking: OperationKind::Submit,
        }
    );
    assert!(h.service.in_flight().submitting);
    assert!(!h.service.can_submit());

    gate.wait_entered().await;
    gate.open();
    first.await.unwrap().unwrap();

    assert_eq!(h.encryption.encrypted_batches().len(), 1);
    assert_eq!(h.ledger.submissions().len(), 1);
    assert!(h.service.in_flight().is_idle());
}

#[tokio::test]
async fn test_refresh_in_flight_blocks_submit_and_decrypt() {
    let h = harness_with_handles().await;
    let gate = Gate::new();
    h.ledger.set_read_gate(gate.clone());

    let refresh = h.service.refresh_assessment().expect("refresh admitted");
    gate.wait_entered().await;

    assert_eq!(
        h.service.submit_assessment(&ANSWERS).unwrap_err(),
        Rejection::Busy {
            requested: OperationKind::Submit,
            blocking: OperationKind::Refresh,
        }
    );
    assert_eq!(
        h.service.decrypt_results().unwrap_err(),
        Rejection::Busy {
            requested: OperationKind::Decrypt,
            blocking: OperationKind::Refresh,
        }
    );
    assert!(matches!(
        h.service.refresh_assessment().unwrap_err(),
        Rejection::Busy { .. }
    ));
    assert!(!h.service.can_submit());
    assert!(!h.service.can_decrypt());
    assert!(!h.service.can_refresh());

    gate.open();
    refresh.await.unwrap().unwrap();
    assert!(h.service.can_submit());
    assert!(h.service.can_decrypt());
    assert!(h.encryption.encrypted_batches().is_empty());
    assert!(h.decryption.requests().is_empty());
}

#[tokio::test]
async fn test_submit_and_decrypt_may_overlap() {
    let h = harness_with_handles().await;
    h.decryption.set_value(H1, 12);
    let gate = Gate::new();
    h.encryption.set_gate(gate.clone());

    let submit = h.service.submit_assessment(&ANSWERS).expect("submit admitted");
    gate.wait_entered().await;

    let decrypt = h.service.decrypt_results().expect("decrypt admitted alongside submit");
    let outcome = decrypt.await.unwrap().unwrap();
    assert_eq!(outcome.revealed, vec![ResultField::Stress]);

    gate.open();
    submit.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_decrypt_rejected_without_handles() {
    let h = harness();
    assert_eq!(
        h.service.decrypt_results().unwrap_err(),
        Rejection::NothingToDecrypt
    );
    assert_eq!(h.signatures.call_count(), 0);
    assert!(h.decryption.requests().is_empty());
}

#[tokio::test]
async fn test_operations_rejected_without_account() {
    let h = harness();
    h.service.switch_account(None);
    assert_eq!(
        h.service.submit_assessment(&ANSWERS).unwrap_err(),
        Rejection::SignerUnavailable
    );
    assert_eq!(
        h.service.refresh_assessment().unwrap_err(),
        Rejection::SignerUnavailable
    );
    assert!(!h.service.can_refresh());
}

// =============================================================================
// STALENESS
// =============================================================================

#[tokio::test]
async fn test_submit_discarded_after_account_switch() {
    let h = harness();
    let gate = Gate::new();
    h.ledger.set_confirm_gate(gate.clone());

    let submit = h.service.submit_assessment(&ANSWERS).unwrap();
    gate.wait_entered().await;
    h.service.switch_account(Some(BOB));
    gate.open();

    let err = submit.await.unwrap().unwrap_err();
    assert!(err.is_stale());
    assert_eq!(
        h.service.status().text(),
        "Submission cancelled due to network or account change."
    );
    assert!(!h.service.has_assessment());
    assert_eq!(h.ledger.read_count(), 0);
    assert!(h.service.in_flight().is_idle());
}

#[tokio::test]
async fn test_submit_discarded_after_network_switch_during_encryption() {
    let h = harness();
    let gate = Gate::new();
    h.encryption.set_gate(gate.clone());

    let submit = h.service.submit_assessment(&ANSWERS).unwrap();
    gate.wait_entered().await;
    h.service.switch_network(Some(UNDEPLOYED));
    gate.open();

    let err = submit.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        AssessmentError::StaleContext {
            operation: OperationKind::Submit,
            stage: "after encryption",
        }
    );
    assert!(h.ledger.submissions().is_empty());
}

#[tokio::test]
async fn test_decrypt_discarded_after_account_switch() {
    let h = harness_with_handles().await;
    h.decryption.set_value(H1, 12);
    h.decryption.set_value(H2, 34);
    h.decryption.set_value(H3, 21);
    let gate = Gate::new();
    h.decryption.set_gate(gate.clone());

    let decrypt = h.service.decrypt_results().unwrap();
    gate.wait_entered().await;
    h.service.switch_account(Some(BOB));
    gate.open();

    let err = decrypt.await.unwrap().unwrap_err();
    assert!(err.is_stale());
    let snapshot = h.service.snapshot();
    assert_eq!(snapshot.clear_stress, None);
    assert_eq!(snapshot.clear_extroversion, None);
    assert_eq!(snapshot.clear_intuition, None);
    assert_eq!(
        h.service.status().text(),
        "Decryption cancelled due to network or account change."
    );
}

#[tokio::test]
async fn test_refresh_discarded_after_network_switch() {
    let h = harness();
    h.ledger.set_handles(all_handles());
    let gate = Gate::new();
    h.ledger.set_read_gate(gate.clone());

    let refresh = h.service.refresh_assessment().unwrap();
    gate.wait_entered().await;
    h.service.switch_network(Some(UNDEPLOYED));
    gate.open();

    assert!(refresh.await.unwrap().unwrap_err().is_stale());
    assert_eq!(h.service.snapshot().handles, None);
}

#[tokio::test]
async fn test_switching_to_undeployed_network_invalidates() {
    let h = harness_with_handles().await;
    assert!(h.service.is_deployed());

    assert_eq!(h.service.switch_network(Some(UNDEPLOYED)), None);

    assert!(!h.service.is_deployed());
    assert!(!h.service.can_submit());
    assert_eq!(h.service.snapshot().handles, None);
    assert_eq!(h.service.status().message, StatusMessage::NotDeployed);
    assert_eq!(
        h.service.submit_assessment(&ANSWERS).unwrap_err(),
        Rejection::ContractUnavailable
    );
}

#[tokio::test]
async fn test_existence_check_discarded_after_account_switch() {
    let h = harness();
    h.ledger.set_has_assessment(true);
    let gate = Gate::new();
    h.ledger.set_check_gate(gate.clone());

    let check = h.service.check_has_assessment().unwrap();
    gate.wait_entered().await;
    h.service.switch_account(Some(BOB));
    gate.open();

    let err = check.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        AssessmentError::StaleCheck {
            stage: "after existence check"
        }
    );
    assert_eq!(err.outcome_label(), "stale");
    assert!(!h.service.has_assessment());
    assert_eq!(h.ledger.read_count(), 0);
}

// =============================================================================
// STATE
// =============================================================================

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let h = harness_with_handles().await;
    let first = h.service.snapshot();
    h.service.refresh_assessment().unwrap().await.unwrap().unwrap();
    assert_eq!(h.service.snapshot(), first);
    assert_eq!(h.ledger.read_count(), 2);
}

#[tokio::test]
async fn test_refresh_failure_keeps_handles() {
    let h = harness_with_handles().await;
    h.ledger.fail_reads_with("connection reset");

    let err = h.service.refresh_assessment().unwrap().await.unwrap().unwrap_err();

    assert!(matches!(err, AssessmentError::Collaborator(_)));
    assert_eq!(h.service.snapshot().handles, Some(all_handles()));
    assert_eq!(
        h.service.status().text(),
        "Failed to retrieve assessment data. Please try again."
    );
}

#[tokio::test]
async fn test_partial_decrypt_commits_revealed_fields_only() {
    let h = harness_with_handles().await;
    h.decryption.set_value(H1, 12);
    h.decryption.set_value(H2, 34);

    let outcome = h.service.decrypt_results().unwrap().await.unwrap().unwrap();

    assert_eq!(
        outcome.revealed,
        vec![ResultField::Stress, ResultField::Extroversion]
    );
    let snapshot = h.service.snapshot();
    assert_eq!(snapshot.clear_stress, Some(12));
    assert_eq!(snapshot.clear_extroversion, Some(34));
    assert_eq!(snapshot.clear_intuition, None);
}

#[tokio::test]
async fn test_clear_values_hidden_after_handles_change() {
    let h = harness_with_handles().await;
    h.decryption.set_value(H1, 12);
    h.service.decrypt_results().unwrap().await.unwrap().unwrap();
    assert_eq!(h.service.snapshot().clear(ResultField::Stress), Some(12));

    h.ledger.set_handles(AssessmentHandles {
        stress: Handle([0x11; 32]),
        ..all_handles()
    });
    h.service.refresh_assessment().unwrap().await.unwrap().unwrap();
    assert_eq!(h.service.snapshot().clear(ResultField::Stress), None);
}

#[tokio::test]
async fn test_decrypt_only_requests_present_handles() {
    let h = harness();
    h.ledger.set_handles(AssessmentHandles {
        stress: H1,
        extroversion: Handle::EMPTY,
        intuition: H3,
    });
    h.service.refresh_assessment().unwrap().await.unwrap().unwrap();

    h.service.decrypt_results().unwrap().await.unwrap().unwrap();

    let requests = h.decryption.requests();
    assert_eq!(requests.len(), 1);
    let handles: Vec<Handle> = requests[0].iter().map(|r| r.handle).collect();
    assert_eq!(handles, vec![H1, H3]);
    assert!(requests[0].iter().all(|r| r.contract == CONTRACT));
}

// =============================================================================
// ORDERING
// =============================================================================

#[tokio::test]
async fn test_refresh_during_confirmation_does_not_hide_submission() {
    let h = harness();
    h.ledger.set_handles_on_confirm(submitted_handles());
    let confirm = Gate::new();
    h.ledger.set_confirm_gate(confirm.clone());
    let read = Gate::new();
    h.ledger.set_read_gate(read.clone());
    let mut status = h.service.subscribe_status();

    let submit = h.service.submit_assessment(&ANSWERS).unwrap();
    confirm.wait_entered().await;

    // Issued against the ledger before the transaction is mined.
    let early = h
        .service
        .refresh_assessment()
        .expect("refresh admitted while submit in flight");
    read.wait_entered().await;

    confirm.open();
    status
        .wait_for(|s| s.message == StatusMessage::Submitted)
        .await
        .unwrap();
    assert!(h.service.has_assessment());
    assert!(h.service.in_flight().submitting);

    read.open();
    let early = early.await.unwrap().unwrap();
    assert!(early.superseded);
    assert_eq!(early.handles, AssessmentHandles::EMPTY);
    assert_eq!(h.service.snapshot().handles, None);

    // The chained refresh runs after the early one released.
    read.wait_entered().await;
    read.open();
    match submit.await.unwrap().unwrap() {
        SubmitOutcome::Confirmed {
            refresh: Ok(refresh),
            ..
        } => {
            assert!(!refresh.superseded);
            assert_eq!(refresh.handles, submitted_handles());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(h.ledger.read_count(), 2);
    assert_eq!(h.service.snapshot().handles, Some(submitted_handles()));
    assert!(h.service.has_assessment());
    assert!(h.service.can_decrypt());
    assert_eq!(h.service.status().text(), "Assessment submitted successfully!");
}

#[tokio::test]
async fn test_late_existence_check_keeps_confirmed_submission() {
    let h = harness();
    h.ledger.set_handles_on_confirm(submitted_handles());
    let gate = Gate::new();
    h.ledger.set_check_gate(gate.clone());

    // Answered "no assessment" from a block before the submission.
    let check = h.service.check_has_assessment().unwrap();
    gate.wait_entered().await;

    h.service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap();
    assert!(h.service.has_assessment());
    assert_eq!(h.ledger.read_count(), 1);

    gate.open();
    assert!(check.await.unwrap().unwrap());

    assert!(h.service.has_assessment());
    assert_eq!(h.service.snapshot().handles, Some(submitted_handles()));
    assert_eq!(h.ledger.read_count(), 1);
}

// =============================================================================
// STATUS
// =============================================================================

#[tokio::test]
async fn test_user_rejection_classified() {
    let h = harness();
    h.ledger
        .fail_submit_with("MetaMask Tx Signature: User denied transaction signature.");

    h.service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap_err();

    let status = h.service.status();
    assert_eq!(status.text(), "Transaction cancelled by user.");
    assert_eq!(status.error, Some(ErrorClass::UserRejected));
}

#[tokio::test]
async fn test_insufficient_funds_classified() {
    let h = harness();
    h.ledger.fail_submit_with("insufficient funds for gas * price + value");

    h.service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap_err();

    let status = h.service.status();
    assert_eq!(status.text(), "Insufficient funds to complete transaction.");
    assert_eq!(status.error, Some(ErrorClass::InsufficientFunds));
    assert!(h.service.in_flight().is_idle());
}

#[tokio::test]
async fn test_generic_encryption_failure() {
    let h = harness();
    h.encryption.fail_with("relayer unreachable");

    h.service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap_err();

    assert_eq!(
        h.service.status().text(),
        "Failed to submit assessment. Please try again."
    );
    assert_eq!(h.service.status().error, Some(ErrorClass::Generic));
}

#[tokio::test]
async fn test_failed_receipt_reports_unverified() {
    let h = harness();
    h.ledger.set_receipt_succeeds(false);

    let outcome = h.service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap();

    assert!(matches!(outcome, SubmitOutcome::Reverted { .. }));
    assert_eq!(
        h.service.status().text(),
        "Transaction completed but may have failed. Please check your wallet."
    );
    assert!(!h.service.has_assessment());
    assert_eq!(h.ledger.read_count(), 0);
}

#[tokio::test]
async fn test_missing_signature_reports_authorization_failure() {
    let h = harness_with_handles().await;
    h.signatures.set_available(false);

    let err = h.service.decrypt_results().unwrap().await.unwrap().unwrap_err();

    assert_eq!(err, AssessmentError::Authorization);
    assert_eq!(
        h.service.status().text(),
        "Unable to create decryption signature. Please try again."
    );
    assert!(h.decryption.requests().is_empty());
}

#[tokio::test]
async fn test_declined_signature_classified() {
    let h = harness_with_handles().await;
    h.signatures.fail_with("user rejected signing");

    h.service.decrypt_results().unwrap().await.unwrap().unwrap_err();

    assert_eq!(h.service.status().text(), "Decryption cancelled by user.");
    assert_eq!(h.service.status().error, Some(ErrorClass::UserRejected));
}

#[tokio::test]
async fn test_decrypt_failure_leaves_no_clear_values() {
    let h = harness_with_handles().await;
    h.decryption.set_value(H1, 12);
    h.decryption.fail_with("gateway error");

    h.service.decrypt_results().unwrap().await.unwrap().unwrap_err();
    assert_eq!(h.service.snapshot().clear_stress, None);
    assert_eq!(
        h.service.status().text(),
        "Failed to decrypt results. Please try again."
    );

    h.decryption.heal();
    h.service.decrypt_results().unwrap().await.unwrap().unwrap();
    assert_eq!(h.service.snapshot().clear_stress, Some(12));
}

// =============================================================================
// END-TO-END
// =============================================================================

#[tokio::test]
async fn test_submit_then_decrypt_with_mocks() {
    let h = harness();
    h.ledger.set_handles(all_handles());
    h.decryption.set_value(H1, 12);
    h.decryption.set_value(H2, 34);
    h.decryption.set_value(H3, 21);

    let outcome = h.service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap();

    match outcome {
        SubmitOutcome::Confirmed {
            refresh: Ok(refresh),
            ..
        } => {
            assert!(!refresh.superseded);
            assert_eq!(refresh.handles, all_handles());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.encryption.encrypted_batches(), vec![ANSWERS.to_vec()]);
    assert!(h.service.has_assessment());
    assert_eq!(h.service.status().text(), "Assessment submitted successfully!");
    assert_eq!(h.ledger.read_count(), 1);

    h.service.decrypt_results().unwrap().await.unwrap().unwrap();
    let snapshot = h.service.snapshot();
    assert_eq!(snapshot.clear_stress, Some(12));
    assert_eq!(snapshot.clear_extroversion, Some(34));
    assert_eq!(snapshot.clear_intuition, Some(21));
    assert_eq!(h.service.status().text(), "Results decrypted successfully!");
}

#[tokio::test]
async fn test_simulated_stack_end_to_end() {
    let backend = SimulatedBackend::new();
    let service = AssessmentService::new(
        config(),
        backend.collaborators().bounded(Duration::from_secs(5)),
    );
    service.switch_network(Some(CHAIN));
    service.switch_account(Some(ALICE));

    service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap();
    assert!(service.has_assessment());

    service.decrypt_results().unwrap().await.unwrap().unwrap();
    let snapshot = service.snapshot();
    assert_eq!(snapshot.clear_stress, Some(15));
    assert_eq!(snapshot.clear_extroversion, Some(25));
    assert_eq!(snapshot.clear_intuition, Some(5));

    // Bob has nothing stored under the same contract.
    service.switch_account(Some(BOB));
    assert_eq!(
        service.decrypt_results().unwrap_err(),
        Rejection::NothingToDecrypt
    );
    let exists = service.check_has_assessment().unwrap().await.unwrap().unwrap();
    assert!(!exists);
    service.refresh_assessment().unwrap().await.unwrap().unwrap();
    assert!(!service.can_decrypt());
}

#[tokio::test]
async fn test_simulated_signature_reused_across_decrypts() {
    let backend = SimulatedBackend::new();
    let service = AssessmentService::new(config(), backend.collaborators());
    service.switch_network(Some(CHAIN));
    service.switch_account(Some(ALICE));
    service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap();

    service.decrypt_results().unwrap().await.unwrap().unwrap();
    service.decrypt_results().unwrap().await.unwrap().unwrap();

    assert_eq!(backend.signatures.created_count(), 1);
}

#[tokio::test]
async fn test_simulated_insufficient_funds() {
    let backend = SimulatedBackend::with_ledger(|ledger| ledger.with_fee(100));
    let service = AssessmentService::new(config(), backend.collaborators());
    service.switch_network(Some(CHAIN));
    service.switch_account(Some(ALICE));

    service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap_err();
    assert_eq!(service.status().error, Some(ErrorClass::InsufficientFunds));

    backend.ledger.fund(ALICE, 100);
    service.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap();
    assert!(service.has_assessment());
}

#[tokio::test]
async fn test_existing_assessment_discovered_on_connect() {
    let backend = SimulatedBackend::new();
    let first = AssessmentService::new(config(), backend.collaborators());
    first.switch_network(Some(CHAIN));
    first.switch_account(Some(ALICE));
    first.submit_assessment(&ANSWERS).unwrap().await.unwrap().unwrap();

    // A second session over the same ledger.
    let second = AssessmentService::new(config(), backend.collaborators());
    second.switch_network(Some(CHAIN));
    second.switch_account(Some(ALICE));
    assert!(second.check_has_assessment().unwrap().await.unwrap().unwrap());
    assert!(second.has_assessment());

    // The check chained a refresh; it holds its permit until the handles land.
    second
        .subscribe_in_flight()
        .wait_for(|f| f.is_idle())
        .await
        .unwrap();
    assert!(second.can_decrypt());
}
