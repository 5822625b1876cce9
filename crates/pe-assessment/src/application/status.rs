//! # Status Reporter
//!
//! One current status, overwritten at each orchestration step, plus the
//! classification of the last collaborator failure.

use std::fmt;

use tokio::sync::watch;

use crate::domain::{ErrorClass, OperationKind, ValidationError};

/// Human-readable status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusMessage {
    /// Nothing reported yet.
    Idle,
    /// Contract missing on the current network.
    NotDeployed,
    /// Submit started.
    PreparingSubmission,
    /// Answers being encrypted.
    Encrypting,
    /// Ciphertexts being sent.
    Sending,
    /// Waiting for the transaction to be mined.
    AwaitingConfirmation,
    /// Transaction mined and succeeded.
    Submitted,
    /// Transaction mined with a failure status.
    SubmittedUnverified,
    /// Submit abandoned after an identity change.
    SubmissionCancelled,
    /// Answers rejected.
    InvalidAnswers(ValidationError),
    /// User declined the transaction.
    TransactionRejected,
    /// Account cannot pay.
    InsufficientFunds,
    /// Any other submit failure.
    SubmissionFailed,
    /// Refresh read failed.
    RetrievalFailed,
    /// Refresh result discarded after an identity change.
    RefreshDiscarded,
    /// Decrypt started.
    PreparingDecryption,
    /// No decryption signature obtainable.
    SignatureUnavailable,
    /// Reveal in progress.
    Decrypting,
    /// Values committed.
    Decrypted,
    /// Decrypt abandoned after an identity change.
    DecryptionCancelled,
    /// User declined the decryption signature.
    DecryptionRejected,
    /// Any other decrypt failure.
    DecryptionFailed,
}

impl StatusMessage {
    /// Message for a collaborator failure of `kind` classified as `class`.
    pub fn for_failure(kind: OperationKind, class: ErrorClass) -> Self {
        match (kind, class) {
            (OperationKind::Submit, ErrorClass::UserRejected) => StatusMessage::TransactionRejected,
            (OperationKind::Submit, ErrorClass::InsufficientFunds) => {
                StatusMessage::InsufficientFunds
            }
            (OperationKind::Submit, ErrorClass::Generic) => StatusMessage::SubmissionFailed,
            (OperationKind::Refresh, _) => StatusMessage::RetrievalFailed,
            (OperationKind::Decrypt, ErrorClass::UserRejected) => StatusMessage::DecryptionRejected,
            (OperationKind::Decrypt, _) => StatusMessage::DecryptionFailed,
        }
    }

    /// Message for a staleness cancellation of `kind`.
    pub fn cancelled(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Submit => StatusMessage::SubmissionCancelled,
            OperationKind::Refresh => StatusMessage::RefreshDiscarded,
            OperationKind::Decrypt => StatusMessage::DecryptionCancelled,
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusMessage::Idle => "",
            StatusMessage::NotDeployed => {
                "Contract not deployed on this network. Please deploy the contract or switch to a supported network."
            }
            StatusMessage::PreparingSubmission => "Preparing your assessment...",
            StatusMessage::Encrypting => "Encrypting your responses...",
            StatusMessage::Sending => "Sending encrypted data to blockchain...",
            StatusMessage::AwaitingConfirmation => "Waiting for transaction confirmation...",
            StatusMessage::Submitted => "Assessment submitted successfully!",
            StatusMessage::SubmittedUnverified => {
                "Transaction completed but may have failed. Please check your wallet."
            }
            StatusMessage::SubmissionCancelled => {
                "Submission cancelled due to network or account change."
            }
            StatusMessage::InvalidAnswers(err) => return write!(f, "{err}"),
            StatusMessage::TransactionRejected => "Transaction cancelled by user.",
            StatusMessage::InsufficientFunds => "Insufficient funds to complete transaction.",
            StatusMessage::SubmissionFailed => "Failed to submit assessment. Please try again.",
            StatusMessage::RetrievalFailed => {
                "Failed to retrieve assessment data. Please try again."
            }
            StatusMessage::RefreshDiscarded => "Refresh discarded due to network or account change.",
            StatusMessage::PreparingDecryption => "Preparing to decrypt your results...",
            StatusMessage::SignatureUnavailable => {
                "Unable to create decryption signature. Please try again."
            }
            StatusMessage::Decrypting => "Decrypting encrypted data...",
            StatusMessage::Decrypted => "Results decrypted successfully!",
            StatusMessage::DecryptionCancelled => {
                "Decryption cancelled due to network or account change."
            }
            StatusMessage::DecryptionRejected => "Decryption cancelled by user.",
            StatusMessage::DecryptionFailed => "Failed to decrypt results. Please try again.",
        };
        f.write_str(text)
    }
}

/// The current status as seen by observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Latest message.
    pub message: StatusMessage,
    /// Classification when the message reports a collaborator failure.
    pub error: Option<ErrorClass>,
    /// Incremented on every overwrite.
    pub revision: u64,
}

impl StatusSnapshot {
    /// Display text.
    pub fn text(&self) -> String {
        self.message.to_string()
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            message: StatusMessage::Idle,
            error: None,
            revision: 0,
        }
    }
}

/// Single-slot status holder.
#[derive(Debug)]
pub struct StatusReporter {
    current: watch::Sender<StatusSnapshot>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    /// Create a reporter with an empty status.
    pub fn new() -> Self {
        let (current, _) = watch::channel(StatusSnapshot::default());
        Self { current }
    }

    /// Overwrite with a progress or outcome message.
    pub fn report(&self, message: StatusMessage) {
        self.overwrite(message, None);
    }

    /// Overwrite with a classified failure.
    pub fn report_error(&self, message: StatusMessage, class: ErrorClass) {
        self.overwrite(message, Some(class));
    }

    fn overwrite(&self, message: StatusMessage, error: Option<ErrorClass>) {
        tracing::debug!(status = %message, "Status updated");
        self.current.send_modify(|snapshot| {
            snapshot.message = message;
            snapshot.error = error;
            snapshot.revision += 1;
        });
    }

    /// Latest status.
    pub fn current(&self) -> StatusSnapshot {
        self.current.borrow().clone()
    }

    /// Follow every overwrite.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.current.subscribe()
    }
}
