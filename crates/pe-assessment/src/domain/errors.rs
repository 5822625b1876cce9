//! # Domain Errors
//!
//! Error taxonomy for orchestrated operations.
//!
//! | Error | Raised when | State effect |
//! |-------|-------------|--------------|
//! | `Validation` | answers malformed, before any external call | none |
//! | `Authorization` | no decryption signature obtainable | none |
//! | `StaleContext` | identity changed while suspended | result discarded |
//! | `StaleCheck` | identity changed before an existence check answered | answer discarded |
//! | `Collaborator` | encryption / ledger / signature / decryption failure | none |

use std::fmt;

use thiserror::Error;

use super::guard::OperationKind;

/// Malformed questionnaire input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The answer sequence does not have exactly the expected length.
    #[error("Expected {expected} answers, got {got}")]
    WrongLength {
        /// Required number of answers
        expected: usize,
        /// Number received
        got: usize,
    },

    /// An answer lies outside the accepted range.
    #[error("Answer {index} must be between 1 and 5")]
    OutOfRange {
        /// Zero-based position of the offending answer
        index: usize,
        /// Value received
        value: u32,
    },
}

/// Failure to parse a hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    /// Wrong number of bytes.
    #[error("expected {expected} bytes, got {got}")]
    Length {
        /// Required byte length
        expected: usize,
        /// Byte length received
        got: usize,
    },

    /// Not valid hexadecimal.
    #[error("invalid hex: {0}")]
    Hex(String),
}

/// Which external collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollaboratorKind {
    /// Encryption engine
    Encryption,
    /// Ledger client
    Ledger,
    /// Decryption signature provider
    Signature,
    /// Decryption engine
    Decryption,
}

impl fmt::Display for CollaboratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollaboratorKind::Encryption => "encryption",
            CollaboratorKind::Ledger => "ledger",
            CollaboratorKind::Signature => "signature",
            CollaboratorKind::Decryption => "decryption",
        };
        f.write_str(name)
    }
}

/// Best-effort classification of a collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The user declined a wallet prompt.
    UserRejected,
    /// The account cannot pay for the transaction.
    InsufficientFunds,
    /// Anything else.
    Generic,
}

impl ErrorClass {
    /// Classify a collaborator message by substring match.
    ///
    /// Not exhaustive: unknown wordings fall back to `Generic`.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("user rejected") || lower.contains("user denied") {
            ErrorClass::UserRejected
        } else if lower.contains("insufficient funds") {
            ErrorClass::InsufficientFunds
        } else {
            ErrorClass::Generic
        }
    }

    /// Stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::UserRejected => "user_rejected",
            ErrorClass::InsufficientFunds => "insufficient_funds",
            ErrorClass::Generic => "generic",
        }
    }
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} collaborator failed: {message}")]
pub struct CollaboratorError {
    /// Failing collaborator.
    pub kind: CollaboratorKind,
    /// Message as reported by the collaborator.
    pub message: String,
    /// Set when the call was abandoned at the boundary deadline.
    pub timed_out: bool,
}

impl CollaboratorError {
    /// Create a collaborator error.
    pub fn new(kind: CollaboratorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timed_out: false,
        }
    }

    /// Create a deadline-exceeded error.
    pub fn timeout(kind: CollaboratorKind, after_secs: u64) -> Self {
        Self {
            kind,
            message: format!("no response within {after_secs}s"),
            timed_out: true,
        }
    }

    /// Classification of the underlying message.
    pub fn class(&self) -> ErrorClass {
        ErrorClass::classify(&self.message)
    }
}

/// Error returned by an orchestrated operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssessmentError {
    /// Input rejected before any external call.
    #[error("Invalid answers: {0}")]
    Validation(#[from] ValidationError),

    /// No decryption authorization could be obtained.
    #[error("Decryption authorization unavailable")]
    Authorization,

    /// The execution context changed while the operation was suspended.
    ///
    /// Informational: the operation is moot, not failed.
    #[error("{operation} cancelled: context changed {stage}")]
    StaleContext {
        /// Operation that was abandoned
        operation: OperationKind,
        /// Suspension point after which the change was seen
        stage: &'static str,
    },

    /// The execution context changed before an existence check answered.
    #[error("existence check discarded: context changed {stage}")]
    StaleCheck {
        /// Suspension point after which the change was seen
        stage: &'static str,
    },

    /// An external collaborator failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl AssessmentError {
    /// True for staleness cancellations.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            AssessmentError::StaleContext { .. } | AssessmentError::StaleCheck { .. }
        )
    }

    /// Stable outcome label for metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            AssessmentError::Validation(_) => "invalid",
            AssessmentError::Authorization => "unauthorized",
            AssessmentError::StaleContext { .. } | AssessmentError::StaleCheck { .. } => "stale",
            AssessmentError::Collaborator(_) => "failed",
        }
    }
}

/// Why a dispatch was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Another operation blocks this kind.
    #[error("{requested} blocked while {blocking} is in flight")]
    Busy {
        /// Kind that was requested
        requested: OperationKind,
        /// In-flight kind that blocks it
        blocking: OperationKind,
    },

    /// No contract is deployed on the current network.
    #[error("contract not deployed on the current network")]
    ContractUnavailable,

    /// No signer account is connected.
    #[error("no signer account connected")]
    SignerUnavailable,

    /// The encryption engine is not ready.
    #[error("encryption engine not ready")]
    EngineUnavailable,

    /// No ciphertext handle to decrypt.
    #[error("no encrypted results to decrypt")]
    NothingToDecrypt,
}
