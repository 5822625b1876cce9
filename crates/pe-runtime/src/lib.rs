//! # PE Runtime
//!
//! Drives the assessment orchestrator end to end against the simulated
//! collaborators.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (from env)
//! 2. Initialize telemetry (logs, metrics, optional OTLP export)
//! 3. Wire the orchestrator with bounded collaborators
//! 4. Connect network and account
//! 5. Submit, refresh, decrypt
//! 6. Print the revealed scores

#![warn(missing_docs)]

pub mod config;
pub mod questionnaire;
pub mod scenario;

pub use config::{load_config, RuntimeConfig};
pub use scenario::{Scenario, ScenarioReport};

use pe_assessment::{AssessmentError, ConfigError, Rejection, TxHash};
use thiserror::Error;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Environment value could not be used.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Deployment table could not be loaded.
    #[error("Invalid deployments: {0}")]
    Deployments(#[from] ConfigError),

    /// Answer list could not be parsed.
    #[error("Invalid answers: {0}")]
    Answers(String),

    /// Operation refused at dispatch.
    #[error("{operation} rejected: {rejection}")]
    Rejected {
        /// Operation name.
        operation: &'static str,
        /// Why it was refused.
        rejection: Rejection,
    },

    /// Operation failed after dispatch.
    #[error(transparent)]
    Operation(#[from] AssessmentError),

    /// Submission mined but reverted.
    #[error("Transaction {0} reverted")]
    Reverted(TxHash),

    /// Operation task panicked or was cancelled.
    #[error("Operation task failed: {0}")]
    Join(String),
}
