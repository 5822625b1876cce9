//! # PE Assessment
//!
//! Orchestrator for a confidential personality assessment: 15 answers are
//! encrypted client-side, submitted to a ledger contract that sums them per
//! result field, and later revealed to their owner only.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Operations
//!
//! | Operation | Collaborators | Blocked while |
//! |-----------|---------------|---------------|
//! | Submit | encryption, ledger | submit, refresh |
//! | Refresh | ledger | refresh |
//! | Decrypt | signatures, decryption | decrypt, refresh |
//!
//! Every operation captures the execution context (network, account,
//! contract) at dispatch and abandons itself after any suspension point at
//! which the context moved on. Results from a previous identity are never
//! committed.
//!
//! ## Module Structure
//!
//! ```text
//! pe-assessment/
//! ├── domain/          # Identities, handles, guard, assessment state, errors
//! ├── ports/           # API trait (inbound) + collaborator traits and mocks (outbound)
//! ├── application/     # AssessmentService, ContextTracker, StatusReporter
//! ├── adapters/        # Simulated collaborators, deadline wrappers
//! └── config.rs        # AssessmentConfig, DeploymentRegistry
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{Bounded, SimulatedBackend};
pub use application::{
    AssessmentService, ContextTracker, StatusMessage, StatusReporter, StatusSnapshot,
};
pub use config::{AssessmentConfig, ConfigError, DeploymentRegistry, CONTRACT_NAME};
pub use domain::{
    AccountAddress, Answers, AssessmentError, AssessmentHandles, AssessmentSnapshot, ChainId,
    ClearValue, CollaboratorError, CollaboratorKind, ContractAddress, ErrorClass,
    ExecutionContext, Handle, InFlight, OperationKind, Rejection, ResultField, TxHash,
    ValidationError, ANSWER_COUNT, MAX_ANSWER, MIN_ANSWER,
};
pub use ports::{
    AssessmentApi, Collaborators, DecryptOutcome, DecryptionEngine, Dispatch, EncryptionEngine,
    LedgerClient, OperationTask, RefreshOutcome, SignatureProvider, SubmitOutcome,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
