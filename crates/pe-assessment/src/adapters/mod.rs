//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound collaborator ports.
//!
//! - [`simulated`]: in-process collaborators for the runtime and end-to-end tests
//! - [`bounded`]: deadline wrappers applied at the port boundary

pub mod bounded;
pub mod simulated;

pub use bounded::Bounded;
pub use simulated::{
    input_proof, CachingSignatureProvider, InMemoryLedger, SimulatedBackend, SimulatedDecryption,
    SimulatedEncryption, SimulatedFhe, SIGNATURE_VALIDITY_DAYS,
};
