//! # Domain Module
//!
//! Core types for the assessment orchestrator: identities, handles,
//! the operation guard and the assessment state.

pub mod entities;
pub mod errors;
pub mod guard;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use guard::*;
pub use value_objects::*;
