//! # Application Module
//!
//! The orchestrator plus the context tracker and status reporter it owns.

pub mod context;
pub mod service;
pub mod status;

pub use context::ContextTracker;
pub use service::AssessmentService;
pub use status::{StatusMessage, StatusReporter, StatusSnapshot};
