//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories, the cluster and storage.

pub mod configuration;
pub mod sweeper;
pub mod training_job;

// Re-export for convenience
pub use configuration as configuration_service;
pub use training_job::{BackendError, OrchestratorError, TrainingJobService};
