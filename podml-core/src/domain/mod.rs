//! Core domain types
//!
//! Business entities shared by the orchestrator's persistence, cluster and
//! API layers.

pub mod configuration;
pub mod job;
pub mod phase;
pub mod resources;
