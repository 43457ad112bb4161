//! Data Transfer Objects
//!
//! Request payloads accepted by the orchestrator API. Responses reuse the
//! domain types directly.

pub mod configuration;
pub mod job;
