//! PodML Core
//!
//! Core types shared by the PodML services.
//!
//! This crate contains:
//! - Domain types: configurations, training jobs, resources, cluster phases
//! - DTOs: request payloads for the orchestrator API
//! - The training program contract: environment, artifact files, exit codes

pub mod contract;
pub mod domain;
pub mod dto;
