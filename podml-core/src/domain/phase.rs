//! Cluster-reported workload phase

use serde::{Deserialize, Serialize};

use crate::domain::job::JobStatus;

/// Raw status facts a cluster backend reports for a workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub has_failure_condition: bool,
    pub succeeded_count: u32,
    pub active_count: u32,
}

impl Phase {
    /// Maps the phase onto a job status
    ///
    /// Precedence: failure, then succeeded replicas, then active replicas,
    /// then queued. Backends can report several of these at once while a
    /// workload is transitioning.
    pub fn status(&self) -> JobStatus {
        if self.has_failure_condition {
            JobStatus::Failed
        } else if self.succeeded_count > 0 {
            JobStatus::Succeeded
        } else if self.active_count > 0 {
            JobStatus::Running
        } else {
            JobStatus::Queued
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_dominates_success() {
        let phase = Phase {
            has_failure_condition: true,
            succeeded_count: 1,
            active_count: 1,
        };
        assert_eq!(phase.status(), JobStatus::Failed);
    }

    #[test]
    fn test_success_dominates_active() {
        let phase = Phase {
            has_failure_condition: false,
            succeeded_count: 1,
            active_count: 1,
        };
        assert_eq!(phase.status(), JobStatus::Succeeded);
    }

    #[test]
    fn test_active_maps_to_running() {
        let phase = Phase {
            active_count: 1,
            ..Default::default()
        };
        assert_eq!(phase.status(), JobStatus::Running);
    }

    #[test]
    fn test_empty_phase_is_queued() {
        assert_eq!(Phase::default().status(), JobStatus::Queued);
    }
}
