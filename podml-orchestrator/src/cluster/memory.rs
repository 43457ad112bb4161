//! In-memory backend used by service tests

use async_trait::async_trait;
use podml_core::domain::phase::Phase;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use super::{ClusterError, WorkloadClient, WorkloadSpec};

#[derive(Default)]
pub struct MemoryClient {
    phases: Mutex<HashMap<String, Phase>>,
    submitted: Mutex<Vec<WorkloadSpec>>,
    phase_calls: AtomicUsize,
    fail_submit: AtomicBool,
    submit_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the phase reported for `name`
    pub fn set_phase(&self, name: &str, phase: Phase) {
        self.phases.lock().unwrap().insert(name.to_string(), phase);
    }

    /// How many times `get_phase` has been called
    pub fn phase_calls(&self) -> usize {
        self.phase_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<WorkloadSpec> {
        self.submitted.lock().unwrap().clone()
    }

    /// Makes every following submit fail with a rejection
    pub fn fail_submissions(&self) {
        self.fail_submit.store(true, Ordering::SeqCst);
    }

    /// Parks every following submit, after recording it, until the returned
    /// gate gets a permit
    pub fn hold_submissions(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.submit_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl WorkloadClient for MemoryClient {
    async fn submit(&self, spec: &WorkloadSpec) -> Result<String, ClusterError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ClusterError::Rejected("submission disabled".to_string()));
        }

        self.submitted.lock().unwrap().push(spec.clone());
        self.phases
            .lock()
            .unwrap()
            .entry(spec.name.clone())
            .or_default();

        let gate = self.submit_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }

        Ok(spec.name.clone())
    }

    async fn get_phase(&self, handle: &str) -> Result<Phase, ClusterError> {
        self.phase_calls.fetch_add(1, Ordering::SeqCst);
        self.phases
            .lock()
            .unwrap()
            .get(handle)
            .copied()
            .ok_or_else(|| ClusterError::NotFound(handle.to_string()))
    }
}
