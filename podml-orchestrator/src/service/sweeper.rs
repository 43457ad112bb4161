//! Stuck-job sweeper
//!
//! Periodically resolves jobs left in `queued`, typically after a failed or
//! interrupted submission.

use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use super::training_job::TrainingJobService;

/// Starts the sweep loop in the background
pub fn spawn(
    service: Arc<TrainingJobService>,
    interval: Duration,
    queued_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    info!(
        "Starting stuck-job sweeper (interval: {:?}, queued timeout: {:?})",
        interval, queued_timeout
    );

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            debug!("Sweeping for stuck queued jobs");

            match service.sweep_stuck_queued(queued_timeout).await {
                Ok(0) => {}
                Ok(changed) => info!("Resolved {} stuck job(s) this sweep", changed),
                Err(e) => error!("Error during sweep: {:?}", e),
            }
        }
    })
}
