//! Background sweeper that transitions IN_PROGRESS jobs whose assignment
//! expired more than a grace period ago to TIMED_OUT (spec §4.5.6: "the
//! core MAY run a background task... after a grace period").

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::jobs::repository::JobRepository;

const DEFAULT_GRACE_MINUTES: i64 = 15;
const DEFAULT_TICK_SECS: u64 = 60;

pub struct SweeperConfig {
    pub grace: chrono::Duration,
    pub tick: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            grace: chrono::Duration::minutes(DEFAULT_GRACE_MINUTES),
            tick: Duration::from_secs(DEFAULT_TICK_SECS),
        }
    }
}

pub struct Sweeper {
    repository: Arc<JobRepository>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(repository: Arc<JobRepository>, config: SweeperConfig) -> Self {
        Self { repository, config }
    }

    /// Spawn the sweep loop; the returned handle may be aborted on shutdown.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            grace_minutes = self.config.grace.num_minutes(),
            tick_secs = self.config.tick.as_secs(),
            "job timeout sweeper started"
        );

        let mut interval = tokio::time::interval(self.config.tick);
        loop {
            interval.tick().await;
            match self.repository.sweep_timed_out(self.config.grace).await {
                Ok(0) => debug!("sweep: no jobs timed out"),
                Ok(n) => info!(count = n, "sweep: jobs transitioned to TIMED_OUT"),
                Err(e) => error!(error = %e, "sweep failed"),
            }
        }
    }
}
