use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::digest::DigestService;
use crate::orchestrator::{CycleOutcome, IngestionOrchestrator};

pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DIGEST_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Runs an ingestion cycle on a fixed interval. Ticks that land while a cycle
/// is still running are dropped.
pub struct ScheduledTrigger {
    orchestrator: Arc<IngestionOrchestrator>,
    interval: Duration,
    category: Option<String>,
    last: Mutex<Option<CycleOutcome>>,
}

impl ScheduledTrigger {
    pub fn new(orchestrator: Arc<IngestionOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            category: None,
            last: Mutex::new(None),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_outcome(&self) -> Option<CycleOutcome> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// One scheduled run. A refused or failed cycle is recorded, never raised.
    pub async fn tick(&self) -> CycleOutcome {
        let started_at = Utc::now();
        let result = self.orchestrator.run_cycle(self.category.as_deref()).await;
        if let Err(e) = &result {
            tracing::warn!("Scheduled ingestion did not complete: {}", e);
        }
        let outcome = CycleOutcome::from_result(started_at, &result);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        outcome
    }

    /// Starts the loop. The first cycle runs immediately.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Scheduling ingestion every {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}

/// Sends digests every `interval`, starting one interval from now.
pub fn spawn_digest_task(digest: Arc<DigestService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = digest.send_digests().await {
                tracing::error!("Digest run failed: {}", e);
            }
        }
    })
}
