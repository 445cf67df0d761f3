//! Background task that keeps re-asserting `monitored` on a newly created
//! catalog entity until its time budget runs out.
//!
//! The task is detached from the approval that spawned it: dropping the
//! caller does not stop it. It stops on its own deadline or when its
//! [`MonitorHandle`] is cancelled.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use quire_config::MonitorConfig;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, sleep_until, timeout_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CatalogError;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait MonitorTarget: Send + Sync + 'static {
    async fn set_monitored(&self, ids: &[i64], monitored: bool) -> Result<(), CatalogError>;
}

/// What a finished monitor task did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub attempts: u32,
    pub failures: u32,
    pub cancelled: bool,
}

#[derive(Debug)]
pub struct MonitorHandle {
    entity_id: i64,
    cancel: CancellationToken,
    join: JoinHandle<MonitorReport>,
}

impl MonitorHandle {
    pub fn entity_id(&self) -> i64 {
        self.entity_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task; `None` if it panicked or was aborted.
    pub async fn join(self) -> Option<MonitorReport> {
        self.join.await.ok()
    }
}

/// Spawn a monitor for `entity_id`. The first update is sent immediately.
pub fn spawn_monitor(
    target: Arc<dyn MonitorTarget>,
    entity_id: i64,
    config: MonitorConfig,
) -> MonitorHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let join = tokio::spawn(run_monitor(target, entity_id, config, token));
    MonitorHandle {
        entity_id,
        cancel,
        join,
    }
}

async fn run_monitor(
    target: Arc<dyn MonitorTarget>,
    entity_id: i64,
    config: MonitorConfig,
    cancel: CancellationToken,
) -> MonitorReport {
    let deadline = Instant::now() + config.budget;
    let mut ticker = interval(config.interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = MonitorReport::default();

    debug!(entity_id, interval = ?config.interval, budget = ?config.budget, "monitor started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            _ = sleep_until(deadline) => break,
            _ = ticker.tick() => {}
        }

        report.attempts += 1;
        // An attempt never runs past the budget.
        let attempt_deadline = (Instant::now() + config.attempt_timeout).min(deadline);
        match timeout_at(attempt_deadline, target.set_monitored(&[entity_id], true)).await {
            Ok(Ok(())) => debug!(entity_id, attempt = report.attempts, "monitor update sent"),
            Ok(Err(err)) => {
                report.failures += 1;
                warn!(entity_id, attempt = report.attempts, error = %err, "monitor update failed");
            }
            Err(_) => {
                report.failures += 1;
                warn!(entity_id, attempt = report.attempts, "monitor update timed out");
            }
        }
    }

    info!(
        entity_id,
        attempts = report.attempts,
        failures = report.failures,
        cancelled = report.cancelled,
        "monitor finished"
    );
    report
}
