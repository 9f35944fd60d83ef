use relaydesk_escalation::retry::RetrySweeper;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Drives the outbox and webhook retry sweeps on a fixed tick.
pub struct RetryScheduler {
    sweeper: Arc<RetrySweeper>,
    tick_secs: u64,
}

impl RetryScheduler {
    pub fn new(sweeper: Arc<RetrySweeper>, tick_secs: u64) -> Self {
        Self {
            sweeper,
            tick_secs: tick_secs.max(1),
        }
    }

    pub async fn run(&self) {
        tracing::info!(tick_secs = self.tick_secs, "Retry scheduler started");

        let mut tick = interval(Duration::from_secs(self.tick_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.run_once().await;
        }
    }

    /// One pass over both queues. Errors are logged and the loop carries on.
    pub async fn run_once(&self) {
        match self.sweeper.sweep_outbox().await {
            Ok(stats) if stats.picked > 0 => tracing::info!(
                picked = stats.picked,
                succeeded = stats.succeeded,
                rescheduled = stats.rescheduled,
                dead = stats.dead,
                "Outbox sweep finished"
            ),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Outbox sweep failed"),
        }

        match self.sweeper.sweep_webhooks().await {
            Ok(stats) if stats.picked > 0 => tracing::info!(
                picked = stats.picked,
                succeeded = stats.succeeded,
                rescheduled = stats.rescheduled,
                dead = stats.dead,
                "Webhook retry sweep finished"
            ),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Webhook retry sweep failed"),
        }
    }
}
