//! Background retry sweeps for the integration outbox and failed webhook
//! deliveries.

use crate::dispatch::DispatchEngine;
use crate::webhook::WebhookDeliveryService;
use chrono::{DateTime, Utc};
use relaydesk_common::types::EscalationEvent;
use relaydesk_storage::store::OutboxEntry;
use relaydesk_storage::DeskStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Exponential backoff with a ceiling and an attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^attempts, max_delay)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use relaydesk_escalation::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy {
    ///     max_attempts: 5,
    ///     base_delay: Duration::from_secs(60),
    ///     max_delay: Duration::from_secs(600),
    /// };
    /// assert_eq!(policy.backoff(1), Duration::from_secs(120));
    /// assert_eq!(policy.backoff(3), Duration::from_secs(480));
    /// assert_eq!(policy.backoff(10), Duration::from_secs(600));
    /// ```
    pub fn backoff(&self, attempts: i32) -> Duration {
        let exp = attempts.clamp(0, 30) as u32;
        self.base_delay
            .checked_mul(1u32 << exp)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// When the next attempt should run after `attempts` failures, or `None`
    /// once the budget is spent.
    pub fn next_attempt_at(&self, attempts: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if attempts >= self.max_attempts {
            return None;
        }
        let delay = chrono::Duration::from_std(self.backoff(attempts)).ok()?;
        Some(now + delay)
    }
}

/// Counts for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub picked: usize,
    pub succeeded: usize,
    pub rescheduled: usize,
    pub dead: usize,
}

pub struct RetrySweeper {
    store: DeskStore,
    engine: Arc<DispatchEngine>,
    webhooks: Arc<WebhookDeliveryService>,
    policy: RetryPolicy,
    batch_size: u64,
}

impl RetrySweeper {
    pub fn new(
        store: DeskStore,
        engine: Arc<DispatchEngine>,
        webhooks: Arc<WebhookDeliveryService>,
        policy: RetryPolicy,
        batch_size: u64,
    ) -> Self {
        Self {
            store,
            engine,
            webhooks,
            policy,
            batch_size,
        }
    }

    /// Resends due outbox entries through the provider registry.
    pub async fn sweep_outbox(&self) -> crate::Result<SweepStats> {
        let due = self.store.list_due_outbox(Utc::now(), self.batch_size).await?;
        let mut stats = SweepStats {
            picked: due.len(),
            ..Default::default()
        };

        for entry in due {
            match self.retry_outbox_entry(&entry).await {
                Ok(()) => {
                    self.store.mark_outbox_sent(&entry.id).await?;
                    stats.succeeded += 1;
                    tracing::info!(
                        outbox_id = %entry.id,
                        provider = %entry.provider,
                        attempts = entry.attempts + 1,
                        "Outbox entry delivered"
                    );
                }
                Err(OutboxFailure::Permanent(error)) => {
                    self.store
                        .mark_outbox_dead(&entry.id, entry.attempts + 1, &error)
                        .await?;
                    stats.dead += 1;
                    tracing::error!(outbox_id = %entry.id, error = %error, "Outbox entry cannot be retried");
                }
                Err(OutboxFailure::Transient(error)) => {
                    let attempts = entry.attempts + 1;
                    match self.policy.next_attempt_at(attempts, Utc::now()) {
                        Some(next) => {
                            self.store
                                .reschedule_outbox(&entry.id, attempts, next, &error)
                                .await?;
                            stats.rescheduled += 1;
                            tracing::warn!(
                                outbox_id = %entry.id,
                                provider = %entry.provider,
                                attempts,
                                next_attempt_at = %next,
                                error = %error,
                                "Outbox retry failed, rescheduled"
                            );
                        }
                        None => {
                            self.store.mark_outbox_dead(&entry.id, attempts, &error).await?;
                            stats.dead += 1;
                            tracing::error!(
                                outbox_id = %entry.id,
                                provider = %entry.provider,
                                attempts,
                                error = %error,
                                "Outbox entry exhausted its retries"
                            );
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    async fn retry_outbox_entry(&self, entry: &OutboxEntry) -> Result<(), OutboxFailure> {
        let event: EscalationEvent = serde_json::from_value(entry.payload.clone())
            .map_err(|e| OutboxFailure::Permanent(format!("invalid outbox payload: {e}")))?;
        let record = self
            .engine
            .rehydrate_target(&entry.tenant_id, &entry.provider, &entry.integration_id)
            .await
            .map_err(OutboxFailure::Permanent)?;
        let outcome = self
            .engine
            .send(&event, &record)
            .await
            .ok_or_else(|| {
                OutboxFailure::Permanent(crate::dispatch::PROVIDER_NOT_REGISTERED.to_string())
            })?;
        if outcome.ok {
            Ok(())
        } else {
            Err(OutboxFailure::Transient(
                outcome.error.unwrap_or_else(|| "provider send failed".to_string()),
            ))
        }
    }

    /// Re-sends failed webhook deliveries whose retry time has come.
    pub async fn sweep_webhooks(&self) -> crate::Result<SweepStats> {
        let due = self
            .store
            .list_due_webhook_deliveries(Utc::now(), self.policy.max_attempts, self.batch_size)
            .await?;
        let mut stats = SweepStats {
            picked: due.len(),
            ..Default::default()
        };

        for row in due {
            let result = self.webhooks.redeliver(&row).await;
            if result.ok {
                stats.succeeded += 1;
            } else if result.next_retry_at.is_some() {
                stats.rescheduled += 1;
            } else {
                stats.dead += 1;
            }
        }
        Ok(stats)
    }
}

enum OutboxFailure {
    /// Retrying cannot help (bad payload, target gone).
    Permanent(String),
    Transient(String),
}
