//! The escalation pipeline.
//!
//! An escalation trigger flows through [`escalation::EscalationService`]
//! (dedup, persist, notify, route), fans out to tenant webhook endpoints via
//! [`webhook::WebhookDeliveryService`] (with `internal://` endpoints handled
//! by [`internal::InternalResolver`]) and is delivered to human channels by
//! [`dispatch::DispatchEngine`]. Failed sends are picked up later by
//! [`retry::RetrySweeper`].

pub mod dispatch;
pub mod error;
pub mod escalation;
pub mod internal;
pub mod retry;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use error::{EscalationError, Result};

use dispatch::{DispatchEngine, DispatchSettings};
use escalation::EscalationService;
use internal::InternalResolver;
use relaydesk_notify::registry::ProviderRegistry;
use relaydesk_notify::settings::FallbackConfig;
use relaydesk_storage::DeskStore;
use retry::{RetryPolicy, RetrySweeper};
use std::sync::Arc;
use std::time::Duration;
use webhook::WebhookDeliveryService;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub dispatch: DispatchSettings,
    pub webhook_timeout: Duration,
    pub dedup_window: Duration,
    /// `None` turns off retry scheduling for webhook deliveries.
    pub retry: Option<RetryPolicy>,
    pub retry_batch_size: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            dispatch: DispatchSettings::default(),
            webhook_timeout: Duration::from_secs(30),
            dedup_window: Duration::from_secs(60),
            retry: Some(RetryPolicy::default()),
            retry_batch_size: 50,
        }
    }
}

/// All pipeline services wired against one store and provider registry.
#[derive(Clone)]
pub struct Pipeline {
    pub engine: Arc<DispatchEngine>,
    pub webhooks: Arc<WebhookDeliveryService>,
    pub escalations: Arc<EscalationService>,
    pub sweeper: Arc<RetrySweeper>,
}

impl Pipeline {
    pub fn build(
        store: DeskStore,
        registry: Arc<ProviderRegistry>,
        fallback: FallbackConfig,
        settings: PipelineSettings,
    ) -> Result<Self> {
        let engine = Arc::new(DispatchEngine::new(
            store.clone(),
            registry,
            fallback,
            settings.dispatch,
        ));
        let resolver = InternalResolver::new(store.clone(), engine.clone());
        let webhooks = Arc::new(WebhookDeliveryService::new(
            store.clone(),
            resolver,
            settings.webhook_timeout,
            settings.retry,
        )?);
        let dedup_window = chrono::Duration::from_std(settings.dedup_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let escalations = Arc::new(EscalationService::new(
            store.clone(),
            engine.clone(),
            webhooks.clone(),
            dedup_window,
        ));
        let sweeper = Arc::new(RetrySweeper::new(
            store,
            engine.clone(),
            webhooks.clone(),
            settings.retry.unwrap_or_default(),
            settings.retry_batch_size,
        ));
        Ok(Self {
            engine,
            webhooks,
            escalations,
            sweeper,
        })
    }
}
