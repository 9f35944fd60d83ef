//! Fan-out of one escalation to its human-notification destinations.

use chrono::Utc;
use futures::future::join_all;
use relaydesk_common::types::{
    DeliveryResult, Destination, EscalationEvent, IntegrationRecord, IntegrationStatus, Provider,
};
use relaydesk_notify::registry::ProviderRegistry;
use relaydesk_notify::settings::FallbackConfig;
use relaydesk_notify::SendOutcome;
use relaydesk_storage::store::NewOutboxEntry;
use relaydesk_storage::DeskStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const NO_DESTINATIONS: &str = "no destinations configured";
pub const PROVIDER_NOT_REGISTERED: &str = "provider_not_registered";

const FALLBACK_EMAIL_ID: &str = "fallback:email";
const FALLBACK_SLACK_ID: &str = "fallback:slack";
const DIRECT_EMAIL_PREFIX: &str = "direct-email:";

/// Timing knobs for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Upper bound on one adapter call, independent of its siblings.
    pub provider_timeout: Duration,
    /// Delay before the outbox sweep first retries a failed send.
    pub outbox_initial_delay: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(15),
            outbox_initial_delay: Duration::from_secs(120),
        }
    }
}

/// Aggregate outcome of a dispatch. `ok` is true when any destination succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub ok: bool,
    pub results: Vec<DeliveryResult>,
    pub error: Option<String>,
}

/// A destination after lookup: either something an adapter can be called
/// with, or the reason it cannot.
#[derive(Debug, Clone)]
enum Target {
    Ready(IntegrationRecord),
    Unresolved {
        provider: String,
        integration_id: Option<String>,
        error: String,
    },
}

/// Resolves destinations, fans out to provider adapters concurrently and
/// queues failed sends in the integration outbox.
pub struct DispatchEngine {
    store: DeskStore,
    registry: Arc<ProviderRegistry>,
    fallback: FallbackConfig,
    settings: DispatchSettings,
}

impl DispatchEngine {
    pub fn new(
        store: DeskStore,
        registry: Arc<ProviderRegistry>,
        fallback: FallbackConfig,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            registry,
            fallback,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Delivers `event` to every destination.
    ///
    /// With `destinations == None` the tenant's active integrations are used.
    /// Environment fallbacks apply only when that yields nothing at all and
    /// `skip_fallback` is false. Integrations listed in `already_delivered`
    /// were reached through an internal webhook endpoint for this event and
    /// are reported as delivered without calling their adapter again.
    pub async fn dispatch(
        &self,
        event: &EscalationEvent,
        destinations: Option<&[Destination]>,
        skip_fallback: bool,
        already_delivered: &[String],
    ) -> DispatchOutcome {
        let mut targets = match destinations {
            Some(list) => self.resolve_destinations(&event.tenant_id, list).await,
            None => self.default_targets(&event.tenant_id).await,
        };

        if targets.is_empty() && !skip_fallback {
            targets = self.fallback_targets(&event.tenant_id);
            if !targets.is_empty() {
                tracing::info!(
                    tenant_id = %event.tenant_id,
                    count = targets.len(),
                    "No tenant destinations, using environment fallback"
                );
            }
        }

        if targets.is_empty() {
            tracing::warn!(
                tenant_id = %event.tenant_id,
                conversation_id = %event.conversation_id,
                skip_fallback,
                "Escalation has no destinations"
            );
            return DispatchOutcome {
                ok: false,
                results: Vec::new(),
                error: Some(NO_DESTINATIONS.to_string()),
            };
        }

        let results = join_all(
            targets
                .into_iter()
                .map(|t| self.deliver(event, t, already_delivered)),
        )
        .await;
        let ok = results.iter().any(|r| r.ok);
        if !ok {
            tracing::error!(
                tenant_id = %event.tenant_id,
                conversation_id = %event.conversation_id,
                destinations = results.len(),
                "Escalation failed on every destination"
            );
        }
        DispatchOutcome {
            ok,
            error: (!ok).then(|| "all destinations failed".to_string()),
            results,
        }
    }

    async fn default_targets(&self, tenant_id: &str) -> Vec<Target> {
        match self.store.list_active_integrations(tenant_id).await {
            Ok(records) => records.into_iter().map(Target::Ready).collect(),
            Err(e) => {
                tracing::warn!(tenant_id, error = %e, "Failed to load tenant integrations");
                Vec::new()
            }
        }
    }

    async fn resolve_destinations(&self, tenant_id: &str, list: &[Destination]) -> Vec<Target> {
        let mut targets = Vec::with_capacity(list.len());
        for destination in list {
            targets.push(self.resolve_destination(tenant_id, destination).await);
        }
        targets
    }

    async fn resolve_destination(&self, tenant_id: &str, destination: &Destination) -> Target {
        match destination {
            Destination::DirectEmail {
                direct_email,
                provider,
            } => Target::Ready(direct_email_record(tenant_id, provider, direct_email)),
            Destination::Descriptor { destination: d } if d.integration_id.is_none() => {
                match d.email.as_deref().filter(|e| !e.trim().is_empty()) {
                    Some(email) => Target::Ready(direct_email_record(tenant_id, &d.kind, email)),
                    None => Target::Unresolved {
                        provider: d.kind.clone(),
                        integration_id: None,
                        error: "destination has no integration or email".to_string(),
                    },
                }
            }
            _ => {
                let Some(id) = destination.integration_id() else {
                    return Target::Unresolved {
                        provider: "unknown".to_string(),
                        integration_id: None,
                        error: "destination has no integration id".to_string(),
                    };
                };
                self.lookup_integration(tenant_id, id).await
            }
        }
    }

    async fn lookup_integration(&self, tenant_id: &str, id: &str) -> Target {
        let unresolved = |provider: &str, error: &str| Target::Unresolved {
            provider: provider.to_string(),
            integration_id: Some(id.to_string()),
            error: error.to_string(),
        };
        match self.store.get_integration(id).await {
            // Foreign integrations look exactly like missing ones.
            Ok(Some(record)) if record.tenant_id != tenant_id => {
                tracing::warn!(tenant_id, integration_id = id, "Destination integration belongs to another tenant");
                unresolved("unknown", "integration not found")
            }
            Ok(Some(record)) if !record.is_active() => {
                unresolved(&record.provider, "integration disabled")
            }
            Ok(Some(record)) => Target::Ready(record),
            Ok(None) => unresolved("unknown", "integration not found"),
            Err(e) => {
                tracing::warn!(tenant_id, integration_id = id, error = %e, "Integration lookup failed");
                unresolved("unknown", "integration lookup failed")
            }
        }
    }

    fn fallback_targets(&self, tenant_id: &str) -> Vec<Target> {
        let mut targets = Vec::new();
        if let Some(email) = &self.fallback.email {
            targets.push(Target::Ready(synthetic_record(
                FALLBACK_EMAIL_ID,
                tenant_id,
                Provider::Email,
                json!({"to": email}),
            )));
        }
        if let Some(url) = &self.fallback.slack_webhook_url {
            targets.push(Target::Ready(synthetic_record(
                FALLBACK_SLACK_ID,
                tenant_id,
                Provider::Slack,
                json!({"webhook_url": url}),
            )));
        }
        targets
    }

    async fn deliver(
        &self,
        event: &EscalationEvent,
        target: Target,
        already_delivered: &[String],
    ) -> DeliveryResult {
        let record = match target {
            Target::Ready(record) => record,
            Target::Unresolved {
                provider,
                integration_id,
                error,
            } => return DeliveryResult::failed(provider, integration_id, error),
        };

        if already_delivered.contains(&record.id) {
            tracing::debug!(
                provider = %record.provider,
                integration_id = %record.id,
                "Integration already reached through an internal webhook"
            );
            return DeliveryResult {
                provider: record.provider,
                ok: true,
                id: None,
                url: None,
                error: None,
                integration_id: Some(record.id),
            };
        }

        let outcome = self.send(event, &record).await;
        let Some(outcome) = outcome else {
            return DeliveryResult::failed(
                record.provider.clone(),
                Some(record.id.clone()),
                PROVIDER_NOT_REGISTERED,
            );
        };

        if !outcome.ok {
            self.enqueue_retry(event, &record, outcome.error.as_deref())
                .await;
        }
        into_result(&record, outcome)
    }

    /// Calls the adapter for `record` under the provider timeout. `None`
    /// when no adapter serves the record's provider.
    pub(crate) async fn send(
        &self,
        event: &EscalationEvent,
        record: &IntegrationRecord,
    ) -> Option<SendOutcome> {
        let adapter = self.registry.resolve(&record.provider)?;
        let timeout = self.settings.provider_timeout;
        let outcome = match tokio::time::timeout(timeout, adapter.send_escalation(event, record)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    provider = %record.provider,
                    integration_id = %record.id,
                    timeout_secs = timeout.as_secs(),
                    "Provider call timed out"
                );
                SendOutcome::failed(format!("{} timed out after {}s", record.provider, timeout.as_secs()))
            }
        };
        Some(outcome)
    }

    async fn enqueue_retry(
        &self,
        event: &EscalationEvent,
        record: &IntegrationRecord,
        error: Option<&str>,
    ) {
        let payload = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize escalation for outbox");
                return;
            }
        };
        let delay = chrono::Duration::from_std(self.settings.outbox_initial_delay)
            .unwrap_or_else(|_| chrono::Duration::minutes(2));
        let entry = NewOutboxEntry {
            tenant_id: event.tenant_id.clone(),
            provider: record.provider.clone(),
            integration_id: record.id.clone(),
            payload,
            last_error: error.map(str::to_string),
            next_attempt_at: Utc::now() + delay,
        };
        match self.store.enqueue_outbox(&entry).await {
            Ok(row) => tracing::info!(
                outbox_id = %row.id,
                provider = %record.provider,
                integration_id = %record.id,
                "Queued failed provider send for retry"
            ),
            Err(e) => tracing::warn!(
                provider = %record.provider,
                integration_id = %record.id,
                error = %e,
                "Failed to queue provider send for retry"
            ),
        }
    }

    /// Rebuilds the send target of an outbox entry: a stored integration
    /// (still active and owned by the tenant) or a synthetic fallback /
    /// direct-email target.
    pub async fn rehydrate_target(
        &self,
        tenant_id: &str,
        provider: &str,
        integration_id: &str,
    ) -> std::result::Result<IntegrationRecord, String> {
        match integration_id {
            FALLBACK_EMAIL_ID => self
                .fallback
                .email
                .as_ref()
                .map(|email| {
                    synthetic_record(FALLBACK_EMAIL_ID, tenant_id, Provider::Email, json!({"to": email}))
                })
                .ok_or_else(|| "fallback email no longer configured".to_string()),
            FALLBACK_SLACK_ID => self
                .fallback
                .slack_webhook_url
                .as_ref()
                .map(|url| {
                    synthetic_record(FALLBACK_SLACK_ID, tenant_id, Provider::Slack, json!({"webhook_url": url}))
                })
                .ok_or_else(|| "fallback slack webhook no longer configured".to_string()),
            id if id.starts_with(DIRECT_EMAIL_PREFIX) => Ok(direct_email_record(
                tenant_id,
                provider,
                &id[DIRECT_EMAIL_PREFIX.len()..],
            )),
            id => match self.lookup_integration(tenant_id, id).await {
                Target::Ready(record) => Ok(record),
                Target::Unresolved { error, .. } => Err(error),
            },
        }
    }
}

fn into_result(record: &IntegrationRecord, outcome: SendOutcome) -> DeliveryResult {
    DeliveryResult {
        provider: record.provider.clone(),
        ok: outcome.ok,
        id: outcome.id,
        url: outcome.url,
        error: outcome.error,
        integration_id: Some(record.id.clone()),
    }
}

fn synthetic_record(
    id: &str,
    tenant_id: &str,
    provider: Provider,
    config: serde_json::Value,
) -> IntegrationRecord {
    IntegrationRecord {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        provider: provider.as_str().to_string(),
        name: id.to_string(),
        status: IntegrationStatus::Active,
        credentials: json!({}),
        config,
    }
}

fn direct_email_record(tenant_id: &str, provider: &str, email: &str) -> IntegrationRecord {
    let email = email.trim();
    IntegrationRecord {
        id: format!("{DIRECT_EMAIL_PREFIX}{email}"),
        tenant_id: tenant_id.to_string(),
        provider: provider.trim().to_lowercase(),
        name: email.to_string(),
        status: IntegrationStatus::Active,
        credentials: json!({}),
        config: json!({"to": email}),
    }
}
