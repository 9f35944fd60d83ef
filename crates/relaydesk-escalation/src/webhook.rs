//! Fan-out of tenant events to registered webhook endpoints.
//!
//! Every endpoint gets its own ledger row before any delivery is attempted.
//! Endpoints are delivered concurrently with settle-all semantics: one
//! endpoint's failure never affects its siblings.

use crate::internal::InternalResolver;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use relaydesk_common::types::{
    Destination, EndpointTarget, EscalationMeta, EscalationReason, WebhookEndpoint, WebhookEvent,
    WebhookPayload,
};
use relaydesk_notify::signature::{sign_payload, SIGNATURE_HEADER};
use relaydesk_notify::utils::{truncate_string, MAX_BODY_LENGTH};
use relaydesk_storage::store::{DeliveryAttempt, WebhookDeliveryRow};
use relaydesk_storage::DeskStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const DELIVERY_HEADER: &str = "X-Webhook-Delivery";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";

/// `data` of an `escalation.triggered` webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTriggeredData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_id: Option<String>,
    pub conversation_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub reason: EscalationReason,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub user_message: String,
    #[serde(default)]
    pub refs: Vec<String>,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub meta: EscalationMeta,
}

/// Result of one attempt against one endpoint, before it is written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptOutcome {
    pub ok: bool,
    pub status: Option<u16>,
    pub body: Option<String>,
    pub error: Option<String>,
    /// Set when an internal endpoint deliberately skipped forwarding.
    pub note: Option<String>,
    /// False for failures a later attempt cannot fix.
    pub retryable: bool,
    /// Integration an internal endpoint handed the event to.
    pub forwarded_to: Option<String>,
}

impl AttemptOutcome {
    pub fn delivered(status: Option<u16>, body: Option<String>) -> Self {
        Self {
            ok: true,
            status,
            body,
            ..Default::default()
        }
    }

    pub fn skipped(note: impl Into<String>) -> Self {
        Self {
            ok: true,
            note: Some(note.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>, retryable: bool) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            retryable,
            ..Default::default()
        }
    }
}

/// Per-endpoint entry of a [`WebhookDispatchSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EndpointDelivery {
    pub endpoint_id: String,
    pub delivery_id: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded_integration_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct WebhookDispatchSummary {
    pub event_type: String,
    pub delivered: usize,
    pub failed: usize,
    pub deliveries: Vec<EndpointDelivery>,
}

impl WebhookDispatchSummary {
    /// Integrations that internal endpoints already delivered this event to.
    pub fn forwarded_integrations(&self) -> Vec<String> {
        self.deliveries
            .iter()
            .filter(|d| d.ok)
            .filter_map(|d| d.forwarded_integration_id.clone())
            .collect()
    }
}

pub struct WebhookDeliveryService {
    store: DeskStore,
    client: reqwest::Client,
    resolver: InternalResolver,
    policy: Option<RetryPolicy>,
}

impl WebhookDeliveryService {
    /// `policy == None` disables retry scheduling; failed rows then stay failed.
    pub fn new(
        store: DeskStore,
        resolver: InternalResolver,
        timeout: Duration,
        policy: Option<RetryPolicy>,
    ) -> crate::Result<Self> {
        let client = relaydesk_notify::utils::http_client(timeout)?;
        Ok(Self {
            store,
            client,
            resolver,
            policy,
        })
    }

    /// Delivers `event` to every active endpoint of the tenant subscribed to its type.
    pub async fn dispatch(&self, event: &WebhookEvent) -> crate::Result<WebhookDispatchSummary> {
        let endpoints = self
            .store
            .list_subscribed_endpoints(&event.tenant_id, &event.event_type)
            .await?;

        if endpoints.is_empty() {
            tracing::debug!(
                tenant_id = %event.tenant_id,
                event_type = %event.event_type,
                "No webhook endpoints subscribed"
            );
        }

        let deliveries = join_all(endpoints.iter().map(|ep| self.deliver_new(ep, event))).await;
        let delivered = deliveries.iter().filter(|d| d.ok).count();
        tracing::info!(
            tenant_id = %event.tenant_id,
            event_type = %event.event_type,
            endpoints = deliveries.len(),
            delivered,
            "Webhook event dispatched"
        );
        Ok(WebhookDispatchSummary {
            event_type: event.event_type.clone(),
            delivered,
            failed: deliveries.len() - delivered,
            deliveries,
        })
    }

    async fn deliver_new(&self, endpoint: &WebhookEndpoint, event: &WebhookEvent) -> EndpointDelivery {
        let payload = WebhookPayload::new(event);
        let body = match serde_json::to_string(&payload) {
            Ok(b) => b,
            Err(e) => {
                return EndpointDelivery {
                    endpoint_id: endpoint.id.clone(),
                    delivery_id: None,
                    ok: false,
                    response_status: None,
                    error: Some(format!("failed to serialize payload: {e}")),
                    note: None,
                    next_retry_at: None,
                    forwarded_integration_id: None,
                }
            }
        };

        let delivery = match self
            .store
            .insert_webhook_delivery(endpoint, &event.event_type, &body)
            .await
        {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::warn!(
                    endpoint_id = %endpoint.id,
                    error = %e,
                    "Failed to record webhook delivery, delivering without ledger row"
                );
                None
            }
        };

        let delivery_id = delivery.as_ref().map(|d| d.id.as_str());
        let outcome = self.attempt(endpoint, delivery_id, &payload, &body).await;
        self.record(endpoint, delivery.as_ref(), outcome).await
    }

    /// Re-sends a previously failed ledger row with its stored body, so the
    /// idempotency key stays stable across attempts.
    pub async fn redeliver(&self, row: &WebhookDeliveryRow) -> EndpointDelivery {
        let endpoint = match self.store.get_webhook_endpoint(&row.webhook_endpoint_id).await {
            Ok(Some(ep)) if ep.is_active => ep,
            Ok(found) => {
                let reason = if found.is_some() {
                    "endpoint inactive"
                } else {
                    "endpoint deleted"
                };
                self.give_up(row, reason).await;
                return EndpointDelivery {
                    endpoint_id: row.webhook_endpoint_id.clone(),
                    delivery_id: Some(row.id.clone()),
                    ok: false,
                    response_status: None,
                    error: Some(reason.to_string()),
                    note: None,
                    next_retry_at: None,
                    forwarded_integration_id: None,
                };
            }
            Err(e) => {
                tracing::warn!(delivery_id = %row.id, error = %e, "Failed to load webhook endpoint for retry");
                return EndpointDelivery {
                    endpoint_id: row.webhook_endpoint_id.clone(),
                    delivery_id: Some(row.id.clone()),
                    ok: false,
                    response_status: None,
                    error: Some(e.to_string()),
                    note: None,
                    next_retry_at: row.next_retry_at,
                    forwarded_integration_id: None,
                };
            }
        };

        let outcome = match serde_json::from_str::<WebhookPayload>(&row.payload) {
            Ok(payload) => self.attempt(&endpoint, Some(&row.id), &payload, &row.payload).await,
            Err(e) => AttemptOutcome::failed(format!("stored payload is invalid: {e}"), false),
        };
        self.record(&endpoint, Some(row), outcome).await
    }

    async fn give_up(&self, row: &WebhookDeliveryRow, reason: &str) {
        let attempt = DeliveryAttempt {
            response_status: None,
            response_body: Some(reason.to_string()),
        };
        if let Err(e) = self.store.mark_delivery_failed(&row.id, &attempt, None).await {
            tracing::warn!(delivery_id = %row.id, error = %e, "Failed to close webhook delivery");
        }
    }

    async fn attempt(
        &self,
        endpoint: &WebhookEndpoint,
        delivery_id: Option<&str>,
        payload: &WebhookPayload,
        body: &str,
    ) -> AttemptOutcome {
        match &endpoint.target {
            EndpointTarget::Http { url } => {
                let delivery_id = delivery_id.unwrap_or(&payload.idempotency_key);
                self.send_http(endpoint, url, delivery_id, payload, body).await
            }
            EndpointTarget::Internal {
                provider,
                integration_id,
            } => {
                self.resolver
                    .resolve(endpoint, provider, integration_id, payload)
                    .await
            }
            EndpointTarget::Invalid { reason } => AttemptOutcome::failed(reason.clone(), false),
        }
    }

    async fn send_http(
        &self,
        endpoint: &WebhookEndpoint,
        url: &str,
        delivery_id: &str,
        payload: &WebhookPayload,
        body: &str,
    ) -> AttemptOutcome {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, &payload.event_type)
            .header(DELIVERY_HEADER, delivery_id)
            .header(TIMESTAMP_HEADER, &payload.timestamp)
            .body(body.to_string());
        if let Some(secret) = &endpoint.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(body, secret));
        }

        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                let text = resp
                    .text()
                    .await
                    .map(|t| truncate_string(&t, MAX_BODY_LENGTH))
                    .ok();
                if status.is_success() {
                    AttemptOutcome::delivered(Some(status.as_u16()), text)
                } else {
                    AttemptOutcome {
                        status: Some(status.as_u16()),
                        body: text,
                        ..AttemptOutcome::failed(format!("HTTP {}", status.as_u16()), true)
                    }
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    "webhook request timed out".to_string()
                } else {
                    format!("webhook request failed: {e}")
                };
                AttemptOutcome::failed(error, true)
            }
        }
    }

    /// Writes an attempt back to the ledger and the endpoint health counters.
    async fn record(
        &self,
        endpoint: &WebhookEndpoint,
        delivery: Option<&WebhookDeliveryRow>,
        outcome: AttemptOutcome,
    ) -> EndpointDelivery {
        let mut next_retry_at = None;

        if outcome.ok {
            if let Some(row) = delivery {
                let attempt = DeliveryAttempt {
                    response_status: outcome.status,
                    response_body: outcome.note.clone().or_else(|| outcome.body.clone()),
                };
                if let Err(e) = self.store.mark_delivery_delivered(&row.id, &attempt).await {
                    tracing::warn!(delivery_id = %row.id, error = %e, "Failed to mark webhook delivered");
                }
            }
            if let Err(e) = self.store.record_endpoint_success(&endpoint.id).await {
                tracing::warn!(endpoint_id = %endpoint.id, error = %e, "Failed to update endpoint health");
            }
        } else {
            let attempts = delivery.map_or(0, |d| d.delivery_attempts) + 1;
            if outcome.retryable {
                next_retry_at = self
                    .policy
                    .and_then(|p| p.next_attempt_at(attempts, Utc::now()));
            }
            if let Some(row) = delivery {
                let attempt = DeliveryAttempt {
                    response_status: outcome.status,
                    response_body: outcome.body.clone().or_else(|| outcome.error.clone()),
                };
                if let Err(e) = self
                    .store
                    .mark_delivery_failed(&row.id, &attempt, next_retry_at)
                    .await
                {
                    tracing::warn!(delivery_id = %row.id, error = %e, "Failed to mark webhook failed");
                }
            }
            if let Err(e) = self.store.record_endpoint_failure(&endpoint.id).await {
                tracing::warn!(endpoint_id = %endpoint.id, error = %e, "Failed to update endpoint health");
            }
            tracing::warn!(
                endpoint_id = %endpoint.id,
                tenant_id = %endpoint.tenant_id,
                attempts,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Webhook delivery failed"
            );
        }

        EndpointDelivery {
            endpoint_id: endpoint.id.clone(),
            delivery_id: delivery.map(|d| d.id.clone()),
            ok: outcome.ok,
            response_status: outcome.status,
            error: outcome.error,
            note: outcome.note,
            next_retry_at,
            forwarded_integration_id: outcome.forwarded_to,
        }
    }
}
