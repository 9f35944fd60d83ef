//! Local handling of `internal://integration/<provider>/<id>` webhook endpoints.
//!
//! Instead of an HTTP hairpin, the event is handed straight to the provider
//! adapter of the referenced integration.

use crate::dispatch::{DispatchEngine, PROVIDER_NOT_REGISTERED};
use crate::webhook::{AttemptOutcome, EscalationTriggeredData};
use relaydesk_common::types::{
    EscalationEvent, IntegrationRecord, WebhookEndpoint, WebhookPayload, ESCALATION_TRIGGERED,
};
use relaydesk_storage::DeskStore;
use std::sync::Arc;

pub const NOTE_NO_ASSISTANT_ANSWER: &str = "skipped: conversation has no assistant answer yet";
pub const NOTE_NOT_A_RULE_DESTINATION: &str = "skipped: integration is not a destination of the matched rule";
pub const NOTE_UNSUPPORTED_EVENT: &str = "skipped: event type is not forwarded to integrations";

pub struct InternalResolver {
    store: DeskStore,
    engine: Arc<DispatchEngine>,
}

impl InternalResolver {
    pub fn new(store: DeskStore, engine: Arc<DispatchEngine>) -> Self {
        Self { store, engine }
    }

    pub async fn resolve(
        &self,
        endpoint: &WebhookEndpoint,
        provider: &str,
        integration_id: &str,
        payload: &WebhookPayload,
    ) -> AttemptOutcome {
        let record = match self.load_integration(endpoint, provider, integration_id).await {
            Ok(record) => record,
            Err(outcome) => return outcome,
        };

        if payload.event_type != ESCALATION_TRIGGERED {
            return AttemptOutcome::skipped(NOTE_UNSUPPORTED_EVENT);
        }
        let data: EscalationTriggeredData = match serde_json::from_value(payload.data.clone()) {
            Ok(d) => d,
            Err(e) => {
                return AttemptOutcome::failed(format!("invalid escalation payload: {e}"), false)
            }
        };

        let exchange = match self.store.latest_exchange(&data.conversation_id).await {
            Ok(exchange) => exchange,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %data.conversation_id,
                    error = %e,
                    "Failed to load conversation for internal webhook"
                );
                return AttemptOutcome::failed(format!("conversation lookup failed: {e}"), true);
            }
        };
        let Some(assistant_answer) = exchange.assistant_answer else {
            tracing::info!(
                endpoint_id = %endpoint.id,
                conversation_id = %data.conversation_id,
                "Conversation has no assistant answer yet, skipping internal delivery"
            );
            return AttemptOutcome::skipped(NOTE_NO_ASSISTANT_ANSWER);
        };

        if !data.destinations.is_empty()
            && !data
                .destinations
                .iter()
                .any(|d| d.matches_integration(&record.id, &record.provider))
        {
            tracing::debug!(
                endpoint_id = %endpoint.id,
                integration_id = %record.id,
                "Integration not among rule destinations, skipping"
            );
            return AttemptOutcome::skipped(NOTE_NOT_A_RULE_DESTINATION);
        }

        let event = EscalationEvent {
            tenant_id: endpoint.tenant_id.clone(),
            conversation_id: data.conversation_id,
            session_id: data.session_id,
            user_message: exchange.user_message.unwrap_or(data.user_message),
            assistant_answer: Some(assistant_answer),
            confidence: data.confidence,
            refs: data.refs,
            reason: data.reason,
            rule_id: data.rule_id,
            destinations: data.destinations,
            meta: data.meta,
        };

        // Escalation-originated events are also dispatched directly, and that
        // path owns retries through the outbox.
        let retryable = data.escalation_id.is_none();
        match self.engine.send(&event, &record).await {
            Some(outcome) if outcome.ok => AttemptOutcome {
                forwarded_to: Some(record.id.clone()),
                ..AttemptOutcome::delivered(outcome.http_status, outcome.id)
            },
            Some(outcome) => AttemptOutcome {
                status: outcome.http_status,
                ..AttemptOutcome::failed(
                    outcome.error.unwrap_or_else(|| "provider send failed".to_string()),
                    retryable,
                )
            },
            None => AttemptOutcome::failed(PROVIDER_NOT_REGISTERED, false),
        }
    }

    /// Loads the referenced integration, failing closed on anything that
    /// does not line up with the endpoint.
    async fn load_integration(
        &self,
        endpoint: &WebhookEndpoint,
        provider: &str,
        integration_id: &str,
    ) -> Result<IntegrationRecord, AttemptOutcome> {
        let record = match self.store.get_integration(integration_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(AttemptOutcome::failed("integration not found", false)),
            Err(e) => {
                return Err(AttemptOutcome::failed(
                    format!("integration lookup failed: {e}"),
                    true,
                ))
            }
        };

        if record.tenant_id != endpoint.tenant_id {
            tracing::warn!(
                endpoint_id = %endpoint.id,
                endpoint_tenant = %endpoint.tenant_id,
                integration_id,
                "Internal webhook references another tenant's integration"
            );
            return Err(AttemptOutcome::failed("integration not found", false));
        }
        if !record.provider.eq_ignore_ascii_case(provider) {
            return Err(AttemptOutcome::failed(
                format!(
                    "integration provider mismatch: endpoint says {provider}, integration is {}",
                    record.provider
                ),
                false,
            ));
        }
        if !record.is_active() {
            return Err(AttemptOutcome::failed("integration disabled", false));
        }
        Ok(record)
    }
}
