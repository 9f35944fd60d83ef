//! Entry point for escalation triggers: dedup, persist, notify, route and
//! deliver.

use crate::dispatch::DispatchEngine;
use crate::error::{EscalationError, Result};
use crate::webhook::{EscalationTriggeredData, WebhookDeliveryService};
use relaydesk_common::types::{
    DeliveryResult, Destination, EscalationEvent, EscalationMeta, EscalationReason, WebhookEvent,
    ESCALATION_TRIGGERED,
};
use relaydesk_notify::utils::preview;
use relaydesk_storage::store::NewNotification;
use relaydesk_storage::DeskStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const DUPLICATE_PREVENTION: &str = "duplicate_prevention";
const NOTIFICATION_BODY_CHARS: usize = 280;

fn default_true() -> bool {
    true
}

/// Parameters of one escalation trigger.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct EscalationRequest {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub user_message: String,
    /// One of `low_confidence`, `restricted`, `handoff`, `user_request`, `fallback_error`.
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub assistant_answer: Option<String>,
    /// Model confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub refs: Vec<String>,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub matched_rule_destinations: Vec<Destination>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub trigger_webhooks: bool,
    /// Routes to exactly this integration, overriding rule destinations.
    #[serde(default)]
    pub integration_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EscalationResult {
    /// True when at least one destination accepted the escalation, or the
    /// trigger was skipped as a duplicate.
    pub ok: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_escalation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_id: Option<String>,
    #[serde(default)]
    pub results: Vec<DeliveryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Best-effort steps that failed without stopping delivery.
    #[serde(default)]
    pub audit_warnings: Vec<String>,
}

pub struct EscalationService {
    store: DeskStore,
    engine: Arc<DispatchEngine>,
    webhooks: Arc<WebhookDeliveryService>,
    dedup_window: chrono::Duration,
}

impl EscalationService {
    pub fn new(
        store: DeskStore,
        engine: Arc<DispatchEngine>,
        webhooks: Arc<WebhookDeliveryService>,
        dedup_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            engine,
            webhooks,
            dedup_window,
        }
    }

    /// Runs one escalation end to end.
    ///
    /// Only validation errors are returned as `Err`. Storage failures before
    /// dispatch are logged and reported in `audit_warnings`; dispatch failures
    /// come back as `ok == false` with per-destination results.
    pub async fn handle(&self, req: EscalationRequest) -> Result<EscalationResult> {
        let mut warnings = Vec::new();
        let rule_based = req.rule_id.as_deref().is_some_and(|r| !r.trim().is_empty())
            || !req.matched_rule_destinations.is_empty();
        let trigger_webhooks = req.trigger_webhooks;
        let integration_id = req.integration_id.clone();
        let matched = req.matched_rule_destinations.clone();
        let mut event = build_event(req)?;

        match self
            .store
            .find_recent_escalation(
                &event.tenant_id,
                &event.conversation_id,
                event.reason.as_str(),
                self.dedup_window,
            )
            .await
        {
            Ok(Some(existing)) => {
                tracing::info!(
                    tenant_id = %event.tenant_id,
                    conversation_id = %event.conversation_id,
                    reason = %event.reason,
                    existing_escalation_id = %existing.id,
                    "Duplicate escalation suppressed"
                );
                return Ok(EscalationResult {
                    ok: true,
                    skipped: true,
                    reason: Some(DUPLICATE_PREVENTION.to_string()),
                    existing_escalation_id: Some(existing.id),
                    ..Default::default()
                });
            }
            Ok(None) => {}
            Err(e) => warn_audit(&mut warnings, &event, format!("dedup check failed: {e}")),
        }

        let escalation_id = match self.store.insert_escalation(&event).await {
            Ok(row) => Some(row.id),
            Err(e) => {
                warn_audit(&mut warnings, &event, format!("failed to persist escalation: {e}"));
                None
            }
        };

        let notification = NewNotification {
            tenant_id: event.tenant_id.clone(),
            kind: "escalation".to_string(),
            severity: event.reason.severity().to_string(),
            title: format!("Escalation: {}", event.reason.label()),
            body: preview(&event.user_message, NOTIFICATION_BODY_CHARS),
            conversation_id: Some(event.conversation_id.clone()),
        };
        if let Err(e) = self.store.create_notification(&notification).await {
            warn_audit(&mut warnings, &event, format!("failed to create notification: {e}"));
        }

        let destinations = self
            .resolve_destinations(&event, integration_id, matched, &mut warnings)
            .await;
        if rule_based && destinations.as_ref().is_some_and(|d| d.is_empty()) {
            tracing::warn!(
                tenant_id = %event.tenant_id,
                conversation_id = %event.conversation_id,
                rule_id = event.rule_id.as_deref().unwrap_or("-"),
                "Rule matched but has zero usable destinations"
            );
            warnings.push("rule matched but has zero usable destinations".to_string());
        }
        event.destinations = destinations.clone().unwrap_or_default();

        let mut forwarded = Vec::new();
        if trigger_webhooks {
            match self.fan_out_webhooks(&event, escalation_id.as_deref()).await {
                Ok(ids) => forwarded = ids,
                Err(e) => warn_audit(&mut warnings, &event, format!("webhook fan-out failed: {e}")),
            }
        }

        let outcome = self
            .engine
            .dispatch(&event, destinations.as_deref(), rule_based, &forwarded)
            .await;

        if let Some(id) = &escalation_id {
            self.record_deliveries(id, &event, &outcome.results, &mut warnings)
                .await;
        }

        tracing::info!(
            tenant_id = %event.tenant_id,
            conversation_id = %event.conversation_id,
            reason = %event.reason,
            ok = outcome.ok,
            destinations = outcome.results.len(),
            "Escalation handled"
        );

        Ok(EscalationResult {
            ok: outcome.ok,
            escalation_id,
            results: outcome.results,
            error: outcome.error,
            audit_warnings: warnings,
            ..Default::default()
        })
    }

    /// Destination precedence: explicit integration, then the caller's
    /// matched rule destinations, then the stored rule. `None` means the
    /// dispatch engine should use the tenant's active integrations.
    async fn resolve_destinations(
        &self,
        event: &EscalationEvent,
        integration_id: Option<String>,
        matched: Vec<Destination>,
        warnings: &mut Vec<String>,
    ) -> Option<Vec<Destination>> {
        if let Some(id) = integration_id {
            return Some(vec![Destination::integration(id)]);
        }
        if !matched.is_empty() {
            return Some(matched);
        }
        let rule_id = event.rule_id.as_deref()?;
        match self.store.get_escalation_rule(&event.tenant_id, rule_id).await {
            Ok(Some(rule)) => Some(rule.destinations),
            Ok(None) => {
                warn_audit(warnings, event, format!("escalation rule {rule_id} not found"));
                Some(Vec::new())
            }
            Err(e) => {
                warn_audit(warnings, event, format!("failed to load escalation rule {rule_id}: {e}"));
                Some(Vec::new())
            }
        }
    }

    /// Returns the integrations internal endpoints delivered to.
    async fn fan_out_webhooks(
        &self,
        event: &EscalationEvent,
        escalation_id: Option<&str>,
    ) -> Result<Vec<String>> {
        let data = EscalationTriggeredData {
            escalation_id: escalation_id.map(str::to_string),
            conversation_id: event.conversation_id.clone(),
            session_id: event.session_id.clone(),
            reason: event.reason,
            confidence: event.confidence,
            user_message: event.user_message.clone(),
            refs: event.refs.clone(),
            rule_id: event.rule_id.clone(),
            destinations: event.destinations.clone(),
            meta: event.meta.clone(),
        };
        let webhook_event = WebhookEvent {
            event_type: ESCALATION_TRIGGERED.to_string(),
            tenant_id: event.tenant_id.clone(),
            data: serde_json::to_value(data)?,
        };
        let summary = self.webhooks.dispatch(&webhook_event).await?;
        Ok(summary.forwarded_integrations())
    }

    async fn record_deliveries(
        &self,
        escalation_id: &str,
        event: &EscalationEvent,
        results: &[DeliveryResult],
        warnings: &mut Vec<String>,
    ) {
        for result in results {
            if let Err(e) = self
                .store
                .insert_escalation_delivery(escalation_id, &event.tenant_id, result)
                .await
            {
                warn_audit(
                    warnings,
                    event,
                    format!("failed to record {} delivery: {e}", result.provider),
                );
            }
        }
    }
}

fn warn_audit(warnings: &mut Vec<String>, event: &EscalationEvent, message: String) {
    tracing::warn!(
        tenant_id = %event.tenant_id,
        conversation_id = %event.conversation_id,
        "{message}"
    );
    warnings.push(message);
}

fn required(field: &str, value: String) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(EscalationError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

/// Validates a request and turns it into an immutable event.
pub fn build_event(req: EscalationRequest) -> Result<EscalationEvent> {
    let tenant_id = required("tenant_id", req.tenant_id)?;
    let conversation_id = required("conversation_id", req.conversation_id)?;
    if req.user_message.trim().is_empty() {
        return Err(EscalationError::Validation("user_message is required".into()));
    }
    let reason: EscalationReason = required("reason", req.reason)?
        .parse()
        .map_err(EscalationError::Validation)?;
    if let Some(c) = req.confidence {
        if !c.is_finite() || !(0.0..=1.0).contains(&c) {
            return Err(EscalationError::Validation(format!(
                "confidence must be between 0 and 1, got {c}"
            )));
        }
    }

    let mut meta: EscalationMeta = serde_json::from_value(Value::Object(req.meta))
        .map_err(|e| EscalationError::Validation(format!("invalid meta: {e}")))?;
    if !req.keywords.is_empty() {
        meta.keywords = req.keywords;
    }
    if req.site_id.is_some() {
        meta.site_id = req.site_id;
    }

    Ok(EscalationEvent {
        tenant_id,
        conversation_id,
        session_id: req.session_id.filter(|s| !s.trim().is_empty()),
        user_message: req.user_message,
        assistant_answer: req.assistant_answer.filter(|a| !a.trim().is_empty()),
        confidence: req.confidence,
        refs: req.refs,
        reason,
        rule_id: req.rule_id.filter(|r| !r.trim().is_empty()),
        destinations: Vec::new(),
        meta,
    })
}
