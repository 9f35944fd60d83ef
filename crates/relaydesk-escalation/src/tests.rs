use crate::dispatch::{DispatchSettings, NO_DESTINATIONS, PROVIDER_NOT_REGISTERED};
use crate::escalation::{EscalationRequest, DUPLICATE_PREVENTION};
use crate::internal::{NOTE_NOT_A_RULE_DESTINATION, NOTE_NO_ASSISTANT_ANSWER};
use crate::retry::RetryPolicy;
use crate::webhook::{DELIVERY_HEADER, EVENT_HEADER, TIMESTAMP_HEADER};
use crate::{EscalationError, Pipeline, PipelineSettings};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use relaydesk_common::types::{
    Destination, EscalationEvent, IntegrationRecord, IntegrationStatus, Provider, WebhookEvent,
    WebhookPayload, ESCALATION_TRIGGERED,
};
use relaydesk_notify::registry::ProviderRegistry;
use relaydesk_notify::settings::{FallbackConfig, ProviderEnvironment};
use relaydesk_notify::signature::{sign_payload, verify_signature, SIGNATURE_HEADER};
use relaydesk_notify::{ProviderAdapter, SendOutcome};
use relaydesk_storage::store::{NewEscalationRule, NewIntegration, NewWebhookEndpoint, OutboxStatus};
use relaydesk_storage::DeskStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT: &str = "t1";

/// Adapter that fails every send, standing in for a broken provider.
struct FailingAdapter(Provider);

#[async_trait]
impl ProviderAdapter for FailingAdapter {
    async fn send_escalation(
        &self,
        _event: &EscalationEvent,
        _integration: &IntegrationRecord,
    ) -> SendOutcome {
        SendOutcome::failed("simulated provider outage")
    }

    fn provider(&self) -> Provider {
        self.0
    }
}

struct Harness {
    _dir: TempDir,
    store: DeskStore,
    pipeline: Pipeline,
    server: MockServer,
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        dispatch: DispatchSettings {
            provider_timeout: Duration::from_secs(5),
            outbox_initial_delay: Duration::ZERO,
        },
        webhook_timeout: Duration::from_secs(5),
        dedup_window: Duration::from_secs(60),
        retry: Some(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }),
        retry_batch_size: 10,
    }
}

async fn harness_with(
    fallback: FallbackConfig,
    customize: impl FnOnce(&mut ProviderRegistry),
) -> Harness {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}/relaydesk.db?mode=rwc", dir.path().display());
    let store = DeskStore::new(&url).await.unwrap();
    let mut registry =
        ProviderRegistry::with_defaults(Arc::new(ProviderEnvironment::default()), Duration::from_secs(5))
            .unwrap();
    customize(&mut registry);
    let pipeline = Pipeline::build(store.clone(), Arc::new(registry), fallback, settings()).unwrap();
    Harness {
        _dir: dir,
        store,
        pipeline,
        server: MockServer::start().await,
    }
}

async fn harness() -> Harness {
    harness_with(FallbackConfig::default(), |_| {}).await
}

impl Harness {
    async fn integration(&self, tenant_id: &str, provider: &str, hook_path: &str) -> IntegrationRecord {
        self.store
            .insert_integration(&NewIntegration {
                tenant_id: tenant_id.into(),
                provider: provider.into(),
                name: format!("{provider}{hook_path}"),
                status: IntegrationStatus::Active,
                credentials: json!({}),
                config: json!({"webhook_url": format!("{}{}", self.server.uri(), hook_path)}),
            })
            .await
            .unwrap()
    }

    async fn mock_ok(&self, hook_path: &str, expected: u64) {
        Mock::given(method("POST"))
            .and(path(hook_path))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    async fn received_on(&self, hook_path: &str) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path() == hook_path)
            .collect()
    }
}

fn request(conversation_id: &str, reason: &str) -> EscalationRequest {
    EscalationRequest {
        tenant_id: TENANT.into(),
        conversation_id: conversation_id.into(),
        user_message: "help".into(),
        reason: reason.into(),
        confidence: Some(0.2),
        trigger_webhooks: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn single_slack_integration_delivers_and_persists_once() {
    let h = harness().await;
    h.integration(TENANT, "slack", "/slack").await;
    h.mock_ok("/slack", 1).await;

    let result = h
        .pipeline
        .escalations
        .handle(request("c1", "low_confidence"))
        .await
        .unwrap();

    assert!(result.ok, "{result:?}");
    assert!(!result.skipped);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].provider, "slack");
    assert!(result.results[0].ok);
    assert!(result.audit_warnings.is_empty(), "{:?}", result.audit_warnings);

    let escalation_id = result.escalation_id.unwrap();
    let row = h
        .store
        .find_recent_escalation(TENANT, "c1", "low_confidence", ChronoDuration::seconds(60))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.id, escalation_id);

    let audit = h.store.list_escalation_deliveries(&escalation_id).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].ok);

    let notifications = h.store.list_notifications(TENANT, 10).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].severity, "warning");
}

#[tokio::test]
async fn repeated_trigger_within_window_is_skipped() {
    let h = harness().await;
    h.integration(TENANT, "slack", "/slack").await;
    h.mock_ok("/slack", 2).await;

    let first = h
        .pipeline
        .escalations
        .handle(request("c1", "low_confidence"))
        .await
        .unwrap();
    let second = h
        .pipeline
        .escalations
        .handle(request("c1", "low_confidence"))
        .await
        .unwrap();

    assert!(second.ok && second.skipped);
    assert_eq!(second.reason.as_deref(), Some(DUPLICATE_PREVENTION));
    assert_eq!(second.existing_escalation_id, first.escalation_id);
    assert!(second.results.is_empty());

    // A different reason on the same conversation is a new escalation.
    let other = h
        .pipeline
        .escalations
        .handle(EscalationRequest {
            trigger_webhooks: false,
            ..request("c1", "handoff")
        })
        .await;
    assert!(!other.unwrap().skipped);
}

#[tokio::test]
async fn failing_destination_does_not_block_siblings() {
    let h = harness_with(FallbackConfig::default(), |registry| {
        registry.register(Arc::new(FailingAdapter(Provider::Discord)));
    })
    .await;
    h.integration(TENANT, "slack", "/slack").await;
    h.integration(TENANT, "discord", "/discord").await;
    h.integration(TENANT, "teams", "/teams").await;
    h.mock_ok("/slack", 1).await;
    Mock::given(method("POST"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h
        .pipeline
        .escalations
        .handle(request("c1", "handoff"))
        .await
        .unwrap();

    assert!(result.ok);
    assert_eq!(result.results.len(), 3);
    let by_provider = |p: &str| result.results.iter().find(|r| r.provider == p).unwrap();
    assert!(by_provider("slack").ok);
    assert_eq!(
        by_provider("discord").error.as_deref(),
        Some("simulated provider outage")
    );
    assert!(!by_provider("teams").ok);

    let queued = h
        .store
        .list_outbox(TENANT, Some(OutboxStatus::Pending.as_str()), 10, 0)
        .await
        .unwrap();
    assert_eq!(queued.len(), 2);
}

#[tokio::test]
async fn rule_with_no_destinations_never_falls_back() {
    let fallback = FallbackConfig {
        email: None,
        slack_webhook_url: Some("http://127.0.0.1:9/unused".into()),
    };
    let h = harness_with(fallback, |_| {}).await;
    let rule = h
        .store
        .insert_escalation_rule(&NewEscalationRule {
            tenant_id: TENANT.into(),
            name: "empty".into(),
            keywords: vec!["refund".into()],
            destinations: vec![],
            enabled: true,
        })
        .await
        .unwrap();

    let result = h
        .pipeline
        .escalations
        .handle(EscalationRequest {
            rule_id: Some(rule.id),
            ..request("c1", "restricted")
        })
        .await
        .unwrap();

    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some(NO_DESTINATIONS));
    assert!(result.results.is_empty());
    assert!(result
        .audit_warnings
        .iter()
        .any(|w| w.contains("zero usable destinations")));
}

#[tokio::test]
async fn tenant_without_integrations_uses_fallback() {
    let fallback_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fallback"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fallback_server)
        .await;
    let fallback = FallbackConfig {
        email: None,
        slack_webhook_url: Some(format!("{}/fallback", fallback_server.uri())),
    };
    let h = harness_with(fallback, |_| {}).await;

    let result = h
        .pipeline
        .escalations
        .handle(request("c1", "fallback_error"))
        .await
        .unwrap();

    assert!(result.ok, "{result:?}");
    assert_eq!(result.results[0].integration_id.as_deref(), Some("fallback:slack"));
}

#[tokio::test]
async fn no_destinations_and_no_fallback_reports_error() {
    let h = harness().await;
    let result = h
        .pipeline
        .escalations
        .handle(request("c1", "handoff"))
        .await
        .unwrap();
    assert!(!result.ok);
    assert_eq!(result.error.as_deref(), Some(NO_DESTINATIONS));
}

#[tokio::test]
async fn unregistered_and_foreign_integrations_fail_per_destination() {
    let h = harness().await;
    let pager = h.integration(TENANT, "pagerduty", "/pager").await;
    let foreign = h.integration("t2", "slack", "/foreign").await;
    h.integration(TENANT, "slack", "/slack").await;
    h.mock_ok("/slack", 0).await;
    h.mock_ok("/foreign", 0).await;

    let result = h
        .pipeline
        .escalations
        .handle(EscalationRequest {
            matched_rule_destinations: vec![
                Destination::integration(pager.id.clone()),
                Destination::integration(foreign.id.clone()),
                Destination::integration("does-not-exist"),
            ],
            ..request("c1", "handoff")
        })
        .await
        .unwrap();

    assert!(!result.ok);
    assert_eq!(result.results.len(), 3);
    assert_eq!(result.results[0].error.as_deref(), Some(PROVIDER_NOT_REGISTERED));
    assert_eq!(result.results[1].error.as_deref(), Some("integration not found"));
    assert_eq!(result.results[2].error.as_deref(), Some("integration not found"));
    // rule-scoped destinations must not reach the tenant default slack integration
    assert!(h.received_on("/slack").await.is_empty());
}

#[tokio::test]
async fn explicit_integration_id_wins_over_rule_destinations() {
    let h = harness().await;
    let teams = h.integration(TENANT, "teams", "/teams").await;
    let slack = h.integration(TENANT, "slack", "/slack").await;
    h.mock_ok("/teams", 1).await;
    h.mock_ok("/slack", 0).await;

    let result = h
        .pipeline
        .escalations
        .handle(EscalationRequest {
            integration_id: Some(teams.id.clone()),
            matched_rule_destinations: vec![Destination::integration(slack.id)],
            ..request("c1", "user_request")
        })
        .await
        .unwrap();

    assert!(result.ok);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].integration_id, Some(teams.id));
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let h = harness().await;
    let missing = h
        .pipeline
        .escalations
        .handle(EscalationRequest {
            tenant_id: " ".into(),
            ..request("c1", "handoff")
        })
        .await;
    assert!(matches!(missing, Err(EscalationError::Validation(_))));

    let bad_reason = h.pipeline.escalations.handle(request("c1", "panic")).await;
    assert!(matches!(bad_reason, Err(EscalationError::Validation(_))));

    let bad_confidence = h
        .pipeline
        .escalations
        .handle(EscalationRequest {
            confidence: Some(1.5),
            ..request("c1", "handoff")
        })
        .await;
    assert!(matches!(bad_confidence, Err(EscalationError::Validation(_))));
}

#[tokio::test]
async fn webhook_is_signed_and_carries_standard_headers() {
    let h = harness().await;
    h.mock_ok("/receiver", 1).await;
    let endpoint = h
        .store
        .insert_webhook_endpoint(&NewWebhookEndpoint {
            tenant_id: TENANT.into(),
            url: format!("{}/receiver", h.server.uri()),
            events: vec!["conversation.closed".into()],
            secret: Some("whsec_test".into()),
            is_active: true,
        })
        .await
        .unwrap();

    let event = WebhookEvent {
        event_type: "conversation.closed".into(),
        tenant_id: TENANT.into(),
        data: json!({"conversation_id": "c1"}),
    };
    let summary = h.pipeline.webhooks.dispatch(&event).await.unwrap();
    assert_eq!(summary.delivered, 1);

    let request = h.received_on("/receiver").await.pop().unwrap();
    let body = String::from_utf8(request.body.clone()).unwrap();
    let signature = request.headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
    assert_eq!(signature, sign_payload(&body, "whsec_test"));
    assert!(verify_signature(&body, "whsec_test", signature));
    assert!(!verify_signature(&body, "other", signature));
    assert_eq!(
        request.headers.get(EVENT_HEADER).unwrap().to_str().unwrap(),
        "conversation.closed"
    );
    assert_eq!(
        request.headers.get(DELIVERY_HEADER).unwrap().to_str().unwrap(),
        summary.deliveries[0].delivery_id.as_deref().unwrap()
    );

    let payload: WebhookPayload = serde_json::from_str(&body).unwrap();
    assert_eq!(payload.event_type, "conversation.closed");
    assert_eq!(payload.tenant_id, TENANT);
    assert_eq!(payload.data, event.data);
    assert_eq!(payload.idempotency_key.len(), 32);
    assert_eq!(
        request.headers.get(TIMESTAMP_HEADER).unwrap().to_str().unwrap(),
        payload.timestamp
    );

    let ep = h.store.get_webhook_endpoint(&endpoint.id).await.unwrap().unwrap();
    assert_eq!(ep.failure_count, 0);
    assert!(ep.last_success_at.is_some());
}

#[tokio::test]
async fn failed_webhook_is_retried_with_the_same_body() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    h.mock_ok("/flaky", 1).await;
    let endpoint = h
        .store
        .insert_webhook_endpoint(&NewWebhookEndpoint {
            tenant_id: TENANT.into(),
            url: format!("{}/flaky", h.server.uri()),
            events: vec!["*".into()],
            secret: None,
            is_active: true,
        })
        .await
        .unwrap();

    let event = WebhookEvent {
        event_type: "conversation.closed".into(),
        tenant_id: TENANT.into(),
        data: json!({}),
    };
    let summary = h.pipeline.webhooks.dispatch(&event).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.deliveries[0].response_status, Some(503));
    assert!(summary.deliveries[0].next_retry_at.is_some());
    let failing = h.store.get_webhook_endpoint(&endpoint.id).await.unwrap().unwrap();
    assert_eq!(failing.failure_count, 1);

    let stats = h.pipeline.sweeper.sweep_webhooks().await.unwrap();
    assert_eq!(stats.picked, 1);
    assert_eq!(stats.succeeded, 1);

    let delivery_id = summary.deliveries[0].delivery_id.clone().unwrap();
    let row = h.store.get_webhook_delivery(&delivery_id).await.unwrap().unwrap();
    assert!(row.delivered_at.is_some());
    assert_eq!(row.delivery_attempts, 1);

    let bodies: Vec<Vec<u8>> = h
        .received_on("/flaky")
        .await
        .into_iter()
        .map(|r| r.body)
        .collect();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);

    let healed = h.store.get_webhook_endpoint(&endpoint.id).await.unwrap().unwrap();
    assert_eq!(healed.failure_count, 0);
}

async fn internal_endpoint(h: &Harness, tenant_id: &str, record: &IntegrationRecord) {
    h.store
        .insert_webhook_endpoint(&NewWebhookEndpoint {
            tenant_id: tenant_id.into(),
            url: format!("internal://integration/{}/{}", record.provider, record.id),
            events: vec![ESCALATION_TRIGGERED.into()],
            secret: None,
            is_active: true,
        })
        .await
        .unwrap();
}

fn triggered(conversation_id: &str, destinations: Value) -> WebhookEvent {
    WebhookEvent {
        event_type: ESCALATION_TRIGGERED.into(),
        tenant_id: TENANT.into(),
        data: json!({
            "conversation_id": conversation_id,
            "reason": "handoff",
            "user_message": "help",
            "destinations": destinations,
        }),
    }
}

#[tokio::test]
async fn internal_endpoint_waits_for_an_assistant_answer() {
    let h = harness().await;
    let slack = h.integration(TENANT, "slack", "/internal-slack").await;
    h.mock_ok("/internal-slack", 0).await;
    internal_endpoint(&h, TENANT, &slack).await;

    let conversation = h.store.insert_conversation(TENANT, None).await.unwrap();
    h.store
        .insert_message(&conversation, "user", "is anyone there?")
        .await
        .unwrap();

    let summary = h
        .pipeline
        .webhooks
        .dispatch(&triggered(&conversation, json!([])))
        .await
        .unwrap();

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.deliveries[0].note.as_deref(), Some(NOTE_NO_ASSISTANT_ANSWER));
    let row = h
        .store
        .get_webhook_delivery(summary.deliveries[0].delivery_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(row.delivered_at.is_some());
    assert_eq!(row.response_body.as_deref(), Some(NOTE_NO_ASSISTANT_ANSWER));
}

#[tokio::test]
async fn internal_endpoint_forwards_latest_exchange_to_adapter() {
    let h = harness().await;
    let slack = h.integration(TENANT, "slack", "/internal-slack").await;
    h.mock_ok("/internal-slack", 1).await;
    internal_endpoint(&h, TENANT, &slack).await;

    let conversation = h.store.insert_conversation(TENANT, None).await.unwrap();
    h.store.insert_message(&conversation, "user", "cancel my order").await.unwrap();
    h.store
        .insert_message(&conversation, "assistant", "Orders can be cancelled within 24h.")
        .await
        .unwrap();

    let summary = h
        .pipeline
        .webhooks
        .dispatch(&triggered(
            &conversation,
            json!([{"integrationId": slack.id.clone()}]),
        ))
        .await
        .unwrap();
    assert_eq!(summary.delivered, 1, "{summary:?}");
    assert!(summary.deliveries[0].note.is_none());

    let sent = h.received_on("/internal-slack").await.pop().unwrap();
    let body = String::from_utf8(sent.body).unwrap();
    assert!(body.contains("Orders can be cancelled within 24h."));
    assert!(body.contains("cancel my order"));
}

#[tokio::test]
async fn internal_endpoint_skips_integrations_outside_rule_destinations() {
    let h = harness().await;
    let slack = h.integration(TENANT, "slack", "/internal-slack").await;
    h.mock_ok("/internal-slack", 0).await;
    internal_endpoint(&h, TENANT, &slack).await;

    let conversation = h.store.insert_conversation(TENANT, None).await.unwrap();
    h.store.insert_message(&conversation, "user", "hi").await.unwrap();
    h.store.insert_message(&conversation, "assistant", "hello").await.unwrap();

    let summary = h
        .pipeline
        .webhooks
        .dispatch(&triggered(&conversation, json!([{"integrationId": "someone-else"}])))
        .await
        .unwrap();
    assert_eq!(summary.deliveries[0].note.as_deref(), Some(NOTE_NOT_A_RULE_DESTINATION));
}

#[tokio::test]
async fn internal_endpoint_fails_closed_on_tenant_mismatch() {
    let h = harness().await;
    let foreign = h.integration("t2", "slack", "/foreign").await;
    h.mock_ok("/foreign", 0).await;
    internal_endpoint(&h, TENANT, &foreign).await;

    let conversation = h.store.insert_conversation(TENANT, None).await.unwrap();
    let summary = h
        .pipeline
        .webhooks
        .dispatch(&triggered(&conversation, json!([])))
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.deliveries[0].error.as_deref(), Some("integration not found"));
    assert!(summary.deliveries[0].next_retry_at.is_none());
}

#[tokio::test]
async fn internal_endpoint_ignores_answer_to_an_earlier_question() {
    let h = harness().await;
    let slack = h.integration(TENANT, "slack", "/internal-slack").await;
    h.mock_ok("/internal-slack", 0).await;
    internal_endpoint(&h, TENANT, &slack).await;

    let conversation = h.store.insert_conversation(TENANT, None).await.unwrap();
    h.store.insert_message(&conversation, "user", "where is my parcel?").await.unwrap();
    h.store
        .insert_message(&conversation, "assistant", "It ships tomorrow.")
        .await
        .unwrap();
    h.store
        .insert_message(&conversation, "user", "can I change the address?")
        .await
        .unwrap();

    let summary = h
        .pipeline
        .webhooks
        .dispatch(&triggered(&conversation, json!([])))
        .await
        .unwrap();

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.deliveries[0].note.as_deref(), Some(NOTE_NO_ASSISTANT_ANSWER));
    assert!(summary.deliveries[0].forwarded_integration_id.is_none());
    assert!(h.received_on("/internal-slack").await.is_empty());
}

#[tokio::test]
async fn integration_reached_by_internal_endpoint_is_not_dispatched_again() {
    let h = harness().await;
    let slack = h.integration(TENANT, "slack", "/slack").await;
    h.mock_ok("/slack", 1).await;
    internal_endpoint(&h, TENANT, &slack).await;

    let conversation = h.store.insert_conversation(TENANT, None).await.unwrap();
    h.store.insert_message(&conversation, "user", "I want a human").await.unwrap();
    h.store
        .insert_message(&conversation, "assistant", "Connecting you now.")
        .await
        .unwrap();

    let result = h
        .pipeline
        .escalations
        .handle(request(&conversation, "handoff"))
        .await
        .unwrap();

    assert!(result.ok, "{result:?}");
    assert_eq!(result.results.len(), 1);
    assert!(result.results[0].ok);
    assert_eq!(result.results[0].integration_id.as_deref(), Some(slack.id.as_str()));
    assert_eq!(h.received_on("/slack").await.len(), 1);
    assert_eq!(h.store.count_outbox(TENANT, None).await.unwrap(), 0);
}

#[tokio::test]
async fn failed_internal_forward_leaves_retries_to_the_outbox() {
    let h = harness_with(FallbackConfig::default(), |registry| {
        registry.register(Arc::new(FailingAdapter(Provider::Slack)));
    })
    .await;
    let slack = h.integration(TENANT, "slack", "/slack").await;
    internal_endpoint(&h, TENANT, &slack).await;

    let conversation = h.store.insert_conversation(TENANT, None).await.unwrap();
    h.store.insert_message(&conversation, "user", "refund please").await.unwrap();
    h.store
        .insert_message(&conversation, "assistant", "Let me check.")
        .await
        .unwrap();

    let result = h
        .pipeline
        .escalations
        .handle(request(&conversation, "handoff"))
        .await
        .unwrap();

    assert!(!result.ok);
    assert_eq!(h.store.count_outbox(TENANT, None).await.unwrap(), 1);
    let due = h
        .store
        .list_due_webhook_deliveries(chrono::Utc::now() + ChronoDuration::seconds(5), 10, 10)
        .await
        .unwrap();
    assert!(due.is_empty(), "{due:?}");
}

#[tokio::test]
async fn outbox_sweep_resends_and_closes_entries() {
    let h = harness().await;
    let slack = h.integration(TENANT, "slack", "/slack").await;
    let teams = h.integration(TENANT, "teams", "/teams").await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    h.mock_ok("/slack", 1).await;
    Mock::given(method("POST"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let result = h
        .pipeline
        .escalations
        .handle(request("c1", "handoff"))
        .await
        .unwrap();
    assert!(!result.ok);

    // Disabling teams makes its entry unrecoverable.
    h.store
        .set_integration_status(&teams.id, IntegrationStatus::Disabled)
        .await
        .unwrap();

    let stats = h.pipeline.sweeper.sweep_outbox().await.unwrap();
    assert_eq!(stats.picked, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.dead, 1);

    let sent = h
        .store
        .list_outbox(TENANT, Some(OutboxStatus::Sent.as_str()), 10, 0)
        .await
        .unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].integration_id, slack.id);

    let dead = h
        .store
        .list_outbox(TENANT, Some(OutboxStatus::Dead.as_str()), 10, 0)
        .await
        .unwrap();
    assert_eq!(dead[0].last_error.as_deref(), Some("integration disabled"));
}

#[test]
fn backoff_is_capped() {
    let policy = RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_secs(30),
        max_delay: Duration::from_secs(300),
    };
    assert_eq!(policy.backoff(0), Duration::from_secs(30));
    assert_eq!(policy.backoff(2), Duration::from_secs(120));
    assert_eq!(policy.backoff(5), Duration::from_secs(300));
    assert!(policy.next_attempt_at(4, chrono::Utc::now()).is_none());
    assert!(policy.next_attempt_at(3, chrono::Utc::now()).is_some());
}
