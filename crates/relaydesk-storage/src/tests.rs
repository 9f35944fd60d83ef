use crate::store::{
    DeliveryAttempt, NewEscalationRule, NewIntegration, NewNotification, NewOutboxEntry,
    NewWebhookEndpoint, OutboxStatus,
};
use crate::DeskStore;
use chrono::{Duration, Utc};
use relaydesk_common::types::{
    DeliveryResult, Destination, EndpointTarget, EscalationEvent, EscalationMeta,
    EscalationReason, IntegrationStatus,
};
use serde_json::json;
use tempfile::TempDir;

async fn setup() -> (TempDir, DeskStore) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}/relaydesk.db?mode=rwc", dir.path().display());
    let store = DeskStore::new(&url).await.unwrap();
    (dir, store)
}

fn event(conversation_id: &str, reason: EscalationReason) -> EscalationEvent {
    EscalationEvent {
        tenant_id: "tenant-a".into(),
        conversation_id: conversation_id.into(),
        session_id: None,
        user_message: "where is my refund".into(),
        assistant_answer: None,
        confidence: Some(0.4),
        refs: vec![],
        reason,
        rule_id: None,
        destinations: vec![],
        meta: EscalationMeta::default(),
    }
}

fn integration(tenant_id: &str, provider: &str, name: &str) -> NewIntegration {
    NewIntegration {
        tenant_id: tenant_id.into(),
        provider: provider.into(),
        name: name.into(),
        status: IntegrationStatus::Active,
        credentials: json!({"webhook_url": "https://hooks.example.com/x"}),
        config: json!({}),
    }
}

#[tokio::test]
async fn recent_escalation_is_scoped_by_conversation_and_reason() {
    let (_dir, store) = setup().await;
    let row = store
        .insert_escalation(&event("conv-1", EscalationReason::LowConfidence))
        .await
        .unwrap();

    let window = Duration::seconds(60);
    let found = store
        .find_recent_escalation("tenant-a", "conv-1", "low_confidence", window)
        .await
        .unwrap();
    assert_eq!(found.map(|r| r.id), Some(row.id));

    for (tenant, conv, reason) in [
        ("tenant-b", "conv-1", "low_confidence"),
        ("tenant-a", "conv-2", "low_confidence"),
        ("tenant-a", "conv-1", "handoff"),
    ] {
        let miss = store
            .find_recent_escalation(tenant, conv, reason, window)
            .await
            .unwrap();
        assert!(miss.is_none(), "{tenant}/{conv}/{reason}");
    }

    // A zero-length window excludes rows created before the call.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let expired = store
        .find_recent_escalation("tenant-a", "conv-1", "low_confidence", Duration::zero())
        .await
        .unwrap();
    assert!(expired.is_none());
}

#[tokio::test]
async fn escalation_deliveries_are_recorded() {
    let (_dir, store) = setup().await;
    let row = store
        .insert_escalation(&event("conv-1", EscalationReason::Handoff))
        .await
        .unwrap();
    let result = DeliveryResult::failed("slack", Some("int-1".into()), "slack webhook not configured");
    store
        .insert_escalation_delivery(&row.id, "tenant-a", &result)
        .await
        .unwrap();

    let rows = store.list_escalation_deliveries(&row.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].ok);
    assert_eq!(rows[0].integration_id.as_deref(), Some("int-1"));
}

#[tokio::test]
async fn only_active_integrations_are_listed() {
    let (_dir, store) = setup().await;
    let slack = store
        .insert_integration(&integration("tenant-a", "Slack", "support"))
        .await
        .unwrap();
    let teams = store
        .insert_integration(&integration("tenant-a", "teams", "ops"))
        .await
        .unwrap();
    store
        .insert_integration(&integration("tenant-b", "discord", "other"))
        .await
        .unwrap();
    store
        .set_integration_status(&teams.id, IntegrationStatus::Disabled)
        .await
        .unwrap();

    let active = store.list_active_integrations("tenant-a").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, slack.id);
    assert_eq!(active[0].provider, "slack");
    assert_eq!(
        active[0].setting("webhook_url"),
        Some("https://hooks.example.com/x")
    );

    let by_name = store
        .find_integration_by_name("tenant-a", "ops")
        .await
        .unwrap()
        .unwrap();
    assert!(!by_name.is_active());
}

#[tokio::test]
async fn rules_are_tenant_scoped_and_decode_destinations() {
    let (_dir, store) = setup().await;
    let rule = store
        .insert_escalation_rule(&NewEscalationRule {
            tenant_id: "tenant-a".into(),
            name: "refunds".into(),
            keywords: vec!["refund".into()],
            destinations: vec![
                Destination::integration("int-1"),
                Destination::DirectEmail {
                    direct_email: "billing@example.com".into(),
                    provider: "email".into(),
                },
            ],
            enabled: true,
        })
        .await
        .unwrap();

    let loaded = store
        .get_escalation_rule("tenant-a", &rule.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.destinations.len(), 2);
    assert_eq!(loaded.keywords, vec!["refund".to_string()]);

    let foreign = store.get_escalation_rule("tenant-b", &rule.id).await.unwrap();
    assert!(foreign.is_none());
}

#[tokio::test]
async fn endpoint_subscription_and_health_counters() {
    let (_dir, store) = setup().await;
    let ep = store
        .insert_webhook_endpoint(&NewWebhookEndpoint {
            tenant_id: "tenant-a".into(),
            url: "https://receiver.example.com/hook".into(),
            events: vec!["escalation.triggered".into()],
            secret: Some("s3cret".into()),
            is_active: true,
        })
        .await
        .unwrap();
    store
        .insert_webhook_endpoint(&NewWebhookEndpoint {
            tenant_id: "tenant-a".into(),
            url: "internal://integration/slack/42".into(),
            events: vec!["*".into()],
            secret: None,
            is_active: true,
        })
        .await
        .unwrap();
    store
        .insert_webhook_endpoint(&NewWebhookEndpoint {
            tenant_id: "tenant-a".into(),
            url: "https://inactive.example.com".into(),
            events: vec!["escalation.triggered".into()],
            secret: None,
            is_active: false,
        })
        .await
        .unwrap();

    let subscribed = store
        .list_subscribed_endpoints("tenant-a", "escalation.triggered")
        .await
        .unwrap();
    assert_eq!(subscribed.len(), 2);
    assert!(subscribed.iter().any(|e| matches!(
        &e.target,
        EndpointTarget::Internal { provider, integration_id } if provider == "slack" && integration_id == "42"
    )));

    let other = store
        .list_subscribed_endpoints("tenant-a", "conversation.closed")
        .await
        .unwrap();
    assert_eq!(other.len(), 1);

    store.record_endpoint_failure(&ep.id).await.unwrap();
    store.record_endpoint_failure(&ep.id).await.unwrap();
    let failed = store.get_webhook_endpoint(&ep.id).await.unwrap().unwrap();
    assert_eq!(failed.failure_count, 2);
    assert!(failed.last_failure_at.is_some());

    store.record_endpoint_success(&ep.id).await.unwrap();
    let healthy = store.get_webhook_endpoint(&ep.id).await.unwrap().unwrap();
    assert_eq!(healthy.failure_count, 0);
    assert!(healthy.last_success_at.is_some());
}

#[tokio::test]
async fn delivery_ledger_tracks_attempts_and_retries() {
    let (_dir, store) = setup().await;
    let ep = store
        .insert_webhook_endpoint(&NewWebhookEndpoint {
            tenant_id: "tenant-a".into(),
            url: "https://receiver.example.com/hook".into(),
            events: vec!["*".into()],
            secret: None,
            is_active: true,
        })
        .await
        .unwrap();
    let delivery = store
        .insert_webhook_delivery(&ep, "escalation.triggered", r#"{"type":"escalation.triggered"}"#)
        .await
        .unwrap();
    assert_eq!(delivery.delivery_attempts, 0);

    let attempt = DeliveryAttempt {
        response_status: Some(502),
        response_body: Some("bad gateway".into()),
    };
    let past = Utc::now() - Duration::seconds(1);
    store
        .mark_delivery_failed(&delivery.id, &attempt, Some(past))
        .await
        .unwrap();

    let due = store
        .list_due_webhook_deliveries(Utc::now(), 5, 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].delivery_attempts, 1);
    assert_eq!(due[0].response_status, Some(502));

    // Exhausted rows are no longer due.
    let exhausted = store
        .list_due_webhook_deliveries(Utc::now(), 1, 10)
        .await
        .unwrap();
    assert!(exhausted.is_empty());

    store
        .mark_delivery_delivered(
            &delivery.id,
            &DeliveryAttempt {
                response_status: Some(200),
                response_body: None,
            },
        )
        .await
        .unwrap();
    let row = store.get_webhook_delivery(&delivery.id).await.unwrap().unwrap();
    assert!(row.delivered_at.is_some());
    assert!(row.next_retry_at.is_none());
    assert_eq!(store.count_webhook_deliveries(&ep.id).await.unwrap(), 1);
}

#[tokio::test]
async fn outbox_lifecycle() {
    let (_dir, store) = setup().await;
    let entry = store
        .enqueue_outbox(&NewOutboxEntry {
            tenant_id: "tenant-a".into(),
            provider: "slack".into(),
            integration_id: "int-1".into(),
            payload: serde_json::to_value(event("conv-1", EscalationReason::Handoff)).unwrap(),
            last_error: Some("HTTP 500".into()),
            next_attempt_at: Utc::now() + Duration::minutes(2),
        })
        .await
        .unwrap();
    assert_eq!(entry.status, OutboxStatus::Pending.as_str());

    assert!(store.list_due_outbox(Utc::now(), 10).await.unwrap().is_empty());
    let later = Utc::now() + Duration::minutes(3);
    let due = store.list_due_outbox(later, 10).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].payload["conversation_id"], "conv-1");

    store
        .reschedule_outbox(&entry.id, 1, later, "HTTP 503")
        .await
        .unwrap();
    store.mark_outbox_dead(&entry.id, 5, "gave up").await.unwrap();

    let dead = store
        .list_outbox("tenant-a", Some(OutboxStatus::Dead.as_str()), 10, 0)
        .await
        .unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 5);
    assert_eq!(dead[0].last_error.as_deref(), Some("gave up"));
    assert_eq!(store.count_outbox("tenant-a", None).await.unwrap(), 1);
    assert!(store.mark_outbox_sent("missing").await.is_err());
}

#[tokio::test]
async fn latest_exchange_only_pairs_answers_to_the_latest_question() {
    let (_dir, store) = setup().await;
    let conv = store.insert_conversation("tenant-a", Some("sess")).await.unwrap();

    let empty = store.latest_exchange(&conv).await.unwrap();
    assert!(empty.user_message.is_none() && empty.assistant_answer.is_none());

    store.insert_message(&conv, "user", "first question").await.unwrap();
    let pending = store.latest_exchange(&conv).await.unwrap();
    assert_eq!(pending.user_message.as_deref(), Some("first question"));
    assert!(pending.assistant_answer.is_none());

    store.insert_message(&conv, "assistant", "first answer").await.unwrap();
    let answered = store.latest_exchange(&conv).await.unwrap();
    assert_eq!(answered.user_message.as_deref(), Some("first question"));
    assert_eq!(answered.assistant_answer.as_deref(), Some("first answer"));

    store.insert_message(&conv, "user", "second question").await.unwrap();
    let stale = store.latest_exchange(&conv).await.unwrap();
    assert_eq!(stale.user_message.as_deref(), Some("second question"));
    assert!(stale.assistant_answer.is_none());

    store.insert_message(&conv, "assistant", "second answer").await.unwrap();
    let exchange = store.latest_exchange(&conv).await.unwrap();
    assert_eq!(exchange.user_message.as_deref(), Some("second question"));
    assert_eq!(exchange.assistant_answer.as_deref(), Some("second answer"));
}

#[tokio::test]
async fn notifications_are_listed_newest_first() {
    let (_dir, store) = setup().await;
    for title in ["one", "two"] {
        store
            .create_notification(&NewNotification {
                tenant_id: "tenant-a".into(),
                kind: "escalation".into(),
                severity: "warning".into(),
                title: title.into(),
                body: "body".into(),
                conversation_id: None,
            })
            .await
            .unwrap();
    }
    let rows = store.list_notifications("tenant-a", 10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(!rows[0].is_read);
}
