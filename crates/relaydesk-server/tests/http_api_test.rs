mod common;

use axum::http::StatusCode;
use common::{build_test_context, build_test_context_with, request_json};
use relaydesk_common::types::IntegrationStatus;
use relaydesk_notify::settings::FallbackConfig;
use relaydesk_server::config::TenantSeedFile;
use relaydesk_server::seed;
use relaydesk_storage::store::{NewIntegration, NewWebhookEndpoint};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn health_reports_providers_and_trace_id() {
    let ctx = build_test_context().await.unwrap();
    let (status, body, trace_id) = request_json(&ctx.app, "GET", "/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["err_code"], 0);
    let trace_id = trace_id.unwrap();
    assert_eq!(trace_id.len(), 16);
    assert_eq!(body["trace_id"], trace_id.as_str());
    let providers = body["data"]["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 5);
    assert!(providers.contains(&json!("slack")));
}

#[tokio::test]
async fn escalation_with_slack_integration_returns_results() {
    let ctx = build_test_context().await.unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;
    ctx.state
        .store
        .insert_integration(&NewIntegration {
            tenant_id: "t1".into(),
            provider: "slack".into(),
            name: "Support".into(),
            status: IntegrationStatus::Active,
            credentials: json!({}),
            config: json!({"webhook_url": format!("{}/slack", server.uri())}),
        })
        .await
        .unwrap();

    let req = json!({
        "tenant_id": "t1",
        "conversation_id": "c1",
        "user_message": "help",
        "reason": "low_confidence",
        "confidence": 0.2
    });
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/escalations", Some(req.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["ok"], true);
    assert_eq!(body["data"]["results"][0]["provider"], "slack");
    assert_eq!(body["data"]["results"][0]["ok"], true);

    let (_, again, _) = request_json(&ctx.app, "POST", "/v1/escalations", Some(req)).await;
    assert_eq!(again["data"]["skipped"], true);
    assert_eq!(again["data"]["reason"], "duplicate_prevention");
    assert_eq!(
        again["data"]["existing_escalation_id"],
        body["data"]["escalation_id"]
    );
}

#[tokio::test]
async fn escalation_validation_errors_are_400() {
    let ctx = build_test_context().await.unwrap();

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/escalations",
        Some(json!({"tenant_id": "t1", "conversation_id": "c1", "user_message": "x", "reason": "bored"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1010);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/escalations",
        Some(json!({"tenant_id": "t1", "conversation_id": "c1", "user_message": "x", "reason": "handoff", "confidence": 2.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["err_msg"].as_str().unwrap().contains("confidence"));

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/escalations",
        Some(json!({"tenant_id": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1001);
}

#[tokio::test]
async fn escalation_without_destinations_reports_dispatch_failure() {
    let ctx = build_test_context_with(FallbackConfig::default()).await.unwrap();
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/escalations",
        Some(json!({"tenant_id": "t1", "conversation_id": "c9", "user_message": "hi", "reason": "handoff"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ok"], false);
    assert_eq!(body["data"]["error"], "no destinations configured");
}

#[tokio::test]
async fn webhook_event_is_delivered_and_listed() {
    let ctx = build_test_context().await.unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    let endpoint = ctx
        .state
        .store
        .insert_webhook_endpoint(&NewWebhookEndpoint {
            tenant_id: "t1".into(),
            url: format!("{}/hook", server.uri()),
            events: vec!["conversation.closed".into()],
            secret: Some("s3cret".into()),
            is_active: true,
        })
        .await
        .unwrap();

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/webhooks/events",
        Some(json!({"tenant_id": "t1", "type": "conversation.closed", "data": {"conversation_id": "c1"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["delivered"], 1);
    assert_eq!(body["data"]["deliveries"][0]["response_status"], 202);

    let uri = format!("/v1/webhooks/endpoints/{}/deliveries?limit=10", endpoint.id);
    let (status, body, _) = request_json(&ctx.app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["limit"], 10);
    assert_eq!(body["data"]["items"][0]["event_type"], "conversation.closed");
    assert!(body["data"]["items"][0]["delivered_at"].is_string());
}

#[tokio::test]
async fn webhook_event_requires_type() {
    let ctx = build_test_context().await.unwrap();
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/webhooks/events",
        Some(json!({"tenant_id": "t1", "type": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1010);
}

#[tokio::test]
async fn deliveries_of_unknown_endpoint_is_404() {
    let ctx = build_test_context().await.unwrap();
    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/webhooks/endpoints/nope/deliveries", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["err_code"], 1004);
}

#[tokio::test]
async fn failed_send_shows_up_in_outbox() {
    let ctx = build_test_context().await.unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    ctx.state
        .store
        .insert_integration(&NewIntegration {
            tenant_id: "t1".into(),
            provider: "teams".into(),
            name: "Teams".into(),
            status: IntegrationStatus::Active,
            credentials: json!({}),
            config: json!({"webhook_url": format!("{}/teams", server.uri())}),
        })
        .await
        .unwrap();

    let (_, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/escalations",
        Some(json!({"tenant_id": "t1", "conversation_id": "c1", "user_message": "help", "reason": "restricted"})),
    )
    .await;
    assert_eq!(body["data"]["ok"], false);
    assert_eq!(body["data"]["error"], "all destinations failed");

    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/tenants/t1/outbox?status=pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["provider"], "teams");
    assert_eq!(body["data"]["items"][0]["payload"]["reason"], "restricted");

    let (status, _, _) =
        request_json(&ctx.app, "GET", "/v1/tenants/t1/outbox?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let ctx = build_test_context().await.unwrap();
    let (status, body, _) = request_json(&ctx.app, "GET", "/v1/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    for p in [
        "/v1/health",
        "/v1/escalations",
        "/v1/webhooks/events",
        "/v1/webhooks/endpoints/{id}/deliveries",
        "/v1/tenants/{tenant_id}/outbox",
    ] {
        assert!(paths.contains_key(p), "missing {p}");
    }
}

#[tokio::test]
async fn tenant_seed_is_idempotent() {
    let ctx = build_test_context().await.unwrap();
    let seed_file: TenantSeedFile = serde_json::from_value(json!({
        "tenant_id": "t1",
        "integrations": [
            {"name": "Support Slack", "provider": "slack", "config": {"webhook_url": "https://hooks.example/1"}},
            {"name": "Old Teams", "provider": "teams", "enabled": false}
        ],
        "rules": [
            {"name": "refunds", "keywords": ["refund"], "integrations": ["Support Slack", "Missing"]}
        ],
        "webhook_endpoints": [
            {"url": "internal://integration/slack/placeholder"}
        ]
    }))
    .unwrap();

    let first = seed::init_tenant(&ctx.state.store, &seed_file).await.unwrap();
    assert_eq!(first.integrations_created, 2);
    assert_eq!(first.rules_created, 1);
    assert_eq!(first.endpoints_created, 1);

    let second = seed::init_tenant(&ctx.state.store, &seed_file).await.unwrap();
    assert_eq!(second.integrations_created, 0);
    assert_eq!(second.integrations_skipped, 2);
    assert_eq!(second.rules_skipped, 1);
    assert_eq!(second.endpoints_skipped, 1);

    let rule = ctx
        .state
        .store
        .find_escalation_rule_by_name("t1", "refunds")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rule.destinations.len(), 1);

    let active = ctx.state.store.list_active_integrations("t1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Support Slack");
}
