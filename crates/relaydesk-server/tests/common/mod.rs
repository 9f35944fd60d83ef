#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use relaydesk_escalation::dispatch::DispatchSettings;
use relaydesk_escalation::retry::RetryPolicy;
use relaydesk_escalation::{Pipeline, PipelineSettings};
use relaydesk_notify::registry::ProviderRegistry;
use relaydesk_notify::settings::{FallbackConfig, ProviderEnvironment};
use relaydesk_server::app;
use relaydesk_server::config::ServerConfig;
use relaydesk_server::state::AppState;
use relaydesk_storage::DeskStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

pub async fn build_test_context() -> anyhow::Result<TestContext> {
    build_test_context_with(FallbackConfig::default()).await
}

pub async fn build_test_context_with(fallback: FallbackConfig) -> anyhow::Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let mut config = ServerConfig::default();
    config.database.data_dir = temp_dir.path().to_string_lossy().to_string();
    let store = DeskStore::new(&config.database.connection_url()).await?;

    let registry = Arc::new(ProviderRegistry::with_defaults(
        Arc::new(ProviderEnvironment::default()),
        Duration::from_secs(5),
    )?);
    let settings = PipelineSettings {
        dispatch: DispatchSettings {
            provider_timeout: Duration::from_secs(5),
            outbox_initial_delay: Duration::ZERO,
        },
        webhook_timeout: Duration::from_secs(5),
        dedup_window: Duration::from_secs(60),
        retry: Some(RetryPolicy::default()),
        retry_batch_size: 10,
    };
    let pipeline = Pipeline::build(store.clone(), registry, fallback, settings)?;

    let state = AppState {
        store,
        pipeline,
        start_time: Utc::now(),
        config: Arc::new(config),
    };
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let req_body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(req_body)
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}
