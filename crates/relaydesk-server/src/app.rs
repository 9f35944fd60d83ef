use crate::state::AppState;
use crate::{api, logging};
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "relaydesk API",
        description = "Escalation dispatch and webhook delivery",
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Escalations", description = "Escalation triggers"),
        (name = "Webhooks", description = "Tenant webhook fan-out and delivery ledger"),
        (name = "Outbox", description = "Failed provider sends awaiting retry")
    )
)]
struct ApiDoc;

pub fn build_http_app(state: AppState) -> Router {
    let (router, route_spec) = api::api_routes().split_for_parts();

    let mut spec = ApiDoc::openapi();
    spec.merge(route_spec);
    let spec = Arc::new(spec);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .with_state(state)
        .route(
            "/v1/openapi.json",
            get(move || {
                let spec = spec.clone();
                async move { Json(spec.as_ref().clone()) }
            }),
        )
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
