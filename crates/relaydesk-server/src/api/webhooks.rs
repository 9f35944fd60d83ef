use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_paginated_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use relaydesk_common::types::WebhookEvent;
use relaydesk_escalation::webhook::WebhookDispatchSummary;
use relaydesk_storage::store::WebhookDeliveryRow;
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// An event to fan out to a tenant's webhook endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookEventRequest {
    pub tenant_id: String,
    /// Event type, e.g. `escalation.triggered` or `conversation.closed`.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

/// Deliver an event to every active endpoint subscribed to its type.
#[utoipa::path(
    post,
    path = "/v1/webhooks/events",
    tag = "Webhooks",
    request_body = WebhookEventRequest,
    responses(
        (status = 200, description = "Per-endpoint delivery summary", body = WebhookDispatchSummary),
        (status = 400, description = "Invalid request", body = crate::api::ApiError)
    )
)]
async fn publish_event(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    payload: Result<Json<WebhookEventRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &e.body_text())
        }
    };
    if req.tenant_id.trim().is_empty() || req.event_type.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "validation_failed",
            "tenant_id and type are required",
        );
    }

    let event = WebhookEvent {
        event_type: req.event_type.trim().to_string(),
        tenant_id: req.tenant_id.trim().to_string(),
        data: req.data,
    };
    match state.pipeline.webhooks.dispatch(&event).await {
        Ok(summary) => success_response(StatusCode::OK, &trace_id, summary),
        Err(e) => {
            tracing::error!(trace_id = %trace_id.0, error = %e, "Webhook fan-out failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Failed to load webhook endpoints",
            )
        }
    }
}

/// Delivery ledger of one endpoint, newest first.
#[utoipa::path(
    get,
    path = "/v1/webhooks/endpoints/{id}/deliveries",
    tag = "Webhooks",
    params(
        ("id" = String, Path, description = "Webhook endpoint id"),
        PaginationParams
    ),
    responses(
        (status = 200, description = "Paginated deliveries", body = Vec<WebhookDeliveryRow>),
        (status = 404, description = "Endpoint not found", body = crate::api::ApiError)
    )
)]
async fn list_deliveries(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    match state.store.get_webhook_endpoint(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                &format!("Webhook endpoint '{id}' not found"),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, endpoint_id = %id, "Failed to load webhook endpoint");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    }

    let limit = pagination.limit();
    let offset = pagination.offset();
    let rows = state
        .store
        .list_webhook_deliveries(&id, limit as u64, offset as u64)
        .await;
    let total = state.store.count_webhook_deliveries(&id).await;
    match (rows, total) {
        (Ok(rows), Ok(total)) => {
            success_paginated_response(StatusCode::OK, &trace_id, rows, total, limit, offset)
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, endpoint_id = %id, "Failed to list webhook deliveries");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn webhook_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(publish_event))
        .routes(routes!(list_deliveries))
}
