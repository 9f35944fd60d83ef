use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_paginated_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use relaydesk_storage::store::{OutboxEntry, OutboxStatus};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OutboxFilter {
    /// `pending`, `sent` or `dead`; all statuses when omitted.
    #[param(required = false)]
    #[serde(default)]
    pub status: Option<String>,
}

fn parse_status(raw: Option<&str>) -> Result<Option<OutboxStatus>, String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    [OutboxStatus::Pending, OutboxStatus::Sent, OutboxStatus::Dead]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(raw))
        .map(Some)
        .ok_or_else(|| format!("unknown outbox status: {raw}"))
}

/// Outbox entries of a tenant, oldest first.
#[utoipa::path(
    get,
    path = "/v1/tenants/{tenant_id}/outbox",
    tag = "Outbox",
    params(
        ("tenant_id" = String, Path, description = "Tenant id"),
        OutboxFilter,
        PaginationParams
    ),
    responses(
        (status = 200, description = "Paginated outbox entries", body = Vec<OutboxEntry>),
        (status = 400, description = "Unknown status filter", body = crate::api::ApiError)
    )
)]
async fn list_outbox(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(filter): Query<OutboxFilter>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let status = match parse_status(filter.status.as_deref()) {
        Ok(s) => s,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };
    let status = status.map(|s| s.as_str());

    let limit = pagination.limit();
    let offset = pagination.offset();
    let rows = state
        .store
        .list_outbox(&tenant_id, status, limit as u64, offset as u64)
        .await;
    let total = state.store.count_outbox(&tenant_id, status).await;
    match (rows, total) {
        (Ok(rows), Ok(total)) => {
            success_paginated_response(StatusCode::OK, &trace_id, rows, total, limit, offset)
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, tenant_id = %tenant_id, "Failed to list outbox");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn outbox_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(list_outbox))
}
