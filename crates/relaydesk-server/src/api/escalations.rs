use crate::api::error_response;
use crate::api::success_response;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use relaydesk_escalation::escalation::{EscalationRequest, EscalationResult};
use relaydesk_escalation::EscalationError;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Trigger an escalation.
///
/// Duplicates within the dedup window come back as `skipped`. Dispatch
/// failures are not HTTP errors: the result carries `ok == false` and the
/// per-destination outcomes.
#[utoipa::path(
    post,
    path = "/v1/escalations",
    tag = "Escalations",
    request_body = EscalationRequest,
    responses(
        (status = 200, description = "Escalation handled", body = EscalationResult),
        (status = 400, description = "Invalid request", body = crate::api::ApiError)
    )
)]
async fn create_escalation(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    payload: Result<Json<EscalationRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &e.body_text())
        }
    };

    match state.pipeline.escalations.handle(req).await {
        Ok(result) => success_response(StatusCode::OK, &trace_id, result),
        Err(EscalationError::Validation(msg)) => {
            error_response(StatusCode::BAD_REQUEST, &trace_id, "validation_failed", &msg)
        }
        Err(e) => {
            tracing::error!(trace_id = %trace_id.0, error = %e, "Escalation failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                &e.to_string(),
            )
        }
    }
}

pub fn escalation_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(create_escalation))
}
