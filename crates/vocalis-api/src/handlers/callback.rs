//! Conversion completion callback.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

use vocalis_service::conversion::{CallbackOutcome, ConversionCallback};

use crate::dto::response::{ApiResponse, CallbackResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/internal/conversions/callback
///
/// The shared secret travels in the configured header. Replays for a job
/// that already finished answer 200 with `applied: false`.
pub async fn conversion_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(callback): Json<ConversionCallback>,
) -> Result<Json<ApiResponse<CallbackResponse>>, ApiError> {
    let presented = headers
        .get(state.callback_config.header_name.as_str())
        .and_then(|v| v.to_str().ok());

    let outcome = state.callback_service.handle(presented, callback).await?;
    let applied = matches!(outcome, CallbackOutcome::Applied(_));
    let job = outcome.job();

    Ok(Json(ApiResponse::ok(CallbackResponse {
        job_id: job.id,
        status: job.status.to_string(),
        applied,
    })))
}
