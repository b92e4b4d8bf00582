// Replay route for reconnecting clients

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::dto::{ReplayQuery, ReplayResponse};
use crate::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/web/api/v1/gpt/replay/:request_id", get(replay))
        .with_state(state)
}

/// GET /web/api/v1/gpt/replay/{request_id} - Messages built so far
///
/// `?fromOrder=N` returns only messages with a sequence number above N.
pub async fn replay(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Query(query): Query<ReplayQuery>,
) -> Result<Json<ReplayResponse>, StatusCode> {
    let from_order = query.from_order.unwrap_or(0);
    let response = state
        .requests
        .replay(&request_id, from_order)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    tracing::debug!(
        request_id = %request_id,
        from_order,
        returned = response.messages.len(),
        "Replay: served buffer"
    );
    Ok(Json(response))
}
