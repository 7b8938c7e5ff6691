use std::sync::Arc;

use crate::{error::ApiResult, live_updates::FlushStatsSnapshot, main_lib::AppState};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use blog_core::events::{LiveEvent, LiveEventSink};

/// Accept a live event from the application tier.
///
/// Publication changes are queued for the next batch; other events are
/// pushed to connected clients immediately.
#[utoipa::path(
    post,
    path = "/api/v1/live/events",
    responses(
        (status = 202, description = "Event accepted"),
        (status = 400, description = "Malformed event")
    )
)]
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<LiveEvent>,
) -> ApiResult<StatusCode> {
    event.validate()?;
    state.live_sink.emit(event);
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(get, path = "/api/v1/live/stats", responses((status = 200, description = "Flush worker counters")))]
pub async fn live_stats(State(state): State<Arc<AppState>>) -> Json<FlushStatsSnapshot> {
    Json(state.live_sink.stats())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/live/events", post(ingest_event))
        .route("/live/stats", get(live_stats))
}
