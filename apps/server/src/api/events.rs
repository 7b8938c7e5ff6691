use std::{convert::Infallible, sync::Arc, time::Duration};

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};
use axum::{
    extract::{Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_core::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use utoipa::IntoParams;

const MAX_ROOM_NAME_LEN: usize = 64;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamParams {
    /// Comma-separated rooms to join besides the default room,
    /// e.g. `publicacion_42,publicacion_43`.
    pub rooms: Option<String>,
}

fn parse_rooms(raw: Option<&str>) -> ApiResult<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|room| !room.is_empty())
        .map(|room| {
            let valid = room.len() <= MAX_ROOM_NAME_LEN
                && room
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if valid {
                Ok(room.to_string())
            } else {
                Err(ApiError::BadRequest(format!("Invalid room name: {room}")))
            }
        })
        .collect()
}

#[utoipa::path(
    get,
    path = "/api/v1/events/stream",
    params(StreamParams),
    responses(
        (status = 200, description = "Server-sent live events"),
        (status = 400, description = "Invalid room name")
    )
)]
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let rooms = parse_rooms(params.rooms.as_deref())?;
    tracing::debug!("Client subscribed to live events (rooms: {:?})", rooms);

    let receiver = BroadcastStream::new(state.event_bus.subscribe());
    let receiver = tokio_stream::StreamExt::take_while(receiver, |event| {
        !matches!(event, Ok(evt) if evt.is_shutdown())
    });
    let stream = tokio_stream::StreamExt::filter_map(receiver, move |event| match event {
        Ok(evt) if !evt.is_visible_to(&rooms) => None,
        Ok(evt) => {
            let sse_event = SseEvent::default().event(evt.name);
            let sse_event = if let Some(payload) = evt.payload {
                match sse_event.json_data(payload) {
                    Ok(ev) => ev,
                    Err(err) => {
                        tracing::error!(
                            "Failed to serialize SSE payload for {}: {}",
                            evt.name,
                            err
                        );
                        return None;
                    }
                }
            } else {
                sse_event.data("null")
            };
            Some(Ok(sse_event))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!("Live event stream lagged, skipped {} event(s)", skipped);
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events/stream", get(stream_events))
}
