//! Live-update SSE endpoints: torrents, RSS, and log tails per instance.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_core::Stream;
use qbfleet_core::{ChannelKind, InstanceId, StreamEvent};

use crate::http::errors::ApiError;
use crate::state::AppState;

const HEARTBEAT_COMMENT: &str = "heartbeat";
const HEADER_X_ACCEL_BUFFERING: &str = "x-accel-buffering";

fn sse_stream(mut subscription: qbfleet_core::Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        yield Ok(Event::default().event("connected").data("{}"));
        while let Some(event) = subscription.recv().await {
            match event {
                StreamEvent::Payload { event, data } => {
                    yield Ok(Event::default().event(remap_event_name(event)).data(data));
                }
                StreamEvent::Heartbeat => {
                    yield Ok(Event::default().comment(HEARTBEAT_COMMENT));
                }
            }
        }
    }
}

/// Translate the streamer's internal channel names to the wire names
/// viewers are expected to listen for.
fn remap_event_name(internal: &'static str) -> &'static str {
    match internal {
        "torrents" => "torrents_delta",
        "rss" => "feeds_update",
        "logs" => "logs_append",
        other => other,
    }
}

async fn subscribe(state: &AppState, id: InstanceId, kind: ChannelKind) -> Result<Response, ApiError> {
    let subscription = state.core.streamer.subscribe(id, kind).await?;
    let sse = Sse::new(sse_stream(subscription)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));
    let mut response = sse.into_response();
    response
        .headers_mut()
        .insert(HEADER_X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
    Ok(response)
}

/// `GET /api/instances/{id}/sse/torrents`.
pub(crate) async fn stream_torrents(State(state): State<AppState>, Path(id): Path<InstanceId>) -> Result<Response, ApiError> {
    subscribe(&state, id, ChannelKind::Torrents).await
}

/// `GET /api/instances/{id}/sse/rss`.
pub(crate) async fn stream_rss(State(state): State<AppState>, Path(id): Path<InstanceId>) -> Result<Response, ApiError> {
    subscribe(&state, id, ChannelKind::Rss).await
}

/// `GET /api/instances/{id}/sse/logs`.
pub(crate) async fn stream_logs(State(state): State<AppState>, Path(id): Path<InstanceId>) -> Result<Response, ApiError> {
    subscribe(&state, id, ChannelKind::Logs).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_event_name_translates_known_channels() {
        assert_eq!(remap_event_name("torrents"), "torrents_delta");
        assert_eq!(remap_event_name("rss"), "feeds_update");
        assert_eq!(remap_event_name("logs"), "logs_append");
    }

    #[test]
    fn remap_event_name_passes_through_unknown() {
        assert_eq!(remap_event_name("other"), "other");
    }
}
