use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast;
use utoipa::OpenApi;

use crate::api::SharedState;

#[derive(OpenApi)]
#[openapi(paths(event_stream))]
pub struct EventsApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new().route("/stream", get(event_stream))
}

/// Stream whitelist-sync and command-queue events via Server-Sent Events.
///
/// Each event is named after its type (`sync.started`, `sync.failed`,
/// `command.dropped`, ...). A client that falls behind receives a `lagged`
/// event and should re-read sync status.
#[utoipa::path(
    get,
    path = "/stream",
    context_path = "/api/v1/events",
    tag = "events",
    responses(
        (status = 200, description = "SSE stream of sync events")
    )
)]
async fn event_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data(r#"{"status":"ok"}"#));

        loop {
            match rx.recv().await {
                Ok(sync_event) => {
                    let data = serde_json::to_string(&sync_event).unwrap_or_default();
                    yield Ok(Event::default().event(sync_event.event_type.as_str()).data(data));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default()
                        .event("lagged")
                        .data(format!(r#"{{"missed":{n}}}"#)));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}
