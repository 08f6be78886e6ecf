//! Server-sent event streams
//!
//! Adapters from bus subscriptions to long-lived `text/event-stream`
//! responses. Subscribers only learn *what* changed; they re-read
//! authoritative state through the regular endpoints. When a subscriber
//! fell behind and deliveries were dropped, the next data object carries
//! the cumulative `dropped` count.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde_json::json;

use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn annotated_event(name: &'static str, id_field: &'static str, id: &str, dropped: u64) -> Event {
    let mut data = json!({ id_field: id });
    if dropped > 0 {
        data["dropped"] = json!(dropped);
    }
    Event::default().event(name).data(data.to_string())
}

/// `GET /v1/stream/nodes` — emits `node_update` events.
pub async fn nodes(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.events.nodes.subscribe();
    let stream = stream::unfold(subscription, |mut subscription| async move {
        let delivery = subscription.recv().await;
        let event = annotated_event(
            "node_update",
            "node_id",
            &delivery.event.node_id,
            delivery.dropped,
        );
        Some((Ok(event), subscription))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// `GET /v1/stream/jobs` — emits `job_update` events.
pub async fn jobs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.events.jobs.subscribe();
    let stream = stream::unfold(subscription, |mut subscription| async move {
        let delivery = subscription.recv().await;
        let event = annotated_event(
            "job_update",
            "job_id",
            &delivery.event.job_id,
            delivery.dropped,
        );
        Some((Ok(event), subscription))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
