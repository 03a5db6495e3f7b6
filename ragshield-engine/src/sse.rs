//! SSE bridge for live event streaming
//!
//! Turns an event-bus subscription into an `text/event-stream` response,
//! one JSON payload per data frame. Implements the slow-consumer policy: a
//! subscriber that lags its broadcast buffer is disconnected rather than
//! ever blocking the publisher.

use crate::events::EventBus;
use axum::response::sse::{Event as SseFrame, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

pub fn live_event_stream(bus: &EventBus) -> Sse<impl Stream<Item = Result<SseFrame, Infallible>>> {
    let mut rx = bus.subscribe();
    info!("New SSE client connected to event stream");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match SseFrame::default().json_data(&event) {
                    Ok(frame) => yield Ok(frame),
                    Err(e) => warn!(error = %e, "failed to serialize SSE event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    // Slow consumer: close the stream instead of slowing the
                    // bus down
                    warn!(skipped, "SSE subscriber lagged behind; disconnecting");
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
