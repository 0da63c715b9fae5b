//! Server-Sent Events support

use crate::messenger::Outgoing;
use crate::store::UserId;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Stream the messages addressed to `user_id`
pub fn sse_stream(
    user_id: UserId,
    rx: broadcast::Receiver<Outgoing>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(message) if message.user_id() == user_id => Some(Ok(outgoing_to_event(&message))),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Event stream lagged, messages skipped");
            None
        }
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn outgoing_to_event(message: &Outgoing) -> Event {
    let event_type = match message {
        Outgoing::Text { .. } => "text",
        Outgoing::Buttons { .. } => "buttons",
    };
    let data = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event_type).data(data)
}
