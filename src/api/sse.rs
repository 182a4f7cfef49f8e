//! Server-Sent Events support

use crate::runtime::SessionEvent;
use crate::state_machine::ConversationState;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream, starting with the current state
pub fn sse_stream(
    initial: &ConversationState,
    broadcast_rx: tokio::sync::broadcast::Receiver<SessionEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = json!({
        "type": "init",
        "version": initial.version,
        "phase": initial.phase,
        "semantic_model": initial.semantic_model,
        "message_count": initial.messages.len(),
    });
    let init = futures::stream::once(async move { Ok(to_axum("init", &init)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(session_event_to_axum(event))),
        Err(_) => None, // Skip lagged messages; the next state change catches up
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Subscribers re-fetch the view on `state_change`; the payload only says
/// which version to expect.
fn session_event_to_axum(event: SessionEvent) -> Event {
    match event {
        SessionEvent::StateChange { version, phase } => to_axum(
            "state_change",
            &json!({
                "type": "state_change",
                "version": version,
                "phase": phase,
            }),
        ),
        SessionEvent::Notification { notification } => to_axum(
            "notification",
            &json!({
                "type": "notification",
                "text": notification.text(),
                "icon": notification.icon(),
            }),
        ),
        SessionEvent::Error { message } => to_axum(
            "error",
            &json!({
                "type": "error",
                "message": message,
            }),
        ),
    }
}

fn to_axum(event_type: &str, data: &Value) -> Event {
    Event::default().event(event_type).data(data.to_string())
}

/// Read `count` frames off an SSE body as `(event, data)` pairs
#[cfg(test)]
pub(super) async fn read_frames(body: axum::body::Body, count: usize) -> Vec<(String, Value)> {
    let mut stream = body.into_data_stream();
    let mut buffer = String::new();
    let mut frames = Vec::with_capacity(count);
    while frames.len() < count {
        if let Some((frame, rest)) = buffer.split_once("\n\n") {
            let mut event = String::new();
            let mut data = Value::Null;
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = name.trim().to_string();
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data = serde_json::from_str(payload.trim()).unwrap();
                }
            }
            frames.push((event, data));
            buffer = rest.to_string();
            continue;
        }
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for an SSE frame")
            .expect("SSE stream ended")
            .unwrap();
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
    frames
}
