//! Streaming handler (§6 "Streaming"): `GET /events` fans out every
//! [`audiobook_core::Event`] as an SSE `data: {json}\n\n` frame, with a
//! 30s keep-alive ping, grounded on the teacher's
//! `scan_progress_sse_handler` (`ferrex-server/src/handlers/scan/handle_scan.rs`).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::state::AppState;

pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.hub.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(event) => event_to_sse(&event),
        Err(_lagged) => Some(SseEvent::default().event("lagged").data("{}")),
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(30)).text("ping"),
    )
}

fn event_to_sse(event: &audiobook_core::Event) -> Option<SseEvent> {
    let name = match event {
        audiobook_core::Event::OperationProgress { .. } => "operation.progress",
        audiobook_core::Event::OperationLog { .. } => "operation.log",
        audiobook_core::Event::OperationCompleted { .. } => "operation.completed",
        audiobook_core::Event::LibraryChanged { .. } => "library.changed",
        audiobook_core::Event::ImportDiscovered { .. } => "import.discovered",
        audiobook_core::Event::ConfigChanged { .. } => "config.changed",
        audiobook_core::Event::Heartbeat => return None,
    };
    let data = serde_json::to_string(event).ok()?;
    Some(SseEvent::default().event(name).data(data))
}
