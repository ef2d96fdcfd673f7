//! Streaming Transport (C11, §4.11). Frames pipeline progress and results
//! as Server-Sent Events with a monotonic `id`, a heartbeat timer, and a
//! hard max-duration cutoff.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::domain::{PortfolioSummary, Trade};
use crate::pipeline::ProgressEvent;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum StreamEvent {
    Connected { stream_id: String, wallet: String, timestamp: chrono::DateTime<chrono::Utc> },
    Progress(ProgressEvent),
    Trades { trades: Vec<Trade>, batch_num: u32, total_yielded: u64, has_more: bool },
    Heartbeat { timestamp: chrono::DateTime<chrono::Utc> },
    Complete { summary: PortfolioSummary, metrics: Value, elapsed_seconds: f64 },
    Error { error: String, code: &'static str, details: Option<String> },
}

impl StreamEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Progress(_) => "progress",
            Self::Trades { .. } => "trades",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// The `data:` payload, unwrapped from the `{event, data}` envelope
    /// `#[serde(tag, content)]` produces — SSE already carries the event
    /// name in its own `event:` field, so `data:` should just be the
    /// variant's inner JSON (§6.2 framing).
    fn data_json(&self) -> Value {
        let enveloped = serde_json::to_value(self).unwrap_or(Value::Null);
        enveloped.get("data").cloned().unwrap_or(Value::Null)
    }
}

/// Monotonic id generator shared by one stream's sender tasks (§5:
/// "Progress events within a stream are strictly monotonic in id").
#[derive(Clone, Default)]
pub struct IdSequence(std::sync::Arc<AtomicU64>);

impl IdSequence {
    pub fn new() -> Self {
        Self(std::sync::Arc::new(AtomicU64::new(0)))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// One rendered `event:`/`id:`/`data:` SSE frame (§6.2).
pub struct Frame {
    pub id: u64,
    pub event: StreamEvent,
}

pub fn into_axum_event(frame: Frame) -> axum::response::sse::Event {
    axum::response::sse::Event::default()
        .id(frame.id.to_string())
        .event(frame.event.event_name())
        .json_data(frame.event.data_json())
        .unwrap_or_else(|_| axum::response::sse::Event::default().event("error"))
}

/// Spawns a heartbeat ticker onto `tx`, stopping when the receiver is
/// dropped or `sse_max_stream` elapses (§4.11: "every 30s", "max 10 min").
pub fn spawn_heartbeat(
    tx: mpsc::Sender<Frame>,
    ids: IdSequence,
    keepalive: Duration,
    max_stream: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = tokio::time::Instant::now() + max_stream;
        let mut interval = tokio::time::interval(keepalive);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = interval.tick() => {
                    let frame = Frame {
                        id: ids.next(),
                        event: StreamEvent::Heartbeat { timestamp: chrono::Utc::now() },
                    };
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Converts a `Receiver<Frame>` into the `Stream` axum's SSE response wants.
pub fn frame_stream(
    rx: mpsc::Receiver<Frame>,
) -> impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>> {
    use futures::StreamExt;
    ReceiverStream::new(rx).map(|frame| Ok(into_axum_event(frame)))
}

/// Parses the `Last-Event-ID` header into a resume point. Per §4.11 this is
/// advisory only — the service holds no durable per-stream state across
/// reconnects, so resume always falls back to "start fresh", but the id
/// sequence for the new stream still starts past whatever the client last
/// saw to keep `id` monotonic from the client's point of view where
/// possible.
pub fn parse_last_event_id(header: Option<&str>) -> Option<u64> {
    header.and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_spec_vocabulary() {
        let connected = StreamEvent::Connected {
            stream_id: "s1".to_string(),
            wallet: "w".to_string(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(connected.event_name(), "connected");

        let error = StreamEvent::Error { error: "boom".to_string(), code: "internal_error", details: None };
        assert_eq!(error.event_name(), "error");
    }

    #[test]
    fn id_sequence_is_monotonic() {
        let ids = IdSequence::new();
        let a = ids.next();
        let b = ids.next();
        assert!(b > a);
    }

    #[test]
    fn last_event_id_parses_numeric_header() {
        assert_eq!(parse_last_event_id(Some("42")), Some(42));
        assert_eq!(parse_last_event_id(Some("not-a-number")), None);
        assert_eq!(parse_last_event_id(None), None);
    }

    #[test]
    fn data_json_unwraps_envelope() {
        let event = StreamEvent::Heartbeat { timestamp: chrono::Utc::now() };
        let data = event.data_json();
        assert!(data.get("timestamp").is_some());
    }
}
