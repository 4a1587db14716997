//! SSE wire frames and the shared response writer.
//!
//! Both the keep-alive task and the relay loop write into the same response
//! body. All writes go through [`EventWriter`], which serializes them behind a
//! lock; a writer holding the lock across several lines keeps them together.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use futures_util::stream;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, MutexGuard};

pub const KEEPALIVE: &[u8] = b": keepalive\n\n";

/// Frames buffered between the session and the response body.
const CHANNEL_CAPACITY: usize = 64;

/// `retry: <ms>` reconnect hint.
pub fn retry_frame(retry_ms: u64) -> Bytes {
    Bytes::from(format!("retry: {}\n\n", retry_ms))
}

/// `event: error` frame with a JSON message payload.
pub fn error_frame(message: &str) -> Bytes {
    event_frame("error", message)
}

/// `event: warning` frame with a JSON message payload.
pub fn warning_frame(message: &str) -> Bytes {
    event_frame("warning", message)
}

fn event_frame(event: &str, message: &str) -> Bytes {
    let data = serde_json::json!({ "message": message });
    Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

/// The client went away; nothing more can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client disconnected")]
pub struct StreamClosed;

/// Serialized access to the response body of one SSE connection.
#[derive(Debug, Clone)]
pub struct EventWriter {
    tx: Arc<Mutex<mpsc::Sender<Bytes>>>,
    // Unlocked handle used only to observe disconnects.
    watch: mpsc::Sender<Bytes>,
}

impl EventWriter {
    /// Create a writer and the response body it feeds.
    ///
    /// The body ends once every clone of the writer is dropped.
    pub fn channel() -> (Self, Body) {
        let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let writer = Self {
            watch: tx.clone(),
            tx: Arc::new(Mutex::new(tx)),
        };

        let frames = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
        });
        (writer, Body::from_stream(frames))
    }

    /// Take exclusive access for a sequence of writes.
    pub async fn lock(&self) -> WriterGuard<'_> {
        WriterGuard(self.tx.lock().await)
    }

    /// Write one frame.
    pub async fn write(&self, frame: Bytes) -> Result<(), StreamClosed> {
        self.lock().await.write(frame).await
    }

    /// Resolves when the client has gone away.
    pub async fn closed(&self) {
        self.watch.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.watch.is_closed()
    }
}

/// Exclusive access to the writer; released on drop.
pub struct WriterGuard<'a>(MutexGuard<'a, mpsc::Sender<Bytes>>);

impl WriterGuard<'_> {
    pub async fn write(&mut self, frame: Bytes) -> Result<(), StreamClosed> {
        self.0.send(frame).await.map_err(|_| StreamClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_frames() {
        assert_eq!(retry_frame(1000), Bytes::from("retry: 1000\n\n"));
        assert_eq!(
            error_frame("no backend configured"),
            Bytes::from("event: error\ndata: {\"message\":\"no backend configured\"}\n\n")
        );
        assert_eq!(
            warning_frame("status 404"),
            Bytes::from("event: warning\ndata: {\"message\":\"status 404\"}\n\n")
        );
    }

    #[test]
    fn test_message_is_json_escaped() {
        let frame = error_frame("bad \"host\"\nvalue");
        assert_eq!(
            frame,
            Bytes::from("event: error\ndata: {\"message\":\"bad \\\"host\\\"\\nvalue\"}\n\n")
        );
    }

    #[tokio::test]
    async fn test_body_ends_when_writers_dropped() {
        let (writer, body) = EventWriter::channel();
        let other = writer.clone();

        writer.write(Bytes::from_static(b"a\n")).await.unwrap();
        other.write(Bytes::from_static(b"b\n")).await.unwrap();
        drop(writer);
        drop(other);

        let frames: Vec<_> = body
            .into_data_stream()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(frames, vec![Bytes::from("a\n"), Bytes::from("b\n")]);
    }

    #[tokio::test]
    async fn test_write_after_disconnect_fails() {
        let (writer, body) = EventWriter::channel();
        drop(body);
        assert!(writer.is_closed());
        assert_eq!(writer.write(Bytes::from_static(KEEPALIVE)).await, Err(StreamClosed));
        writer.closed().await;
    }
}
