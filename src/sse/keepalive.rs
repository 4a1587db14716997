//! Keep-alive ticker for SSE connections.

use std::time::Duration;

use axum::body::Bytes;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::sse::event::{EventWriter, KEEPALIVE};

/// Spawn a task writing `: keepalive` comments every `interval` until `cancel` fires
/// or the client goes away. The first comment is written one interval after start.
pub fn spawn(writer: EventWriter, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                written = writer.write(Bytes::from_static(KEEPALIVE)) => written,
            };
            if written.is_err() {
                break;
            }
        }

        tracing::trace!("Keep-alive stopped");
    })
}
