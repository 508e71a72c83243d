use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

/// How long one readiness poll on the active feed may block. Bounds how
/// quickly a repoint of the active feed becomes visible to the relay.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);
/// Idle wait when no feed is published or the published one hit end of
/// stream.
pub const IDLE_QUANTUM: Duration = Duration::from_millis(200);
const CHUNK_SIZE: usize = 32 * 1024;

/// Read side of one published feed. Not mutated after publication; the relay
/// is the only reader.
pub struct FeedOutput {
    name: String,
    reader: Mutex<Box<dyn AsyncRead + Send + Unpin>>,
}

impl FeedOutput {
    pub fn new(name: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Mutex::new(Box::new(reader)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub type ActiveFeed = Option<Arc<FeedOutput>>;

/// Single-slot mailbox holding the feed the relay should currently read
/// from. The switch controller is the only writer; `send_replace` is the
/// atomic repoint the relay observes.
pub fn active_feed_slot() -> (watch::Sender<ActiveFeed>, watch::Receiver<ActiveFeed>) {
    watch::channel(None)
}

/// Moves bytes from whichever feed is currently published into the sink's
/// input until cancelled. Feed-side trouble (end of stream, read errors) only
/// parks that feed; a failed sink write is fatal for the whole run and is the
/// single error this returns.
pub async fn run_relay<W>(
    rx: watch::Receiver<ActiveFeed>,
    mut sink_in: W,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Send + Unpin,
{
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
    let mut exhausted: ActiveFeed = None;

    loop {
        if cancel.is_cancelled() {
            log::info!("Relay: cancelled");
            return Ok(());
        }

        let active = rx.borrow().clone();
        let Some(feed) = active else {
            idle(&cancel).await;
            continue;
        };
        if exhausted.as_ref().is_some_and(|e| Arc::ptr_eq(e, &feed)) {
            idle(&cancel).await;
            continue;
        }

        let mut reader = feed.reader.lock().await;
        match tokio::time::timeout(POLL_TIMEOUT, reader.read_buf(&mut buf)).await {
            // No data inside the poll window; loop to re-check the slot.
            Err(_) => {}
            Ok(Ok(0)) => {
                drop(reader);
                log::info!("Relay: feed {} reached end of stream", feed.name());
                exhausted = Some(feed);
            }
            Ok(Ok(_)) => {
                drop(reader);
                if let Err(e) = sink_in.write_all(&buf).await {
                    log::error!("Relay: write to sink failed: {}", e);
                    cancel.cancel();
                    return Err(anyhow::Error::new(e).context("write to sink input"));
                }
                buf.clear();
            }
            Ok(Err(e)) => {
                drop(reader);
                log::warn!("Relay: read from feed {} failed: {}", feed.name(), e);
                exhausted = Some(feed);
            }
        }
    }
}

async fn idle(cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(IDLE_QUANTUM) => {}
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod relay_test;
