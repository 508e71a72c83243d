use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::BufReader;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::media::feed::{Feed, FeedSpec, probe_ready};
use crate::media::relay::{ActiveFeed, FeedOutput};
use crate::media::sink::Sink;

/// Liveness sampling step while waiting out a dwell interval.
const LIVENESS_POLL: Duration = Duration::from_secs(1);
/// Longest wait for a newly started feed to produce its first bytes.
const READY_PROBE_MAX: Duration = Duration::from_secs(10);
/// Settle time after repointing the relay, letting the sink flush the
/// transition before the next dwell starts.
const DRAIN_PERIOD: Duration = Duration::from_secs(2);

/// Position in the rotation list. The index is always reduced modulo the
/// list length, so it stays valid for any non-empty list.
#[derive(Debug, Clone)]
pub struct RotationState {
    index: usize,
    len: usize,
}

impl RotationState {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "rotation over an empty source list");
        Self { index: 0, len }
    }

    pub fn current(&self) -> usize {
        self.index
    }

    pub fn next(&self) -> usize {
        (self.index + 1) % self.len
    }

    pub fn advance(&mut self) -> usize {
        self.index = self.next();
        self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellOutcome {
    /// The full interval passed; time for a scheduled switch.
    Elapsed,
    /// The active feed's processes died; switch early.
    FeedDied,
    /// The output sink died; fatal for the run.
    SinkDied,
    Cancelled,
}

/// Wait out one dwell interval, sampling liveness once per second and
/// returning early on the first failed check. Sink death outranks feed death.
pub(crate) async fn dwell(
    interval: Duration,
    cancel: &CancellationToken,
    mut feed_alive: impl FnMut() -> bool,
    mut sink_alive: impl FnMut() -> bool,
) -> DwellOutcome {
    let mut remaining = interval;
    loop {
        if cancel.is_cancelled() {
            return DwellOutcome::Cancelled;
        }
        if !sink_alive() {
            return DwellOutcome::SinkDied;
        }
        if !feed_alive() {
            return DwellOutcome::FeedDied;
        }
        if remaining.is_zero() {
            return DwellOutcome::Elapsed;
        }
        let step = remaining.min(LIVENESS_POLL);
        tokio::select! {
            _ = cancel.cancelled() => return DwellOutcome::Cancelled,
            _ = tokio::time::sleep(step) => remaining -= step,
        }
    }
}

/// Snapshot of the rotation, published for the preview server.
#[derive(Debug, Clone, Serialize)]
pub struct RotationStatus {
    pub camera: String,
    pub index: usize,
}

/// How a run ended. Anything but `Shutdown` exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Shutdown,
    SinkDied,
}

/// Owns the rotation schedule, the active feed and the sink handle, and is
/// the only writer of the active-feed mailbox.
pub struct Switcher {
    config: Arc<AppConfig>,
    sink: Sink,
    feed_tx: watch::Sender<ActiveFeed>,
    status_tx: watch::Sender<RotationStatus>,
    cancel: CancellationToken,
}

impl Switcher {
    pub fn new(
        config: Arc<AppConfig>,
        sink: Sink,
        feed_tx: watch::Sender<ActiveFeed>,
        status_tx: watch::Sender<RotationStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            sink,
            feed_tx,
            status_tx,
            cancel,
        }
    }

    /// Runs the rotation until shutdown or a fatal sink failure. The only
    /// error is a failure to bring up the very first feed.
    pub async fn run(mut self) -> anyhow::Result<RunEnd> {
        let cancel = self.cancel.clone();
        let interval = self.config.switch_interval();
        let mut rotation = RotationState::new(self.config.cameras.len());

        log::info!(
            "Switcher: rotating {} cameras every {}s",
            self.config.cameras.len(),
            interval.as_secs()
        );

        // The first feed must come up or the run is aborted.
        let camera = self.config.cameras[rotation.current()].clone();
        log::info!("Switcher: starting with camera {}", camera.name);
        let spec = FeedSpec::for_source(&camera, &self.config.tools)?;
        let mut active = match Feed::start(&spec) {
            Ok(feed) => feed,
            Err(e) => {
                self.sink.stop().await;
                return Err(e.context(format!("start initial feed for {}", camera.name)));
            }
        };
        self.publish(&mut active, rotation.current()).await;

        let end = loop {
            let outcome = dwell(
                interval,
                &cancel,
                || active.is_alive(),
                || self.sink.is_alive(),
            )
            .await;

            match outcome {
                DwellOutcome::Cancelled => {
                    log::info!("Switcher: shutdown requested");
                    break RunEnd::Shutdown;
                }
                DwellOutcome::SinkDied => {
                    log::error!("Switcher: output sink died unexpectedly");
                    break RunEnd::SinkDied;
                }
                DwellOutcome::FeedDied => {
                    log::warn!(
                        "Switcher: feed {} ended (camera offline?), switching early",
                        active.name()
                    );
                }
                DwellOutcome::Elapsed => {}
            }

            // Make-before-break: the old feed keeps running and stays
            // published while the next one spins up.
            let next_index = rotation.next();
            let camera = self.config.cameras[next_index].clone();
            log::info!("Switcher: switching to camera {}", camera.name);

            let fresh = FeedSpec::for_source(&camera, &self.config.tools)
                .and_then(|spec| Feed::start(&spec));
            let mut fresh = match fresh {
                Ok(feed) => feed,
                Err(e) => {
                    log::warn!(
                        "Switcher: failed to start feed for {}: {:#}; keeping {}",
                        camera.name,
                        e,
                        active.name()
                    );
                    // Back off one liveness tick before the retry so a dead
                    // rotation target cannot spin the loop.
                    tokio::select! {
                        _ = cancel.cancelled() => break RunEnd::Shutdown,
                        _ = tokio::time::sleep(LIVENESS_POLL) => {}
                    }
                    continue;
                }
            };

            self.publish(&mut fresh, next_index).await;
            active.stop().await;
            active = fresh;
            rotation.advance();

            tokio::select! {
                _ = cancel.cancelled() => break RunEnd::Shutdown,
                _ = tokio::time::sleep(DRAIN_PERIOD) => {}
            }
        };

        active.stop().await;
        self.sink.stop().await;
        log::info!("Switcher: stopped");
        Ok(end)
    }

    /// Probe the feed for first data (bounded, best-effort), then atomically
    /// repoint the relay and publish the new rotation status.
    async fn publish(&mut self, feed: &mut Feed, index: usize) {
        let name = feed.name().to_string();
        let Some(stdout) = feed.take_output() else {
            log::warn!("Switcher: feed {} has no output to publish", name);
            return;
        };

        let mut reader = BufReader::new(stdout);
        let ready = tokio::select! {
            _ = self.cancel.cancelled() => false,
            ready = probe_ready(&mut reader, READY_PROBE_MAX) => ready,
        };
        if !ready {
            log::warn!(
                "Switcher: feed {} produced no data within {}s, switching anyway",
                name,
                READY_PROBE_MAX.as_secs()
            );
        }

        self.feed_tx
            .send_replace(Some(Arc::new(FeedOutput::new(&name, reader))));
        self.status_tx.send_replace(RotationStatus {
            camera: name,
            index,
        });
    }
}

#[cfg(test)]
#[path = "switcher_test.rs"]
mod switcher_test;
