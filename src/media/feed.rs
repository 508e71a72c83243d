use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::process::{Child, ChildStdout};

use crate::config::{CameraConfig, SourceLocator, ToolsConfig};
use crate::media::proc;

const STOP_GRACE: Duration = Duration::from_secs(3);

/// External command pair that turns one camera into a canonical mpegts byte
/// stream.
pub struct FeedSpec {
    pub name: String,
    pub extractor: Option<Vec<String>>,
    pub normalizer: Vec<String>,
}

impl FeedSpec {
    pub fn for_source(camera: &CameraConfig, tools: &ToolsConfig) -> anyhow::Result<Self> {
        let locator = camera
            .locator()
            .with_context(|| format!("camera {} has no usable locator", camera.name))?;
        Ok(match locator {
            SourceLocator::YouTube(id) => Self {
                name: camera.name.clone(),
                extractor: Some(extractor_args(&tools.ytdlp, &id)),
                normalizer: normalizer_args(&tools.ffmpeg, "pipe:0"),
            },
            // A direct URL needs no extractor; the normalizer pulls it itself.
            SourceLocator::Url(url) => Self {
                name: camera.name.clone(),
                extractor: None,
                normalizer: normalizer_args(&tools.ffmpeg, &url),
            },
        })
    }
}

fn extractor_args(ytdlp: &str, youtube_id: &str) -> Vec<String> {
    vec![
        ytdlp.to_string(),
        "-f".to_string(),
        "best".to_string(),
        "--hls-prefer-ffmpeg".to_string(),
        "-o".to_string(),
        "-".to_string(),
        format!("https://www.youtube.com/watch?v={}", youtube_id),
    ]
}

/// Remux to mpegts with regenerated timestamps and uniform audio, without
/// touching the video codec. The persistent sink does the actual encode, so
/// every feed looks identical downstream and a mid-stream swap stays coherent.
fn normalizer_args(ffmpeg: &str, input: &str) -> Vec<String> {
    [
        ffmpeg, "-i", input, "-c:v", "copy", "-c:a", "aac", "-ar", "44100", "-ac", "2",
        "-fflags", "+genpts", "-reset_timestamps", "1", "-f", "mpegts", "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Live process pair for one source. The processes are started and stopped as
/// a unit and never shared between two logical feeds.
pub struct Feed {
    name: String,
    extractor: Option<Child>,
    normalizer: Child,
    output: Option<ChildStdout>,
    stopped: bool,
}

impl Feed {
    /// Spawns the process chain. On any spawn failure nothing is left
    /// running (children are killed on drop).
    pub fn start(spec: &FeedSpec) -> anyhow::Result<Feed> {
        let mut extractor = None;
        let normalizer_stdin = match &spec.extractor {
            Some(argv) => {
                let mut child = proc::spawn_group(argv, Stdio::null(), Stdio::piped())
                    .with_context(|| format!("start extractor for {}", spec.name))?;
                let stdout = child.stdout.take().context("extractor stdout not piped")?;
                extractor = Some(child);
                Stdio::from(stdout.into_owned_fd().context("wire extractor into normalizer")?)
            }
            None => Stdio::null(),
        };

        let mut normalizer = proc::spawn_group(&spec.normalizer, normalizer_stdin, Stdio::piped())
            .with_context(|| format!("start normalizer for {}", spec.name))?;
        let output = normalizer.stdout.take();

        log::info!("Feed {}: started", spec.name);
        Ok(Feed {
            name: spec.name.clone(),
            extractor,
            normalizer,
            output,
            stopped: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalizer's readable output. Yields once.
    pub fn take_output(&mut self) -> Option<ChildStdout> {
        self.output.take()
    }

    /// Both processes still running; false as soon as either has exited.
    pub fn is_alive(&mut self) -> bool {
        let extractor_ok = self.extractor.as_mut().is_none_or(proc::is_running);
        let normalizer_ok = proc::is_running(&mut self.normalizer);
        extractor_ok && normalizer_ok
    }

    /// Graceful stop of the whole chain. Idempotent, bounded, swallows
    /// termination errors.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        drop(self.output.take());
        if let Some(child) = self.extractor.as_mut() {
            proc::terminate(child, STOP_GRACE).await;
        }
        proc::terminate(&mut self.normalizer, STOP_GRACE).await;
        log::info!("Feed {}: stopped", self.name);
    }
}

/// Wait up to `max_wait` for the feed's first readable bytes without
/// consuming them; whatever is peeked stays buffered for the relay.
pub async fn probe_ready<R: AsyncBufRead + Unpin>(reader: &mut R, max_wait: Duration) -> bool {
    match tokio::time::timeout(max_wait, reader.fill_buf()).await {
        Ok(Ok(buf)) => !buf.is_empty(),
        Ok(Err(_)) | Err(_) => false,
    }
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod feed_test;
