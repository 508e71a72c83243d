use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::process::{Child, ChildStdin};

use crate::config::AppConfig;
use crate::media::proc;

const STOP_GRACE: Duration = Duration::from_secs(5);

pub const PLAYLIST_NAME: &str = "stream.m3u8";
const SEGMENT_PATTERN: &str = "seg%05d.ts";

/// Argv for the single persistent encoder. It consumes canonical mpegts on
/// stdin and emits either rolling HLS segments under `hls_dir` or an RTMP
/// push, per configuration.
pub fn sink_args(config: &AppConfig, hls_dir: Option<&Path>) -> Vec<String> {
    let framerate = config.encode.framerate;
    let mut args: Vec<String> = [
        &config.tools.ffmpeg,
        "-re",
        "-fflags",
        "+genpts+igndts+discardcorrupt",
        "-f",
        "mpegts",
        "-i",
        "pipe:0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(music) = &config.audio.music_file {
        args.extend([
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            music.display().to_string(),
            "-filter_complex".to_string(),
            format!(
                "[1:a]volume={}[music];[0:a][music]amix=inputs=2:duration=first[aout]",
                config.audio.music_volume
            ),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
        ]);
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-b:v".to_string(),
        config.encode.video_bitrate.clone(),
        "-maxrate".to_string(),
        config.encode.video_bitrate.clone(),
        "-g".to_string(),
        (framerate * 2).to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        config.encode.audio_bitrate.clone(),
        "-r".to_string(),
        framerate.to_string(),
    ]);

    match hls_dir {
        Some(dir) => args.extend([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            config.stream.hls.segment_seconds.to_string(),
            "-hls_list_size".to_string(),
            config.stream.hls.playlist_len.to_string(),
            "-hls_flags".to_string(),
            "delete_segments".to_string(),
            "-hls_segment_filename".to_string(),
            dir.join(SEGMENT_PATTERN).display().to_string(),
            dir.join(PLAYLIST_NAME).display().to_string(),
        ]),
        None => args.extend([
            "-f".to_string(),
            "flv".to_string(),
            format!(
                "{}/{}",
                config.stream.youtube.rtmp_url, config.stream.youtube.stream_key
            ),
        ]),
    }

    args
}

/// The single persistent encoder. Started once at startup, it survives every
/// source switch; its exit is fatal for the whole run.
pub struct Sink {
    child: Child,
    input: Option<ChildStdin>,
}

impl Sink {
    pub fn start(argv: &[String]) -> anyhow::Result<Sink> {
        let mut child =
            proc::spawn_group(argv, Stdio::piped(), Stdio::null()).context("start output sink")?;
        let input = child.stdin.take();
        log::info!("Sink: started");
        Ok(Sink { child, input })
    }

    /// The writable input. Yields once; only the relay writes to it.
    pub fn take_input(&mut self) -> Option<ChildStdin> {
        self.input.take()
    }

    pub fn is_alive(&mut self) -> bool {
        proc::is_running(&mut self.child)
    }

    /// Close the input, then graceful termination with a bounded wait.
    pub async fn stop(&mut self) {
        drop(self.input.take());
        proc::terminate(&mut self.child, STOP_GRACE).await;
        log::info!("Sink: stopped");
    }
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod sink_test;
