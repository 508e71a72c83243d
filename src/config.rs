use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Application configuration, loaded once at startup and read-only thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cameras: Vec<CameraConfig>,
    pub stream: StreamConfig,
    pub encode: EncodeConfig,
    pub audio: AudioConfig,
    pub tools: ToolsConfig,
}

/// One entry in the rotation list. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    /// Platform id resolved through the extractor tool.
    #[serde(default)]
    pub youtube_id: Option<String>,
    /// Direct stream URL, read by the normalizer itself.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    YouTube(String),
    Url(String),
}

impl CameraConfig {
    /// The camera's locator, if exactly one non-empty kind is configured.
    pub fn locator(&self) -> Option<SourceLocator> {
        match (&self.youtube_id, &self.url) {
            (Some(id), None) if !id.is_empty() => Some(SourceLocator::YouTube(id.clone())),
            (None, Some(url)) if !url.is_empty() => Some(SourceLocator::Url(url.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Seconds a camera stays active before a scheduled switch.
    pub switch_interval_secs: u64,
    /// true = local HLS segments + preview server, false = RTMP push.
    pub preview_mode: bool,
    pub preview_port: u16,
    pub youtube: RtmpConfig,
    pub hls: HlsConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            switch_interval_secs: 300,
            preview_mode: true,
            preview_port: 8080,
            youtube: RtmpConfig::default(),
            hls: HlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtmpConfig {
    pub rtmp_url: String,
    pub stream_key: String,
}

impl Default for RtmpConfig {
    fn default() -> Self {
        Self {
            rtmp_url: "rtmp://a.rtmp.youtube.com/live2".to_string(),
            stream_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HlsConfig {
    pub segment_seconds: u32,
    pub playlist_len: u32,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            segment_seconds: 2,
            playlist_len: 10,
        }
    }
}

/// Parameters of the persistent encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub framerate: u32,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_bitrate: "4500k".to_string(),
            audio_bitrate: "128k".to_string(),
            framerate: 30,
        }
    }
}

/// Optional background music mixed under the relayed audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub music_file: Option<PathBuf>,
    pub music_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            music_file: None,
            music_volume: 0.3,
        }
    }
}

/// External binaries. Overridable so deployments (and tests) can point at
/// specific builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub ytdlp: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ytdlp: "yt-dlp".to_string(),
        }
    }
}

impl AppConfig {
    /// Read and validate the YAML config file. A relative music file path is
    /// resolved against the config file's directory; a missing music file is
    /// dropped with a warning.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let mut config: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parse config file {}", path.display()))?;

        if let Some(file) = config.audio.music_file.take() {
            let base = path.parent().unwrap_or(Path::new("."));
            let resolved = if file.is_absolute() { file } else { base.join(file) };
            if resolved.exists() {
                config.audio.music_file = Some(resolved);
            } else {
                log::warn!("Music file not found: {}", resolved.display());
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cameras.is_empty() {
            anyhow::bail!("no cameras configured");
        }
        for camera in &self.cameras {
            if camera.locator().is_none() {
                anyhow::bail!(
                    "camera {}: exactly one non-empty locator (youtube_id or url) is required",
                    camera.name
                );
            }
        }
        if self.stream.switch_interval_secs == 0 {
            anyhow::bail!("switch_interval_secs must be at least 1");
        }
        if !self.stream.preview_mode && self.stream.youtube.stream_key.is_empty() {
            anyhow::bail!("no stream key configured for push mode");
        }
        Ok(())
    }

    pub fn switch_interval(&self) -> Duration {
        Duration::from_secs(self.stream.switch_interval_secs)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
