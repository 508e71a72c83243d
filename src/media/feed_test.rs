// ============================================================================
// Source Feed Tests
// ============================================================================

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::{Feed, FeedSpec, extractor_args, normalizer_args, probe_ready};
use crate::config::{CameraConfig, ToolsConfig};

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

// ------------------------------------------------------------------------
// Command construction
// ------------------------------------------------------------------------

#[test]
fn test_extractor_args_for_youtube() {
    assert_eq!(
        extractor_args("yt-dlp", "abc123"),
        argv(&[
            "yt-dlp",
            "-f",
            "best",
            "--hls-prefer-ffmpeg",
            "-o",
            "-",
            "https://www.youtube.com/watch?v=abc123",
        ])
    );
}

#[test]
fn test_normalizer_args_canonicalize_stream() {
    let args = normalizer_args("ffmpeg", "pipe:0");
    assert_eq!(args[0], "ffmpeg");
    assert_eq!(&args[1..3], argv(&["-i", "pipe:0"]).as_slice());
    // Video is passed through; audio and timestamps are made uniform.
    assert!(args.windows(2).any(|w| w == argv(&["-c:v", "copy"]).as_slice()));
    assert!(args.windows(2).any(|w| w == argv(&["-reset_timestamps", "1"]).as_slice()));
    assert_eq!(&args[args.len() - 3..], argv(&["-f", "mpegts", "pipe:1"]).as_slice());
}

#[test]
fn test_spec_for_youtube_source_chains_extractor() {
    let camera = CameraConfig {
        name: "plaza".to_string(),
        youtube_id: Some("abc123".to_string()),
        url: None,
    };
    let spec = FeedSpec::for_source(&camera, &ToolsConfig::default()).expect("spec");

    assert_eq!(spec.name, "plaza");
    let extractor = spec.extractor.expect("youtube needs an extractor");
    assert_eq!(extractor[0], "yt-dlp");
    assert!(spec.normalizer.contains(&"pipe:0".to_string()));
}

#[test]
fn test_spec_for_direct_url_has_no_extractor() {
    let camera = CameraConfig {
        name: "harbor".to_string(),
        youtube_id: None,
        url: Some("rtsp://example/harbor".to_string()),
    };
    let spec = FeedSpec::for_source(&camera, &ToolsConfig::default()).expect("spec");

    assert!(spec.extractor.is_none());
    assert!(spec.normalizer.contains(&"rtsp://example/harbor".to_string()));
}

#[test]
fn test_spec_for_source_without_locator_errors() {
    let camera = CameraConfig {
        name: "broken".to_string(),
        youtube_id: None,
        url: None,
    };
    assert!(FeedSpec::for_source(&camera, &ToolsConfig::default()).is_err());
}

// ------------------------------------------------------------------------
// Process lifecycle (stub commands)
// ------------------------------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn test_start_forwards_extractor_bytes_through_normalizer() {
    let spec = FeedSpec {
        name: "stub".to_string(),
        extractor: Some(argv(&["sh", "-c", "printf hello; sleep 30"])),
        normalizer: argv(&["cat"]),
    };
    let mut feed = Feed::start(&spec).expect("start");
    assert!(feed.is_alive());

    let mut output = feed.take_output().expect("output");
    assert!(feed.take_output().is_none());

    let mut buf = [0u8; 5];
    output.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"hello");

    feed.stop().await;
    assert!(!feed.is_alive());
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_is_bounded_and_idempotent() {
    let spec = FeedSpec {
        name: "stub".to_string(),
        extractor: Some(argv(&["sleep", "30"])),
        normalizer: argv(&["sh", "-c", "sleep 30"]),
    };
    let mut feed = Feed::start(&spec).expect("start");

    let start = Instant::now();
    feed.stop().await;
    feed.stop().await;
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!feed.is_alive());
}

#[cfg(unix)]
#[tokio::test]
async fn test_dead_extractor_flips_liveness() {
    let spec = FeedSpec {
        name: "stub".to_string(),
        extractor: Some(argv(&["true"])),
        normalizer: argv(&["sleep", "30"]),
    };
    let mut feed = Feed::start(&spec).expect("start");

    let deadline = Instant::now() + Duration::from_secs(5);
    while feed.is_alive() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!feed.is_alive());

    feed.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_normalizer_spawn_failure_errors() {
    let spec = FeedSpec {
        name: "stub".to_string(),
        extractor: Some(argv(&["sleep", "30"])),
        normalizer: argv(&["/definitely/not/a/binary"]),
    };
    assert!(Feed::start(&spec).is_err());
}

// ------------------------------------------------------------------------
// Readiness probe
// ------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_probe_ready_sees_early_data() {
    let (mut tx, rx) = tokio::io::duplex(1024);
    tx.write_all(b"ts").await.expect("write");

    let mut reader = BufReader::new(rx);
    assert!(probe_ready(&mut reader, Duration::from_secs(10)).await);

    // Peeked bytes are still there for the next reader.
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"ts");
}

#[tokio::test(start_paused = true)]
async fn test_probe_ready_waits_for_late_data() {
    let (mut tx, rx) = tokio::io::duplex(1024);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let _ = tx.write_all(b"late").await;
    });

    let mut reader = BufReader::new(rx);
    assert!(probe_ready(&mut reader, Duration::from_secs(10)).await);
}

#[tokio::test(start_paused = true)]
async fn test_probe_ready_times_out_at_bound() {
    let (_tx, rx) = tokio::io::duplex(1024);
    let mut reader = BufReader::new(rx);

    let start = tokio::time::Instant::now();
    assert!(!probe_ready(&mut reader, Duration::from_secs(10)).await);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_probe_ready_false_on_end_of_stream() {
    let (tx, rx) = tokio::io::duplex(1024);
    drop(tx);

    let mut reader = BufReader::new(rx);
    assert!(!probe_ready(&mut reader, Duration::from_secs(10)).await);
}
