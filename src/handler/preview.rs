use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::watch;

use crate::handler::ApiResult;
use crate::switcher::RotationStatus;

#[derive(Clone)]
pub struct PreviewState {
    pub hls_dir: PathBuf,
    pub status: watch::Receiver<RotationStatus>,
}

pub fn preview_router(state: PreviewState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/stream/{file}", get(segment))
        .route("/status", get(status))
        .fallback(redirect_home)
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status(State(state): State<PreviewState>) -> Json<RotationStatus> {
    Json(state.status.borrow().clone())
}

async fn segment(
    State(state): State<PreviewState>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    // The player asks for live.m3u8; the encoder writes stream.m3u8.
    let file = if file == "live.m3u8" {
        "stream.m3u8".to_string()
    } else {
        file
    };
    if file.contains('/') || file.contains("..") {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    let content_type = if file.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if file.ends_with(".ts") {
        "video/mp2t"
    } else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    match tokio::fs::read(state.hls_dir.join(&file)).await {
        Ok(body) => Ok((
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "no-cache"),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            body,
        )
            .into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(StatusCode::NOT_FOUND.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn redirect_home() -> Redirect {
    Redirect::temporary("/")
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html><head><title>Live Stream Preview</title>
<script src="https://cdn.jsdelivr.net/npm/hls.js@latest"></script>
<style>
  body { background: #111; color: #eee; font-family: sans-serif; text-align: center; margin: 2em; }
  video { max-width: 100%; background: #000; }
  #status { margin-top: 1em; color: #aaa; }
</style>
</head>
<body>
<h1>Live Stream Preview</h1>
<video id="video" controls autoplay muted></video>
<div id="status">Connecting...</div>
<script>
var video = document.getElementById('video');
var status = document.getElementById('status');
if (Hls.isSupported()) {
    var hls = new Hls({
        liveSyncDuration: 3,
        liveMaxLatencyDuration: 10,
        liveDurationInfinity: true,
        manifestLoadingTimeOut: 10000,
        manifestLoadingMaxRetry: 30,
        manifestLoadingRetryDelay: 1000,
    });
    hls.loadSource('/stream/live.m3u8');
    hls.attachMedia(video);
    hls.on(Hls.Events.MANIFEST_PARSED, function() {
        status.textContent = 'Playing';
        video.play();
    });
    hls.on(Hls.Events.ERROR, function(event, data) {
        if (data.fatal) {
            status.textContent = 'Reconnecting...';
            setTimeout(function() { hls.loadSource('/stream/live.m3u8'); }, 2000);
        }
    });
} else if (video.canPlayType('application/vnd.apple.mpegurl')) {
    video.src = '/stream/live.m3u8';
    video.addEventListener('loadedmetadata', function() {
        status.textContent = 'Playing';
        video.play();
    });
}
</script>
</body></html>"#;
