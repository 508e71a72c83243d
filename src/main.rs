use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

mod api;
mod config;
mod handler;
mod media;
mod switcher;

use crate::config::AppConfig;
use crate::handler::preview::PreviewState;
use crate::media::relay;
use crate::media::sink::{Sink, sink_args};
use crate::switcher::{RotationStatus, RunEnd, Switcher};

/// Cycles a continuous output stream through a rotating list of live camera
/// sources.
#[derive(Parser)]
#[command(name = "camcycle", version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let args = Args::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            log::error!("Config: {:#}", e);
            std::process::exit(1);
        }
    };
    log::info!(
        "Loaded config with {} cameras, switch interval {}s, {}",
        config.cameras.len(),
        config.stream.switch_interval_secs,
        if config.stream.preview_mode {
            "HLS preview"
        } else {
            "RTMP push"
        }
    );

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    // HLS working dir lives for the whole run and is removed on drop.
    let hls_dir = if config.stream.preview_mode {
        match tempfile::Builder::new().prefix("camcycle-hls-").tempdir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                log::error!("Failed to create HLS working dir: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let (status_tx, status_rx) = tokio::sync::watch::channel(RotationStatus {
        camera: config.cameras[0].name.clone(),
        index: 0,
    });

    if let Some(dir) = &hls_dir {
        log::info!("HLS segments directory: {}", dir.path().display());
        api::start_preview_server(
            config.stream.preview_port,
            PreviewState {
                hls_dir: dir.path().to_path_buf(),
                status: status_rx,
            },
            cancel.clone(),
        );
    }

    let argv = sink_args(&config, hls_dir.as_ref().map(|d| d.path()));
    let mut sink = match Sink::start(&argv) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("Sink: {:#}", e);
            std::process::exit(1);
        }
    };
    let Some(sink_in) = sink.take_input() else {
        log::error!("Sink: input pipe unavailable");
        std::process::exit(1);
    };

    let (feed_tx, feed_rx) = relay::active_feed_slot();
    let relay_task = tokio::spawn(relay::run_relay(feed_rx, sink_in, cancel.clone()));

    let switcher = Switcher::new(Arc::clone(&config), sink, feed_tx, status_tx, cancel.clone());
    let end = switcher.run().await;

    cancel.cancel();
    let relay_failed = match relay_task.await {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            log::error!("Relay: {:#}", e);
            true
        }
        Err(e) => {
            log::error!("Relay task: {}", e);
            true
        }
    };

    let code = match end {
        Ok(RunEnd::Shutdown) if !relay_failed => 0,
        Ok(RunEnd::Shutdown) | Ok(RunEnd::SinkDied) => 1,
        Err(e) => {
            log::error!("Switcher: {:#}", e);
            1
        }
    };

    drop(hls_dir);
    log::info!("Streamer stopped");
    std::process::exit(code);
}

fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    log::warn!("SIGTERM handler unavailable: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        log::info!("Received shutdown signal");
        cancel.cancel();
    });
}
