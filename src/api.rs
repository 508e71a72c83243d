use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::handler::preview::{PreviewState, preview_router};

/// Serves the player page and the generated segments for as long as the run
/// is alive. A preview server failure is logged but never ends the stream.
pub(crate) fn start_preview_server(port: u16, state: PreviewState, cancel: CancellationToken) {
    tokio::spawn(async move {
        let app = preview_router(state);

        let listener = match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("Preview server: bind port {} failed: {}", port, e);
                return;
            }
        };
        log::info!("Preview server started at http://localhost:{}", port);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("Preview server: {}", e);
        }
    });
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            log::info!("Shutting down preview server...");
        }
    }
}
