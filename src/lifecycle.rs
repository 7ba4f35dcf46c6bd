//! Process lifecycle: signal handling and orderly shutdown.

use actix_web::HttpServer;
use std::future::Future;
use std::net::TcpListener;
use tokio::signal;

use crate::app::{build_app, AppState};
use crate::services::NotifierHandle;

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl+C signal"),
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                log::info!("Received SIGTERM signal");
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Serves the application on `listener` until `shutdown` resolves, then
/// stops the notifier and closes the database.
///
/// In-flight requests are not drained: the workers are stopped as soon as
/// the signal arrives.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    notifier: Option<NotifierHandle>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + 'static,
{
    let workers = state.clone();
    let server = HttpServer::new(move || build_app(&workers))
        .disable_signals()
        .shutdown_timeout(0)
        .listen(listener)?
        .run();

    let handle = server.handle();
    actix_web::rt::spawn(async move {
        shutdown.await;
        log::info!("Shutdown signal received, stopping server...");
        handle.stop(false).await;
    });

    server.await?;

    if let Some(notifier) = notifier {
        notifier.stop().await;
    }
    state.db.close().await;
    log::info!("Server shut down complete");
    Ok(())
}
