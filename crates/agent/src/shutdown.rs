use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Create the process-wide shutdown token, cancelled on the first
/// SIGINT or SIGTERM. Clones of the token fan out to every task; the
/// cleanup path after cancellation runs exactly once, in startup.
pub fn create_shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let armed = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("termination signal received, shutting down");
        armed.cancel();
    });

    token
}

async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
