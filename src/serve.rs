//! Optional built-in server for a controller tree.

use crate::{Config, Controller, Result};

use {
    std::{future::Future, time::Duration},
    tokio::{net::TcpListener, signal, sync::watch},
    tower_http::trace::TraceLayer,
};

impl Controller {
    /// Serves this controller on the address configured in `[http]` until
    /// Ctrl+C or SIGTERM is received.
    ///
    /// In-flight requests get `shutdown_timeout` to finish once the signal
    /// arrives; after that the server stops anyway.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate and an
    /// I/O error if the listener cannot be bound.
    pub async fn serve(&self, config: &Config) -> Result<()> {
        config.validate()?;

        let bind_addr = config.http.full_bind_addr();
        let listener = TcpListener::bind(&bind_addr).await?;
        tracing::info!("Bound to {}", listener.local_addr()?);
        tracing::info!("Waiting for connections");

        self.serve_on(listener, shutdown_signal(), config.http.shutdown_timeout)
            .await
    }

    /// Serves this controller on an already bound listener until `shutdown`
    /// resolves, then drains in-flight requests for at most `shutdown_timeout`.
    pub async fn serve_on<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
        shutdown_timeout: Duration,
    ) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router().layer(TraceLayer::new_for_http());

        let (initiated_tx, mut initiated_rx) = watch::channel(false);
        let signal = async move {
            shutdown.await;
            tracing::info!(
                "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
                shutdown_timeout.as_secs()
            );
            let _ = initiated_tx.send(true);
        };

        let serve_future = axum::serve(listener, app).with_graceful_shutdown(signal);

        // The timeout only starts once shutdown has been initiated.
        tokio::select! {
            result = serve_future => {
                result?;
                tracing::info!("Graceful shutdown completed");
            }
            _ = async {
                let initiated = initiated_rx.wait_for(|initiated| *initiated).await.is_ok();
                if !initiated {
                    std::future::pending::<()>().await;
                }
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                tracing::warn!("Graceful shutdown timeout expired, forcing shutdown");
            }
        }

        Ok(())
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::debug!("Ctrl+C signal received"),
            Err(err) => {
                tracing::warn!("Failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal_handler) => {
                signal_handler.recv().await;
                tracing::debug!("SIGTERM signal received");
            }
            Err(err) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", err);
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
