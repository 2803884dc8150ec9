//! HTTP status API for the call relay

pub mod calls;
pub mod health;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::session::CallSummary;

/// Live call snapshots published by the orchestrator
pub type CallsView = watch::Receiver<Vec<CallSummary>>;

/// Read-only status server
pub struct ApiServer {
    calls: CallsView,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub const fn new(calls: CallsView, port: u16) -> Self {
        Self { calls, port }
    }

    /// Build the router
    pub fn router(view: CallsView) -> Router {
        Router::new()
            .merge(health::router(view.clone()))
            .nest("/calls", calls::router(view))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, Self::router(self.calls))
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task, logging a failure
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    }
}
