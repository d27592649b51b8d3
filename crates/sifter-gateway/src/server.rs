use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use sifter_core::config::GatewayConfig;
use sifter_pipeline::JobRunner;

use crate::routes;
use crate::state::AppState;

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    runner: JobRunner,
}

/// The gateway's routes over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/jobs", get(routes::list_jobs).post(routes::submit_job))
        .route("/api/jobs/{id}", get(routes::job_status))
        .route("/api/jobs/{id}/events", get(routes::job_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, runner: JobRunner) -> Self {
        Self { config, runner }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            runner: self.runner.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
