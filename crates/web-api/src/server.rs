use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use optrade_core::config::RiskConfig;
use optrade_engine::EngineHandle;
use optrade_store::Database;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Shared state behind every route.
pub struct AppState {
    pub engine: EngineHandle,
    pub store: Arc<Database>,
    pub risk_cfg: RiskConfig,
}

pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    #[must_use]
    pub fn new(engine: EngineHandle, store: Arc<Database>, risk_cfg: RiskConfig) -> Self {
        Self {
            state: Arc::new(AppState {
                engine,
                store,
                risk_cfg,
            }),
        }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/positions", get(handlers::get_positions))
            .route("/api/risk", get(handlers::get_risk))
            .route("/api/strategies", get(handlers::get_strategies))
            .route("/api/pause", post(handlers::pause))
            .route("/api/resume", post(handlers::resume))
            .route("/api/square-off", post(handlers::square_off))
            .route("/api/positions/:id/close", post(handlers::close_position))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// # Errors
    ///
    /// Fails when the listener cannot bind or the server errors while
    /// serving.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "admin API listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
