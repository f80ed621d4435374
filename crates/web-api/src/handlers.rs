use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use optrade_core::types::{Position, RiskState};
use optrade_core::PositionStore;
use optrade_engine::EngineStatus;
use optrade_risk::RiskMetrics;
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
}

/// # Errors
///
/// `INTERNAL_SERVER_ERROR` when the engine task is gone.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EngineStatus>, StatusCode> {
    let status = state
        .engine
        .status()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(status))
}

/// # Errors
///
/// `INTERNAL_SERVER_ERROR` when the store query fails.
pub async fn get_positions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PositionsResponse>, StatusCode> {
    let positions = state
        .store
        .get_open_positions()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(PositionsResponse { positions }))
}

/// # Errors
///
/// `INTERNAL_SERVER_ERROR` when the store query fails.
pub async fn get_risk(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RiskMetrics>, StatusCode> {
    let open = state
        .store
        .get_open_positions()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let today_realized_pnl = state
        .store
        .get_today_realized_pnl()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let risk_state = RiskState {
        today_realized_pnl,
        open_positions: open.len(),
        total_exposure: open.iter().map(Position::notional).sum(),
    };
    Ok(Json(RiskMetrics::compute(&state.risk_cfg, &risk_state)))
}

/// # Errors
///
/// `INTERNAL_SERVER_ERROR` when the store query fails.
pub async fn get_strategies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<optrade_store::StrategyPerformance>>, StatusCode> {
    let perf = state
        .store
        .get_strategy_performance()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(perf))
}

/// # Errors
///
/// `INTERNAL_SERVER_ERROR` when the engine task is gone.
pub async fn pause(State(state): State<Arc<AppState>>) -> Result<StatusCode, StatusCode> {
    state
        .engine
        .pause()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::ACCEPTED)
}

/// # Errors
///
/// `INTERNAL_SERVER_ERROR` when the engine task is gone.
pub async fn resume(State(state): State<Arc<AppState>>) -> Result<StatusCode, StatusCode> {
    state
        .engine
        .resume()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::ACCEPTED)
}

/// # Errors
///
/// `INTERNAL_SERVER_ERROR` when the engine task is gone.
pub async fn square_off(State(state): State<Arc<AppState>>) -> Result<StatusCode, StatusCode> {
    state
        .engine
        .square_off()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::ACCEPTED)
}

/// # Errors
///
/// `INTERNAL_SERVER_ERROR` when the engine task is gone.
pub async fn close_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    state
        .engine
        .close_position(id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::ACCEPTED)
}
