//! Command channel between the admin surface and the engine task.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum EngineCommand {
    Pause,
    Resume,
    /// Close every open position now, regardless of the clock.
    SquareOff,
    /// Close one position at the current market price.
    ClosePosition {
        id: i64,
    },
    GetStatus(oneshot::Sender<EngineStatus>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    OutsideMarketHours,
    Active,
    Paused,
    SquaringOff,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub symbol: String,
    pub last_iteration: Option<DateTime<Utc>>,
    pub open_positions: usize,
    pub today_realized_pnl: Decimal,
    pub last_error: Option<String>,
}

impl EngineStatus {
    #[must_use]
    pub fn idle(symbol: String) -> Self {
        Self {
            state: EngineState::OutsideMarketHours,
            symbol,
            last_iteration: None,
            open_positions: 0,
            today_realized_pnl: Decimal::ZERO,
            last_error: None,
        }
    }
}

/// Cloneable handle the admin API uses to drive the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { tx }
    }

    /// # Errors
    ///
    /// Fails when the engine task has exited.
    pub async fn pause(&self) -> Result<()> {
        self.tx.send(EngineCommand::Pause).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails when the engine task has exited.
    pub async fn resume(&self) -> Result<()> {
        self.tx.send(EngineCommand::Resume).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails when the engine task has exited.
    pub async fn square_off(&self) -> Result<()> {
        self.tx.send(EngineCommand::SquareOff).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails when the engine task has exited.
    pub async fn close_position(&self, id: i64) -> Result<()> {
        self.tx.send(EngineCommand::ClosePosition { id }).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails when the engine task has exited or dropped the reply channel.
    pub async fn status(&self) -> Result<EngineStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(EngineCommand::GetStatus(tx)).await?;
        Ok(rx.await?)
    }

    /// # Errors
    ///
    /// Fails when the engine task has exited.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(EngineCommand::Shutdown).await?;
        Ok(())
    }
}
