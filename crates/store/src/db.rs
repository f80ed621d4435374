//! SQLite-backed [`PositionStore`].
//!
//! Money columns are stored as TEXT and parsed back into `Decimal`, which
//! keeps exact values through SQLite's dynamic typing. Contributor lists are
//! stored comma-separated on the trade row.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optrade_core::traits::PositionStore;
use optrade_core::types::{
    ExitReason, NewPosition, NewTrade, OptionType, Position, PositionStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// Aggregate per-contributor performance, served by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy: String,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub total_pnl: Decimal,
    pub win_rate: f64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `url` and applies the
    /// schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .with_context(|| format!("opening database {url}"))?;
        let db = Self { pool };
        db.init_schema().await?;
        info!(url, "database ready");
        Ok(db)
    }

    /// Private in-memory database for tests. Single connection, since each
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trade_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                option_type TEXT NOT NULL,
                strike TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                entry_price TEXT NOT NULL,
                current_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                target TEXT NOT NULL,
                trailing_active INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'OPEN',
                entry_time TEXT NOT NULL,
                exit_time TEXT,
                exit_reason TEXT,
                pnl TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                option_type TEXT NOT NULL,
                strike TEXT NOT NULL,
                action TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT,
                stop_loss TEXT NOT NULL,
                target TEXT NOT NULL,
                pnl TEXT,
                pnl_pct TEXT,
                status TEXT NOT NULL DEFAULT 'OPEN',
                signal_strength REAL NOT NULL,
                contributors TEXT NOT NULL DEFAULT '',
                exit_reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_performance (
                strategy TEXT PRIMARY KEY,
                total_trades INTEGER NOT NULL DEFAULT 0,
                winning_trades INTEGER NOT NULL DEFAULT 0,
                losing_trades INTEGER NOT NULL DEFAULT 0,
                total_pnl TEXT NOT NULL DEFAULT '0',
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All contributor aggregates, biggest earner first.
    pub async fn get_strategy_performance(&self) -> Result<Vec<StrategyPerformance>> {
        let rows = sqlx::query(
            "SELECT strategy, total_trades, winning_trades, losing_trades, total_pnl \
             FROM strategy_performance",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let total_trades: i64 = row.get("total_trades");
            let winning_trades: i64 = row.get("winning_trades");
            out.push(StrategyPerformance {
                strategy: row.get("strategy"),
                total_trades,
                winning_trades,
                losing_trades: row.get("losing_trades"),
                total_pnl: decimal_col(&row, "total_pnl")?,
                win_rate: if total_trades > 0 {
                    winning_trades as f64 / total_trades as f64
                } else {
                    0.0
                },
            });
        }
        out.sort_by(|a, b| b.total_pnl.cmp(&a.total_pnl));
        Ok(out)
    }
}

fn decimal_col(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<Decimal> {
    let raw: String = row.get(col);
    Decimal::from_str(&raw).with_context(|| format!("parsing decimal column {col}: {raw:?}"))
}

fn position_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Position> {
    let option_type: String = row.get("option_type");
    let entry_time: DateTime<Utc> = row.get("entry_time");
    Ok(Position {
        id: row.get("id"),
        trade_id: row.get("trade_id"),
        symbol: row.get("symbol"),
        option_type: OptionType::parse(&option_type)
            .with_context(|| format!("unknown option type {option_type:?}"))?,
        strike: decimal_col(row, "strike")?,
        quantity: row.get("quantity"),
        entry_price: decimal_col(row, "entry_price")?,
        current_price: decimal_col(row, "current_price")?,
        stop_loss: decimal_col(row, "stop_loss")?,
        target: decimal_col(row, "target")?,
        trailing_active: row.get::<i64, _>("trailing_active") != 0,
        status: PositionStatus::Open,
        entry_time,
        exit_time: None,
        exit_reason: None,
        pnl: None,
    })
}

#[async_trait]
impl PositionStore for Database {
    async fn get_open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE status = 'OPEN' ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(position_from_row).collect()
    }

    async fn add_position(&self, position: NewPosition) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions
                (trade_id, symbol, option_type, strike, quantity, entry_price,
                 current_price, stop_loss, target, entry_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(position.trade_id)
        .bind(&position.symbol)
        .bind(position.option_type.as_str())
        .bind(position.strike.to_string())
        .bind(position.quantity)
        .bind(position.entry_price.to_string())
        .bind(position.stop_loss.to_string())
        .bind(position.target.to_string())
        .bind(position.entry_time)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();
        debug!(id, symbol = %position.symbol, "position recorded");
        Ok(id)
    }

    async fn update_position_mark(
        &self,
        id: i64,
        current_price: Decimal,
        unrealized_pnl: Decimal,
    ) -> Result<()> {
        sqlx::query("UPDATE positions SET current_price = ?2, pnl = ?3 WHERE id = ?1")
            .bind(id)
            .bind(current_price.to_string())
            .bind(unrealized_pnl.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_stop_loss(&self, id: i64, new_stop: Decimal) -> Result<()> {
        sqlx::query("UPDATE positions SET stop_loss = ?2, trailing_active = 1 WHERE id = ?1")
            .bind(id)
            .bind(new_stop.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close_position(
        &self,
        id: i64,
        exit_price: Decimal,
        pnl: Decimal,
        reason: ExitReason,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE positions
            SET status = 'CLOSED', current_price = ?2, pnl = ?3,
                exit_reason = ?4, exit_time = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(exit_price.to_string())
        .bind(pnl.to_string())
        .bind(reason.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_today_realized_pnl(&self) -> Result<Decimal> {
        let rows = sqlx::query(
            "SELECT pnl FROM trades \
             WHERE status = 'CLOSED' AND pnl IS NOT NULL AND date(timestamp) = date('now')",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut total = Decimal::ZERO;
        for row in &rows {
            total += decimal_col(row, "pnl")?;
        }
        Ok(total)
    }

    async fn add_trade(&self, trade: NewTrade) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades
                (timestamp, symbol, option_type, strike, action, quantity,
                 entry_price, stop_loss, target, signal_strength, contributors)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(Utc::now())
        .bind(&trade.symbol)
        .bind(trade.option_type.as_str())
        .bind(trade.strike.to_string())
        .bind(trade.action.to_string())
        .bind(trade.quantity)
        .bind(trade.entry_price.to_string())
        .bind(trade.stop_loss.to_string())
        .bind(trade.target.to_string())
        .bind(trade.signal_strength)
        .bind(trade.contributors.join(","))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn close_trade(
        &self,
        id: i64,
        exit_price: Decimal,
        pnl: Decimal,
        pnl_pct: Decimal,
        reason: ExitReason,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trades
            SET status = 'CLOSED', exit_price = ?2, pnl = ?3, pnl_pct = ?4, exit_reason = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(exit_price.to_string())
        .bind(pnl.to_string())
        .bind(pnl_pct.to_string())
        .bind(reason.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_trade_contributors(&self, trade_id: i64) -> Result<Vec<String>> {
        let row = sqlx::query("SELECT contributors FROM trades WHERE id = ?1")
            .bind(trade_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(Vec::new());
        };
        let raw: String = row.get("contributors");
        Ok(raw
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn update_strategy_performance(&self, name: &str, pnl: Decimal) -> Result<()> {
        let won = i64::from(pnl > Decimal::ZERO);
        let lost = i64::from(pnl < Decimal::ZERO);

        let row = sqlx::query("SELECT total_pnl FROM strategy_performance WHERE strategy = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let new_total = decimal_col(&row, "total_pnl")? + pnl;
                sqlx::query(
                    r#"
                    UPDATE strategy_performance
                    SET total_trades = total_trades + 1,
                        winning_trades = winning_trades + ?2,
                        losing_trades = losing_trades + ?3,
                        total_pnl = ?4,
                        updated_at = ?5
                    WHERE strategy = ?1
                    "#,
                )
                .bind(name)
                .bind(won)
                .bind(lost)
                .bind(new_total.to_string())
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO strategy_performance
                        (strategy, total_trades, winning_trades, losing_trades, total_pnl, updated_at)
                    VALUES (?1, 1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(name)
                .bind(won)
                .bind(lost)
                .bind(pnl.to_string())
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}
