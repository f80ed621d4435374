//! SQLite persistence. The engine reads its risk state back from here every
//! iteration, so the store is the single source of truth for positions.

pub mod db;

pub use db::{Database, StrategyPerformance};
