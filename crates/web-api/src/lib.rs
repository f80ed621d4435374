//! Admin REST surface: status, positions, risk metrics, and control
//! commands (pause, resume, square-off, manual close).

pub mod handlers;
pub mod server;

pub use server::{ApiServer, AppState};
