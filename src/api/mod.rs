//! HTTP REST API over the armory workflows.
//!
//! Run with `armory serve` or `armory-server`.

pub mod handlers;
pub mod server;

pub use server::{router, run_api_server, ApiConfig, AppState};
