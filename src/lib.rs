//! Armory Sheets - armory inventory, sign-out and logistics over a spreadsheet
//!
//! A company's rosters, master inventories, defect log and logistics requests
//! live as tabs of one Google Sheets spreadsheet. This library reads those
//! tabs as header-keyed records, guards status transitions on logistics
//! requests, reconciles weapon and optics balances, and writes every change
//! together with its audit row in a single batch.
//!
//! # Features
//!
//! - Sheet access over the Sheets REST API or an in-memory store
//! - Permission-gated sessions with a cached access token
//! - Order / sign-out / re-arm workflow with signature capture
//! - Balance aggregation across every company roster
//! - Quantity ledger and serial-number moves between rosters and inventories
//! - CSV export, HTTP API and CLI
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use armory_sheets::config::ArmoryConfig;
//! use armory_sheets::session::SessionManager;
//! use armory_sheets::sheets::GoogleConnector;
//! use armory_sheets::balance::fetch_balances;
//!
//! # async fn run() -> armory_sheets::ArmoryResult<()> {
//! let config = Arc::new(ArmoryConfig::default());
//! let connector = Arc::new(GoogleConnector::new(config.clone())?);
//! let sessions = SessionManager::new(connector, config.clone());
//!
//! let session = sessions.login("ya29.token").await?;
//! let report = fetch_balances(&config, session.store().clone()).await?;
//! for row in report.shortages() {
//!     println!("{}: {}", row.item, row.gap);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod armory;
pub mod balance;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod grouping;
pub mod ledger;
pub mod logistics;
pub mod parser;
pub mod session;
pub mod sheets;
pub mod transition;
pub mod types;

// Re-export commonly used types
pub use config::ArmoryConfig;
pub use error::{ArmoryError, ArmoryResult};
pub use parser::Record;
pub use types::{RawGrid, SheetRef, Status};

/// Install the fmt subscriber on stderr. `RUST_LOG` overrides the default
/// filter; a second call is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "armory_sheets=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
