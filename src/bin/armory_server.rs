//! Armory API server binary
//!
//! HTTP REST API over the armory spreadsheet.

use std::path::PathBuf;
use std::sync::Arc;

use armory_sheets::api::{run_api_server, ApiConfig, AppState};
use armory_sheets::config::ArmoryConfig;
use armory_sheets::sheets::{Connector, GoogleConnector, MemoryConnector};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "armory-server")]
#[command(version)]
#[command(about = "Armory API Server - HTTP REST API over the armory spreadsheet")]
#[command(long_about = r#"
Armory API Server - HTTP REST API

Callers authenticate with `Authorization: Bearer <google access token>`;
every request runs with that account's permissions.

  - GET  /api/v1/sheets/{range}/records   - Parsed records of a tab
  - GET  /api/v1/logistics/{unit}         - Status buckets + sign-out summary
  - POST /api/v1/logistics/{unit}/orders  - Submit an order
  - POST /api/v1/logistics/{unit}/transition
  - POST /api/v1/logistics/{unit}/sign-out
  - POST /api/v1/logistics/{unit}/read
  - GET  /api/v1/balances                 - Weapon and optics balances
  - GET  /api/v1/equipment/{range}        - Equipment ledger (+ /sign, /credit)
  - POST /api/v1/armory/issue             - Issue a serial to a roster row
  - POST /api/v1/armory/credit            - Return a roster row's weapon
  - POST /api/v1/armory/repair            - Move a serial to the defect log
  - POST /api/v1/armory/receive           - Bring a serial back from the defect log
  - POST /api/v1/armory/add               - Register a new serial in an inventory
  - POST /api/v1/armory/return-all        - Return everything a soldier holds

Additional endpoints:
  - GET  /health, /version, /

Example usage:
  armory-server                           # Start on localhost:8080
  armory-server --host 0.0.0.0 --port 3000 --config armory.yaml

  curl http://localhost:8080/api/v1/balances \
    -H "Authorization: Bearer $TOKEN"
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "ARMORY_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "ARMORY_PORT")]
    port: u16,

    /// YAML config (defaults to the built-in sheet catalogue)
    #[arg(short, long, env = "ARMORY_CONFIG")]
    config: Option<PathBuf>,

    /// Serve an in-memory spreadsheet seeded from this YAML
    #[arg(long)]
    fixture: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    armory_sheets::init_tracing();

    let config = ArmoryConfig::load_or_default(args.config.as_deref())?;
    config.validate()?;
    let config = Arc::new(config);

    let connector: Arc<dyn Connector> = match &args.fixture {
        Some(path) => Arc::new(MemoryConnector::load_fixture(path)?),
        None => Arc::new(GoogleConnector::new(Arc::clone(&config))?),
    };

    let api = ApiConfig {
        host: args.host,
        port: args.port,
    };
    run_api_server(api, AppState::new(config, connector)).await
}
