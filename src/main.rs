use std::path::PathBuf;
use std::sync::Arc;

use armory_sheets::api::{run_api_server, ApiConfig, AppState};
use armory_sheets::cli::{self, Workspace};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "armory")]
#[command(about = "Armory inventory, sign-out and logistics over a shared spreadsheet")]
#[command(long_about = "Armory - inventory and logistics over a Google Sheets spreadsheet

COMMANDS:
  records    - Print the parsed records of a tab
  logistics  - Show a logistics tab grouped by status
  balances   - Weapon and optics balances across every roster
  export     - Write a tab to CSV
  serve      - Run the HTTP API

EXAMPLES:
  armory --token $TOKEN records מלאי נשקיה
  armory --token $TOKEN balances --json
  armory --fixture demo.yaml --token demo logistics לוגיסטיקה-א
  armory --token $TOKEN export תיעוד audit.csv")]
#[command(version)]
struct Cli {
    /// YAML config (defaults to the built-in sheet catalogue)
    #[arg(short, long, global = true, env = "ARMORY_CONFIG")]
    config: Option<PathBuf>,

    /// Google OAuth access token; the token cache is used when omitted
    #[arg(short, long, global = true, env = "ARMORY_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Seed an in-memory spreadsheet from this YAML instead of calling Google
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parsed records of a tab
    Records {
        /// Tab range or name
        range: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a logistics tab grouped by status
    Logistics {
        /// Logistics tab range or name
        unit: String,

        #[arg(long)]
        json: bool,
    },

    /// Weapon and optics balances across every roster
    Balances {
        #[arg(long)]
        json: bool,
    },

    /// Write a tab to CSV
    Export {
        /// Tab range or name
        range: String,

        /// Output CSV file
        output: PathBuf,
    },

    /// Run the HTTP API
    Serve {
        /// Host address to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1", env = "ARMORY_HOST")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "ARMORY_PORT")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    armory_sheets::init_tracing();

    let ws = Workspace::open(cli.config.as_deref(), cli.fixture.as_deref())?;
    let token = cli.token.as_deref();

    let result = match cli.command {
        Commands::Records { range, json } => cli::records(&ws, token, &range, json).await,
        Commands::Logistics { unit, json } => cli::logistics(&ws, token, &unit, json).await,
        Commands::Balances { json } => cli::balances(&ws, token, json).await,
        Commands::Export { range, output } => cli::export(&ws, token, &range, output).await,
        Commands::Serve { host, port } => {
            let state = AppState::new(Arc::clone(&ws.config), ws.connector());
            return run_api_server(ApiConfig { host, port }, state).await;
        }
    };

    if let Err(e) = &result {
        ws.sessions.observe(e);
    }
    Ok(result?)
}
