//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::Colorize;
use tracing::info;

use crate::balance::{fetch_balances, BalanceRow, BalanceTable};
use crate::config::ArmoryConfig;
use crate::error::{ArmoryError, ArmoryResult};
use crate::export::export_csv_file;
use crate::logistics::LogisticsBoard;
use crate::parser::{self, Record};
use crate::session::{Session, SessionManager, TokenCache};
use crate::sheets::{Connector, GoogleConnector, MemoryConnector};
use crate::types::Status;

/// Config, backend and session manager shared by every command.
pub struct Workspace {
    pub config: Arc<ArmoryConfig>,
    pub sessions: SessionManager,
    connector: Arc<dyn Connector>,
}

impl Workspace {
    /// `fixture` switches to the in-memory backend seeded from that file.
    pub fn open(config_path: Option<&Path>, fixture: Option<&Path>) -> ArmoryResult<Self> {
        let config = ArmoryConfig::load_or_default(config_path)?;
        config.validate()?;
        let config = Arc::new(config);

        let connector: Arc<dyn Connector> = match fixture {
            Some(path) => {
                info!(fixture = %path.display(), "using in-memory spreadsheet");
                Arc::new(MemoryConnector::load_fixture(path)?)
            }
            None => Arc::new(GoogleConnector::new(Arc::clone(&config))?),
        };

        let mut sessions = SessionManager::new(Arc::clone(&connector), Arc::clone(&config));
        if let Some(path) = &config.token_cache {
            sessions = sessions.with_cache(TokenCache::new(path));
        }
        Ok(Self {
            config,
            sessions,
            connector,
        })
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::clone(&self.connector)
    }

    /// Log in with `token`, or resume from the token cache.
    pub async fn session(&self, token: Option<&str>) -> ArmoryResult<Arc<Session>> {
        if let Some(token) = token {
            return self.sessions.login(token).await;
        }
        self.sessions.resume().await?.ok_or_else(|| {
            ArmoryError::Config(
                "no access token: pass --token or set ARMORY_ACCESS_TOKEN".to_string(),
            )
        })
    }
}

fn print_records(records: &[Record]) {
    let Some(first) = records.first() else {
        println!("{}", "⚠️  No records".yellow());
        return;
    };
    println!("   {}", first.names().join(" | ").bold());
    for record in records {
        let values: Vec<&str> = record.fields().map(|(_, v)| v).collect();
        println!("   {:>4}  {}", record.row, values.join(" | "));
    }
}

/// Execute the records command
pub async fn records(ws: &Workspace, token: Option<&str>, range: &str, json: bool) -> ArmoryResult<()> {
    let session = ws.session(token).await?;
    let sheet = ws.config.sheet(range)?;
    session.require_readable(&ws.config, range)?;
    let records = parser::parse(&session.store().fetch_sheet(sheet).await?);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    println!("{}", format!("📋 {}", sheet.name).bold().green());
    println!("   {} records\n", records.len());
    print_records(&records);
    Ok(())
}

/// Execute the logistics command
pub async fn logistics(ws: &Workspace, token: Option<&str>, unit: &str, json: bool) -> ArmoryResult<()> {
    let session = ws.session(token).await?;
    let board = LogisticsBoard::new(&ws.config, &session, unit)?;
    let view = board.view().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{}", format!("📦 {}", view.sheet.name).bold().green());
    for status in Status::ALL {
        let bucket = view.groups.get(status);
        println!("\n{} ({})", status.as_str().bold().cyan(), bucket.len());
        for record in bucket {
            let c = &ws.config.logistics_columns;
            println!(
                "   {:>4}  {} {} x{}  {}",
                record.row,
                record.get(&c.item),
                record.get(&c.size),
                record.get(&c.quantity),
                record.get(&c.user).dimmed()
            );
        }
    }

    if !view.signature_summary.is_empty() {
        println!("\n{}", "✍️  Signed out".bold());
        for row in &view.signature_summary {
            println!("   {} {} x{}  {} {}", row.item, row.size, row.quantity, row.signer, row.date.dimmed());
        }
    }
    Ok(())
}

fn print_table(title: &str, table: &BalanceTable) {
    if table.rows.is_empty() {
        return;
    }
    println!("\n{}", title.bold().cyan());
    println!(
        "   {:<14} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
        "item", "issued", "stored", "stock", "defect", "total", "signed", "gap"
    );
    for row in &table.rows {
        println!("   {}", format_row(row));
    }
}

fn format_row(row: &BalanceRow) -> String {
    let gap = format!("{:>7}", row.gap);
    let gap = if row.is_shortage() { gap.red().bold() } else { gap.green() };
    format!(
        "{:<14} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {}",
        row.item, row.issued, row.stored, row.in_stock, row.defective, row.total, row.signed_off, gap
    )
}

/// Execute the balances command
pub async fn balances(ws: &Workspace, token: Option<&str>, json: bool) -> ArmoryResult<()> {
    let session = ws.session(token).await?;
    let report = fetch_balances(&ws.config, session.store().clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "🔫 Armory balances".bold().green());
    print_table("Weapons", &report.weapons);
    print_table("Optics", &report.optics);
    print_table("Accessories", &report.accessories);

    let shortages: Vec<&str> = report.shortages().map(|r| r.item.as_str()).collect();
    if shortages.is_empty() {
        println!("\n{}", "✅ No shortages".bold().green());
    } else {
        println!("\n{}", format!("❌ Shortages: {}", shortages.join(", ")).bold().red());
    }
    Ok(())
}

/// Execute the export command
pub async fn export(ws: &Workspace, token: Option<&str>, range: &str, output: PathBuf) -> ArmoryResult<()> {
    let session = ws.session(token).await?;
    let sheet = ws.config.sheet(range)?;
    session.require_readable(&ws.config, range)?;
    let records = parser::parse(&session.store().fetch_sheet(sheet).await?);
    let count = export_csv_file(&records, &output)?;

    println!("{}", "✅ Export Complete!".bold().green());
    println!("   {} records → {}", count, output.display());
    Ok(())
}
