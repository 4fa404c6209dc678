//! In-process spreadsheet
//!
//! Backs offline CLI runs (`--fixture`) and the test suite. Mirrors the wire
//! behaviour that matters to callers: trailing blanks are trimmed on read,
//! appends land after the last non-empty row, and a batch is validated in
//! full before anything is applied.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Connector, SheetRange, SheetStore};
use crate::error::{ArmoryError, ArmoryResult};
use crate::types::{BatchWrite, RawGrid, SheetRef};

#[derive(Debug, Clone)]
struct Tab {
    sheet: SheetRef,
    grid: RawGrid,
}

/// Seed file for offline runs: `sheets: { <range>: { id, rows } }` plus an
/// optional `accounts: { <token>: <email> }` table.
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub sheets: BTreeMap<String, FixtureSheet>,
    #[serde(default)]
    pub accounts: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureSheet {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rows: RawGrid,
}

#[derive(Default)]
pub struct MemorySheetStore {
    tabs: Mutex<HashMap<i64, Tab>>,
    fail_next_write: AtomicBool,
    token_expired: AtomicBool,
    writes: AtomicUsize,
    fetches: AtomicUsize,
}

fn read_fixture(path: &Path) -> ArmoryResult<Fixture> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn trimmed(grid: &RawGrid) -> RawGrid {
    let mut out: RawGrid = grid
        .iter()
        .map(|row| {
            let keep = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
            row[..keep].to_vec()
        })
        .collect();
    while out.last().is_some_and(Vec::is_empty) {
        out.pop();
    }
    out
}

fn put(grid: &mut RawGrid, row: usize, col: usize, value: &str) {
    if grid.len() <= row {
        grid.resize(row + 1, Vec::new());
    }
    let cells = &mut grid[row];
    if cells.len() <= col {
        cells.resize(col + 1, String::new());
    }
    cells[col] = value.to_string();
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(self, sheet: SheetRef, grid: RawGrid) -> Self {
        self.insert_sheet(sheet, grid);
        self
    }

    pub fn insert_sheet(&self, sheet: SheetRef, grid: RawGrid) {
        if let Ok(mut tabs) = self.tabs.lock() {
            tabs.insert(sheet.id, Tab { sheet, grid });
        }
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let store = Self::new();
        for (range, sheet) in fixture.sheets {
            let name = sheet.name.unwrap_or_else(|| range.clone());
            store.insert_sheet(SheetRef::new(name, range, sheet.id), sheet.rows);
        }
        store
    }

    pub fn load_fixture(path: &Path) -> ArmoryResult<Self> {
        Ok(Self::from_fixture(read_fixture(path)?))
    }

    /// The next write call fails without applying anything.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Every following call answers like a 401.
    pub fn expire_token(&self) {
        self.token_expired.store(true, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Current content of a tab, trimmed like a values read.
    pub fn snapshot(&self, range: &str) -> RawGrid {
        self.tabs
            .lock()
            .ok()
            .and_then(|tabs| {
                tabs.values()
                    .find(|t| t.sheet.range == range || t.sheet.name == range)
                    .map(|t| trimmed(&t.grid))
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> ArmoryResult<std::sync::MutexGuard<'_, HashMap<i64, Tab>>> {
        self.tabs
            .lock()
            .map_err(|_| ArmoryError::Fetch("memory store poisoned".to_string()))
    }

    fn check_token(&self) -> ArmoryResult<()> {
        if self.token_expired.load(Ordering::SeqCst) {
            return Err(ArmoryError::AuthExpired);
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> ArmoryResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(ArmoryError::WriteFailed(
                "500 Internal Server Error: injected failure".to_string(),
            ));
        }
        Ok(())
    }
}

fn append_after_last(grid: &mut RawGrid, rows: &RawGrid) {
    let mut base = trimmed(grid);
    base.extend(rows.iter().cloned());
    *grid = base;
}

#[async_trait]
impl SheetStore for MemorySheetStore {
    async fn fetch_range(&self, range: &SheetRange) -> ArmoryResult<RawGrid> {
        self.check_token()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let tabs = self.lock()?;
        let tab = tabs
            .values()
            .find(|t| t.sheet.range == range.tab || t.sheet.name == range.tab)
            .ok_or_else(|| {
                ArmoryError::Fetch(format!("400 Bad Request: unable to parse range {}", range))
            })?;
        Ok(trimmed(&range.slice(&trimmed(&tab.grid))))
    }

    async fn append_rows(&self, sheet: &SheetRef, rows: RawGrid) -> ArmoryResult<()> {
        self.check_token()?;
        self.take_injected_failure()?;
        let mut tabs = self.lock()?;
        let tab = tabs
            .get_mut(&sheet.id)
            .ok_or_else(|| ArmoryError::WriteFailed(format!("unknown sheet id {}", sheet.id)))?;
        append_after_last(&mut tab.grid, &rows);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn batch_write(&self, batch: BatchWrite) -> ArmoryResult<()> {
        self.check_token()?;
        self.take_injected_failure()?;
        let mut tabs = self.lock()?;

        let ids = batch
            .overwrites
            .iter()
            .map(|o| o.sheet_id)
            .chain(batch.updates.iter().map(|u| u.sheet_id))
            .chain(batch.appends.iter().map(|a| a.sheet_id));
        for id in ids {
            if !tabs.contains_key(&id) {
                return Err(ArmoryError::WriteFailed(format!(
                    "400 Bad Request: no grid with id {}",
                    id
                )));
            }
        }

        debug!(
            updates = batch.updates.len(),
            appends = batch.appends.len(),
            overwrites = batch.overwrites.len(),
            "memory batch"
        );
        for ow in &batch.overwrites {
            if let Some(tab) = tabs.get_mut(&ow.sheet_id) {
                tab.grid = ow.grid.clone();
            }
        }
        for update in &batch.updates {
            if let Some(tab) = tabs.get_mut(&update.sheet_id) {
                put(&mut tab.grid, update.row, update.col, &update.value);
            }
        }
        for group in &batch.appends {
            if let Some(tab) = tabs.get_mut(&group.sheet_id) {
                append_after_last(&mut tab.grid, &group.rows);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test/offline connector: fixed token → email table over one shared store.
pub struct MemoryConnector {
    store: Arc<MemorySheetStore>,
    accounts: HashMap<String, String>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemorySheetStore>) -> Self {
        Self {
            store,
            accounts: HashMap::new(),
        }
    }

    pub fn with_account(mut self, token: impl Into<String>, email: impl Into<String>) -> Self {
        self.accounts.insert(token.into(), email.into());
        self
    }

    /// Store and accounts from one fixture file.
    pub fn load_fixture(path: &Path) -> ArmoryResult<Self> {
        let mut fixture = read_fixture(path)?;
        let accounts = std::mem::take(&mut fixture.accounts);
        let connector = Self::new(Arc::new(MemorySheetStore::from_fixture(fixture)));
        Ok(accounts
            .into_iter()
            .fold(connector, |c, (token, email)| c.with_account(token, email)))
    }

    pub fn store_handle(&self) -> Arc<MemorySheetStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn resolve_email(&self, token: &str) -> ArmoryResult<String> {
        self.accounts
            .get(token)
            .cloned()
            .ok_or(ArmoryError::AuthExpired)
    }

    fn store(&self, token: &str) -> ArmoryResult<Arc<dyn SheetStore>> {
        if !self.accounts.contains_key(token) {
            return Err(ArmoryError::AuthExpired);
        }
        Ok(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellUpdate;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn store() -> (MemorySheetStore, SheetRef, SheetRef) {
        let data = SheetRef::new("data", "data", 1);
        let log = SheetRef::new("log", "log", 2);
        let store = MemorySheetStore::new()
            .with_sheet(data.clone(), vec![row(&["a", "b"]), row(&["1", "2"])])
            .with_sheet(log.clone(), vec![row(&["msg", "ts", "who"])]);
        (store, data, log)
    }

    #[tokio::test]
    async fn test_append_then_fetch_keeps_order() {
        let (store, data, _) = store();
        store
            .append_rows(&data, vec![row(&["3", "4"]), row(&["5"])])
            .await
            .unwrap();
        let grid = store.fetch_sheet(&data).await.unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[3], row(&["5"]));
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let (store, data, log) = store();
        store.fail_next_write();
        let batch = BatchWrite::new()
            .update(CellUpdate::new(1, 1, 0, "X"))
            .append(2, vec![row(&["m", "t", "w"])]);
        assert!(matches!(
            store.batch_write(batch).await,
            Err(ArmoryError::WriteFailed(_))
        ));
        assert_eq!(store.snapshot("data")[1][0], "1");
        assert_eq!(store.snapshot("log").len(), 1);
        assert_eq!(store.write_count(), 0);
        let _ = (data, log);
    }

    #[tokio::test]
    async fn test_unknown_sheet_rejects_whole_batch() {
        let (store, _, _) = store();
        let batch = BatchWrite::new()
            .update(CellUpdate::new(1, 1, 0, "X"))
            .append(99, vec![row(&["x"])]);
        assert!(store.batch_write(batch).await.is_err());
        assert_eq!(store.snapshot("data")[1][0], "1");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (store, data, _) = store();
        store.expire_token();
        assert!(matches!(
            store.fetch_sheet(&data).await,
            Err(ArmoryError::AuthExpired)
        ));
    }

    #[tokio::test]
    async fn test_fixture_yaml() {
        let fixture: Fixture = serde_yaml::from_str(
            r#"
sheets:
  "א":
    id: 10
    rows:
      - ["שם מלא", "סוג נשק"]
      - ["ישראל", "M16"]
"#,
        )
        .unwrap();
        let store = MemorySheetStore::from_fixture(fixture);
        let grid = store
            .fetch_range(&SheetRange::parse("א!A2:B").unwrap())
            .await
            .unwrap();
        assert_eq!(grid, vec![row(&["ישראל", "M16"])]);
    }

    #[tokio::test]
    async fn test_connector_fixture_accounts() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fixture.yaml");
        std::fs::write(
            &path,
            "sheets:\n  data:\n    id: 1\n    rows: [[a]]\naccounts:\n  tok: s@unit.il\n",
        )
        .unwrap();
        let connector = MemoryConnector::load_fixture(&path).unwrap();
        assert_eq!(connector.resolve_email("tok").await.unwrap(), "s@unit.il");
        assert!(matches!(
            connector.resolve_email("other").await,
            Err(ArmoryError::AuthExpired)
        ));
        assert_eq!(connector.store_handle().snapshot("data"), vec![row(&["a"])]);
    }
}
