//! Concurrent reads and stale-response suppression

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{ArmoryError, ArmoryResult};
use crate::sheets::SheetStore;
use crate::types::{RawGrid, SheetRef};

/// Fetch every sheet concurrently and wait for all of them to settle.
///
/// Completion order is irrelevant: results come back in request order, and
/// the first failure (in request order) is reported only after every fetch
/// has finished.
pub async fn fetch_all(
    store: Arc<dyn SheetStore>,
    sheets: &[SheetRef],
) -> ArmoryResult<Vec<RawGrid>> {
    let mut tasks = JoinSet::new();
    for (idx, sheet) in sheets.iter().cloned().enumerate() {
        let store = Arc::clone(&store);
        tasks.spawn(async move { (idx, store.fetch_sheet(&sheet).await) });
    }

    let mut results: Vec<Option<ArmoryResult<RawGrid>>> = (0..sheets.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (idx, result) = joined.map_err(|e| ArmoryError::Fetch(format!("fetch task: {}", e)))?;
        results[idx] = Some(result);
    }
    debug!(sheets = sheets.len(), "all fetches settled");

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(ArmoryError::Fetch("fetch task vanished".to_string()))))
        .collect()
}

/// Last applied grid of one sheet.
pub struct SheetView {
    store: Arc<dyn SheetStore>,
    sheet: SheetRef,
    issued: AtomicU64,
    latest: Mutex<Option<(u64, RawGrid)>>,
}

impl SheetView {
    pub fn new(store: Arc<dyn SheetStore>, sheet: SheetRef) -> Self {
        Self {
            store,
            sheet,
            issued: AtomicU64::new(0),
            latest: Mutex::new(None),
        }
    }

    pub fn sheet(&self) -> &SheetRef {
        &self.sheet
    }

    pub fn store(&self) -> Arc<dyn SheetStore> {
        Arc::clone(&self.store)
    }

    /// Refetch. Returns `None` when a newer refresh (or `cancel`) was issued
    /// while this one was in flight; its result is discarded.
    pub async fn refresh(&self) -> ArmoryResult<Option<RawGrid>> {
        let generation = self.issue();
        let grid = self.store.fetch_sheet(&self.sheet).await?;
        if !self.apply(generation, &grid) {
            debug!(sheet = %self.sheet.name, generation, "dropping stale response");
            return Ok(None);
        }
        Ok(Some(grid))
    }

    fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store `grid` if `generation` is still the newest issued and newer than
    /// what is stored. Checked under the lock so an older response can never
    /// replace a newer one.
    fn apply(&self, generation: u64, grid: &RawGrid) -> bool {
        let mut latest = match self.latest.lock() {
            Ok(latest) => latest,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.issued.load(Ordering::SeqCst) != generation {
            return false;
        }
        if latest.as_ref().is_some_and(|(stored, _)| *stored >= generation) {
            return false;
        }
        *latest = Some((generation, grid.clone()));
        true
    }

    pub fn cancel(&self) {
        self.issued.fetch_add(1, Ordering::SeqCst);
    }

    /// Last applied grid, if any.
    pub fn current(&self) -> Option<RawGrid> {
        let latest = match self.latest.lock() {
            Ok(latest) => latest,
            Err(poisoned) => poisoned.into_inner(),
        };
        latest.as_ref().map(|(_, grid)| grid.clone())
    }

    /// Last applied grid, fetching once if nothing was applied yet.
    pub async fn current_or_refresh(&self) -> ArmoryResult<RawGrid> {
        if let Some(grid) = self.current() {
            return Ok(grid);
        }
        match self.refresh().await? {
            Some(grid) => Ok(grid),
            None => self.store.fetch_sheet(&self.sheet).await,
        }
    }
}
