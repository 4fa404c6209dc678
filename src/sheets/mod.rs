//! Sheet access layer
//!
//! [`SheetStore`] is the only way the workflows touch the spreadsheet. Every
//! call is a single request/response with no caching and no retry; a rejected
//! token surfaces as [`ArmoryError::AuthExpired`] so the session can be torn
//! down.

pub mod a1;
pub mod google;
pub mod memory;

pub use a1::{column_letter, SheetRange};
pub use google::{GoogleConnector, GoogleSheetsClient};
pub use memory::{MemoryConnector, MemorySheetStore};

use crate::error::{ArmoryError, ArmoryResult};
use crate::types::{BatchWrite, RangeOverwrite, RawGrid, SheetRef};
use async_trait::async_trait;
use serde::Serialize;

#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Read a range. Row 0 of a whole-tab read is the header.
    async fn fetch_range(&self, range: &SheetRange) -> ArmoryResult<RawGrid>;

    /// Append rows after the last non-empty row of `sheet`.
    async fn append_rows(&self, sheet: &SheetRef, rows: RawGrid) -> ArmoryResult<()>;

    /// Apply cell updates, append groups and overwrites in one round-trip.
    /// Either everything is committed or nothing is.
    async fn batch_write(&self, batch: BatchWrite) -> ArmoryResult<()>;

    /// Replace the whole content of `sheet`; `previous` is the grid being
    /// replaced so leftover cells can be blanked.
    async fn overwrite_range(
        &self,
        sheet: &SheetRef,
        previous: &RawGrid,
        grid: RawGrid,
    ) -> ArmoryResult<()> {
        self.batch_write(
            BatchWrite::new().overwrite(RangeOverwrite::replacing(sheet.id, previous, grid)),
        )
        .await
    }

    /// Whole-tab read
    async fn fetch_sheet(&self, sheet: &SheetRef) -> ArmoryResult<RawGrid> {
        self.fetch_range(&SheetRange::whole(sheet.range.clone()))
            .await
    }
}

/// Turns an access token into an identity and a store acting on its behalf.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Email of the account owning `token`.
    async fn resolve_email(&self, token: &str) -> ArmoryResult<String>;

    fn store(&self, token: &str) -> ArmoryResult<std::sync::Arc<dyn SheetStore>>;
}

/// A non-blank cell found under a header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellHit {
    pub row: usize,
    pub col: usize,
    pub value: String,
}

fn cell(grid: &RawGrid, row: usize, col: usize) -> &str {
    grid.get(row)
        .and_then(|r| r.get(col))
        .map(String::as_str)
        .unwrap_or("")
}

/// First blank cell under `header`, or one row past the end when the column
/// is full. Returned as zero-based (row, col).
pub fn find_insert_index(grid: &RawGrid, header: &str) -> ArmoryResult<(usize, usize)> {
    let col = crate::parser::column_index(grid, header)
        .ok_or_else(|| ArmoryError::NotFound(format!("header '{}'", header)))?;

    let row = (1..grid.len())
        .find(|&r| cell(grid, r, col).trim().is_empty())
        .unwrap_or(grid.len().max(1));
    Ok((row, col))
}

/// Every non-blank cell under `header`, top to bottom.
pub fn find_values_under_header(grid: &RawGrid, header: &str) -> Vec<CellHit> {
    let Some(col) = crate::parser::column_index(grid, header) else {
        return Vec::new();
    };
    (1..grid.len())
        .filter_map(|row| {
            let value = cell(grid, row, col);
            (!value.is_empty()).then(|| CellHit {
                row,
                col,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Number of non-blank cells under `header` in the body rows.
pub fn count_non_blank(grid: &RawGrid, header: &str) -> usize {
    let Some(col) = crate::parser::column_index(grid, header) else {
        return 0;
    };
    grid.iter()
        .skip(1)
        .filter(|row| row.get(col).is_some_and(|v| !v.trim().is_empty()))
        .count()
}
