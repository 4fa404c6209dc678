//! Logistics request workflow
//!
//! Companies order items, logistics staff move them through the status
//! vocabulary and sign them out against a captured signature. Every write is
//! one batch carrying its audit row.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::{ArmoryConfig, LogisticsColumns};
use crate::error::{ArmoryError, ArmoryResult};
use crate::fetch::SheetView;
use crate::grouping::{group_by_status, StatusGroups};
use crate::parser::{self, to_int_or_zero, to_timestamp, Record};
use crate::session::Session;
use crate::transition::{Applied, Decision, PendingSignOut, SignatureCapture, TransitionGuard};
use crate::types::{timestamp_now, BatchWrite, Purpose, RawGrid, SheetRef, Status, NO, YES};

fn one() -> i64 {
    1
}

/// One requested line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item: String,
    #[serde(default)]
    pub size: String,
    #[serde(default = "one")]
    pub quantity: i64,
    #[serde(default)]
    pub purpose: Purpose,
    #[serde(default)]
    pub note: String,
}

impl OrderItem {
    pub fn new(item: impl Into<String>, quantity: i64) -> Self {
        Self {
            item: item.into(),
            size: String::new(),
            quantity,
            purpose: Purpose::default(),
            note: String::new(),
        }
    }

    pub fn from_record(record: &Record, columns: &LogisticsColumns) -> Self {
        Self {
            item: record.get(&columns.item).to_string(),
            size: record.get(&columns.size).to_string(),
            quantity: to_int_or_zero(record.get(&columns.quantity)),
            purpose: Purpose::from_cell(record.get(&columns.purpose)).unwrap_or_default(),
            note: record.get(&columns.note).to_string(),
        }
    }
}

/// A full logistics row about to be appended.
#[derive(Debug, Clone)]
pub struct LogisticsEntry {
    pub date: String,
    pub item: OrderItem,
    pub status: Status,
    pub user: String,
    pub read: String,
    pub signature: String,
    pub signer: String,
    pub row_id: String,
}

impl LogisticsEntry {
    /// Cells in the order of `header`; columns the header lacks are dropped.
    pub fn to_row(&self, header: &[String], columns: &LogisticsColumns) -> Vec<String> {
        let record = Record::from_pairs(
            0,
            [
                (columns.date.as_str(), self.date.clone()),
                (columns.catalog.as_str(), String::new()),
                (columns.item.as_str(), self.item.item.trim().to_string()),
                (columns.size.as_str(), self.item.size.clone()),
                (columns.quantity.as_str(), self.item.quantity.to_string()),
                (columns.purpose.as_str(), self.item.purpose.as_str().to_string()),
                (columns.note.as_str(), self.item.note.clone()),
                (columns.status.as_str(), self.status.as_str().to_string()),
                (columns.user.as_str(), self.user.clone()),
                (columns.read.as_str(), self.read.clone()),
                (columns.signature.as_str(), self.signature.clone()),
                (columns.signer.as_str(), self.signer.clone()),
                (columns.row_id.as_str(), self.row_id.clone()),
            ],
        );
        parser::row_for_header(header, &record)
    }
}

/// Signed-out quantity per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub item: String,
    pub size: String,
    pub quantity: i64,
    pub date: String,
    pub user: String,
    pub signer: String,
}

/// Collapse sign-out rows per item: quantities are summed, size comes from
/// the first row, date/user/signer from the latest-dated row. Items keep
/// their first-appearance order.
pub fn signature_summary(records: &[Record], columns: &LogisticsColumns) -> Vec<SummaryRow> {
    let mut order: Vec<SummaryRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let item = record.get(&columns.item).to_string();
        let quantity = to_int_or_zero(record.get(&columns.quantity));
        match index.get(&item) {
            Some(&i) => {
                let existing = &mut order[i];
                existing.quantity += quantity;
                let newer = match (to_timestamp(record.get(&columns.date)), to_timestamp(&existing.date)) {
                    (Some(current), Some(kept)) => current > kept,
                    (Some(_), None) => true,
                    _ => false,
                };
                if newer {
                    existing.date = record.get(&columns.date).to_string();
                    existing.user = record.get(&columns.user).to_string();
                    existing.signer = record.get(&columns.signer).to_string();
                }
            }
            None => {
                index.insert(item.clone(), order.len());
                order.push(SummaryRow {
                    item,
                    size: record.get(&columns.size).to_string(),
                    quantity,
                    date: record.get(&columns.date).to_string(),
                    user: record.get(&columns.user).to_string(),
                    signer: record.get(&columns.signer).to_string(),
                });
            }
        }
    }
    order
}

/// Identifies a row the caller saw: by synthetic id when it has one,
/// otherwise by its record number in the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowKey {
    #[serde(default)]
    pub row_id: Option<String>,
    #[serde(default)]
    pub row: Option<usize>,
}

impl RowKey {
    pub fn find<'r>(&self, records: &'r [Record], columns: &LogisticsColumns) -> ArmoryResult<&'r Record> {
        let found = match (&self.row_id, self.row) {
            (Some(id), _) if !id.trim().is_empty() => records
                .iter()
                .find(|r| r.get(&columns.row_id).trim() == id.trim()),
            (_, Some(row)) => records.iter().find(|r| r.row == row),
            _ => {
                return Err(ArmoryError::Validation(
                    "row_id or row is required".to_string(),
                ))
            }
        };
        found.ok_or_else(|| ArmoryError::NotFound(format!("logistics row {:?}", self)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogisticsView {
    pub sheet: SheetRef,
    pub groups: StatusGroups,
    pub signature_summary: Vec<SummaryRow>,
    pub can_edit_status: bool,
}

/// One logistics tab seen through a session.
pub struct LogisticsBoard<'a> {
    config: &'a ArmoryConfig,
    session: &'a Session,
    sheet: SheetRef,
    view: SheetView,
}

impl<'a> LogisticsBoard<'a> {
    pub fn new(config: &'a ArmoryConfig, session: &'a Session, range: &str) -> ArmoryResult<Self> {
        let sheet = config.logistics_sheet(range)?.clone();
        let view = SheetView::new(session.store().clone(), sheet.clone());
        Ok(Self {
            config,
            session,
            sheet,
            view,
        })
    }

    pub fn sheet(&self) -> &SheetRef {
        &self.sheet
    }

    fn columns(&self) -> &LogisticsColumns {
        &self.config.logistics_columns
    }

    fn require_visible(&self) -> ArmoryResult<()> {
        if self.session.can_view_unit_tables(self.config, &self.sheet.range) {
            Ok(())
        } else {
            Err(ArmoryError::AccessDenied(format!(
                "{} may not see '{}'",
                self.session.email, self.sheet.name
            )))
        }
    }

    /// Latest grid of the tab. A refresh overtaken by a newer one falls back
    /// to whatever that newer one applied.
    pub async fn snapshot(&self) -> ArmoryResult<RawGrid> {
        match self.view.refresh().await? {
            Some(grid) => Ok(grid),
            None => self.view.current_or_refresh().await,
        }
    }

    /// Status buckets and the sign-out summary.
    pub async fn view(&self) -> ArmoryResult<LogisticsView> {
        self.require_visible()?;
        let grid = self.snapshot().await?;
        let records = parser::parse(&grid);
        let groups = group_by_status(&records, &self.columns().status, &Status::ALL);
        let signature_summary = signature_summary(groups.get(Status::SignOut), self.columns());
        Ok(LogisticsView {
            sheet: self.sheet.clone(),
            groups,
            signature_summary,
            can_edit_status: self.session.can_edit_status(self.config),
        })
    }

    /// Append one order row per non-blank item. Returns the new row ids.
    pub async fn submit_order(&self, items: &[OrderItem]) -> ArmoryResult<Vec<String>> {
        self.require_visible()?;
        let items: Vec<&OrderItem> = items.iter().filter(|i| !i.item.trim().is_empty()).collect();
        if items.is_empty() {
            return Err(ArmoryError::Validation(
                "no valid items to order, fill in at least one item".to_string(),
            ));
        }
        if let Some(bad) = items.iter().find(|i| i.quantity <= 0) {
            return Err(ArmoryError::Validation(format!(
                "quantity of '{}' must be positive",
                bad.item
            )));
        }

        let grid = self.snapshot().await?;
        let header = if grid.is_empty() {
            self.columns().header()
        } else {
            parser::header(&grid).to_vec()
        };
        let timestamp = timestamp_now();
        let entries: Vec<LogisticsEntry> = items
            .iter()
            .map(|item| LogisticsEntry {
                date: timestamp.clone(),
                item: (*item).clone(),
                status: Status::Order,
                user: self.session.email.clone(),
                read: NO.to_string(),
                signature: String::new(),
                signer: String::new(),
                row_id: Uuid::new_v4().to_string(),
            })
            .collect();

        let mut rows: RawGrid = entries.iter().map(|e| e.to_row(&header, self.columns())).collect();
        if grid.is_empty() {
            rows.insert(0, header.clone());
        }
        let names: Vec<&str> = items.iter().map(|i| i.item.trim()).collect();
        let entry = self
            .session
            .audit(format!("{}: הזמנה של {}", self.sheet.name, names.join(", ")));
        let batch = BatchWrite::new()
            .append(self.sheet.id, rows)
            .audited(self.config.audit_log.id, &entry);
        self.session.store().batch_write(batch).await?;

        info!(sheet = %self.sheet.name, items = entries.len(), "order submitted");
        Ok(entries.into_iter().map(|e| e.row_id).collect())
    }

    pub async fn transition(&self, key: &RowKey, from: Status, to: Status) -> ArmoryResult<Decision> {
        self.require_visible()?;
        let grid = self.snapshot().await?;
        let records = parser::parse(&grid);
        let record = key.find(&records, self.columns())?;
        TransitionGuard::new(self.config, self.session, &self.sheet)
            .attempt(&grid, record, from, to)
            .await
    }

    pub async fn complete_sign_out(
        &self,
        pending: &PendingSignOut,
        capture: &SignatureCapture,
    ) -> ArmoryResult<Applied> {
        if pending.sheet.id != self.sheet.id {
            return Err(ArmoryError::Validation(format!(
                "pending sign-out belongs to '{}'",
                pending.sheet.name
            )));
        }
        TransitionGuard::new(self.config, self.session, &self.sheet)
            .complete_sign_out(pending, capture)
            .await
    }

    /// Mark a row read or unread. Only the logistics role may.
    pub async fn set_read_flag(&self, key: &RowKey, read: bool) -> ArmoryResult<usize> {
        if !self.session.can_edit_status(self.config) {
            return Err(ArmoryError::AccessDenied(
                "changing the read flag requires the logistics role".to_string(),
            ));
        }
        let grid = self.snapshot().await?;
        let records = parser::parse(&grid);
        let record = key.find(&records, self.columns())?;
        let value = if read { YES } else { NO };
        let message = format!(
            "{}: {} סומן {} {}",
            self.sheet.name,
            record.get(&self.columns().item),
            self.columns().read,
            value
        );
        TransitionGuard::new(self.config, self.session, &self.sheet)
            .update_cell(&grid, record, &self.columns().read, value, message)
            .await
    }
}
