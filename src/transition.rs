//! Logistics status transitions
//!
//! ```text
//! order ──▶ sign-out      needs a signature; appends new sign-out rows
//!   │                      rejected for wear items
//!   └────▶ re-arm         direct cell update; rejected once the row is read
//! sign-out ──▶ re-arm     direct cell update; rejected once the row is read
//! ```
//!
//! Business-rule rejections come back as [`Decision::Rejected`] carrying the
//! status to revert to. Only store failures are errors.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ArmoryConfig, LogisticsColumns};
use crate::error::{ArmoryError, ArmoryResult};
use crate::logistics::{LogisticsEntry, OrderItem};
use crate::parser::{self, to_bool, Record};
use crate::session::Session;
use crate::types::{timestamp_now, BatchWrite, CellUpdate, Purpose, RawGrid, SheetRef, Status, NO};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Wear items are never signed out
    WearItem,
    /// Read rows cannot move to re-arm
    AlreadyRead,
    IllegalTransition,
    NoChange,
    NotPermitted,
    /// The record no longer carries the status the caller started from
    StaleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectReason,
    /// Value the caller must restore
    pub revert_to: Status,
    pub message: String,
}

impl Rejection {
    fn new(reason: RejectReason, revert_to: Status) -> Self {
        let message = match reason {
            RejectReason::WearItem => "לא ניתן להעביר פריט בלאי לסטטוס החתמה",
            RejectReason::AlreadyRead => "לא ניתן להעביר פריט שנקרא לסטטוס התעצמות",
            RejectReason::IllegalTransition => "מעבר סטטוס לא חוקי",
            RejectReason::NoChange => "הסטטוס לא השתנה",
            RejectReason::NotPermitted => "אין הרשאה לשנות סטטוס",
            RejectReason::StaleStatus => "הסטטוס השתנה מאז הטעינה, יש לרענן",
        };
        Self {
            reason,
            revert_to,
            message: message.to_string(),
        }
    }
}

/// A sign-out waiting for its signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSignOut {
    pub sheet: SheetRef,
    /// Row of the originating order in the snapshot it was accepted against
    pub source_row: usize,
    pub source_row_id: String,
    pub revert_to: Status,
    pub purpose: Purpose,
    /// Items to sign for; defaults to the order's own item
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCapture {
    pub signer_name: String,
    /// PNG data URI of the drawn signature
    pub signature: String,
}

impl SignatureCapture {
    pub fn validate(&self) -> ArmoryResult<()> {
        if self.signer_name.trim().is_empty() {
            return Err(ArmoryError::Validation("signer name is required".to_string()));
        }
        if !self.signature.starts_with("data:image") {
            return Err(ArmoryError::Validation(
                "signature must be an image data URI".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applied {
    pub status: Status,
    /// Rows written: the updated row, or the appended ones
    pub rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Decision {
    Applied(Applied),
    NeedsSignature(PendingSignOut),
    Rejected(Rejection),
}

/// Pure rule check, no I/O.
pub fn check_transition(
    record: &Record,
    from: Status,
    to: Status,
    columns: &LogisticsColumns,
    can_edit_status: bool,
) -> Result<(), Rejection> {
    if !can_edit_status {
        return Err(Rejection::new(RejectReason::NotPermitted, from));
    }
    if Status::from_cell(record.get(&columns.status)) != Some(from) {
        return Err(Rejection::new(RejectReason::StaleStatus, from));
    }
    if from == to {
        return Err(Rejection::new(RejectReason::NoChange, from));
    }
    match (from, to) {
        (Status::Order, Status::SignOut)
            if Purpose::from_cell(record.get(&columns.purpose)) == Some(Purpose::Wear) =>
        {
            Err(Rejection::new(RejectReason::WearItem, from))
        }
        (_, Status::ReArm) if to_bool(record.get(&columns.read)) == Some(true) => {
            Err(Rejection::new(RejectReason::AlreadyRead, from))
        }
        (Status::SignOut, Status::Order) | (Status::ReArm, Status::SignOut) => {
            Err(Rejection::new(RejectReason::IllegalTransition, from))
        }
        _ => Ok(()),
    }
}

/// Zero-based grid row of `record`.
///
/// Rows carrying a synthetic id are matched on it. Older rows fall back to
/// the first row whose (date, item) pair matches; that scan can pick the
/// wrong row if another user wrote an identical pair in between, which is
/// why writes go through [`verify_snapshot`].
pub fn locate_row(grid: &RawGrid, record: &Record, columns: &LogisticsColumns) -> ArmoryResult<usize> {
    let cell = |row: &Vec<String>, col: Option<usize>| -> String {
        col.and_then(|c| row.get(c)).map(|v| v.trim().to_string()).unwrap_or_default()
    };

    let row_id = record.get(&columns.row_id).trim();
    let id_col = parser::column_index(grid, &columns.row_id);
    if !row_id.is_empty() && id_col.is_some() {
        return grid
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, row)| cell(row, id_col) == row_id)
            .map(|(i, _)| i)
            .ok_or_else(|| ArmoryError::NotFound(format!("row id {}", row_id)));
    }

    let date_col = parser::column_index(grid, &columns.date);
    let item_col = parser::column_index(grid, &columns.item);
    let date = record.get(&columns.date).trim();
    let item = record.get(&columns.item).trim();
    debug!(date, item, "locating row by scan");
    grid.iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| cell(row, date_col) == date && cell(row, item_col) == item)
        .map(|(i, _)| i)
        .ok_or_else(|| ArmoryError::NotFound(format!("row for '{}' at {}", item, date)))
}

fn normalized(row: Option<&Vec<String>>) -> Vec<&str> {
    let mut cells: Vec<&str> = row
        .map(|r| r.iter().map(|c| c.trim()).collect())
        .unwrap_or_default();
    while cells.last() == Some(&"") {
        cells.pop();
    }
    cells
}

/// Fail with `Conflict` when row `index` differs between the snapshot the
/// caller acted on and a fresh read.
pub fn verify_snapshot(snapshot: &RawGrid, fresh: &RawGrid, index: usize) -> ArmoryResult<()> {
    if normalized(snapshot.get(index)) != normalized(fresh.get(index)) {
        return Err(ArmoryError::Conflict(format!(
            "row {} was modified by someone else",
            index + 1
        )));
    }
    Ok(())
}

/// Applies transitions to one logistics tab on behalf of a session.
pub struct TransitionGuard<'a> {
    config: &'a ArmoryConfig,
    session: &'a Session,
    sheet: &'a SheetRef,
}

impl<'a> TransitionGuard<'a> {
    pub fn new(config: &'a ArmoryConfig, session: &'a Session, sheet: &'a SheetRef) -> Self {
        Self {
            config,
            session,
            sheet,
        }
    }

    fn columns(&self) -> &LogisticsColumns {
        &self.config.logistics_columns
    }

    /// Try to move `record` (as seen in `snapshot`) from `from` to `to`.
    pub async fn attempt(
        &self,
        snapshot: &RawGrid,
        record: &Record,
        from: Status,
        to: Status,
    ) -> ArmoryResult<Decision> {
        let can_edit = self.session.can_edit_status(self.config);
        if let Err(rejection) = check_transition(record, from, to, self.columns(), can_edit) {
            info!(
                sheet = %self.sheet.name,
                item = record.get(&self.columns().item),
                reason = ?rejection.reason,
                "transition rejected"
            );
            return Ok(Decision::Rejected(rejection));
        }

        if to == Status::SignOut {
            let source_row = locate_row(snapshot, record, self.columns())?;
            return Ok(Decision::NeedsSignature(PendingSignOut {
                sheet: self.sheet.clone(),
                source_row,
                source_row_id: record.get(&self.columns().row_id).to_string(),
                revert_to: from,
                purpose: Purpose::from_cell(record.get(&self.columns().purpose)).unwrap_or_default(),
                items: vec![OrderItem::from_record(record, self.columns())],
            }));
        }

        let row = self
            .update_cell(
                snapshot,
                record,
                &self.columns().status,
                to.as_str(),
                format!(
                    "{}: {} {} → {}",
                    self.sheet.name,
                    record.get(&self.columns().item),
                    from,
                    to
                ),
            )
            .await?;
        info!(sheet = %self.sheet.name, row, from = %from, to = %to, "status changed");
        Ok(Decision::Applied(Applied {
            status: to,
            rows: vec![row],
        }))
    }

    /// Locate `record`, re-check it against a fresh read, then write one cell
    /// together with its audit row. Returns the zero-based row written.
    pub async fn update_cell(
        &self,
        snapshot: &RawGrid,
        record: &Record,
        field: &str,
        value: &str,
        message: String,
    ) -> ArmoryResult<usize> {
        let row = locate_row(snapshot, record, self.columns())?;
        let col = parser::column_index(snapshot, field)
            .ok_or_else(|| ArmoryError::NotFound(format!("column '{}'", field)))?;

        let fresh = self.session.store().fetch_sheet(self.sheet).await?;
        verify_snapshot(snapshot, &fresh, row)?;

        let batch = BatchWrite::new()
            .update(CellUpdate::new(self.sheet.id, row, col, value))
            .audited(self.config.audit_log.id, &self.session.audit(message));
        self.session.store().batch_write(batch).await?;
        Ok(row)
    }

    /// Append the signed rows for a pending sign-out. The order row itself is
    /// left untouched.
    ///
    /// The pending value comes back from the client, so the order is looked
    /// up again in a fresh read and re-checked before anything is signed.
    pub async fn complete_sign_out(
        &self,
        pending: &PendingSignOut,
        capture: &SignatureCapture,
    ) -> ArmoryResult<Applied> {
        let can_edit = self.session.can_edit_status(self.config);
        if !can_edit {
            return Err(ArmoryError::AccessDenied(
                "changing status requires the logistics role".to_string(),
            ));
        }
        capture.validate()?;
        if pending.revert_to != Status::Order {
            return Err(ArmoryError::Validation(format!(
                "only orders can be signed out, not {}",
                pending.revert_to
            )));
        }

        let fresh = self.session.store().fetch_sheet(self.sheet).await?;
        let records = parser::parse(&fresh);
        let source = self.find_source(&records, pending)?;
        if let Err(rejection) =
            check_transition(source, Status::Order, Status::SignOut, self.columns(), can_edit)
        {
            info!(sheet = %self.sheet.name, reason = ?rejection.reason, "sign-out rejected");
            return Err(match rejection.reason {
                RejectReason::StaleStatus => ArmoryError::Conflict(
                    "the order changed status before it was signed".to_string(),
                ),
                _ => ArmoryError::Validation(rejection.message),
            });
        }
        let items = signed_items(source, &pending.items, self.columns())?;

        let header = if fresh.is_empty() {
            self.columns().header()
        } else {
            parser::header(&fresh).to_vec()
        };
        let timestamp = timestamp_now();
        let rows: RawGrid = items
            .iter()
            .map(|item| {
                LogisticsEntry {
                    date: timestamp.clone(),
                    item: item.clone(),
                    status: Status::SignOut,
                    user: self.session.email.clone(),
                    read: NO.to_string(),
                    signature: capture.signature.clone(),
                    signer: capture.signer_name.trim().to_string(),
                    row_id: Uuid::new_v4().to_string(),
                }
                .to_row(&header, self.columns())
            })
            .collect();
        let base = fresh.len().max(1);
        let written: Vec<usize> = (base..base + rows.len()).collect();

        let quantity: i64 = items.iter().map(|i| i.quantity).sum();
        let entry = self.session.audit(format!(
            "{}: החתמה של {} על {} x{}",
            self.sheet.name,
            capture.signer_name.trim(),
            source.get(&self.columns().item).trim(),
            quantity
        ));
        let batch = BatchWrite::new()
            .append(self.sheet.id, rows)
            .audited(self.config.audit_log.id, &entry);
        self.session.store().batch_write(batch).await?;

        info!(sheet = %self.sheet.name, rows = written.len(), "sign-out recorded");
        Ok(Applied {
            status: Status::SignOut,
            rows: written,
        })
    }

    fn find_source<'r>(&self, records: &'r [Record], pending: &PendingSignOut) -> ArmoryResult<&'r Record> {
        let columns = self.columns();
        let source = if pending.source_row_id.trim().is_empty() {
            records.iter().find(|r| r.row == pending.source_row)
        } else {
            records
                .iter()
                .find(|r| r.get(&columns.row_id).trim() == pending.source_row_id.trim())
        };
        source.ok_or_else(|| ArmoryError::NotFound("originating order".to_string()))
    }
}

/// Items a sign-out may record against the order `source`.
///
/// Name, size, purpose and note always come from the order row. The caller
/// may only split or lower the quantity; the total never exceeds what was
/// ordered. An empty request signs the whole order.
pub fn signed_items(
    source: &Record,
    requested: &[OrderItem],
    columns: &LogisticsColumns,
) -> ArmoryResult<Vec<OrderItem>> {
    let ordered = OrderItem::from_record(source, columns);
    let requested: Vec<&OrderItem> = requested
        .iter()
        .filter(|i| !i.item.trim().is_empty())
        .collect();
    if requested.is_empty() {
        return Ok(vec![ordered]);
    }

    if let Some(other) = requested.iter().find(|i| i.item.trim() != ordered.item.trim()) {
        return Err(ArmoryError::Validation(format!(
            "'{}' is not part of the order for '{}'",
            other.item.trim(),
            ordered.item.trim()
        )));
    }
    if let Some(bad) = requested.iter().find(|i| i.quantity <= 0) {
        return Err(ArmoryError::Validation(format!(
            "quantity of '{}' must be positive",
            bad.item.trim()
        )));
    }
    let total: i64 = requested.iter().map(|i| i.quantity).sum();
    if total > ordered.quantity {
        return Err(ArmoryError::Validation(format!(
            "cannot sign {} of '{}', only {} ordered",
            total,
            ordered.item.trim(),
            ordered.quantity
        )));
    }

    Ok(requested
        .iter()
        .map(|i| OrderItem {
            quantity: i.quantity,
            ..ordered.clone()
        })
        .collect())
}
