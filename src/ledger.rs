//! Quantity ledger for bulk equipment
//!
//! Signing appends a positive row, crediting appends an offsetting negative
//! row; the balance of an item is the sum of its rows.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ArmoryConfig, EquipmentColumns};
use crate::error::{ArmoryError, ArmoryResult};
use crate::parser::{self, to_int_or_zero, Record};
use crate::session::Session;
use crate::types::{timestamp_now, BatchWrite, RawGrid, SheetRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemBalance {
    pub item: String,
    pub quantity: i64,
}

impl ItemBalance {
    pub fn is_open(&self) -> bool {
        self.quantity > 0
    }
}

/// Sum quantities per item in first-appearance order. Rows without an item
/// are skipped, non-numeric quantities count as zero.
pub fn balances(records: &[Record], columns: &EquipmentColumns) -> Vec<ItemBalance> {
    let mut out: Vec<ItemBalance> = Vec::new();
    for record in records {
        let item = record.get(&columns.item).trim();
        if item.is_empty() {
            continue;
        }
        let qty = to_int_or_zero(record.get(&columns.quantity));
        match out.iter_mut().find(|b| b.item == item) {
            Some(balance) => balance.quantity += qty,
            None => out.push(ItemBalance {
                item: item.to_string(),
                quantity: qty,
            }),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMove {
    pub item: String,
    pub quantity: i64,
    /// Soldier receiving (or returning) the equipment
    pub signer: String,
    /// Soldier handing it over
    pub issuer: String,
}

impl LedgerMove {
    fn validate(&self) -> ArmoryResult<()> {
        if self.item.trim().is_empty()
            || self.quantity <= 0
            || self.signer.trim().is_empty()
            || self.issuer.trim().is_empty()
        {
            return Err(ArmoryError::Validation(
                "item, a positive quantity, signer and issuer are all required".to_string(),
            ));
        }
        Ok(())
    }

    fn row(&self, columns: &EquipmentColumns, header: &[String], quantity: i64) -> Vec<String> {
        let record = Record::from_pairs(
            0,
            [
                (columns.item.as_str(), self.item.trim().to_string()),
                (columns.quantity.as_str(), quantity.to_string()),
                (columns.signer.as_str(), self.signer.trim().to_string()),
                (columns.issuer.as_str(), self.issuer.trim().to_string()),
                (columns.time.as_str(), timestamp_now()),
            ],
        );
        parser::row_for_header(header, &record)
    }
}

pub struct Ledger<'a> {
    config: &'a ArmoryConfig,
    session: &'a Session,
    sheet: SheetRef,
}

impl<'a> Ledger<'a> {
    pub fn new(config: &'a ArmoryConfig, session: &'a Session, range: &str) -> ArmoryResult<Self> {
        Ok(Self {
            config,
            session,
            sheet: config.equipment_sheet(range)?.clone(),
        })
    }

    fn columns(&self) -> &EquipmentColumns {
        &self.config.equipment_columns
    }

    fn header(&self, grid: &RawGrid) -> Vec<String> {
        if grid.is_empty() {
            let c = self.columns();
            vec![c.item.clone(), c.quantity.clone(), c.signer.clone(), c.issuer.clone(), c.time.clone()]
        } else {
            parser::header(grid).to_vec()
        }
    }

    pub async fn records(&self) -> ArmoryResult<Vec<Record>> {
        let grid = self.session.store().fetch_sheet(&self.sheet).await?;
        Ok(parser::parse(&grid))
    }

    pub async fn balances(&self) -> ArmoryResult<Vec<ItemBalance>> {
        Ok(balances(&self.records().await?, self.columns()))
    }

    pub async fn sign(&self, entry: &LedgerMove) -> ArmoryResult<()> {
        entry.validate()?;
        let grid = self.session.store().fetch_sheet(&self.sheet).await?;
        let message = format!(
            "{}: {} x{} נחתם ע\"י {}",
            self.sheet.name,
            entry.item.trim(),
            entry.quantity,
            entry.signer.trim()
        );
        self.write(&grid, entry.row(self.columns(), &self.header(&grid), entry.quantity), message)
            .await
    }

    /// Credit back part of a balance. Crediting more than is signed out is
    /// rejected.
    pub async fn credit(&self, entry: &LedgerMove) -> ArmoryResult<()> {
        entry.validate()?;
        let grid = self.session.store().fetch_sheet(&self.sheet).await?;
        let signed = balances(&parser::parse(&grid), self.columns())
            .into_iter()
            .find(|b| b.item == entry.item.trim())
            .map_or(0, |b| b.quantity);
        if entry.quantity > signed {
            return Err(ArmoryError::Validation(format!(
                "cannot credit {} of '{}', only {} signed",
                entry.quantity,
                entry.item.trim(),
                signed
            )));
        }
        let message = format!(
            "{}: {} x{} זוכה ע\"י {}",
            self.sheet.name,
            entry.item.trim(),
            entry.quantity,
            entry.signer.trim()
        );
        self.write(&grid, entry.row(self.columns(), &self.header(&grid), -entry.quantity), message)
            .await
    }

    async fn write(&self, grid: &RawGrid, row: Vec<String>, message: String) -> ArmoryResult<()> {
        let mut rows = vec![row];
        if grid.is_empty() {
            rows.insert(0, self.header(grid));
        }
        let batch = BatchWrite::new()
            .append(self.sheet.id, rows)
            .audited(self.config.audit_log.id, &self.session.audit(message.clone()));
        self.session.store().batch_write(batch).await?;
        info!(sheet = %self.sheet.name, "{}", message);
        Ok(())
    }
}
