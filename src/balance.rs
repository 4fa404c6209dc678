//! Balance aggregation
//!
//! Reconciles the company rosters, the two master inventories, the defect log
//! and the sign-off summary into one row per item type:
//!
//! ```text
//! issued     rows across every roster carrying the type
//! stored     issued weapons whose comment is the stored marker (not in total)
//! in_stock   non-blank cells under the type in its master inventory
//! defective  non-blank cells under the type in the defect log
//! total      issued + in_stock + defective
//! gap        total - signed_off          (negative: shortage)
//! ```
//!
//! Everything is recomputed from the grids on every call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ArmoryConfig;
use crate::error::{ArmoryError, ArmoryResult};
use crate::fetch::fetch_all;
use crate::parser::{self, to_int};
use crate::sheets::{count_non_blank, SheetStore};
use crate::types::{RawGrid, SheetRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    Weapon,
    Optic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitCount {
    pub unit: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceRow {
    pub item: String,
    pub kind: ItemKind,
    pub per_unit: Vec<UnitCount>,
    pub issued: usize,
    pub stored: usize,
    pub in_stock: usize,
    pub defective: usize,
    pub total: usize,
    pub signed_off: i64,
    pub gap: i64,
}

impl BalanceRow {
    pub fn is_shortage(&self) -> bool {
        self.gap < 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockCell {
    pub item: String,
    pub in_stock: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceTable {
    /// Top-line in-stock count per type
    pub stock_row: Vec<StockCell>,
    pub rows: Vec<BalanceRow>,
}

impl BalanceTable {
    fn from_rows(rows: Vec<BalanceRow>) -> Self {
        let stock_row = rows
            .iter()
            .map(|r| StockCell {
                item: r.item.clone(),
                in_stock: r.in_stock,
            })
            .collect();
        Self { stock_row, rows }
    }

    pub fn row(&self, item: &str) -> Option<&BalanceRow> {
        self.rows.iter().find(|r| r.item == item)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub weapons: BalanceTable,
    pub optics: BalanceTable,
    pub accessories: BalanceTable,
}

impl BalanceReport {
    pub fn shortages(&self) -> impl Iterator<Item = &BalanceRow> {
        self.weapons
            .rows
            .iter()
            .chain(&self.optics.rows)
            .chain(&self.accessories.rows)
            .filter(|r| r.is_shortage())
    }
}

/// Every grid the aggregation reads.
#[derive(Debug, Clone, Default)]
pub struct BalanceInputs {
    pub units: Vec<(SheetRef, RawGrid)>,
    pub weapon_inventory: RawGrid,
    pub optics_inventory: RawGrid,
    pub defect_log: RawGrid,
    pub signoff_summary: RawGrid,
}

struct Aggregator<'a> {
    config: &'a ArmoryConfig,
    inputs: &'a BalanceInputs,
    signoff: Vec<parser::Record>,
}

impl<'a> Aggregator<'a> {
    fn issued_in(&self, grid: &RawGrid, kind: ItemKind, item: &str) -> (usize, usize) {
        let columns = &self.config.roster_columns;
        let body = grid.iter().skip(1);
        match kind {
            ItemKind::Weapon => {
                let Some(type_col) = parser::column_index(grid, &columns.weapon_type) else {
                    return (0, 0);
                };
                let comment_col = parser::column_index(grid, &columns.comment);
                let mut issued = 0;
                let mut stored = 0;
                for row in body.filter(|r| r.get(type_col).map(String::as_str) == Some(item)) {
                    issued += 1;
                    let comment = comment_col.and_then(|c| row.get(c)).map_or("", |c| c.trim());
                    if comment == columns.stored_marker {
                        stored += 1;
                    }
                }
                (issued, stored)
            }
            ItemKind::Optic if self.config.is_scope_type(item) => {
                let Some(scope_col) = parser::column_index(grid, &columns.scope) else {
                    return (0, 0);
                };
                let n = body
                    .filter(|r| r.get(scope_col).is_some_and(|v| v.trim() == item))
                    .count();
                (n, 0)
            }
            ItemKind::Optic => (count_non_blank(grid, item), 0),
        }
    }

    fn signed_off(&self, item: &str) -> i64 {
        let columns = &self.config.signoff_columns;
        self.signoff
            .iter()
            .find(|r| r.get(&columns.item).trim() == item)
            .and_then(|r| to_int(r.get(&columns.signed)))
            .unwrap_or(0)
    }

    fn row(&self, kind: ItemKind, item: &str) -> BalanceRow {
        let mut per_unit = Vec::with_capacity(self.inputs.units.len());
        let mut issued = 0;
        let mut stored = 0;
        for (unit, grid) in &self.inputs.units {
            let (n, s) = self.issued_in(grid, kind, item);
            per_unit.push(UnitCount {
                unit: unit.name.clone(),
                count: n,
            });
            issued += n;
            stored += s;
        }

        let master = match kind {
            ItemKind::Weapon => &self.inputs.weapon_inventory,
            ItemKind::Optic => &self.inputs.optics_inventory,
        };
        let in_stock = count_non_blank(master, item);
        let defective = count_non_blank(&self.inputs.defect_log, item);
        let total = issued + in_stock + defective;
        let signed_off = self.signed_off(item);

        BalanceRow {
            item: item.to_string(),
            kind,
            per_unit,
            issued,
            stored,
            in_stock,
            defective,
            total,
            signed_off,
            gap: total as i64 - signed_off,
        }
    }
}

fn item_types(grid: &RawGrid) -> Vec<String> {
    parser::header(grid)
        .iter()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

/// Balance row of a single type; the types need not appear anywhere.
pub fn compute_row(config: &ArmoryConfig, inputs: &BalanceInputs, kind: ItemKind, item: &str) -> BalanceRow {
    let aggregator = Aggregator {
        config,
        inputs,
        signoff: parser::parse(&inputs.signoff_summary),
    };
    aggregator.row(kind, item)
}

/// Weapon types come from the weapon inventory header, optic types from the
/// optics inventory header; optic types on the accessory list go to their own
/// table.
pub fn compute_balances(config: &ArmoryConfig, inputs: &BalanceInputs) -> BalanceReport {
    let aggregator = Aggregator {
        config,
        inputs,
        signoff: parser::parse(&inputs.signoff_summary),
    };

    let weapons = item_types(&inputs.weapon_inventory)
        .iter()
        .map(|t| aggregator.row(ItemKind::Weapon, t))
        .collect();

    let (accessories, optics): (Vec<BalanceRow>, Vec<BalanceRow>) = item_types(&inputs.optics_inventory)
        .iter()
        .map(|t| aggregator.row(ItemKind::Optic, t))
        .partition(|r| config.is_accessory(&r.item));

    BalanceReport {
        weapons: BalanceTable::from_rows(weapons),
        optics: BalanceTable::from_rows(optics),
        accessories: BalanceTable::from_rows(accessories),
    }
}

/// Fetch every contributing sheet concurrently, then aggregate once all of
/// them have arrived.
pub async fn fetch_balances(config: &ArmoryConfig, store: Arc<dyn SheetStore>) -> ArmoryResult<BalanceReport> {
    let mut sheets: Vec<SheetRef> = config.units.clone();
    sheets.extend([
        config.weapon_inventory.clone(),
        config.optics_inventory.clone(),
        config.defect_log.clone(),
        config.signoff_summary.clone(),
    ]);
    let mut grids = fetch_all(store, &sheets).await?;

    let fixed = grids.split_off(config.units.len());
    let [weapon_inventory, optics_inventory, defect_log, signoff_summary]: [RawGrid; 4] = fixed
        .try_into()
        .map_err(|_| ArmoryError::Fetch("missing inventory grids".to_string()))?;

    if parser::header(&weapon_inventory).is_empty() && parser::header(&optics_inventory).is_empty() {
        return Err(ArmoryError::EmptyResult(
            "both master inventories are empty".to_string(),
        ));
    }

    let inputs = BalanceInputs {
        units: config.units.iter().cloned().zip(grids).collect(),
        weapon_inventory,
        optics_inventory,
        defect_log,
        signoff_summary,
    };
    debug!(units = inputs.units.len(), "aggregating balances");
    let report = compute_balances(config, &inputs);
    info!(shortages = report.shortages().count(), "balances computed");
    Ok(report)
}
