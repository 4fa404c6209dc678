use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rows exactly as the values API returns them: row 0 is the header,
/// trailing empty cells are omitted by the server.
pub type RawGrid = Vec<Vec<String>>;

/// Timestamp layout written into every sheet (`17.10.2026, 14:03:22`).
pub const TIMESTAMP_FORMAT: &str = "%-d.%-m.%Y, %H:%M:%S";

pub const YES: &str = "כן";
pub const NO: &str = "לא";

pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn timestamp_now() -> String {
    format_timestamp(&Local::now())
}

//==============================================================================
// Sheet addressing
//==============================================================================

/// A tab of the spreadsheet: display name, range used for reads, and the
/// numeric sheet id used by batch writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRef {
    pub name: String,
    pub range: String,
    pub id: i64,
}

impl SheetRef {
    pub fn new(name: impl Into<String>, range: impl Into<String>, id: i64) -> Self {
        Self {
            name: name.into(),
            range: range.into(),
            id,
        }
    }
}

//==============================================================================
// Logistics vocabulary
//==============================================================================

/// Closed status vocabulary of the logistics workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Order,
    SignOut,
    ReArm,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Order, Status::SignOut, Status::ReArm];

    /// Cell value as stored in the sheet
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Order => "הזמנה",
            Status::SignOut => "החתמה",
            Status::ReArm => "התעצמות",
        }
    }

    pub fn from_cell(value: &str) -> Option<Self> {
        Status::ALL.into_iter().find(|s| s.as_str() == value.trim())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    #[default]
    Issue,
    Wear,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Issue => "ניפוק",
            Purpose::Wear => "בלאי",
        }
    }

    pub fn from_cell(value: &str) -> Option<Self> {
        match value.trim() {
            "ניפוק" => Some(Purpose::Issue),
            "בלאי" => Some(Purpose::Wear),
            _ => None,
        }
    }
}

//==============================================================================
// Writes
//==============================================================================

/// Single-cell update addressed by sheet id and zero-based row/column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub sheet_id: i64,
    pub row: usize,
    pub col: usize,
    pub value: String,
}

impl CellUpdate {
    pub fn new(sheet_id: i64, row: usize, col: usize, value: impl Into<String>) -> Self {
        Self {
            sheet_id,
            row,
            col,
            value: value.into(),
        }
    }
}

/// Rows appended after the last non-empty row of a sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendGroup {
    pub sheet_id: i64,
    pub rows: RawGrid,
}

/// Full replacement of a sheet's content. `clear_rows`/`clear_cols` give the
/// previous extent so leftovers past the new grid are blanked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeOverwrite {
    pub sheet_id: i64,
    pub grid: RawGrid,
    pub clear_rows: usize,
    pub clear_cols: usize,
}

impl RangeOverwrite {
    /// Replace `previous` with `grid`, blanking whatever `previous` covered.
    pub fn replacing(sheet_id: i64, previous: &RawGrid, grid: RawGrid) -> Self {
        Self {
            sheet_id,
            clear_rows: previous.len(),
            clear_cols: previous.iter().map(Vec::len).max().unwrap_or(0),
            grid,
        }
    }
}

/// One atomic round-trip: either every part is applied or none is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWrite {
    pub updates: Vec<CellUpdate>,
    pub appends: Vec<AppendGroup>,
    pub overwrites: Vec<RangeOverwrite>,
}

impl BatchWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(mut self, update: CellUpdate) -> Self {
        self.updates.push(update);
        self
    }

    pub fn append(mut self, sheet_id: i64, rows: RawGrid) -> Self {
        match self.appends.iter_mut().find(|g| g.sheet_id == sheet_id) {
            Some(group) => group.rows.extend(rows),
            None => self.appends.push(AppendGroup { sheet_id, rows }),
        }
        self
    }

    pub fn overwrite(mut self, overwrite: RangeOverwrite) -> Self {
        self.overwrites.push(overwrite);
        self
    }

    /// Attach the audit row that must accompany every mutation.
    pub fn audited(self, audit_sheet_id: i64, entry: &AuditLogEntry) -> Self {
        self.append(audit_sheet_id, vec![entry.to_row()])
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.appends.is_empty() && self.overwrites.is_empty()
    }
}

//==============================================================================
// Audit log
//==============================================================================

/// Append-only audit row: `[message, timestamp, actor email]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub message: String,
    pub timestamp: String,
    pub actor: String,
}

impl AuditLogEntry {
    pub fn new(message: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: timestamp_now(),
            actor: actor.into(),
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.message.clone(),
            self.timestamp.clone(),
            self.actor.clone(),
        ]
    }
}
