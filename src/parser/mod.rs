//! Row parser: raw header + data grids into keyed records
//!
//! Every cell stays a string. Typed values are only produced on demand through
//! the narrow coercions in [`coerce`].

pub mod coerce;

pub use coerce::{to_bool, to_int, to_int_or_zero, to_timestamp};

use crate::types::RawGrid;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One data row keyed by header names.
///
/// Header names may repeat; lookups by name resolve to the later occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Position of the source row in the fetched grid (the header is row 0)
    pub row: usize,
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new(row: usize, fields: Vec<(String, String)>) -> Self {
        Self { row, fields }
    }

    /// Build a record from `(name, value)` pairs, mostly for callers
    /// assembling rows that are about to be appended.
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        row: usize,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            row,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of a field, `None` when the header does not declare it.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a field, empty string when undeclared.
    pub fn get(&self, name: &str) -> &str {
        self.field(name).unwrap_or("")
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name)
    }

    /// Overwrite the effective value of `name`, declaring it when missing.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.fields.iter_mut().rev().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.into(),
            None => self.fields.push((name.to_string(), value.into())),
        }
    }

    /// Declared fields in header order, duplicates included.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Distinct field names in first-appearance order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.fields.len());
        for (k, _) in &self.fields {
            if !names.contains(&k.as_str()) {
                names.push(k.as_str());
            }
        }
        names
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut map = serializer.serialize_map(Some(names.len()))?;
        for name in names {
            map.serialize_entry(name, self.get(name))?;
        }
        map.end()
    }
}

/// Zip the header row with every data row.
///
/// Missing trailing cells become empty strings, cells past the header are
/// dropped. An empty grid or a header-only grid yields no records.
pub fn parse(grid: &RawGrid) -> Vec<Record> {
    let Some((header, rows)) = grid.split_first() else {
        return Vec::new();
    };

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let fields = header
                .iter()
                .enumerate()
                .map(|(col, name)| (name.clone(), row.get(col).cloned().unwrap_or_default()))
                .collect();
            Record::new(i + 1, fields)
        })
        .collect()
}

/// Header row of a grid, empty when the grid is empty.
pub fn header(grid: &RawGrid) -> &[String] {
    grid.first().map(Vec::as_slice).unwrap_or(&[])
}

/// Position of `name` in the header row.
pub fn column_index(grid: &RawGrid, name: &str) -> Option<usize> {
    header(grid).iter().position(|h| h == name)
}

/// Build a row in the sheet's header order from a record; fields the header
/// does not declare are dropped.
pub fn row_for_header(header: &[String], record: &Record) -> Vec<String> {
    header
        .iter()
        .map(|name| record.get(name).to_string())
        .collect()
}
