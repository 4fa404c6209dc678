//! A1 notation helpers

use crate::error::{ArmoryError, ArmoryResult};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Zero-based column index to its letter name (0 → A, 25 → Z, 26 → AA).
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Letter name to zero-based column index.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let n = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c as usize - 'A' as usize + 1));
    Some(n - 1)
}

/// Cell bounds inside a tab; rows are 1-based as in A1 notation and an
/// absent row or end column means "to the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellBounds {
    pub start_col: usize,
    pub start_row: Option<usize>,
    pub end_col: Option<usize>,
    pub end_row: Option<usize>,
}

/// A tab name with optional cell bounds, e.g. `מלאי נשקיה!A1:L`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRange {
    pub tab: String,
    pub bounds: Option<CellBounds>,
}

fn bounds_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Z]+)([0-9]+)?(?::([A-Z]+)([0-9]+)?)?$").expect("static regex")
    })
}

impl SheetRange {
    /// The whole tab
    pub fn whole(tab: impl Into<String>) -> Self {
        Self {
            tab: tab.into(),
            bounds: None,
        }
    }

    pub fn parse(input: &str) -> ArmoryResult<Self> {
        let Some((tab, cells)) = input.rsplit_once('!') else {
            return Ok(Self::whole(input));
        };

        let tab = tab
            .strip_prefix('\'')
            .and_then(|t| t.strip_suffix('\''))
            .map(|t| t.replace("''", "'"))
            .unwrap_or_else(|| tab.to_string());

        let caps = bounds_regex()
            .captures(cells)
            .ok_or_else(|| ArmoryError::Validation(format!("invalid range '{}'", input)))?;

        let col = |i: usize| caps.get(i).and_then(|m| column_index(m.as_str()));
        let row = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<usize>().ok());

        let start_col =
            col(1).ok_or_else(|| ArmoryError::Validation(format!("invalid range '{}'", input)))?;
        if row(2) == Some(0) || row(4) == Some(0) {
            return Err(ArmoryError::Validation(format!(
                "rows are 1-based in '{}'",
                input
            )));
        }

        Ok(Self {
            tab,
            bounds: Some(CellBounds {
                start_col,
                start_row: row(2),
                end_col: col(3),
                end_row: row(4),
            }),
        })
    }

    /// Apply the bounds to a full-tab grid.
    pub fn slice(&self, grid: &[Vec<String>]) -> Vec<Vec<String>> {
        let Some(b) = self.bounds else {
            return grid.to_vec();
        };
        // `C2` addresses one cell, `C` a whole column
        let single_cell = b.end_col.is_none() && b.start_row.is_some();
        let first_row = b.start_row.map_or(0, |r| r - 1);
        let last_row = if single_cell {
            b.start_row.map_or(grid.len(), |r| r.min(grid.len()))
        } else {
            b.end_row.map_or(grid.len(), |r| r.min(grid.len()))
        };
        let last_col = b.end_col.unwrap_or(b.start_col);

        grid.iter()
            .take(last_row)
            .skip(first_row)
            .map(|row| {
                let end = (last_col + 1).min(row.len());
                row.get(b.start_col..end.max(b.start_col))
                    .map(<[String]>::to_vec)
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(b) = self.bounds else {
            return f.write_str(&self.tab);
        };
        let needs_quotes = self
            .tab
            .chars()
            .any(|c| !(c.is_alphanumeric() || c == '_'));
        if needs_quotes {
            write!(f, "'{}'!", self.tab.replace('\'', "''"))?;
        } else {
            write!(f, "{}!", self.tab)?;
        }
        write!(f, "{}", column_letter(b.start_col))?;
        if let Some(r) = b.start_row {
            write!(f, "{}", r)?;
        }
        if let Some(c) = b.end_col {
            write!(f, ":{}", column_letter(c))?;
            if let Some(r) = b.end_row {
                write!(f, "{}", r)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("a"), None);
    }

    #[test]
    fn test_parse_and_format() {
        let r = SheetRange::parse("מלאי נשקיה!A1:C9").unwrap();
        assert_eq!(r.tab, "מלאי נשקיה");
        let b = r.bounds.unwrap();
        assert_eq!((b.start_col, b.start_row, b.end_col, b.end_row), (0, Some(1), Some(2), Some(9)));
        assert_eq!(r.to_string(), "'מלאי נשקיה'!A1:C9");

        let quoted = SheetRange::parse("'מלאי נשקיה'!B2:B").unwrap();
        assert_eq!(quoted.tab, "מלאי נשקיה");

        assert_eq!(SheetRange::parse("א").unwrap(), SheetRange::whole("א"));
        assert!(SheetRange::parse("א!1:2").is_err());
        assert!(SheetRange::parse("א!A0").is_err());
    }

    #[test]
    fn test_slice() {
        let grid: Vec<Vec<String>> = vec![
            vec!["h1".into(), "h2".into(), "h3".into()],
            vec!["a".into(), "b".into(), "c".into()],
            vec!["d".into()],
        ];
        let r = SheetRange::parse("t!B1:C2").unwrap();
        assert_eq!(
            r.slice(&grid),
            vec![vec!["h2".to_string(), "h3".to_string()], vec!["b".to_string(), "c".to_string()]]
        );
        let tail = SheetRange::parse("t!A2:A").unwrap();
        assert_eq!(tail.slice(&grid), vec![vec!["a".to_string()], vec!["d".to_string()]]);
        let cell = SheetRange::parse("t!C2").unwrap();
        assert_eq!(cell.slice(&grid), vec![vec!["c".to_string()]]);
    }
}
