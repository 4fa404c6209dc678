//! Narrow conversions from cell strings
//!
//! Callers apply these only where a domain rule needs a typed value.

use chrono::NaiveDateTime;

const TIMESTAMP_LAYOUTS: [&str; 4] = [
    "%d.%m.%Y, %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Whole number in a cell. Accepts `"3"`, `" 3 "` and `"3.0"`; anything else is `None`.
pub fn to_int(cell: &str) -> Option<i64> {
    let trimmed = cell.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

pub fn to_int_or_zero(cell: &str) -> i64 {
    to_int(cell).unwrap_or(0)
}

/// Yes/no flag. Unknown values are `None` rather than silently false.
pub fn to_bool(cell: &str) -> Option<bool> {
    match cell.trim().to_lowercase().as_str() {
        "כן" | "yes" | "true" | "1" => Some(true),
        "לא" | "no" | "false" | "0" | "" => Some(false),
        _ => None,
    }
}

pub fn to_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let trimmed = cell.trim();
    TIMESTAMP_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(trimmed, layout).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_to_int() {
        assert_eq!(to_int("4"), Some(4));
        assert_eq!(to_int(" -2 "), Some(-2));
        assert_eq!(to_int("3.0"), Some(3));
        assert_eq!(to_int("3.5"), None);
        assert_eq!(to_int("שלוש"), None);
        assert_eq!(to_int_or_zero(""), 0);
    }

    #[test]
    fn test_to_bool() {
        assert_eq!(to_bool("כן"), Some(true));
        assert_eq!(to_bool("לא"), Some(false));
        assert_eq!(to_bool("YES"), Some(true));
        assert_eq!(to_bool(""), Some(false));
        assert_eq!(to_bool("maybe"), None);
    }

    #[test]
    fn test_to_timestamp_local_layout() {
        let ts = to_timestamp("7.3.2026, 09:05:01").unwrap();
        assert_eq!(ts.day(), 7);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.hour(), 9);
        assert!(to_timestamp("not a date").is_none());
    }

    #[test]
    fn test_to_timestamp_iso() {
        let ts = to_timestamp("2026-10-17 14:03:22").unwrap();
        assert_eq!(ts.year(), 2026);
    }
}
