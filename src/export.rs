//! CSV export of a record set

use std::io::Write;
use std::path::Path;

use csv::{QuoteStyle, WriterBuilder};

use crate::error::{ArmoryError, ArmoryResult};
use crate::parser::Record;

/// Write `records` as CSV: the header is the field names of the first
/// record, every value is quoted and embedded quotes are doubled.
pub fn write_csv<W: Write>(records: &[Record], out: W) -> ArmoryResult<()> {
    let Some(first) = records.first() else {
        return Err(ArmoryError::EmptyResult("no records to export".to_string()));
    };
    let header = first.names();

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(out);
    writer.write_record(&header)?;
    for record in records {
        writer.write_record(header.iter().map(|name| record.get(name)))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_csv(records: &[Record]) -> ArmoryResult<String> {
    let mut buf = Vec::new();
    write_csv(records, &mut buf)?;
    String::from_utf8(buf).map_err(|e| ArmoryError::Validation(format!("export is not UTF-8: {}", e)))
}

pub fn export_csv_file(records: &[Record], path: &Path) -> ArmoryResult<usize> {
    let file = std::fs::File::create(path)?;
    write_csv(records, std::io::BufWriter::new(file))?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_field_quoted() {
        let records = vec![
            Record::from_pairs(1, [("פריט", "קסדה"), ("הערה", "גודל \"L\"")]),
            Record::from_pairs(2, [("פריט", "וסט"), ("הערה", "")]),
        ];
        let csv = export_csv(&records).unwrap();
        assert_eq!(
            csv,
            "\"פריט\",\"הערה\"\n\"קסדה\",\"גודל \"\"L\"\"\"\n\"וסט\",\"\"\n"
        );
    }

    #[test]
    fn test_empty_is_empty_result() {
        assert!(matches!(export_csv(&[]), Err(ArmoryError::EmptyResult(_))));
    }

    #[test]
    fn test_file_export() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![Record::from_pairs(1, [("a", "1")])];
        assert_eq!(export_csv_file(&records, &path).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "\"a\"\n\"1\"\n");
    }
}
