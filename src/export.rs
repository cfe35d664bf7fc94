//! Tabular export. CSV columns are the union of record keys in first-seen order, so the header is
//! reproducible for a given record order and no field introduced by a later record is lost.

use crate::model::Record;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Output format selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }

    /// Infer from a file extension (case-insensitive). Unknown extensions give `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Errors from the export writers.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ordered set of column names: insertion order, no duplicates.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of keys across `records`: the first record's keys, then each unseen key as it appears.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns = Self::new();
        for record in records {
            columns.observe(record);
        }
        columns
    }

    /// Append the keys of `record` not seen before, in the record's order.
    pub fn observe(&mut self, record: &Record) {
        for key in record.keys() {
            if !self.seen.contains(key) {
                self.seen.insert(key.to_string());
                self.order.push(key.to_string());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Write records as CSV with a union-of-keys header.
///
/// Absent keys and missing values are written as empty cells. No records means no header can be
/// derived, and nothing is written.
pub fn write_csv<W: Write>(records: &[Record], sink: W) -> Result<(), ExportError> {
    let columns = ColumnSet::from_records(records);
    if columns.is_empty() {
        return Ok(());
    }
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(columns.iter())?;
    for record in records {
        writer.write_record(columns.iter().map(|column| record.get(column).unwrap_or("")))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write records as a pretty-printed JSON array; each object keeps its own key order and nulls.
pub fn write_json<W: Write>(records: &[Record], mut sink: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut sink, records)?;
    sink.write_all(b"\n")?;
    sink.flush()?;
    Ok(())
}

pub fn write_records<W: Write>(
    format: OutputFormat,
    records: &[Record],
    sink: W,
) -> Result<(), ExportError> {
    match format {
        OutputFormat::Csv => write_csv(records, sink),
        OutputFormat::Json => write_json(records, sink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn record(pairs: &[(&str, Option<&str>)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (*k, v.map(String::from)))
            .collect()
    }

    fn csv_string(records: &[Record]) -> Result<String, Box<dyn Error>> {
        let mut out = Vec::new();
        write_csv(records, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn header_is_union_of_keys_in_first_seen_order() -> Result<(), Box<dyn Error>> {
        let records = vec![
            record(&[("title", Some("A")), ("price", Some("1"))]),
            record(&[("sku", Some("S2")), ("title", Some("B")), ("color", None)]),
            record(&[("price", Some("3")), ("weight", Some("2kg"))]),
        ];
        let out = csv_string(&records)?;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "title,price,sku,color,weight");
        assert_eq!(lines[1], "A,1,,,");
        assert_eq!(lines[2], "B,,S2,,");
        assert_eq!(lines[3], ",3,,,2kg");
        assert_eq!(lines.len(), 4);
        Ok(())
    }

    #[test]
    fn missing_values_are_empty_cells() -> Result<(), Box<dyn Error>> {
        let records = vec![record(&[("a", None), ("b", Some("x"))])];
        let out = csv_string(&records)?;
        assert_eq!(out.lines().collect::<Vec<_>>(), vec!["a,b", ",x"]);
        Ok(())
    }

    #[test]
    fn values_are_quoted_when_needed() -> Result<(), Box<dyn Error>> {
        let records = vec![record(&[("title", Some("Tea, green")), ("note", Some("say \"hi\""))])];
        let out = csv_string(&records)?;
        assert_eq!(out.lines().nth(1), Some(r#""Tea, green","say ""hi""""#));
        Ok(())
    }

    #[test]
    fn empty_record_set_writes_nothing() -> Result<(), Box<dyn Error>> {
        assert_eq!(csv_string(&[])?, "");
        Ok(())
    }

    #[test]
    fn json_keeps_key_order_and_nulls() -> Result<(), Box<dyn Error>> {
        let records = vec![
            record(&[("title", Some("A")), ("price", None)]),
            record(&[("sku", Some("S"))]),
        ];
        let mut out = Vec::new();
        write_records(OutputFormat::Json, &records, &mut out)?;
        let value: serde_json::Value = serde_json::from_slice(&out)?;
        let items = value.as_array().ok_or("expected array")?;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["title"], "A");
        assert!(items[0]["price"].is_null());
        assert_eq!(items[1]["sku"], "S");
        let text = String::from_utf8(out)?;
        assert!(text.find("\"title\"") < text.find("\"price\""));
        Ok(())
    }

    #[test]
    fn json_empty_is_empty_array() -> Result<(), Box<dyn Error>> {
        let mut out = Vec::new();
        write_json(&[], &mut out)?;
        assert_eq!(String::from_utf8(out)?.trim(), "[]");
        Ok(())
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            OutputFormat::from_path(Path::new("out/items.JSON")),
            Some(OutputFormat::Json)
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("items.csv")),
            Some(OutputFormat::Csv)
        );
        assert_eq!(OutputFormat::from_path(Path::new("items.xlsx")), None);
        assert_eq!(OutputFormat::from_path(Path::new("items")), None);
        assert_eq!(OutputFormat::Csv.extension(), "csv");
        assert_eq!(OutputFormat::Json.extension(), "json");
    }

    #[test]
    fn column_set_dedupes() {
        let mut columns = ColumnSet::new();
        columns.observe(&record(&[("a", None), ("b", None)]));
        columns.observe(&record(&[("b", None), ("c", None), ("a", None)]));
        assert_eq!(columns.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(columns.len(), 3);
    }
}
