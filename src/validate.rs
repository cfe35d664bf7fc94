//! Data quality summary: how many records lack each field.

use crate::export::ColumnSet;
use crate::model::Record;
use std::fmt;

/// Missing-value counts over a record set. Fields are listed in first-seen order, as in the CSV
/// header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    pub total: usize,
    pub per_field_missing: Vec<(String, usize)>,
}

impl QualityReport {
    pub fn missing(&self, field: &str) -> Option<usize> {
        self.per_field_missing
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, count)| *count)
    }
}

/// Count, per field, the records where it is absent, null, or empty.
pub fn summarize(records: &[Record]) -> QualityReport {
    let columns = ColumnSet::from_records(records);
    let per_field_missing = columns
        .iter()
        .map(|field| {
            let missing = records
                .iter()
                .filter(|r| r.get(field).map_or(true, str::is_empty))
                .count();
            (field.to_string(), missing)
        })
        .collect();
    QualityReport {
        total: records.len(),
        per_field_missing,
    }
}

/// Human-readable report: total first, then one line per field with count and ratio.
pub fn format_report(report: &QualityReport) -> String {
    report.to_string()
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total_records: {}", self.total)?;
        write!(f, "missing_counts:")?;
        if self.per_field_missing.is_empty() {
            write!(f, " none")?;
        }
        for (field, count) in &self.per_field_missing {
            let pct = if self.total == 0 {
                0.0
            } else {
                *count as f64 * 100.0 / self.total as f64
            };
            write!(
                f,
                "\n  {}: {}/{} ({:.1}%)",
                field, count, self.total, pct
            )?;
        }
        Ok(())
    }
}
