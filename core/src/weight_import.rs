use std::collections::HashSet;
use std::io::Read;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::TrainerError;
use crate::models::{NewWeightRecord, validate_weight};
use crate::service::TrainerService;

/// A single weigh-in parsed from a CSV export.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightRow {
    /// 1-based line in the source file, header included.
    pub line: usize,
    pub date: NaiveDate,
    pub weight: f64,
    pub notes: Option<String>,
}

/// What a weight import would do / did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeightImportSummary {
    pub rows_parsed: usize,
    pub records_imported: usize,
    pub duplicates_skipped: usize,
    pub dates_spanned: usize,
    pub dry_run: bool,
}

/// Parse a weigh-in CSV from any reader.
///
/// Expected header: `Date,Weight[,Notes]` (any order, case-insensitive).
/// Weight is in kilograms.
pub fn parse_weight_csv<R: Read>(reader: R) -> Result<Vec<WeightRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let Some(idx_date) = col("Date") else {
        bail!(TrainerError::invalid("Missing required column: Date"));
    };
    let Some(idx_weight) = col("Weight") else {
        bail!(TrainerError::invalid("Missing required column: Weight"));
    };
    let idx_notes = col("Notes");

    let mut rows = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let line = i + 2;
        let record = result.with_context(|| format!("Failed to parse CSV line {line}"))?;

        let raw_date = record.get(idx_date).unwrap_or("");
        let raw_weight = record.get(idx_weight).unwrap_or("");
        if raw_date.is_empty() && raw_weight.is_empty() {
            continue;
        }

        let date = parse_date(raw_date).with_context(|| format!("Line {line}"))?;
        let weight: f64 = raw_weight.parse().map_err(|_| {
            TrainerError::invalid(format!("Line {line}: invalid weight '{raw_weight}'"))
        })?;
        validate_weight(weight).with_context(|| format!("Line {line}"))?;
        let notes = idx_notes
            .and_then(|i| record.get(i))
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        rows.push(WeightRow {
            line,
            date,
            weight,
            notes,
        });
    }

    Ok(rows)
}

/// ISO dates, falling back to day-first `D/M/YYYY`.
fn parse_date(raw: &str) -> Result<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Ok(d);
    }
    bail!(TrainerError::invalid(format!("Cannot parse date: '{raw}'")))
}

/// Load parsed rows into `client_id`'s history.
///
/// A row matching an existing record (same date and weight), or an earlier
/// row of the same file, is skipped. The import is all or nothing: a bad row
/// stores no records. When `dry_run` is true, no data is written.
pub fn import_weight_records(
    service: &mut TrainerService,
    client_id: &str,
    rows: &[WeightRow],
    dry_run: bool,
) -> Result<WeightImportSummary> {
    service.db().ensure_user_exists(client_id)?;

    let mut summary = WeightImportSummary {
        rows_parsed: rows.len(),
        dry_run,
        ..Default::default()
    };
    let mut dates = HashSet::new();
    let mut seen = HashSet::new();
    let mut pending = Vec::new();

    for row in rows {
        dates.insert(row.date);
        let key = (row.date, row.weight.to_bits());
        if !seen.insert(key) || service.db().has_weight_record(client_id, row.date, row.weight)? {
            summary.duplicates_skipped += 1;
            continue;
        }
        validate_weight(row.weight).with_context(|| format!("Failed to import line {}", row.line))?;
        pending.push(NewWeightRecord {
            client_id: client_id.to_string(),
            weight: row.weight,
            date: row.date,
            notes: row.notes.clone(),
        });
    }

    if !dry_run && !pending.is_empty() {
        service.add_weight_records(&pending)?;
    }
    summary.records_imported = pending.len();
    summary.dates_spanned = dates.len();
    Ok(summary)
}
