use std::path::Path;

use anyhow::{Context, Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::models::{NewWeightRecord, WeightProgress};
use phinpt_core::service::TrainerService;
use phinpt_core::weight_import::{import_weight_records, parse_weight_csv};

use super::helpers::{client_scope, no_neg_zero, parse_date, print_deleted, print_json, write_target};

const KG_PER_LB: f64 = 0.453_592;

/// Convert a reading in `unit` to kilograms.
pub(crate) fn to_kg(value: f64, unit: &str) -> Result<f64> {
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => Ok(no_neg_zero(value * KG_PER_LB)),
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_weight_log(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    value: f64,
    unit: &str,
    date: Option<String>,
    notes: Option<String>,
    client: Option<&str>,
    json: bool,
) -> Result<()> {
    let weight = to_kg(value, unit)?;
    if !unit.eq_ignore_ascii_case("kg") {
        eprintln!("Converting {value:.1} {unit} → {weight:.2} kg");
    }
    let client_id = write_target(service, gate, client)?;

    let record = service.add_weight_record(&NewWeightRecord {
        client_id,
        weight,
        date: parse_date(date)?,
        notes,
    })?;

    if json {
        print_json(&record)?;
    } else {
        println!(
            "Logged {:.1} kg for {}",
            record.weight,
            record.date.format("%Y-%m-%d")
        );
        if let Some(ref n) = record.notes {
            println!("  Notes: {n}");
        }
    }
    Ok(())
}

pub(crate) fn format_progress(progress: &WeightProgress) -> Option<String> {
    let (start, current, change) = (
        progress.start_weight?,
        progress.current_weight?,
        progress.change?,
    );
    Some(format!(
        "Start {start:.1} kg, now {current:.1} kg ({:+.1} kg)",
        no_neg_zero(change)
    ))
}

pub(crate) fn cmd_weight_history(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    client: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let scope = client_scope(service, gate, client)?;
    service.fetch_weight_records()?;
    let mut records = service.weight_records_for(scope.as_deref());
    if let Some(n) = limit {
        records.truncate(n);
    }
    let progress = scope
        .as_deref()
        .map(|id| service.weight_progress(id))
        .transpose()?;

    if json {
        print_json(&serde_json::json!({ "records": records, "progress": progress }))?;
    } else if records.is_empty() {
        eprintln!("No weight records found. Use `phinpt weight log` to add one.");
    } else {
        #[derive(Tabled)]
        struct WeightRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight (kg)")]
            kg: String,
            #[tabled(rename = "Notes")]
            notes: String,
        }

        let rows: Vec<WeightRow> = records
            .iter()
            .map(|r| WeightRow {
                id: r.id.clone(),
                date: r.date.format("%Y-%m-%d").to_string(),
                kg: format!("{:.1}", r.weight),
                notes: r.notes.clone().unwrap_or_default(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
            .to_string();
        println!("{table}");
        if let Some(line) = progress.as_ref().and_then(format_progress) {
            println!("{line}");
        }
    }
    Ok(())
}

pub(crate) fn cmd_weight_delete(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    service.delete_weight_record(id)?;
    print_deleted("weight record", id, json);
    Ok(())
}

pub(crate) fn cmd_weight_import(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    path: &Path,
    client: &str,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let client_id = write_target(service, gate, Some(client))?;

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let rows = parse_weight_csv(file)?;

    if rows.is_empty() {
        if json {
            println!("{}", serde_json::json!({ "error": "No rows found in CSV file" }));
        } else {
            eprintln!("No rows found in CSV file.");
        }
        return Ok(());
    }

    let summary = import_weight_records(service, &client_id, &rows, dry_run)?;

    if json {
        print_json(&summary)?;
    } else {
        if dry_run {
            println!("Dry run, no changes made.\n");
            println!("  Rows parsed:        {}", summary.rows_parsed);
            println!("  Records to add:     {}", summary.records_imported);
        } else {
            println!("Import complete.\n");
            println!("  Rows parsed:        {}", summary.rows_parsed);
            println!("  Records added:      {}", summary.records_imported);
        }
        println!("  Duplicates skipped: {}", summary.duplicates_skipped);
        println!("  Dates spanned:      {}", summary.dates_spanned);
    }
    Ok(())
}
