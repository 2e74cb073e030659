//! Result formatting.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde_json::json;

use observa_core::model::ObservationRow;
use observa_core::{CostReport, MatchingPlan};

use crate::commands::QueryOutcome;
use crate::OutputFormat;

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Print a cost estimate
pub fn print_report(report: &CostReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            let mut table = new_table(&["estimate", "max_allowed", "cropping_required"]);
            table.add_row(vec![
                report.estimate.to_string(),
                report.max_allowed.to_string(),
                report.cropping_required.to_string(),
            ]);
            println!("{table}");
        }
    }
    Ok(())
}

/// Print a matching plan, one row per elimination step
pub fn print_plan(plan: &MatchingPlan, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    let periods = plan
        .candidates
        .time_periods
        .as_ref()
        .map_or_else(|| "all".to_string(), |p| p.len().to_string());
    let locations = plan
        .candidates
        .location_ids
        .as_ref()
        .map_or_else(|| "all".to_string(), |l| l.len().to_string());
    println!(
        "Candidates: subject {} | time periods: {periods} | locations: {locations}",
        plan.candidates.subject_id
    );
    println!("Hints: {}", plan.hints);

    if plan.eliminations.is_empty() {
        println!("No filter eliminations.");
        return Ok(());
    }
    let mut table = new_table(&[
        "step",
        "filter",
        "selected",
        "total",
        "selectiveness",
        "polarity",
        "items",
    ]);
    for (step, elimination) in plan.eliminations.iter().enumerate() {
        table.add_row(vec![
            (step + 1).to_string(),
            elimination.filter_id.to_string(),
            elimination.selected_count.to_string(),
            elimination.total_count.to_string(),
            format!("{:.2}", elimination.selectiveness),
            elimination.polarity.to_string(),
            elimination.item_ids.len().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn location_label(row: &ObservationRow) -> String {
    match &row.location.old_code {
        Some(old) => format!("{} ({}, {})", row.location.name, row.location.code, old),
        None => format!("{} ({})", row.location.name, row.location.code),
    }
}

/// Print matched observations
pub fn print_query(outcome: &QueryOutcome, format: OutputFormat) -> anyhow::Result<()> {
    let result = &outcome.result;
    if format == OutputFormat::Json {
        let body = json!({
            "query": result.query,
            "cropped": result.cropped,
            "estimate": result.estimate,
            "observations": result.observations,
            "timings": result.timings,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if result.cropped {
        println!("Query was cropped to fit the cell budget (estimate {}).", result.estimate);
    }
    if result.observations.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let mut header = vec!["id", "location", "time period", "filters"];
    header.extend(outcome.indicators.iter().map(|i| i.label.as_str()));
    let mut table = new_table(&header);
    for row in &result.observations {
        let mut cells = vec![
            row.id.to_string(),
            location_label(row),
            row.time_period().to_string(),
            row.filter_items
                .iter()
                .map(|item| item.label.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ];
        cells.extend(outcome.indicators.iter().map(|indicator| {
            row.measures
                .get(&indicator.id)
                .cloned()
                .unwrap_or_else(|| "-".to_string())
        }));
        table.add_row(cells);
    }
    println!("{table}");
    println!(
        "{} observations in {} ms",
        result.observations.len(),
        result.timings.total.as_millis()
    );
    Ok(())
}
