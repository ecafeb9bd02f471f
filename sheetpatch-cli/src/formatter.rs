//! Output formatters for regions, grids and save results

use anyhow::Result;
use colored::*;
use serde::Serialize;
use sheetpatch_core::address::col_to_letters;
use sheetpatch_core::reader::RegionView;
use sheetpatch_core::{CellPatch, EditSession, PatchStats, SaveOutcome, TypedValue};
use std::path::Path;

/// Widest a grid column is printed before its values are cut
const MAX_COLUMN_WIDTH: usize = 24;

pub fn print_regions_human(session: &EditSession) {
    let source = session.source();
    println!("{}", format!("Regions in: {}", source.file_name).bold());
    println!();

    for (index, region) in session.regions().iter().enumerate() {
        println!(
            "  {} {} {}",
            format!("[{}]", index).yellow().bold(),
            format!("{:<5}", region.kind()).bright_black(),
            session.region_label(region)
        );
    }
}

pub fn print_regions_json(session: &EditSession) -> Result<()> {
    let regions: Vec<_> = session
        .regions()
        .iter()
        .enumerate()
        .map(|(index, region)| {
            serde_json::json!({
                "index": index,
                "label": session.region_label(region),
                "region": region,
            })
        })
        .collect();

    let output = serde_json::json!({
        "file": session.source().file_name,
        "regions": regions,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn print_view_human(label: &str, view: &RegionView) {
    println!("{}", label.bold());
    println!(
        "{} {}!{}",
        "Selection:".bold(),
        view.selection.sheet.cyan(),
        view.selection.range
    );
    println!();

    let start = view.selection.start();
    let cells: Vec<Vec<String>> = view
        .grid
        .iter()
        .map(|row| row.iter().map(|v| clip(&v.to_string())).collect())
        .collect();
    let widths: Vec<usize> = (0..view.selection.range.cols() as usize)
        .map(|c| {
            cells
                .iter()
                .filter_map(|row| row.get(c))
                .map(|s| s.chars().count())
                .max()
                .unwrap_or(0)
                .max(col_to_letters(start.col + c as u32).len())
        })
        .collect();
    let row_label_width = (start.row + view.grid.len() as u32).to_string().len();

    let header: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(c, w)| format!("{:<w$}", col_to_letters(start.col + c as u32), w = w))
        .collect();
    println!("{:>rw$}  {}", "", header.join("  ").bold(), rw = row_label_width);

    for (r, row) in cells.iter().enumerate() {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(value, w)| format!("{:<w$}", value, w = w))
            .collect();
        println!(
            "{:>rw$}  {}",
            (start.row + r as u32 + 1).to_string().bright_black(),
            line.join("  "),
            rw = row_label_width
        );
    }
}

pub fn print_view_json(label: &str, view: &RegionView) -> Result<()> {
    let output = serde_json::json!({
        "label": label,
        "selection": view.selection,
        "grid": view.grid,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn print_patches_human(patches: &[CellPatch]) {
    println!("{}", format!("{} pending edit(s)", patches.len()).bold());
    for patch in patches {
        let value = match &patch.value {
            TypedValue::Blank => "(blank)".bright_black(),
            other => other.to_string().normal(),
        };
        println!(
            "  {} {} {}",
            patch.cell.to_a1().yellow(),
            format!("{:<7}", patch.value.kind()).bright_black(),
            value
        );
    }
}

pub fn print_patches_json(patches: &[CellPatch]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(patches)?);
    Ok(())
}

/// What a save wrote and how
#[derive(Debug, Serialize)]
pub struct SaveReport {
    pub path: String,
    pub mode: &'static str,
    pub cells: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<PatchStats>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parts_touched: Vec<String>,
}

impl SaveReport {
    pub fn new(path: &Path, cells: usize, outcome: &SaveOutcome) -> Self {
        let path = path.display().to_string();
        match outcome {
            SaveOutcome::Patched(patched) => Self {
                path,
                mode: "patched",
                cells,
                reason: None,
                stats: Some(patched.stats.clone()),
                parts_touched: patched.parts_touched.clone(),
            },
            SaveOutcome::Rebuilt { reason, .. } => Self {
                path,
                mode: "rebuilt",
                cells,
                reason: Some(reason.clone()),
                stats: None,
                parts_touched: Vec::new(),
            },
        }
    }

    pub fn data_only(path: &Path, cells: usize) -> Self {
        Self {
            path: path.display().to_string(),
            mode: "data-only",
            cells,
            reason: None,
            stats: None,
            parts_touched: Vec::new(),
        }
    }
}

pub fn print_save_human(report: &SaveReport) {
    match report.mode {
        "patched" => println!(
            "{} {} cell(s) written to {}",
            "✓".green().bold(),
            report.cells,
            report.path.bold()
        ),
        _ => println!(
            "{} {} cell(s) written to {} ({})",
            "✓".yellow().bold(),
            report.cells,
            report.path.bold(),
            "formatting not preserved".yellow()
        ),
    }

    if let Some(stats) = &report.stats {
        println!(
            "  {} {} row(s), {} cell(s) created; {} shared string(s) added, {} reused",
            "Changes:".bold(),
            stats.rows_created,
            stats.cells_created,
            stats.strings_appended,
            stats.strings_reused
        );
        println!("  {} {}", "Parts:".bold(), report.parts_touched.join(", "));
    }
    if let Some(reason) = &report.reason {
        println!("  {} {}", "Rebuilt because:".bold(), reason.bright_black());
    }
}

pub fn print_save_json(report: &SaveReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_COLUMN_WIDTH {
        return text.to_string();
    }
    let mut short: String = text.chars().take(MAX_COLUMN_WIDTH - 1).collect();
    short.push('…');
    short
}
