//! Format-preserving patch engine
//!
//! Rewrites only the target worksheet part and, when text is written into a
//! workbook that has one, the shared-string table. Every other part of the
//! archive is copied byte for byte.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::address::CellRef;
use crate::config::PatchConfig;
use crate::error::{Cause, CellFailure, PatchError, Result, Step, StepContext};
use crate::package::Package;
use crate::value::TypedValue;
use crate::xml::{CellContent, SharedStringTable, SheetDocument, WriteEffect, is_xml_char};

/// One cell edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellPatch {
    pub cell: CellRef,
    pub value: TypedValue,
}

impl CellPatch {
    pub fn new(cell: CellRef, value: TypedValue) -> Self {
        Self { cell, value }
    }
}

/// Counters describing what a patch run changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchStats {
    pub cells_written: usize,
    pub rows_created: usize,
    pub cells_created: usize,
    pub strings_appended: usize,
    pub strings_reused: usize,
    /// `count` of the shared-string table after patching
    pub shared_count: Option<u64>,
    /// `uniqueCount` of the shared-string table after patching
    pub shared_unique_count: Option<u64>,
}

/// Patched workbook plus a description of the change
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub bytes: Vec<u8>,
    pub sheet_path: String,
    pub shared_strings_path: Option<String>,
    pub parts_touched: Vec<String>,
    pub stats: PatchStats,
}

/// Applies cell patches to a workbook archive
#[derive(Debug, Clone, Default)]
pub struct PatchEngine {
    config: PatchConfig,
}

impl PatchEngine {
    pub fn new(config: PatchConfig) -> Self {
        Self { config }
    }

    /// Produce a new archive with `patches` written into `sheet_name`.
    ///
    /// `original` is never modified, so it stays usable after a failure.
    /// Cell-level problems are collected across the whole batch and reported
    /// together as a `write-cell` error.
    pub fn apply(&self, original: &[u8], patches: &[CellPatch], sheet_name: &str) -> Result<PatchOutcome> {
        let mut package = Package::open(original)?;
        let sheet_path = package.resolve_sheet_path(sheet_name)?;

        let sheet_xml = package.read_part(&sheet_path).at(Step::Parse)?;
        let mut sheet = SheetDocument::parse(&sheet_xml).at(Step::Parse)?;

        let shared_strings_path = package.shared_strings_path()?;
        let mut strings = match &shared_strings_path {
            Some(path) => {
                let xml = package.read_part(path).at(Step::Parse)?;
                Some(SharedStringTable::parse(&xml).at(Step::Parse)?)
            }
            None => None,
        };

        log::debug!(
            "Patching {} cell(s) in '{}' ({}), shared strings: {}",
            patches.len(),
            sheet_name,
            sheet_path,
            shared_strings_path.as_deref().unwrap_or("none")
        );

        let mut stats = PatchStats::default();
        let mut failures = Vec::new();
        let mut failed = 0usize;
        let interval = self.config.progress_interval.max(1);

        for (n, patch) in patches.iter().enumerate() {
            match write_cell(&mut sheet, strings.as_mut(), patch) {
                Ok(effect) => {
                    stats.cells_written += 1;
                    stats.rows_created += usize::from(effect.row_created);
                    stats.cells_created += usize::from(effect.cell_created);
                }
                Err(reason) => {
                    failed += 1;
                    if failures.len() < self.config.max_reported_failures {
                        failures.push(self.failure(patch, reason));
                    }
                }
            }
            if (n + 1) % interval == 0 {
                log::debug!("Applied {}/{} cells", n + 1, patches.len());
            }
        }

        if failed > 0 {
            return Err(PatchError::new(
                Step::WriteCell,
                Cause::Cells {
                    total: failed,
                    failures,
                },
            ));
        }

        let mut replacements = BTreeMap::new();
        replacements.insert(sheet_path.clone(), sheet.to_xml().at(Step::Repack)?);
        if let (Some(path), Some(table)) = (&shared_strings_path, &strings) {
            stats.strings_appended = table.appended();
            stats.strings_reused = table.reused();
            stats.shared_count = Some(table.count());
            stats.shared_unique_count = Some(table.unique_count());
            if table.is_dirty() {
                replacements.insert(path.clone(), table.to_xml().at(Step::Repack)?);
            }
        }

        let bytes = package.repack(&replacements)?;
        let parts_touched: Vec<String> = replacements.into_keys().collect();
        log::info!(
            "Patched {} cell(s); {} byte(s) written; touched: {}",
            stats.cells_written,
            bytes.len(),
            parts_touched.join(", ")
        );

        Ok(PatchOutcome {
            bytes,
            sheet_path,
            shared_strings_path,
            parts_touched,
            stats,
        })
    }

    fn failure(&self, patch: &CellPatch, reason: String) -> CellFailure {
        CellFailure {
            row: patch.cell.row,
            col: patch.cell.col,
            address: patch.cell.to_a1(),
            value_kind: patch.value.kind(),
            sample: truncate(&patch.value.to_string(), self.config.failure_sample_chars),
            reason,
        }
    }
}

/// Patch `sheet_name` with the default engine configuration
pub fn patch_workbook(original: &[u8], patches: &[CellPatch], sheet_name: &str) -> Result<PatchOutcome> {
    PatchEngine::default().apply(original, patches, sheet_name)
}

fn write_cell(
    sheet: &mut SheetDocument,
    strings: Option<&mut SharedStringTable>,
    patch: &CellPatch,
) -> std::result::Result<WriteEffect, String> {
    // Checked before interning so a rejected value never reaches the table
    let content = match &patch.value {
        TypedValue::Blank => CellContent::Blank,
        TypedValue::Number(n) if !n.is_finite() => {
            return Err(format!("non-finite number {}", n));
        }
        TypedValue::Number(n) => CellContent::Number(*n),
        TypedValue::Boolean(b) => CellContent::Boolean(*b),
        TypedValue::Text(text) => {
            if let Some(c) = text.chars().find(|c| !is_xml_char(*c)) {
                return Err(format!("character U+{:04X} is not allowed in XML", c as u32));
            }
            match strings {
                Some(table) => CellContent::SharedString(table.intern(text)),
                None => CellContent::InlineString(text.clone()),
            }
        }
    };
    sheet.set_cell(patch.cell, &content).map_err(|e| e.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max_chars).collect();
    short.push('…');
    short
}
