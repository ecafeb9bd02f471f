//! Full-fidelity workbook reading using calamine

use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Cursor;

use crate::address::{CellRange, CellRef};
use crate::config::PreviewConfig;
use crate::discover::Region;
use crate::error::{PatchError, Result, Step, StepContext};
use crate::selection::Selection;
use crate::value::RawValue;

pub mod workbook;

pub use workbook::{Cell, CellValue, Sheet, Workbook};

/// Read every sheet (values and formulas) of a workbook held in memory
pub fn read_workbook(bytes: &[u8]) -> Result<Workbook> {
    let mut excel = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).at(Step::Load)?;

    let sheet_names = excel.sheet_names();
    let mut sheets = Vec::with_capacity(sheet_names.len());

    for sheet_name in &sheet_names {
        let range = excel.worksheet_range(sheet_name).at(Step::Load)?;
        let formula_range = match excel.worksheet_formula(sheet_name) {
            Ok(range) => Some(range),
            Err(e) => {
                log::warn!("Formulas of sheet '{}' could not be read: {}", sheet_name, e);
                None
            }
        };
        sheets.push(parse_sheet(sheet_name, &range, formula_range.as_ref()));
    }

    Ok(Workbook { sheets })
}

fn parse_sheet(name: &str, range: &Range<Data>, formula_range: Option<&Range<String>>) -> Sheet {
    let mut cells: HashMap<(u32, u32), Cell> = HashMap::new();

    for (row, col, data) in range.used_cells() {
        if matches!(data, Data::Empty) {
            continue;
        }
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let (row, col) = (start_row + row as u32, start_col + col as u32);
        cells.insert(
            (row, col),
            Cell {
                row,
                col,
                value: parse_cell_value(data),
                formula: None,
            },
        );
    }

    if let Some(formulas) = formula_range {
        let (start_row, start_col) = formulas.start().unwrap_or((0, 0));
        for (row, col, formula) in formulas.used_cells() {
            if formula.is_empty() {
                continue;
            }
            let (row, col) = (start_row + row as u32, start_col + col as u32);
            cells
                .entry((row, col))
                .or_insert_with(|| Cell {
                    row,
                    col,
                    value: CellValue::Empty,
                    formula: None,
                })
                .formula = Some(formula.clone());
        }
    }

    let used_range = bounding_box(cells.keys().copied());
    Sheet {
        name: name.to_string(),
        cells,
        used_range,
    }
}

fn bounding_box(keys: impl Iterator<Item = (u32, u32)>) -> Option<CellRange> {
    keys.fold(None, |acc: Option<CellRange>, (row, col)| {
        let cell = CellRef::new(row, col);
        Some(match acc {
            None => CellRange::new(cell, cell),
            Some(r) => CellRange::new(
                CellRef::new(r.start.row.min(row), r.start.col.min(col)),
                CellRef::new(r.end.row.max(row), r.end.col.max(col)),
            ),
        })
    })
}

fn parse_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(e.to_string()),
        Data::Empty => CellValue::Empty,
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) => CellValue::Text(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// A region materialised for editing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionView {
    pub selection: Selection,
    /// Full rectangle, row-major; empty cells are empty text
    pub grid: Vec<Vec<RawValue>>,
}

/// Resolve `region` to a selection and fill its grid from `workbook`.
/// Whole-sheet regions start at the first used cell and are capped at the
/// preview size; an empty sheet previews `A1`.
pub fn render_region(workbook: &Workbook, region: &Region, preview: &PreviewConfig) -> Result<RegionView> {
    let sheet = workbook.get_sheet(region.sheet()).ok_or_else(|| {
        PatchError::message(
            Step::ResolveSheet,
            format!("sheet '{}' not found in workbook", region.sheet()),
        )
    })?;

    let range = match region.range() {
        Some(range) => range,
        None => preview_range(sheet.used_range, preview),
    };
    let selection = Selection::new(sheet.name.clone(), range);

    let grid = (0..range.rows())
        .map(|r| {
            (0..range.cols())
                .map(|c| sheet.raw_value(selection.address_at(r, c)))
                .collect()
        })
        .collect();

    Ok(RegionView { selection, grid })
}

fn preview_range(used: Option<CellRange>, preview: &PreviewConfig) -> CellRange {
    let Some(used) = used else {
        let a1 = CellRef::new(0, 0);
        return CellRange::new(a1, a1);
    };
    let end = CellRef::new(
        used.end.row.min(used.start.row + preview.max_rows.max(1) - 1),
        used.end.col.min(used.start.col + preview.max_cols.max(1) - 1),
    );
    CellRange::new(used.start, end)
}
