//! Workbook data structures

use std::collections::HashMap;

use crate::address::{CellRange, CellRef};
use crate::patch::CellPatch;
use crate::value::{RawValue, TypedValue};

/// Represents a complete workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Get a sheet by name
    pub fn get_sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn get_sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Represents a worksheet
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub cells: HashMap<(u32, u32), Cell>,
    /// Bounding box of every cell holding a value or a formula
    pub used_range: Option<CellRange>,
}

impl Sheet {
    /// Get a cell at the given position
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Grid value of a cell; missing cells read as empty text
    pub fn raw_value(&self, at: CellRef) -> RawValue {
        match self.get_cell(at.row, at.col).map(|c| &c.value) {
            Some(CellValue::Number(n)) => RawValue::Number(*n),
            Some(CellValue::Boolean(b)) => RawValue::Bool(*b),
            Some(CellValue::Text(s)) | Some(CellValue::Error(s)) => RawValue::Text(s.clone()),
            Some(CellValue::Empty) | None => RawValue::Text(String::new()),
        }
    }

    /// Replace a cell with a patched value; blank removes the cell
    pub fn apply(&mut self, patch: &CellPatch) {
        let key = (patch.cell.row, patch.cell.col);
        let value = match &patch.value {
            TypedValue::Blank => {
                self.cells.remove(&key);
                return;
            }
            TypedValue::Number(n) => CellValue::Number(*n),
            TypedValue::Boolean(b) => CellValue::Boolean(*b),
            TypedValue::Text(s) => CellValue::Text(s.clone()),
        };
        self.cells.insert(
            key,
            Cell {
                row: key.0,
                col: key.1,
                value,
                formula: None,
            },
        );
    }

    /// Cells sorted by row, then column
    pub fn sorted_cells(&self) -> Vec<&Cell> {
        let mut cells: Vec<&Cell> = self.cells.values().collect();
        cells.sort_by_key(|c| (c.row, c.col));
        cells
    }
}

/// Represents a single cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    /// Formula text without the leading `=`
    pub formula: Option<String>,
}

/// Cell value types
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
}

impl CellValue {
    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}
