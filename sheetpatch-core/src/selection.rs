//! The region currently bound to the editing grid

use serde::Serialize;

use crate::address::{CellRange, CellRef};
use crate::patch::CellPatch;
use crate::value::{RawValue, normalize};

/// Sheet and rectangle the grid was rendered from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub sheet: String,
    pub range: CellRange,
}

impl Selection {
    pub fn new(sheet: impl Into<String>, range: CellRange) -> Self {
        Self {
            sheet: sheet.into(),
            range,
        }
    }

    pub fn start(&self) -> CellRef {
        self.range.start
    }

    pub fn end(&self) -> CellRef {
        self.range.end
    }

    /// Sheet address of grid cell (`row_offset`, `col_offset`)
    pub fn address_at(&self, row_offset: u32, col_offset: u32) -> CellRef {
        CellRef::new(self.range.start.row + row_offset, self.range.start.col + col_offset)
    }

    /// Grid offsets of a sheet address, if it lies inside the selection
    pub fn offset_of(&self, cell: CellRef) -> Option<(u32, u32)> {
        self.range
            .contains(cell)
            .then(|| (cell.row - self.range.start.row, cell.col - self.range.start.col))
    }

    /// One normalised patch per grid cell, row-major.
    ///
    /// # Panics
    ///
    /// If the grid has more rows or columns than the selection.
    pub fn patches_from_grid(&self, grid: &[Vec<RawValue>]) -> Vec<CellPatch> {
        assert!(
            grid.len() <= self.range.rows() as usize,
            "grid has {} rows but selection {} has {}",
            grid.len(),
            self.range,
            self.range.rows()
        );

        let mut patches = Vec::with_capacity(grid.len() * self.range.cols() as usize);
        for (r, row) in grid.iter().enumerate() {
            assert!(
                row.len() <= self.range.cols() as usize,
                "grid row {} has {} columns but selection {} has {}",
                r,
                row.len(),
                self.range,
                self.range.cols()
            );
            for (c, raw) in row.iter().enumerate() {
                patches.push(CellPatch::new(self.address_at(r as u32, c as u32), normalize(raw)));
            }
        }
        patches
    }
}
