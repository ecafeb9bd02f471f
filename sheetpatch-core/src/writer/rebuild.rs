//! Full rebuild: regenerate a workbook from its values and formulas
//!
//! Styles, charts and macros are lost on this path. It exists for when the
//! format-preserving patch cannot be applied.

use rust_xlsxwriter::{Workbook as XlsxWorkbook, XlsxError};

use crate::error::{PatchError, Result, Step, StepContext};
use crate::patch::CellPatch;
use crate::reader::{CellValue, Workbook, read_workbook};

/// Read `original`, apply `patches` to `sheet_name` in memory and write a
/// fresh xlsx.
pub fn rebuild_workbook(original: &[u8], sheet_name: &str, patches: &[CellPatch]) -> Result<Vec<u8>> {
    let mut workbook = read_workbook(original)?;
    let sheet = workbook.get_sheet_mut(sheet_name).ok_or_else(|| {
        PatchError::message(
            Step::ResolveSheet,
            format!("sheet '{}' not found in workbook", sheet_name),
        )
    })?;
    for patch in patches {
        sheet.apply(patch);
    }

    let bytes = write_workbook(&workbook).at(Step::Repack)?;
    log::info!(
        "Rebuilt workbook with {} sheet(s); {} byte(s) written",
        workbook.sheets.len(),
        bytes.len()
    );
    Ok(bytes)
}

fn write_workbook(workbook: &Workbook) -> std::result::Result<Vec<u8>, XlsxError> {
    let mut xlsx = XlsxWorkbook::new();

    for sheet in &workbook.sheets {
        let worksheet = xlsx.add_worksheet().set_name(&sheet.name)?;

        for cell in sheet.sorted_cells() {
            let (row, col) = (cell.row, cell.col as u16);
            if let Some(formula) = &cell.formula {
                worksheet.write_formula(row, col, formula.as_str())?;
                continue;
            }
            match &cell.value {
                CellValue::Number(n) => worksheet.write_number(row, col, *n)?,
                CellValue::Text(s) | CellValue::Error(s) => worksheet.write_string(row, col, s)?,
                CellValue::Boolean(b) => worksheet.write_boolean(row, col, *b)?,
                CellValue::Empty => continue,
            };
        }
    }

    xlsx.save_to_buffer()
}
