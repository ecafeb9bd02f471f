//! Post-patch spot checks

use crate::error::Cause;
use crate::package::Package;
use crate::patch::CellPatch;
use crate::value::TypedValue;
use crate::xml::sheet::format_number;
use crate::xml::{SharedStringTable, SheetDocument};

/// Re-read the first, middle and last patched cells from `patched` and
/// check that each holds what was written. Never errors: any problem
/// reading the archive counts as a failed verification.
pub fn verify(
    patched: &[u8],
    patches: &[CellPatch],
    sheet_path: &str,
    shared_strings_path: Option<&str>,
) -> bool {
    match check_samples(patched, patches, sheet_path, shared_strings_path) {
        Ok(ok) => ok,
        Err(e) => {
            log::warn!("Verification could not read patched workbook: {}", e);
            false
        }
    }
}

/// Indices of the first, middle and last patch, without repeats
pub fn sample_indices(len: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut indices = vec![0, len / 2, len - 1];
    indices.dedup();
    indices
}

fn check_samples(
    patched: &[u8],
    patches: &[CellPatch],
    sheet_path: &str,
    shared_strings_path: Option<&str>,
) -> Result<bool, Cause> {
    let samples = sample_indices(patches.len());
    if samples.is_empty() {
        return Ok(true);
    }

    let mut package = Package::open(patched).map_err(|e| e.cause)?;
    let sheet = SheetDocument::parse(&package.read_part(sheet_path)?)?;
    let strings = match shared_strings_path {
        Some(path) => Some(SharedStringTable::parse(&package.read_part(path)?)?),
        None => None,
    };

    let mut ok = true;
    for idx in samples {
        let patch = &patches[idx];
        if let Err(found) = check_cell(&sheet, strings.as_ref(), patch) {
            log::warn!(
                "Verification mismatch at {}: expected {} {:?}, found {}",
                patch.cell,
                patch.value.kind(),
                patch.value.to_string(),
                found
            );
            ok = false;
        }
    }
    Ok(ok)
}

/// `Err` carries a description of what was found instead
fn check_cell(
    sheet: &SheetDocument,
    strings: Option<&SharedStringTable>,
    patch: &CellPatch,
) -> Result<(), String> {
    let cell = sheet.cell(patch.cell);

    if patch.value == TypedValue::Blank {
        return match cell {
            Some(c) if c.has_content() => Err("a cell with content".to_string()),
            _ => Ok(()),
        };
    }

    let Some(cell) = cell else {
        return Err("no cell".to_string());
    };
    let cell_type = cell.cell_type();
    let value = cell.value_text();

    let matches = match &patch.value {
        TypedValue::Blank => true,
        TypedValue::Number(n) => {
            matches!(cell_type.as_deref(), None | Some("n"))
                && value.as_deref() == Some(format_number(*n).as_str())
        }
        TypedValue::Boolean(b) => {
            cell_type.as_deref() == Some("b") && value.as_deref() == Some(if *b { "1" } else { "0" })
        }
        TypedValue::Text(text) => match cell_type.as_deref() {
            Some("s") => value
                .as_deref()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .and_then(|idx| strings.and_then(|t| t.get(idx)))
                == Some(text.as_str()),
            Some("inlineStr") => cell.inline_text().as_deref() == Some(text.as_str()),
            _ => false,
        },
    };

    if matches {
        Ok(())
    } else {
        Err(format!(
            "t={:?} v={:?} is={:?}",
            cell_type,
            value,
            cell.inline_text()
        ))
    }
}
