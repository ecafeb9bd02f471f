//! Save pipeline: patch, verify, and fall back to a full rebuild

use crate::config::PatchConfig;
use crate::error::{PatchError, Result, Step};
use crate::patch::{CellPatch, PatchEngine, PatchOutcome};
use crate::verify::verify;

pub mod rebuild;

pub use rebuild::rebuild_workbook;

/// Containers the full rebuild can regenerate
const REBUILDABLE_EXTENSIONS: &[&str] = &["xlsx"];

/// How the saved bytes were produced
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// Format-preserving patch that passed verification
    Patched(PatchOutcome),
    /// Full rebuild after the patch path failed
    Rebuilt { bytes: Vec<u8>, reason: String },
}

impl SaveOutcome {
    pub fn bytes(&self) -> &[u8] {
        match self {
            SaveOutcome::Patched(outcome) => &outcome.bytes,
            SaveOutcome::Rebuilt { bytes, .. } => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            SaveOutcome::Patched(outcome) => outcome.bytes,
            SaveOutcome::Rebuilt { bytes, .. } => bytes,
        }
    }

    pub fn is_patched(&self) -> bool {
        matches!(self, SaveOutcome::Patched(_))
    }
}

pub fn is_rebuildable(extension: &str) -> bool {
    REBUILDABLE_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Patch and verify; only verified bytes are returned from the patch path.
pub fn patch_verified(
    original: &[u8],
    sheet_name: &str,
    patches: &[CellPatch],
    config: &PatchConfig,
) -> Result<PatchOutcome> {
    let outcome = PatchEngine::new(config.clone()).apply(original, patches, sheet_name)?;
    if !verify(
        &outcome.bytes,
        patches,
        &outcome.sheet_path,
        outcome.shared_strings_path.as_deref(),
    ) {
        return Err(PatchError::message(
            Step::Verify,
            "patched workbook does not read back the written values",
        ));
    }
    Ok(outcome)
}

/// Save with formatting preserved. When the patch path fails on the
/// container itself (load, parse, repack, verify), a container of a
/// rebuildable type is regenerated from its data instead. Unknown sheets and
/// unwritable values fail the same way on both paths and are surfaced.
pub fn save_preserving(
    original: &[u8],
    extension: &str,
    sheet_name: &str,
    patches: &[CellPatch],
    config: &PatchConfig,
) -> Result<SaveOutcome> {
    match patch_verified(original, sheet_name, patches, config) {
        Ok(outcome) => Ok(SaveOutcome::Patched(outcome)),
        Err(err) if falls_back(err.step) && is_rebuildable(extension) => {
            log::warn!("Format-preserving save failed ({}); rebuilding from data", err);
            let bytes = rebuild_workbook(original, sheet_name, patches)?;
            Ok(SaveOutcome::Rebuilt {
                bytes,
                reason: err.to_string(),
            })
        }
        Err(err) => Err(err),
    }
}

fn falls_back(step: Step) -> bool {
    !matches!(step, Step::ResolveSheet | Step::WriteCell)
}

/// Data-only save: always the full rebuild
pub fn save_data_only(original: &[u8], sheet_name: &str, patches: &[CellPatch]) -> Result<Vec<u8>> {
    rebuild_workbook(original, sheet_name, patches)
}
