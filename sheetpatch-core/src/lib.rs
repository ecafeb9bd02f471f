//! sheetpatch-core: format-preserving cell edits for Excel workbooks
//!
//! Edits to a rectangular region are written straight into the worksheet XML
//! of the original archive, so styles, charts, macros and untouched sheets
//! survive the save. When that is not possible for a plain xlsx file, the
//! workbook is regenerated from its data instead.

pub mod address;
pub mod config;
pub mod discover;
pub mod error;
pub mod package;
pub mod patch;
pub mod persist;
pub mod reader;
pub mod selection;
pub mod session;
pub mod source;
pub mod value;
pub mod verify;
pub mod writer;
pub mod xml;

pub use address::{CellRange, CellRef};
pub use config::SessionConfig;
pub use discover::{Region, discover_regions};
pub use error::{Cause, CellFailure, PatchError, Step};
pub use patch::{CellPatch, PatchEngine, PatchOutcome, PatchStats, patch_workbook};
pub use persist::{Download, FileHandle};
pub use selection::Selection;
pub use session::EditSession;
pub use source::LoadedSource;
pub use value::{RawValue, TypedValue, normalize};
pub use verify::verify;
pub use writer::SaveOutcome;
