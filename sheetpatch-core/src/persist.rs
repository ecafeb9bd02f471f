//! Persistence: in-place writes through a file handle, or a downloadable blob

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PatchError, Result, Step, StepContext};

/// MIME type for a workbook file name, by extension
pub fn mime_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsm" => "application/vnd.ms-excel.sheet.macroEnabled.12",
        "xlsb" => "application/vnd.ms-excel.sheet.binary.macroEnabled.12",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "xls" => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

/// Writable handle to the file a workbook was opened from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    path: PathBuf,
}

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the file can be written without modifying it
    pub fn request_write_permission(&self) -> Result<()> {
        let metadata = fs::metadata(&self.path).at(Step::Permission)?;
        if metadata.permissions().readonly() {
            return Err(PatchError::message(
                Step::Permission,
                format!("'{}' is read-only", self.path.display()),
            ));
        }
        OpenOptions::new()
            .write(true)
            .open(&self.path)
            .at(Step::Permission)?;
        Ok(())
    }

    /// Replace the file contents: permission check, truncate, write
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.request_write_permission()?;
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .at(Step::Permission)?;
        file.write_all(bytes).at(Step::Permission)?;
        file.flush().at(Step::Permission)?;
        log::info!("Saved {} byte(s) to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

/// A workbook offered for download under its original name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        Self {
            mime_type: mime_type_for(&file_name),
            file_name,
            bytes,
        }
    }

    /// Write the blob as `dir/file_name`
    pub fn save_into(&self, dir: &Path) -> Result<PathBuf> {
        let target = dir.join(&self.file_name);
        self.save_as(&target)?;
        Ok(target)
    }

    /// Write the blob to an explicit path
    pub fn save_as(&self, target: &Path) -> Result<()> {
        fs::write(target, &self.bytes).at(Step::Permission)?;
        log::info!(
            "Downloaded {} ({}, {} byte(s)) to {}",
            self.file_name,
            self.mime_type,
            self.bytes.len(),
            target.display()
        );
        Ok(())
    }
}
