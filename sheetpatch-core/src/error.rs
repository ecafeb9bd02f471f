//! Step-tagged errors for the load / patch / save pipeline

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline stage at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Load,
    ResolveSheet,
    Parse,
    WriteCell,
    Repack,
    Verify,
    Permission,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Load => "load",
            Step::ResolveSheet => "resolve-sheet",
            Step::Parse => "parse",
            Step::WriteCell => "write-cell",
            Step::Repack => "repack",
            Step::Verify => "verify",
            Step::Permission => "permission",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell that could not be written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellFailure {
    /// 0-based row
    pub row: u32,
    /// 0-based column
    pub col: u32,
    pub address: String,
    pub value_kind: &'static str,
    /// Truncated rendering of the offending value
    pub sample: String,
    pub reason: String,
}

impl fmt::Display for CellFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {:?}): {}",
            self.address, self.value_kind, self.sample, self.reason
        )
    }
}

/// Underlying reason of a [`PatchError`]
#[derive(Debug, Error)]
pub enum Cause {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("workbook read error: {0}")]
    Calamine(#[from] calamine::Error),
    #[error("workbook write error: {0}")]
    XlsxWriter(#[from] rust_xlsxwriter::XlsxError),
    #[cfg(feature = "url-fetch")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Message(String),
    #[error("{} cell(s) could not be written{}", .total, format_failures(.failures))]
    Cells {
        /// Number of failing cells, including those not listed
        total: usize,
        failures: Vec<CellFailure>,
    },
}

fn format_failures(failures: &[CellFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("\n  {}", f))
        .collect::<String>()
}

impl Cause {
    pub fn message(msg: impl Into<String>) -> Self {
        Cause::Message(msg.into())
    }
}

/// Error raised by any stage of the pipeline, tagged with the stage
#[derive(Debug, Error)]
#[error("{step} failed: {cause}")]
pub struct PatchError {
    pub step: Step,
    #[source]
    pub cause: Cause,
}

impl PatchError {
    pub fn new(step: Step, cause: impl Into<Cause>) -> Self {
        Self {
            step,
            cause: cause.into(),
        }
    }

    pub fn message(step: Step, msg: impl Into<String>) -> Self {
        Self::new(step, Cause::message(msg))
    }

    /// Failed cells, when the error is a batched cell write failure
    pub fn cell_failures(&self) -> &[CellFailure] {
        match &self.cause {
            Cause::Cells { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Attach a [`Step`] to results carrying any convertible cause
pub(crate) trait StepContext<T> {
    fn at(self, step: Step) -> Result<T, PatchError>;
}

impl<T, E: Into<Cause>> StepContext<T> for Result<T, E> {
    fn at(self, step: Step) -> Result<T, PatchError> {
        self.map_err(|e| PatchError::new(step, e))
    }
}

pub type Result<T, E = PatchError> = std::result::Result<T, E>;
