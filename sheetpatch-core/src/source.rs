//! Loading workbook bytes from a file or a URL

use std::fs;
use std::path::Path;

use crate::error::{Result, Step, StepContext};

const FALLBACK_FILE_NAME: &str = "workbook.xlsx";

/// Workbook bytes together with the name they were loaded under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub bytes: Vec<u8>,
    pub file_name: String,
    /// Lower-cased extension without the dot, empty when there is none
    pub extension: String,
}

impl LoadedSource {
    pub fn from_bytes(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            extension: extension_of(&file_name),
            file_name,
            bytes,
        }
    }
}

pub fn extension_of(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Read a workbook from disk
pub fn read_file(path: &Path) -> Result<LoadedSource> {
    let bytes = fs::read(path).at(Step::Load)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    log::info!("Loaded {} ({} bytes)", file_name, bytes.len());
    Ok(LoadedSource::from_bytes(bytes, file_name))
}

/// Last non-empty path segment of a URL, query and fragment ignored
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map(|(_, p)| p).unwrap_or_default())
        .unwrap_or(without_query);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Download a workbook over HTTP(S)
#[cfg(feature = "url-fetch")]
pub fn fetch_url(url: &str) -> Result<LoadedSource> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .at(Step::Load)?;
    let bytes = response.bytes().at(Step::Load)?.to_vec();
    let file_name = file_name_from_url(url);
    log::info!("Fetched {} from {} ({} bytes)", file_name, url, bytes.len());
    Ok(LoadedSource::from_bytes(bytes, file_name))
}
