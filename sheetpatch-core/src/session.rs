//! Editing session: one loaded workbook, one selected region, one grid

use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::address::CellRef;
use crate::config::SessionConfig;
use crate::discover::{Region, discover_regions};
use crate::patch::CellPatch;
use crate::persist::{Download, FileHandle};
use crate::reader::{RegionView, Workbook, read_workbook, render_region};
use crate::selection::Selection;
use crate::source::{LoadedSource, read_file};
use crate::value::RawValue;
use crate::writer::{SaveOutcome, save_data_only, save_preserving};

/// State of a single editing session. Loading a new workbook means building
/// a new session, so a selection can never outlive the bytes it refers to.
/// Saves take `&mut self`, which keeps at most one save in flight.
pub struct EditSession {
    source: LoadedSource,
    handle: Option<FileHandle>,
    config: SessionConfig,
    workbook: Workbook,
    regions: Vec<Region>,
    view: Option<RegionView>,
}

impl EditSession {
    /// Start a session over already loaded bytes. `handle`, when given, is
    /// where in-place saves go.
    pub fn load(source: LoadedSource, handle: Option<FileHandle>, config: SessionConfig) -> Result<Self> {
        let regions = discover_regions(&source.bytes)
            .with_context(|| format!("Failed to list regions of {}", source.file_name))?;
        let workbook = read_workbook(&source.bytes)
            .with_context(|| format!("Failed to read {}", source.file_name))?;

        Ok(Self {
            source,
            handle,
            config,
            workbook,
            regions,
            view: None,
        })
    }

    /// Open a file from disk with an in-place save handle
    pub fn open_file(path: &Path, config: SessionConfig) -> Result<Self> {
        let source = read_file(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Self::load(source, Some(FileHandle::new(path)), config)
    }

    pub fn source(&self) -> &LoadedSource {
        &self.source
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region_label(&self, region: &Region) -> String {
        region.label(self.config.preview.max_rows, self.config.preview.max_cols)
    }

    /// Bind region `index` to the grid, replacing any previous selection
    pub fn render(&mut self, index: usize) -> Result<&RegionView> {
        let Some(region) = self.regions.get(index) else {
            bail!(
                "Region {} does not exist ({} region(s) available)",
                index,
                self.regions.len()
            );
        };
        let view = render_region(&self.workbook, region, &self.config.preview)?;
        log::info!(
            "Rendered {} as {}!{}",
            self.region_label(region),
            view.selection.sheet,
            view.selection.range
        );
        Ok(self.view.insert(view))
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.view.as_ref().map(|v| &v.selection)
    }

    pub fn grid(&self) -> Option<&[Vec<RawValue>]> {
        self.view.as_ref().map(|v| v.grid.as_slice())
    }

    /// Edit one grid cell by offset
    pub fn set_cell(&mut self, row: usize, col: usize, value: RawValue) -> Result<()> {
        let view = self.view.as_mut().context("No region is selected")?;
        let Some(cell) = view.grid.get_mut(row).and_then(|r| r.get_mut(col)) else {
            bail!("Cell ({}, {}) is outside the selected grid", row, col);
        };
        log::info!(
            "Edited {} -> {}",
            view.selection.address_at(row as u32, col as u32),
            value
        );
        *cell = value;
        Ok(())
    }

    /// Edit one grid cell by sheet address
    pub fn set_address(&mut self, address: CellRef, value: RawValue) -> Result<()> {
        let selection = self.selection().context("No region is selected")?;
        let Some((row, col)) = selection.offset_of(address) else {
            bail!("{} is outside the selected range {}", address, selection.range);
        };
        self.set_cell(row as usize, col as usize, value)
    }

    /// Replace the whole grid; it must not be larger than the selection
    pub fn replace_grid(&mut self, grid: Vec<Vec<RawValue>>) -> Result<()> {
        let view = self.view.as_mut().context("No region is selected")?;
        let (rows, cols) = (view.selection.range.rows() as usize, view.selection.range.cols() as usize);
        if grid.len() > rows || grid.iter().any(|r| r.len() > cols) {
            bail!(
                "Grid does not fit the selected range {} ({} x {})",
                view.selection.range,
                rows,
                cols
            );
        }
        view.grid = grid;
        Ok(())
    }

    /// Patches for the current grid
    pub fn pending_patches(&self) -> Result<Vec<CellPatch>> {
        let view = self.view.as_ref().context("No region is selected")?;
        Ok(view.selection.patches_from_grid(&view.grid))
    }

    fn selected_sheet(&self) -> Result<String> {
        Ok(self.selection().context("No region is selected")?.sheet.clone())
    }

    fn build(&self) -> Result<SaveOutcome> {
        let sheet = self.selected_sheet()?;
        let patches = self.pending_patches()?;
        let outcome = save_preserving(
            &self.source.bytes,
            &self.source.extension,
            &sheet,
            &patches,
            &self.config.patch,
        )?;
        Ok(outcome)
    }

    /// Save the edits back into the file the session was opened from.
    /// The session then continues from the saved bytes.
    pub fn save_in_place(&mut self) -> Result<SaveOutcome> {
        let handle = self
            .handle
            .clone()
            .context("This workbook was not opened from a writable file")?;
        handle.request_write_permission()?;

        let outcome = self.build()?;
        handle.write(outcome.bytes())?;

        self.source.bytes = outcome.bytes().to_vec();
        self.workbook = read_workbook(&self.source.bytes)?;
        Ok(outcome)
    }

    /// Patched workbook offered under the original file name
    pub fn download(&self) -> Result<(Download, SaveOutcome)> {
        let outcome = self.build()?;
        let download = Download::new(self.download_name(), outcome.bytes().to_vec());
        Ok((download, outcome))
    }

    /// Workbook regenerated from data only, under the original file name
    pub fn download_data_only(&self) -> Result<Download> {
        let sheet = self.selected_sheet()?;
        let patches = self.pending_patches()?;
        let bytes = save_data_only(&self.source.bytes, &sheet, &patches)?;
        Ok(Download::new(self.download_name(), bytes))
    }

    fn download_name(&self) -> String {
        if self.source.file_name.is_empty() {
            format!("workbook.{}", self.source.extension)
        } else {
            self.source.file_name.clone()
        }
    }
}
