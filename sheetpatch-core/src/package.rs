//! Workbook container access: parts, relationships and repacking

use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{Cause, PatchError, Result, Step, StepContext};
use crate::xml::{attr_value, local_name};

const OFFICE_DOCUMENT_REL: &str = "/officeDocument";
const WORKSHEET_REL: &str = "/worksheet";
const SHARED_STRINGS_REL: &str = "/sharedStrings";
const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// One `<Relationship>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// One `<sheet>` entry of the workbook manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub rel_id: String,
}

/// An opened workbook archive. The original bytes are only ever read.
pub struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    names: Vec<String>,
}

impl<'a> Package<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes)).at(Step::Load)?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self { archive, names })
    }

    /// Part names in archive order
    pub fn part_names(&self) -> &[String] {
        &self.names
    }

    /// Stored name of a part, matched exactly and then case-insensitively
    pub fn find_part(&self, name: &str) -> Option<&str> {
        let name = name.trim_start_matches('/');
        self.names
            .iter()
            .find(|n| n.as_str() == name)
            .or_else(|| self.names.iter().find(|n| n.eq_ignore_ascii_case(name)))
            .map(String::as_str)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.find_part(name).is_some()
    }

    pub fn read_part(&mut self, name: &str) -> std::result::Result<Vec<u8>, Cause> {
        let stored = self
            .find_part(name)
            .ok_or_else(|| Cause::message(format!("part '{}' not found", name)))?
            .to_string();
        let mut file = self.archive.by_name(&stored)?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Relationships declared by `source_part`; a missing rels part means none
    pub fn relationships(&mut self, source_part: &str) -> std::result::Result<Vec<Relationship>, Cause> {
        let rels_path = rels_path_for(source_part);
        if !self.has_part(&rels_path) {
            return Ok(Vec::new());
        }
        let xml = self.read_part(&rels_path)?;
        parse_relationships(&xml)
    }

    /// Workbook manifest location from the package root relationships
    pub fn workbook_path(&mut self) -> Result<String> {
        let rels = self.relationships("").at(Step::Parse)?;
        let target = rels
            .iter()
            .find(|r| !r.external && r.rel_type.ends_with(OFFICE_DOCUMENT_REL))
            .map(|r| resolve_target("", &r.target));
        match target {
            Some(path) if self.has_part(&path) => Ok(path),
            _ if self.has_part(DEFAULT_WORKBOOK_PART) => Ok(DEFAULT_WORKBOOK_PART.to_string()),
            _ => Err(PatchError::message(
                Step::Load,
                "archive has no workbook part; is this an xlsx file?",
            )),
        }
    }

    /// Sheets of the manifest in declaration order
    pub fn sheets(&mut self) -> Result<Vec<SheetEntry>> {
        let workbook = self.workbook_path()?;
        let xml = self.read_part(&workbook).at(Step::Parse)?;
        parse_sheet_entries(&xml).at(Step::Parse)
    }

    /// Resolve a sheet display name to its part path through the manifest
    /// and the workbook relationships.
    pub fn resolve_sheet_path(&mut self, sheet_name: &str) -> Result<String> {
        let workbook = self.workbook_path()?;
        let sheets = self.sheets()?;
        let entry = sheets.iter().find(|s| s.name == sheet_name).ok_or_else(|| {
            PatchError::message(
                Step::ResolveSheet,
                format!("sheet '{}' not found in workbook manifest", sheet_name),
            )
        })?;

        let rels = self.relationships(&workbook).at(Step::Parse)?;
        let rel = rels.iter().find(|r| r.id == entry.rel_id).ok_or_else(|| {
            PatchError::message(
                Step::ResolveSheet,
                format!(
                    "relationship '{}' not found for sheet '{}'",
                    entry.rel_id, sheet_name
                ),
            )
        })?;
        if rel.external || !rel.rel_type.ends_with(WORKSHEET_REL) {
            return Err(PatchError::message(
                Step::ResolveSheet,
                format!("sheet '{}' is not a worksheet part", sheet_name),
            ));
        }

        let path = resolve_target(&workbook, &rel.target);
        match self.find_part(&path) {
            Some(stored) => Ok(stored.to_string()),
            None => Err(PatchError::message(
                Step::ResolveSheet,
                format!("sheet '{}' points to missing part '{}'", sheet_name, path),
            )),
        }
    }

    /// Shared-string part, when the workbook has one
    pub fn shared_strings_path(&mut self) -> Result<Option<String>> {
        let workbook = self.workbook_path()?;
        let rels = self.relationships(&workbook).at(Step::Parse)?;
        let from_rels = rels
            .iter()
            .find(|r| !r.external && r.rel_type.ends_with(SHARED_STRINGS_REL))
            .map(|r| resolve_target(&workbook, &r.target));
        let path = from_rels.unwrap_or_else(|| DEFAULT_SHARED_STRINGS_PART.to_string());
        Ok(self.find_part(&path).map(str::to_string))
    }

    /// Write a new archive with `replacements` swapped in. Untouched parts are
    /// copied without recompression; replaced parts keep the original entry's
    /// compression method, timestamp and permissions, so the output only
    /// depends on the inputs.
    pub fn repack(&mut self, replacements: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>> {
        let mut out = ZipWriter::new(Cursor::new(Vec::new()));

        for i in 0..self.archive.len() {
            let file = self.archive.by_index(i).at(Step::Repack)?;
            let name = file.name().to_string();

            let Some(data) = replacements.get(&name) else {
                out.raw_copy_file(file).at(Step::Repack)?;
                continue;
            };

            let mut opts = SimpleFileOptions::default()
                .compression_method(file.compression())
                .last_modified_time(file.last_modified().unwrap_or_default());
            if let Some(mode) = file.unix_mode() {
                opts = opts.unix_permissions(mode);
            }
            drop(file);

            out.start_file(name.as_str(), opts).at(Step::Repack)?;
            out.write_all(data).at(Step::Repack)?;
        }

        let bytes = out.finish().at(Step::Repack)?.into_inner();
        check_repacked(&bytes, replacements)?;
        Ok(bytes)
    }
}

/// Re-open the new archive and make sure every rewritten part reads back
fn check_repacked(bytes: &[u8], replacements: &BTreeMap<String, Vec<u8>>) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).at(Step::Repack)?;
    for (name, expected) in replacements {
        let mut file = archive.by_name(name).at(Step::Repack)?;
        let mut data = Vec::with_capacity(expected.len());
        file.read_to_end(&mut data).at(Step::Repack)?;
        if &data != expected {
            return Err(PatchError::message(
                Step::Repack,
                format!("part '{}' does not read back as written", name),
            ));
        }
    }
    Ok(())
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`; `""` -> `_rels/.rels`
pub fn rels_path_for(part: &str) -> String {
    let part = part.trim_start_matches('/');
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the directory of its source part
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    let joined = if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else {
        match source_part.trim_start_matches('/').rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, target),
            None => target,
        }
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

pub fn parse_relationships(xml: &[u8]) -> std::result::Result<Vec<Relationship>, Cause> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut rels = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                rels.push(Relationship {
                    id: attr_value(&e, b"Id")?.unwrap_or_default(),
                    rel_type: attr_value(&e, b"Type")?.unwrap_or_default(),
                    target: attr_value(&e, b"Target")?.unwrap_or_default(),
                    external: attr_value(&e, b"TargetMode")?
                        .is_some_and(|m| m.eq_ignore_ascii_case("External")),
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

pub fn parse_sheet_entries(xml: &[u8]) -> std::result::Result<Vec<SheetEntry>, Cause> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut sheets = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"sheet" => {
                let name = attr_value(&e, b"name")?.unwrap_or_default();
                // r:id, whatever the relationships prefix is bound to
                let rel_id = attr_value(&e, b"id")?.unwrap_or_default();
                sheets.push(SheetEntry { name, rel_id });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}
