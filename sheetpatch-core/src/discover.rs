//! Editable regions of a workbook: tables, defined names, sheet previews

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use std::fmt;

use crate::address::CellRange;
use crate::error::{Cause, Result, Step, StepContext};
use crate::package::{Package, Relationship, SheetEntry, resolve_target};
use crate::xml::{attr_value, local_name};

const TABLE_REL: &str = "/table";

/// Something the user can pick and edit as a grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Region {
    Table {
        sheet: String,
        name: String,
        range: CellRange,
    },
    Name {
        sheet: String,
        name: String,
        range: CellRange,
    },
    /// Whole sheet, shown as a capped preview of its used range
    Sheet { sheet: String },
}

impl Region {
    pub fn sheet(&self) -> &str {
        match self {
            Region::Table { sheet, .. } | Region::Name { sheet, .. } | Region::Sheet { sheet } => sheet,
        }
    }

    pub fn range(&self) -> Option<CellRange> {
        match self {
            Region::Table { range, .. } | Region::Name { range, .. } => Some(*range),
            Region::Sheet { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Region::Table { .. } => "table",
            Region::Name { .. } => "name",
            Region::Sheet { .. } => "sheet",
        }
    }

    /// Label as shown in a selection list
    pub fn label(&self, preview_rows: u32, preview_cols: u32) -> String {
        match self {
            Region::Table { sheet, name, range } | Region::Name { sheet, name, range } => {
                format!("{}: {} [{}]", sheet, name, range)
            }
            Region::Sheet { sheet } => {
                format!("{}: (preview first {}x{})", sheet, preview_rows, preview_cols)
            }
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label(50, 50))
    }
}

/// List regions in order: tables sheet by sheet (manifest order), then
/// workbook-scoped defined names. A workbook with neither yields one
/// preview region per sheet.
pub fn discover_regions(bytes: &[u8]) -> Result<Vec<Region>> {
    let mut package = Package::open(bytes)?;
    let workbook = package.workbook_path()?;
    let sheets = package.sheets()?;
    let workbook_rels = package.relationships(&workbook).at(Step::Parse)?;

    let mut regions = Vec::new();
    for entry in &sheets {
        match sheet_tables(&mut package, &workbook, &workbook_rels, entry) {
            Ok(tables) => regions.extend(tables),
            Err(e) => log::warn!("Skipping tables of sheet '{}': {}", entry.name, e),
        }
    }

    let workbook_xml = package.read_part(&workbook).at(Step::Parse)?;
    regions.extend(defined_name_regions(&workbook_xml).at(Step::Parse)?);

    if regions.is_empty() {
        regions = sheets
            .iter()
            .map(|s| Region::Sheet {
                sheet: s.name.clone(),
            })
            .collect();
    }

    log::info!("Discovered {} region(s) in {} sheet(s)", regions.len(), sheets.len());
    Ok(regions)
}

fn sheet_tables(
    package: &mut Package<'_>,
    workbook: &str,
    workbook_rels: &[Relationship],
    entry: &SheetEntry,
) -> std::result::Result<Vec<Region>, Cause> {
    let Some(rel) = workbook_rels.iter().find(|r| r.id == entry.rel_id) else {
        return Err(Cause::message(format!("no relationship '{}'", entry.rel_id)));
    };
    let sheet_path = resolve_target(workbook, &rel.target);

    let mut tables = Vec::new();
    for rel in package.relationships(&sheet_path)? {
        if rel.external || !rel.rel_type.ends_with(TABLE_REL) {
            continue;
        }
        let table_path = resolve_target(&sheet_path, &rel.target);
        let xml = package.read_part(&table_path)?;
        match parse_table(&xml)? {
            Some((name, range)) => tables.push(Region::Table {
                sheet: entry.name.clone(),
                name,
                range,
            }),
            None => log::debug!("Ignoring table part '{}' without name or ref", table_path),
        }
    }
    Ok(tables)
}

/// `(displayName or name, ref)` of a table part
fn parse_table(xml: &[u8]) -> std::result::Result<Option<(String, CellRange)>, Cause> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"table" => {
                let name = match attr_value(&e, b"displayName")? {
                    Some(name) => Some(name),
                    None => attr_value(&e, b"name")?,
                };
                let range = attr_value(&e, b"ref")?.and_then(|r| CellRange::parse(&r));
                return Ok(name.zip(range));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

/// Workbook-scoped defined names that point at a single cell rectangle
fn defined_name_regions(workbook_xml: &[u8]) -> std::result::Result<Vec<Region>, Cause> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);

    let mut regions = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<(String, bool)> = None;
    let mut formula = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"definedName" => {
                let name = attr_value(&e, b"name")?.unwrap_or_default();
                let sheet_scoped = attr_value(&e, b"localSheetId")?.is_some();
                current = Some((name, sheet_scoped));
                formula.clear();
            }
            Event::Text(e) if current.is_some() => formula.push_str(&e.unescape()?),
            Event::End(e) if local_name(e.name().as_ref()) == b"definedName" => {
                if let Some((name, sheet_scoped)) = current.take()
                    && !sheet_scoped
                    && !name.is_empty()
                    && !name.starts_with("_xlnm.")
                    && !name.contains("_FilterDatabase")
                {
                    match split_reference(&formula) {
                        Some((sheet, range)) => regions.push(Region::Name { sheet, name, range }),
                        None => log::debug!("Ignoring defined name '{}' = {}", name, formula),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(regions)
}

/// Split `'My Sheet'!$A$1:$B$4` into sheet and range. Only the first area of
/// a multi-area reference is used; external and broken references give `None`.
pub fn split_reference(formula: &str) -> Option<(String, CellRange)> {
    let area = first_area(formula.trim().trim_start_matches('='));
    let bang = last_unquoted(area, '!')?;
    let (sheet_part, address) = (&area[..bang], &area[bang + 1..]);

    let sheet = unquote_sheet(sheet_part.trim());
    if sheet.is_empty() || sheet.starts_with('[') || address.contains("#REF") {
        return None;
    }
    let range = CellRange::parse(&address.replace('$', ""))?;
    Some((sheet, range))
}

fn first_area(formula: &str) -> &str {
    let mut in_quotes = false;
    for (idx, ch) in formula.char_indices() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            ',' if !in_quotes => return &formula[..idx],
            _ => {}
        }
    }
    formula
}

fn last_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut found = None;
    for (idx, ch) in text.char_indices() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => found = Some(idx),
            _ => {}
        }
    }
    found
}

fn unquote_sheet(sheet: &str) -> String {
    match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => sheet.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reference() {
        assert_eq!(
            split_reference("Sheet1!$A$1:$B$4"),
            Some(("Sheet1".to_string(), CellRange::parse("A1:B4").unwrap()))
        );
        assert_eq!(
            split_reference("'Bob''s Data'!C3"),
            Some(("Bob's Data".to_string(), CellRange::parse("C3").unwrap()))
        );
        assert_eq!(
            split_reference("'A!B'!A1:A2,'A!B'!C1"),
            Some(("A!B".to_string(), CellRange::parse("A1:A2").unwrap()))
        );
        assert_eq!(split_reference("Sheet1!#REF!"), None);
        assert_eq!(split_reference("[1]Sheet1!A1"), None);
        assert_eq!(split_reference("42"), None);
    }

    #[test]
    fn test_defined_names_are_filtered() {
        let xml = br#"<workbook><definedNames>
<definedName name="_xlnm.Print_Area" localSheetId="0">Data!$A$1:$C$9</definedName>
<definedName name="Local" localSheetId="0">Data!$A$1</definedName>
<definedName name="Rates">Data!$B$2:$C$5</definedName>
<definedName name="Constant">0.21</definedName>
</definedNames></workbook>"#;
        let regions = defined_name_regions(xml).unwrap();
        assert_eq!(
            regions,
            vec![Region::Name {
                sheet: "Data".to_string(),
                name: "Rates".to_string(),
                range: CellRange::parse("B2:C5").unwrap(),
            }]
        );
    }

    #[test]
    fn test_parse_table_prefers_display_name() {
        let xml = br#"<table xmlns="urn:x" id="1" name="Table1" displayName="Sales" ref="A1:C10"/>"#;
        assert_eq!(
            parse_table(xml).unwrap(),
            Some(("Sales".to_string(), CellRange::parse("A1:C10").unwrap()))
        );
    }

    #[test]
    fn test_labels() {
        let table = Region::Table {
            sheet: "Data".to_string(),
            name: "Sales".to_string(),
            range: CellRange::parse("A1:C3").unwrap(),
        };
        assert_eq!(table.to_string(), "Data: Sales [A1:C3]");
        let sheet = Region::Sheet {
            sheet: "Data".to_string(),
        };
        assert_eq!(sheet.label(50, 50), "Data: (preview first 50x50)");
    }
}
