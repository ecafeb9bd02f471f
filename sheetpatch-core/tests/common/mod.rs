#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

struct MockSheet {
    name: String,
    sheet_data: String,
    tables: Vec<(String, String)>,
}

/// Builder for a minimal but valid xlsx archive held in memory
#[derive(Default)]
pub struct MockWorkbook {
    sheets: Vec<MockSheet>,
    shared_strings: Option<Vec<String>>,
    defined_names: Vec<(String, String, Option<u32>)>,
    extra_parts: Vec<(String, Vec<u8>)>,
    raw_sheet_xml: Vec<(usize, String)>,
}

impl MockWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet; `sheet_data` is the inner XML of `<sheetData>`
    pub fn sheet(mut self, name: &str, sheet_data: &str) -> Self {
        self.sheets.push(MockSheet {
            name: name.to_string(),
            sheet_data: sheet_data.to_string(),
            tables: Vec::new(),
        });
        self
    }

    /// Replace the whole worksheet XML of sheet `index`
    pub fn raw_sheet(mut self, index: usize, xml: &str) -> Self {
        self.raw_sheet_xml.push((index, xml.to_string()));
        self
    }

    /// Add a table to the most recently added sheet
    pub fn table(mut self, display_name: &str, range: &str) -> Self {
        if let Some(sheet) = self.sheets.last_mut() {
            sheet
                .tables
                .push((display_name.to_string(), range.to_string()));
        }
        self
    }

    /// Give the workbook a shared-string table with these entries
    pub fn shared_strings(mut self, entries: &[&str]) -> Self {
        self.shared_strings = Some(entries.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn defined_name(mut self, name: &str, formula: &str, local_sheet: Option<u32>) -> Self {
        self.defined_names
            .push((name.to_string(), formula.to_string(), local_sheet));
        self
    }

    /// An extra part stored uncompressed, e.g. media or a VBA project
    pub fn extra_part(mut self, name: &str, bytes: &[u8]) -> Self {
        self.extra_parts.push((name.to_string(), bytes.to_vec()));
        self
    }

    pub fn build(&self) -> anyhow::Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stamp = zip::DateTime::from_date_and_time(2024, 1, 15, 10, 30, 0)
            .map_err(|_| anyhow::anyhow!("invalid fixture timestamp"))?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(stamp);
        let stored = options.compression_method(CompressionMethod::Stored);

        let mut table_counter = 0;

        // 1. [Content_Types].xml
        zip.start_file("[Content_Types].xml", options)?;
        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        for (i, sheet) in self.sheets.iter().enumerate() {
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i + 1
            ));
            for _ in &sheet.tables {
                table_counter += 1;
                content_types.push_str(&format!(
                    r#"<Override PartName="/xl/tables/table{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml"/>"#,
                    table_counter
                ));
            }
        }
        if self.shared_strings.is_some() {
            content_types.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
        }
        content_types.push_str("</Types>");
        zip.write_all(content_types.as_bytes())?;

        // 2. _rels/.rels
        zip.start_file("_rels/.rels", options)?;
        zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.as_bytes())?;

        // 3. xl/workbook.xml
        zip.start_file("xl/workbook.xml", options)?;
        let mut workbook_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{}" xmlns:r="{}"><sheets>"#,
            MAIN_NS, REL_NS
        );
        for (i, sheet) in self.sheets.iter().enumerate() {
            workbook_xml.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape(&sheet.name),
                i + 1,
                i + 1
            ));
        }
        workbook_xml.push_str("</sheets>");
        if !self.defined_names.is_empty() {
            workbook_xml.push_str("<definedNames>");
            for (name, formula, local) in &self.defined_names {
                let scope = local
                    .map(|id| format!(r#" localSheetId="{}""#, id))
                    .unwrap_or_default();
                workbook_xml.push_str(&format!(
                    r#"<definedName name="{}"{}>{}</definedName>"#,
                    name,
                    scope,
                    escape(formula)
                ));
            }
            workbook_xml.push_str("</definedNames>");
        }
        workbook_xml.push_str("</workbook>");
        zip.write_all(workbook_xml.as_bytes())?;

        // 4. xl/_rels/workbook.xml.rels
        zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        let mut rels_xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, _) in self.sheets.iter().enumerate() {
            rels_xml.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i + 1,
                i + 1
            ));
        }
        if self.shared_strings.is_some() {
            rels_xml.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
                self.sheets.len() + 1
            ));
        }
        rels_xml.push_str("</Relationships>");
        zip.write_all(rels_xml.as_bytes())?;

        // 5. Worksheets, their tables and relationships
        let mut table_counter = 0;
        for (i, sheet) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            let raw = self
                .raw_sheet_xml
                .iter()
                .find(|(idx, _)| *idx == i)
                .map(|(_, xml)| xml.clone());
            let xml = raw.unwrap_or_else(|| {
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{}" xmlns:r="{}"><sheetData>{}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#,
                    MAIN_NS, REL_NS, sheet.sheet_data
                )
            });
            zip.write_all(xml.as_bytes())?;

            if sheet.tables.is_empty() {
                continue;
            }
            let mut sheet_rels = String::from(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            );
            for (t, (display_name, range)) in sheet.tables.iter().enumerate() {
                table_counter += 1;
                sheet_rels.push_str(&format!(
                    r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/table" Target="../tables/table{}.xml"/>"#,
                    t + 1,
                    table_counter
                ));
                zip.start_file(format!("xl/tables/table{}.xml", table_counter), options)?;
                zip.write_all(
                    format!(
                        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<table xmlns="{}" id="{}" name="Table{}" displayName="{}" ref="{}"/>"#,
                        MAIN_NS, table_counter, table_counter, display_name, range
                    )
                    .as_bytes(),
                )?;
            }
            sheet_rels.push_str("</Relationships>");
            zip.start_file(format!("xl/worksheets/_rels/sheet{}.xml.rels", i + 1), options)?;
            zip.write_all(sheet_rels.as_bytes())?;
        }

        // 6. Shared strings
        if let Some(entries) = &self.shared_strings {
            zip.start_file("xl/sharedStrings.xml", options)?;
            let mut sst = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{}" count="{}" uniqueCount="{}">"#,
                MAIN_NS,
                entries.len(),
                entries.len()
            );
            for entry in entries {
                sst.push_str(&format!("<si><t>{}</t></si>", escape(entry)));
            }
            sst.push_str("</sst>");
            zip.write_all(sst.as_bytes())?;
        }

        // 7. Anything else
        for (name, bytes) in &self.extra_parts {
            zip.start_file(name.as_str(), stored)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Decompressed contents of a part
pub fn read_part(bytes: &[u8], name: &str) -> anyhow::Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut file = archive.by_name(name)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text)
}

pub fn has_part(bytes: &[u8], name: &str) -> anyhow::Result<bool> {
    let archive = ZipArchive::new(Cursor::new(bytes))?;
    let found = archive.file_names().any(|n| n == name);
    Ok(found)
}

/// `(name, compression, compressed size, crc)` for every entry
pub fn entry_summary(bytes: &[u8]) -> anyhow::Result<Vec<(String, zip::CompressionMethod, u64, u32)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        entries.push((
            file.name().to_string(),
            file.compression(),
            file.compressed_size(),
            file.crc32(),
        ));
    }
    Ok(entries)
}
