mod common;

use common::{MockWorkbook, entry_summary, has_part, read_part};
use sheetpatch_core::config::PatchConfig;
use sheetpatch_core::reader::{CellValue, read_workbook};
use sheetpatch_core::xml::{SharedStringTable, SheetDocument};
use sheetpatch_core::{CellPatch, CellRef, PatchEngine, Step, TypedValue, patch_workbook, verify};

const SHEET1: &str = "xl/worksheets/sheet1.xml";
const SST: &str = "xl/sharedStrings.xml";

fn at(a1: &str) -> CellRef {
    CellRef::from_a1(a1).expect("valid address")
}

fn text(a1: &str, s: &str) -> CellPatch {
    CellPatch::new(at(a1), TypedValue::Text(s.to_string()))
}

fn number(a1: &str, n: f64) -> CellPatch {
    CellPatch::new(at(a1), TypedValue::Number(n))
}

fn sheet_doc(bytes: &[u8]) -> anyhow::Result<SheetDocument> {
    let xml = read_part(bytes, SHEET1)?;
    Ok(SheetDocument::parse(xml.as_bytes())?)
}

fn strings(bytes: &[u8]) -> anyhow::Result<SharedStringTable> {
    let xml = read_part(bytes, SST)?;
    Ok(SharedStringTable::parse(xml.as_bytes())?)
}

#[test]
fn test_text_without_shared_strings_is_inline() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", r#"<row r="1"><c r="A1"><v>1</v></c></row>"#)
        .build()?;

    let outcome = patch_workbook(&original, &[text("B1", "hello")], "Data")?;

    let doc = sheet_doc(&outcome.bytes)?;
    let cell = doc.cell(at("B1")).expect("B1 written");
    assert_eq!(cell.cell_type().as_deref(), Some("inlineStr"));
    assert_eq!(cell.inline_text().as_deref(), Some("hello"));
    assert!(!has_part(&outcome.bytes, SST)?);
    assert_eq!(outcome.parts_touched, vec![SHEET1.to_string()]);
    assert_eq!(outcome.shared_strings_path, None);
    Ok(())
}

#[test]
fn test_shared_strings_are_deduplicated() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", "")
        .shared_strings(&[])
        .build()?;

    let patches = vec![text("A1", "foo"), text("A2", "bar"), text("A3", "foo")];
    let outcome = patch_workbook(&original, &patches, "Data")?;

    let table = strings(&outcome.bytes)?;
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0), Some("foo"));
    assert_eq!(table.get(1), Some("bar"));
    assert_eq!(table.count(), 3);
    assert_eq!(table.unique_count(), 2);

    let doc = sheet_doc(&outcome.bytes)?;
    assert_eq!(doc.cell(at("A1")).and_then(|c| c.value_text()).as_deref(), Some("0"));
    assert_eq!(doc.cell(at("A2")).and_then(|c| c.value_text()).as_deref(), Some("1"));
    assert_eq!(doc.cell(at("A3")).and_then(|c| c.value_text()).as_deref(), Some("0"));
    assert_eq!(doc.cell(at("A3")).and_then(|c| c.cell_type()).as_deref(), Some("s"));

    assert_eq!(outcome.stats.strings_appended, 2);
    assert_eq!(outcome.stats.strings_reused, 1);
    assert_eq!(outcome.stats.shared_count, Some(3));
    assert_eq!(outcome.stats.shared_unique_count, Some(2));
    Ok(())
}

#[test]
fn test_existing_shared_string_is_reused() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#)
        .shared_strings(&["alpha", "beta"])
        .build()?;

    let outcome = patch_workbook(&original, &[text("B1", "beta")], "Data")?;

    let table = strings(&outcome.bytes)?;
    assert_eq!(table.len(), 2);
    assert_eq!(table.unique_count(), 2);
    assert_eq!(table.count(), 3);
    let doc = sheet_doc(&outcome.bytes)?;
    assert_eq!(doc.cell(at("B1")).and_then(|c| c.value_text()).as_deref(), Some("1"));
    Ok(())
}

#[test]
fn test_number_over_text_keeps_style() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet(
            "Data",
            r#"<row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>2</v></c><c r="C1" s="5" t="s"><v>0</v></c></row>"#,
        )
        .shared_strings(&["old"])
        .build()?;

    let outcome = patch_workbook(&original, &[number("C1", 3.5)], "Data")?;

    let doc = sheet_doc(&outcome.bytes)?;
    let cell = doc.cell(at("C1")).expect("C1 present");
    assert_eq!(cell.cell_type().as_deref(), Some("n"));
    assert_eq!(cell.value_text().as_deref(), Some("3.5"));
    assert_eq!(cell.style().as_deref(), Some("5"));
    // Untouched neighbours keep their values
    assert_eq!(doc.cell(at("A1")).and_then(|c| c.value_text()).as_deref(), Some("1"));
    assert_eq!(doc.cell(at("B1")).and_then(|c| c.value_text()).as_deref(), Some("2"));
    // No text was written, so the string table is left alone
    assert_eq!(outcome.parts_touched, vec![SHEET1.to_string()]);
    assert!(verify(&outcome.bytes, &[number("C1", 3.5)], SHEET1, Some(SST)));
    Ok(())
}

#[test]
fn test_unknown_sheet_leaves_original_intact() -> anyhow::Result<()> {
    let original = MockWorkbook::new().sheet("Data", "").build()?;
    let before = original.clone();

    let err = patch_workbook(&original, &[number("A1", 1.0)], "Missing").unwrap_err();

    assert_eq!(err.step, Step::ResolveSheet);
    assert!(err.to_string().contains("Missing"));
    assert_eq!(original, before);
    Ok(())
}

#[test]
fn test_blank_clears_value_and_type() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", r#"<row r="2"><c r="B2" s="3" t="s"><v>0</v></c></row>"#)
        .shared_strings(&["gone"])
        .build()?;

    let outcome = patch_workbook(&original, &[CellPatch::new(at("B2"), TypedValue::Blank)], "Data")?;

    let doc = sheet_doc(&outcome.bytes)?;
    let cell = doc.cell(at("B2")).expect("styled cell stays");
    assert_eq!(cell.cell_type(), None);
    assert_eq!(cell.value_text(), None);
    assert!(!cell.has_content());
    assert_eq!(cell.style().as_deref(), Some("3"));
    Ok(())
}

#[test]
fn test_formula_is_replaced_by_literal() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet(
            "Data",
            r#"<row r="1"><c r="A1"><v>1</v></c><c r="A2"><f>A1*2</f><v>2</v></c></row>"#,
        )
        .build()?;

    let outcome = patch_workbook(&original, &[number("A2", 7.0)], "Data")?;

    let doc = sheet_doc(&outcome.bytes)?;
    let cell = doc.cell(at("A2")).expect("A2 present");
    assert!(!cell.has_formula());
    assert_eq!(cell.value_text().as_deref(), Some("7"));
    Ok(())
}

#[test]
fn test_patches_in_new_row_create_one_row() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", r#"<row r="1"><c r="A1"><v>1</v></c></row>"#)
        .build()?;

    let patches = vec![number("A7", 1.0), number("C7", 3.0)];
    let outcome = patch_workbook(&original, &patches, "Data")?;

    let xml = read_part(&outcome.bytes, SHEET1)?;
    assert_eq!(xml.matches(r#"<row r="7""#).count(), 1);
    let doc = sheet_doc(&outcome.bytes)?;
    let row = doc.row(7).expect("row 7 created");
    assert_eq!(row.cell_addresses(), vec![at("A7"), at("C7")]);
    assert_eq!(outcome.stats.rows_created, 1);
    assert_eq!(outcome.stats.cells_created, 2);
    Ok(())
}

#[test]
fn test_boolean_cells() -> anyhow::Result<()> {
    let original = MockWorkbook::new().sheet("Data", "").build()?;

    let patches = vec![
        CellPatch::new(at("A1"), TypedValue::Boolean(true)),
        CellPatch::new(at("A2"), TypedValue::Boolean(false)),
    ];
    let outcome = patch_workbook(&original, &patches, "Data")?;

    let doc = sheet_doc(&outcome.bytes)?;
    assert_eq!(doc.cell(at("A1")).and_then(|c| c.cell_type()).as_deref(), Some("b"));
    assert_eq!(doc.cell(at("A1")).and_then(|c| c.value_text()).as_deref(), Some("1"));
    assert_eq!(doc.cell(at("A2")).and_then(|c| c.value_text()).as_deref(), Some("0"));

    let workbook = read_workbook(&outcome.bytes)?;
    let sheet = workbook.get_sheet("Data").expect("sheet read back");
    assert_eq!(sheet.get_cell(0, 0).map(|c| &c.value), Some(&CellValue::Boolean(true)));
    Ok(())
}

#[test]
fn test_patching_twice_is_idempotent() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#)
        .shared_strings(&["seed"])
        .build()?;
    let patches = vec![text("A1", "x"), number("B2", 2.5), text("C3", "y")];

    let once = patch_workbook(&original, &patches, "Data")?;
    let twice = patch_workbook(&once.bytes, &patches, "Data")?;

    assert_eq!(read_part(&once.bytes, SHEET1)?, read_part(&twice.bytes, SHEET1)?);
    let table = strings(&twice.bytes)?;
    assert_eq!(table.unique_count(), strings(&once.bytes)?.unique_count());
    assert_eq!(twice.stats.strings_appended, 0);
    Ok(())
}

#[test]
fn test_output_is_deterministic() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", r#"<row r="1"><c r="A1"><v>1</v></c></row>"#)
        .shared_strings(&["a"])
        .build()?;
    let patches = vec![text("A1", "b"), number("D4", 4.0)];

    let first = patch_workbook(&original, &patches, "Data")?;
    let second = patch_workbook(&original, &patches, "Data")?;

    assert_eq!(first.bytes, second.bytes);
    Ok(())
}

#[test]
fn test_untouched_parts_are_identical() -> anyhow::Result<()> {
    let image = [0x89, b'P', b'N', b'G', 0, 1, 2, 3, 4, 5];
    let original = MockWorkbook::new()
        .sheet("Data", r#"<row r="1"><c r="A1"><v>1</v></c></row>"#)
        .sheet("Other", r#"<row r="1"><c r="A1"><v>9</v></c></row>"#)
        .extra_part("xl/media/image1.png", &image)
        .build()?;

    let outcome = patch_workbook(&original, &[number("A1", 2.0)], "Data")?;

    let before = entry_summary(&original)?;
    let after = entry_summary(&outcome.bytes)?;
    assert_eq!(
        before.iter().map(|e| &e.0).collect::<Vec<_>>(),
        after.iter().map(|e| &e.0).collect::<Vec<_>>(),
        "entry order is preserved"
    );
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.1, new.1, "compression of {}", old.0);
        if old.0 != SHEET1 {
            assert_eq!(old, new, "{} was rewritten", old.0);
        }
    }
    assert_eq!(
        read_part(&original, "xl/worksheets/sheet2.xml")?,
        read_part(&outcome.bytes, "xl/worksheets/sheet2.xml")?
    );
    Ok(())
}

#[test]
fn test_invalid_values_are_reported_together() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", "")
        .shared_strings(&[])
        .build()?;

    let patches = vec![
        number("A1", f64::INFINITY),
        text("A2", "fine"),
        text("A3", "bell\u{7}"),
        number("A4", f64::NEG_INFINITY),
    ];
    let err = patch_workbook(&original, &patches, "Data").unwrap_err();

    assert_eq!(err.step, Step::WriteCell);
    let failures = err.cell_failures();
    assert_eq!(failures.len(), 3);
    assert_eq!(failures[0].address, "A1");
    assert_eq!(failures[0].value_kind, "number");
    assert_eq!(failures[1].address, "A3");
    assert_eq!(failures[1].value_kind, "text");
    assert!(failures[1].reason.contains("U+0007"));
    Ok(())
}

#[test]
fn test_reported_failures_are_capped() -> anyhow::Result<()> {
    let original = MockWorkbook::new().sheet("Data", "").build()?;
    let engine = PatchEngine::new(PatchConfig {
        max_reported_failures: 1,
        ..PatchConfig::default()
    });

    let patches: Vec<CellPatch> = (1..=3)
        .map(|r| number(&format!("A{}", r), f64::INFINITY))
        .collect();
    let err = engine.apply(&original, &patches, "Data").unwrap_err();

    assert_eq!(err.cell_failures().len(), 1);
    assert!(err.to_string().starts_with("write-cell failed: 3 cell(s)"));
    Ok(())
}

#[test]
fn test_not_a_zip_is_load_error() {
    let err = patch_workbook(b"definitely not a workbook", &[], "Data").unwrap_err();
    assert_eq!(err.step, Step::Load);
}

#[test]
fn test_missing_sheet_data_is_parse_error() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", "")
        .raw_sheet(
            0,
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1"/></worksheet>"#,
        )
        .build()?;

    let err = patch_workbook(&original, &[number("A1", 1.0)], "Data").unwrap_err();
    assert_eq!(err.step, Step::Parse);
    Ok(())
}

#[test]
fn test_patched_values_read_back_with_calamine() -> anyhow::Result<()> {
    let original = MockWorkbook::new()
        .sheet("Data", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#)
        .sheet("Other", "")
        .shared_strings(&["Name"])
        .build()?;
    let patches = vec![text("A2", "Widget"), number("B2", 12.25), text("A3", "Name")];

    let outcome = patch_workbook(&original, &patches, "Data")?;

    let workbook = read_workbook(&outcome.bytes)?;
    assert_eq!(workbook.sheet_names(), vec!["Data", "Other"]);
    let sheet = workbook.get_sheet("Data").expect("Data sheet");
    assert_eq!(sheet.get_cell(0, 0).map(|c| &c.value), Some(&CellValue::Text("Name".into())));
    assert_eq!(sheet.get_cell(1, 0).map(|c| &c.value), Some(&CellValue::Text("Widget".into())));
    assert_eq!(sheet.get_cell(1, 1).map(|c| &c.value), Some(&CellValue::Number(12.25)));
    assert_eq!(sheet.get_cell(2, 0).map(|c| &c.value), Some(&CellValue::Text("Name".into())));
    Ok(())
}

#[test]
fn test_carriage_returns_and_literal_escapes_are_encoded() -> anyhow::Result<()> {
    let value = "a_x0041_b\r\nc";
    let patches = vec![text("A1", value)];

    let inline_book = MockWorkbook::new().sheet("Data", "").build()?;
    let inline = patch_workbook(&inline_book, &patches, "Data")?;
    let xml = read_part(&inline.bytes, SHEET1)?;
    assert!(!xml.contains('\r'));
    assert!(xml.contains("a_x005F_x0041_b_x000D_\nc"));
    let doc = sheet_doc(&inline.bytes)?;
    let cell = doc.cell(at("A1")).expect("A1 written");
    assert_eq!(cell.inline_text().as_deref(), Some(value));
    assert!(verify(&inline.bytes, &patches, SHEET1, None));

    let shared_book = MockWorkbook::new()
        .sheet("Data", "")
        .shared_strings(&[])
        .build()?;
    let shared = patch_workbook(&shared_book, &patches, "Data")?;
    let xml = read_part(&shared.bytes, SST)?;
    assert!(!xml.contains('\r'));
    assert!(xml.contains("<t>a_x005F_x0041_b_x000D_\nc</t>"));
    assert_eq!(strings(&shared.bytes)?.get(0), Some(value));
    assert!(verify(&shared.bytes, &patches, SHEET1, Some(SST)));

    // patching the same text again reuses the decoded entry
    let again = patch_workbook(&shared.bytes, &patches, "Data")?;
    assert_eq!(strings(&again.bytes)?.len(), 1);
    Ok(())
}
