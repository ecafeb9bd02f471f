//! Worksheet XML as a tree of rows and cells
//!
//! Only `<sheetData>` is modelled. Everything before and after it, and every
//! row or cell child the patcher does not touch, is kept as the original
//! events so it serialises back unchanged.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::collections::HashMap;

use super::{
    attr_value, decode_ooxml_text, element_name, encode_ooxml_text, is_xml_char, local_name,
    needs_space_preserve, prefix_of, read_events,
};
use crate::address::{CellRef, MAX_COLS, MAX_ROWS};
use crate::error::Cause;

/// Content written into a cell, after shared-string resolution
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Blank,
    Number(f64),
    Boolean(bool),
    SharedString(usize),
    InlineString(String),
}

impl CellContent {
    /// Reason the content cannot be represented in a worksheet, if any
    pub fn problem(&self) -> Option<String> {
        match self {
            CellContent::Number(n) if !n.is_finite() => Some(format!("non-finite number {}", n)),
            CellContent::InlineString(s) => s
                .chars()
                .find(|c| !is_xml_char(*c))
                .map(|c| format!("character U+{:04X} is not allowed in XML", c as u32)),
            _ => None,
        }
    }
}

/// Result of writing one cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteEffect {
    pub row_created: bool,
    pub cell_created: bool,
}

/// Worksheet part parsed for patching
#[derive(Debug, Clone)]
pub struct SheetDocument {
    head: Vec<Event<'static>>,
    data: SheetData,
    tail: Vec<Event<'static>>,
}

#[derive(Debug, Clone)]
struct SheetData {
    start: BytesStart<'static>,
    self_closing: bool,
    prefix: String,
    items: Vec<DataItem>,
    /// row number (1-based) -> index in `items`
    rows: HashMap<u32, usize>,
}

#[derive(Debug, Clone)]
enum DataItem {
    Row(RowNode),
    Other(Event<'static>),
}

/// A `<row>` element
#[derive(Debug, Clone)]
pub struct RowNode {
    start: BytesStart<'static>,
    /// Explicit `r`, or implied by document order
    number: u32,
    self_closing: bool,
    items: Vec<RowItem>,
    /// column -> index in `items`
    cells: HashMap<u32, usize>,
    /// New cells were appended, so the `spans` hint is stale
    grown: bool,
}

#[derive(Debug, Clone)]
enum RowItem {
    Cell(CellNode),
    Other(Event<'static>),
}

/// A `<c>` element
#[derive(Debug, Clone)]
pub struct CellNode {
    start: BytesStart<'static>,
    /// Explicit `r`, or implied by document order
    address: CellRef,
    self_closing: bool,
    children: Vec<CellChild>,
}

#[derive(Debug, Clone)]
struct CellChild {
    kind: ChildKind,
    events: Vec<Event<'static>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildKind {
    Formula,
    Value,
    InlineString,
    Other,
}

impl ChildKind {
    fn of(start: &BytesStart<'_>) -> Self {
        match local_name(start.name().as_ref()) {
            b"f" => ChildKind::Formula,
            b"v" => ChildKind::Value,
            b"is" => ChildKind::InlineString,
            _ => ChildKind::Other,
        }
    }
}

fn is_named(start: &BytesStart<'_>, name: &[u8]) -> bool {
    local_name(start.name().as_ref()) == name
}

/// Pull the remaining events of an element whose start was already consumed
fn collect_element(
    events: &mut impl Iterator<Item = Event<'static>>,
    out: &mut Vec<Event<'static>>,
) -> Result<(), Cause> {
    let mut depth = 1usize;
    while depth > 0 {
        let ev = events
            .next()
            .ok_or_else(|| Cause::message("unexpected end of worksheet XML"))?;
        match &ev {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            _ => {}
        }
        out.push(ev);
    }
    Ok(())
}

impl SheetDocument {
    /// Parse a worksheet part. Structural problems the patcher cannot work
    /// around (no `sheetData`, duplicate rows or cells, a cell addressed
    /// outside its row) are rejected here.
    pub fn parse(xml: &[u8]) -> Result<Self, Cause> {
        let mut events = read_events(xml)?.into_iter();

        let mut head = Vec::new();
        let (start, self_closing) = loop {
            match events.next() {
                Some(Event::Start(e)) if is_named(&e, b"sheetData") => break (e, false),
                Some(Event::Empty(e)) if is_named(&e, b"sheetData") => break (e, true),
                Some(ev) => head.push(ev),
                None => return Err(Cause::message("worksheet has no sheetData element")),
            }
        };

        let mut data = SheetData {
            prefix: prefix_of(&start),
            start,
            self_closing,
            items: Vec::new(),
            rows: HashMap::new(),
        };
        if !self_closing {
            data.parse_items(&mut events)?;
        }

        Ok(Self {
            head,
            data,
            tail: events.collect(),
        })
    }

    /// Look up a cell by address through the row/column index
    pub fn cell(&self, at: CellRef) -> Option<&CellNode> {
        let row = self.row(at.row_number())?;
        row.cells.get(&at.col).and_then(|&idx| match &row.items[idx] {
            RowItem::Cell(cell) => Some(cell),
            RowItem::Other(_) => None,
        })
    }

    pub fn row(&self, number: u32) -> Option<&RowNode> {
        self.data
            .rows
            .get(&number)
            .and_then(|&idx| match &self.data.items[idx] {
                DataItem::Row(row) => Some(row),
                DataItem::Other(_) => None,
            })
    }

    /// Row numbers in document order
    pub fn row_numbers(&self) -> Vec<u32> {
        self.data
            .items
            .iter()
            .filter_map(|item| match item {
                DataItem::Row(row) => Some(row.number),
                DataItem::Other(_) => None,
            })
            .collect()
    }

    /// Write `content` into the cell at `at`, creating the row and the cell
    /// (appended at the end of their parents) when missing.
    pub fn set_cell(&mut self, at: CellRef, content: &CellContent) -> Result<WriteEffect, Cause> {
        let number = at.row_number();
        let prefix = self.data.prefix.clone();
        let mut effect = WriteEffect::default();

        let row_idx = match self.data.rows.get(&number) {
            Some(&idx) => idx,
            None => {
                let idx = self.data.items.len();
                self.data.items.push(DataItem::Row(RowNode::new(&prefix, number)));
                self.data.rows.insert(number, idx);
                effect.row_created = true;
                idx
            }
        };

        let DataItem::Row(row) = &mut self.data.items[row_idx] else {
            return Err(Cause::message(format!("row {} index is out of sync", number)));
        };

        let cell_idx = match row.cells.get(&at.col) {
            Some(&idx) => idx,
            None => {
                let idx = row.items.len();
                row.items.push(RowItem::Cell(CellNode::new(&prefix, at)));
                row.cells.insert(at.col, idx);
                row.self_closing = false;
                row.grown = true;
                effect.cell_created = true;
                idx
            }
        };

        let RowItem::Cell(cell) = &mut row.items[cell_idx] else {
            return Err(Cause::message(format!("cell {} index is out of sync", at)));
        };
        cell.set_content(content, &prefix)?;
        Ok(effect)
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, Cause> {
        let mut writer = Writer::new(Vec::new());
        for ev in &self.head {
            writer.write_event(ev.borrow())?;
        }
        self.data.write(&mut writer)?;
        for ev in &self.tail {
            writer.write_event(ev.borrow())?;
        }
        Ok(writer.into_inner())
    }
}

impl SheetData {
    fn parse_items(&mut self, events: &mut impl Iterator<Item = Event<'static>>) -> Result<(), Cause> {
        let mut depth = 0usize;
        let mut last_row = 0u32;
        loop {
            let ev = events
                .next()
                .ok_or_else(|| Cause::message("unterminated sheetData element"))?;
            match ev {
                Event::Start(e) if depth == 0 && is_named(&e, b"row") => {
                    let row = RowNode::parse(e, false, last_row + 1, events)?;
                    last_row = row.number;
                    self.push_row(row)?;
                }
                Event::Empty(e) if depth == 0 && is_named(&e, b"row") => {
                    let row = RowNode::parse(e, true, last_row + 1, events)?;
                    last_row = row.number;
                    self.push_row(row)?;
                }
                Event::End(_) if depth == 0 => return Ok(()),
                Event::Start(e) => {
                    depth += 1;
                    self.items.push(DataItem::Other(Event::Start(e)));
                }
                Event::End(e) => {
                    depth -= 1;
                    self.items.push(DataItem::Other(Event::End(e)));
                }
                other => self.items.push(DataItem::Other(other)),
            }
        }
    }

    fn push_row(&mut self, row: RowNode) -> Result<(), Cause> {
        if self.rows.insert(row.number, self.items.len()).is_some() {
            return Err(Cause::message(format!("duplicate row {} in sheetData", row.number)));
        }
        self.items.push(DataItem::Row(row));
        Ok(())
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), Cause> {
        if self.self_closing && self.items.is_empty() {
            writer.write_event(Event::Empty(self.start.borrow()))?;
            return Ok(());
        }
        writer.write_event(Event::Start(self.start.borrow()))?;
        for item in &self.items {
            match item {
                DataItem::Row(row) => row.write(writer)?,
                DataItem::Other(ev) => writer.write_event(ev.borrow())?,
            }
        }
        writer.write_event(Event::End(self.start.to_end()))?;
        Ok(())
    }
}

impl RowNode {
    fn new(prefix: &str, number: u32) -> Self {
        let mut start = BytesStart::new(format!("{}row", prefix));
        start.push_attribute(("r", number.to_string().as_str()));
        Self {
            start,
            number,
            self_closing: true,
            items: Vec::new(),
            cells: HashMap::new(),
            grown: false,
        }
    }

    /// `implied` is the row number to use when `r` is absent
    fn parse(
        start: BytesStart<'static>,
        self_closing: bool,
        implied: u32,
        events: &mut impl Iterator<Item = Event<'static>>,
    ) -> Result<Self, Cause> {
        let number = match attr_value(&start, b"r")? {
            Some(text) => match text.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(Cause::message(format!("invalid row number '{}'", text))),
            },
            None => implied,
        };
        if number > MAX_ROWS {
            return Err(Cause::message(format!("row {} is beyond the last sheet row", number)));
        }

        let mut row = Self {
            start,
            number,
            self_closing,
            items: Vec::new(),
            cells: HashMap::new(),
            grown: false,
        };
        if self_closing {
            return Ok(row);
        }

        let mut depth = 0usize;
        let mut next_col = 0u32;
        loop {
            let ev = events
                .next()
                .ok_or_else(|| Cause::message("unterminated row element"))?;
            match ev {
                Event::Start(e) if depth == 0 && is_named(&e, b"c") => {
                    let implied = CellRef::new(number - 1, next_col);
                    let cell = CellNode::parse(e, false, implied, events)?;
                    next_col = cell.address.col + 1;
                    row.push_cell(cell)?;
                }
                Event::Empty(e) if depth == 0 && is_named(&e, b"c") => {
                    let implied = CellRef::new(number - 1, next_col);
                    let cell = CellNode::parse(e, true, implied, events)?;
                    next_col = cell.address.col + 1;
                    row.push_cell(cell)?;
                }
                Event::End(_) if depth == 0 => return Ok(row),
                Event::Start(e) => {
                    depth += 1;
                    row.items.push(RowItem::Other(Event::Start(e)));
                }
                Event::End(e) => {
                    depth -= 1;
                    row.items.push(RowItem::Other(Event::End(e)));
                }
                other => row.items.push(RowItem::Other(other)),
            }
        }
    }

    fn push_cell(&mut self, cell: CellNode) -> Result<(), Cause> {
        let at = cell.address;
        if at.row_number() != self.number {
            return Err(Cause::message(format!(
                "cell {} is placed in row {}",
                at, self.number
            )));
        }
        if self.cells.insert(at.col, self.items.len()).is_some() {
            return Err(Cause::message(format!("duplicate cell {} in row {}", at, self.number)));
        }
        self.items.push(RowItem::Cell(cell));
        Ok(())
    }

    /// Cell addresses in document order
    pub fn cell_addresses(&self) -> Vec<CellRef> {
        self.items
            .iter()
            .filter_map(|item| match item {
                RowItem::Cell(cell) => Some(cell.address),
                RowItem::Other(_) => None,
            })
            .collect()
    }

    /// Value of an attribute on the `<row>` element
    pub fn attribute(&self, key: &str) -> Option<String> {
        attr_value(&self.start, key.as_bytes()).ok().flatten()
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), Cause> {
        let start = if self.grown {
            without_attributes(&self.start, &[b"spans"])?
        } else {
            self.start.clone()
        };
        if self.self_closing && self.items.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start.borrow()))?;
        for item in &self.items {
            match item {
                RowItem::Cell(cell) => cell.write(writer)?,
                RowItem::Other(ev) => writer.write_event(ev.borrow())?,
            }
        }
        writer.write_event(Event::End(start.to_end()))?;
        Ok(())
    }
}

impl CellNode {
    fn new(prefix: &str, at: CellRef) -> Self {
        let mut start = BytesStart::new(format!("{}c", prefix));
        start.push_attribute(("r", at.to_a1().as_str()));
        Self {
            start,
            address: at,
            self_closing: true,
            children: Vec::new(),
        }
    }

    /// `implied` is the address to use when `r` is absent
    fn parse(
        start: BytesStart<'static>,
        self_closing: bool,
        implied: CellRef,
        events: &mut impl Iterator<Item = Event<'static>>,
    ) -> Result<Self, Cause> {
        let address = match attr_value(&start, b"r")? {
            Some(text) => CellRef::from_a1(&text)
                .ok_or_else(|| Cause::message(format!("invalid cell reference '{}'", text)))?,
            None if implied.col < MAX_COLS => implied,
            None => return Err(Cause::message(format!("row {} has too many cells", implied.row_number()))),
        };

        let mut children = Vec::new();
        if !self_closing {
            loop {
                let ev = events
                    .next()
                    .ok_or_else(|| Cause::message("unterminated cell element"))?;
                match ev {
                    Event::End(_) => break,
                    Event::Start(e) => {
                        let kind = ChildKind::of(&e);
                        let mut child_events = vec![Event::Start(e)];
                        collect_element(events, &mut child_events)?;
                        children.push(CellChild {
                            kind,
                            events: child_events,
                        });
                    }
                    Event::Empty(e) => children.push(CellChild {
                        kind: ChildKind::of(&e),
                        events: vec![Event::Empty(e)],
                    }),
                    other => children.push(CellChild {
                        kind: ChildKind::Other,
                        events: vec![other],
                    }),
                }
            }
        }

        Ok(Self {
            start,
            address,
            self_closing,
            children,
        })
    }

    /// Address from `r`, or implied by position in the row
    pub fn address(&self) -> CellRef {
        self.address
    }

    /// The `t` attribute, absent for plain numbers and blanks
    pub fn cell_type(&self) -> Option<String> {
        attr_value(&self.start, b"t").ok().flatten()
    }

    /// The `s` style index attribute
    pub fn style(&self) -> Option<String> {
        attr_value(&self.start, b"s").ok().flatten()
    }

    pub fn has_formula(&self) -> bool {
        self.children.iter().any(|c| c.kind == ChildKind::Formula)
    }

    /// Whether a value or inline-string node is present
    pub fn has_content(&self) -> bool {
        self.children
            .iter()
            .any(|c| matches!(c.kind, ChildKind::Value | ChildKind::InlineString))
    }

    /// Text of the `<v>` child
    pub fn value_text(&self) -> Option<String> {
        self.children
            .iter()
            .find(|c| c.kind == ChildKind::Value)
            .map(|c| element_text(&c.events))
    }

    /// Text of the `<is>` child, phonetic runs excluded
    pub fn inline_text(&self) -> Option<String> {
        self.children
            .iter()
            .find(|c| c.kind == ChildKind::InlineString)
            .map(|c| string_item_text(&c.events))
    }

    fn set_content(&mut self, content: &CellContent, prefix: &str) -> Result<(), Cause> {
        if let Some(problem) = content.problem() {
            return Err(Cause::message(problem));
        }

        let mut start = without_attributes(&self.start, &[b"t", b"cm", b"vm"])?;
        let (cell_type, child) = match content {
            CellContent::Blank => (None, None),
            CellContent::Number(n) => (Some("n"), Some(value_child(prefix, &format_number(*n)))),
            CellContent::Boolean(b) => (Some("b"), Some(value_child(prefix, if *b { "1" } else { "0" }))),
            CellContent::SharedString(idx) => (Some("s"), Some(value_child(prefix, &idx.to_string()))),
            CellContent::InlineString(text) => (Some("inlineStr"), Some(inline_child(prefix, text))),
        };
        if let Some(t) = cell_type {
            start.push_attribute(("t", t));
        }
        self.start = start;

        self.children.retain(|c| c.kind == ChildKind::Other);
        if self.children.iter().all(CellChild::is_whitespace) {
            self.children.clear();
        }
        // f, v and is precede any other child of <c>
        if let Some(child) = child {
            self.children.insert(0, child);
        }
        self.self_closing = self.children.is_empty();
        Ok(())
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), Cause> {
        if self.self_closing && self.children.is_empty() {
            writer.write_event(Event::Empty(self.start.borrow()))?;
            return Ok(());
        }
        writer.write_event(Event::Start(self.start.borrow()))?;
        for child in &self.children {
            for ev in &child.events {
                writer.write_event(ev.borrow())?;
            }
        }
        writer.write_event(Event::End(self.start.to_end()))?;
        Ok(())
    }
}

impl CellChild {
    fn is_whitespace(&self) -> bool {
        self.kind == ChildKind::Other
            && self.events.iter().all(|ev| match ev {
                Event::Text(t) => t.iter().all(|b| b.is_ascii_whitespace()),
                _ => false,
            })
    }
}

/// Copy of `start` minus the named attributes, others kept in order
fn without_attributes(start: &BytesStart<'_>, drop: &[&[u8]]) -> Result<BytesStart<'static>, Cause> {
    let mut out = BytesStart::new(element_name(start));
    for attr in start.attributes() {
        let attr = attr?;
        if drop.contains(&attr.key.as_ref()) {
            continue;
        }
        out.push_attribute(attr);
    }
    Ok(out)
}

/// Shortest decimal that reads back as the same number; `-0` is written as `0`
pub(crate) fn format_number(n: f64) -> String {
    if n == 0.0 { "0".to_string() } else { n.to_string() }
}

fn value_child(prefix: &str, text: &str) -> CellChild {
    let name = format!("{}v", prefix);
    CellChild {
        kind: ChildKind::Value,
        events: vec![
            Event::Start(BytesStart::new(name.clone())),
            Event::Text(BytesText::new(text).into_owned()),
            Event::End(BytesEnd::new(name)),
        ],
    }
}

fn inline_child(prefix: &str, text: &str) -> CellChild {
    let is_name = format!("{}is", prefix);
    let t_name = format!("{}t", prefix);
    let mut t_start = BytesStart::new(t_name.clone());
    if needs_space_preserve(text) {
        t_start.push_attribute(("xml:space", "preserve"));
    }
    CellChild {
        kind: ChildKind::InlineString,
        events: vec![
            Event::Start(BytesStart::new(is_name.clone())),
            Event::Start(t_start),
            Event::Text(BytesText::new(&encode_ooxml_text(text)).into_owned()),
            Event::End(BytesEnd::new(t_name)),
            Event::End(BytesEnd::new(is_name)),
        ],
    }
}

fn text_of(ev: &Event<'_>) -> Option<String> {
    match ev {
        Event::Text(t) => Some(
            t.unescape()
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned()),
        ),
        Event::CData(c) => Some(String::from_utf8_lossy(c).into_owned()),
        _ => None,
    }
}

/// All text inside an element
fn element_text(events: &[Event<'_>]) -> String {
    events.iter().filter_map(text_of).collect()
}

/// Text of `<t>` nodes in a string item (`<si>` or `<is>`), skipping `<rPh>`
/// runs, with `_xHHHH_` escapes decoded
pub(crate) fn string_item_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    let mut in_t = false;
    let mut phonetic_depth = 0usize;
    for ev in events {
        match ev {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => in_t = true,
                _ => {}
            },
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_t = false,
                _ => {}
            },
            other if in_t => {
                if let Some(s) = text_of(other) {
                    text.push_str(&s);
                }
            }
            _ => {}
        }
    }
    decode_ooxml_text(&text).into_owned()
}
