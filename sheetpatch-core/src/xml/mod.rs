//! Typed views over the worksheet and shared-string XML parts

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

use crate::error::Cause;

pub mod shared_strings;
pub mod sheet;

pub use shared_strings::SharedStringTable;
pub use sheet::{CellContent, SheetDocument, WriteEffect};

/// Strip a namespace prefix (`x:row` -> `row`)
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Namespace prefix including the colon (`x:sheetData` -> `x:`), empty when unprefixed
pub(crate) fn prefix_of(start: &BytesStart<'_>) -> String {
    let name = start.name();
    let name = name.as_ref();
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => String::from_utf8_lossy(&name[..=idx]).into_owned(),
        None => String::new(),
    }
}

pub(crate) fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

/// Unescaped value of the attribute whose local name is `key`
pub(crate) fn attr_value(start: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, Cause> {
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Text needs `xml:space="preserve"` when it starts or ends with whitespace
pub(crate) fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

/// Characters allowed in XML 1.0 documents
pub(crate) fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn escaped_char_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"_x([0-9A-Fa-f]{4})_").expect("static escape pattern is valid"))
}

/// Text as stored in a `<t>` node. Carriage returns become `_x000D_` since
/// XML readers turn a literal CR into LF, and a literal `_xHHHH_` gets its
/// underscore escaped so it is not decoded as a character.
pub(crate) fn encode_ooxml_text(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') && !escaped_char_pattern().is_match(text) {
        return Cow::Borrowed(text);
    }
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 8);
    for (idx, ch) in text.char_indices() {
        match ch {
            '\r' => out.push_str("_x000D_"),
            '_' if starts_escape(&bytes[idx..]) => out.push_str("_x005F_"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// `bytes` begins with `_xHHHH_`
fn starts_escape(bytes: &[u8]) -> bool {
    bytes.len() >= 7
        && bytes[0] == b'_'
        && bytes[1] == b'x'
        && bytes[2..6].iter().all(u8::is_ascii_hexdigit)
        && bytes[6] == b'_'
}

/// Inverse of [`encode_ooxml_text`]: `_xHHHH_` sequences become their character
pub(crate) fn decode_ooxml_text(text: &str) -> Cow<'_, str> {
    escaped_char_pattern().replace_all(text, |caps: &Captures<'_>| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    })
}

/// Read a part into owned events, keeping whitespace untouched
pub(crate) fn read_events(xml: &[u8]) -> Result<Vec<Event<'static>>, Cause> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut events = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            ev => events.push(ev.into_owned()),
        }
        buf.clear();
    }
    Ok(events)
}
