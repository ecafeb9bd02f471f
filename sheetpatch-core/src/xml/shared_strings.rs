//! Shared-string table (`xl/sharedStrings.xml`)

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::collections::HashMap;

use super::sheet::string_item_text;
use super::{
    attr_value, element_name, encode_ooxml_text, local_name, needs_space_preserve, prefix_of, read_events,
};
use crate::error::Cause;

/// Parsed shared-string table with append-only interning
#[derive(Debug, Clone)]
pub struct SharedStringTable {
    head: Vec<Event<'static>>,
    start: BytesStart<'static>,
    self_closing: bool,
    body: Vec<Event<'static>>,
    tail: Vec<Event<'static>>,
    prefix: String,
    texts: Vec<String>,
    /// text -> first entry carrying it
    lookup: HashMap<String, usize>,
    count: u64,
    unique_count: u64,
    appended: usize,
    reused: usize,
}

impl SharedStringTable {
    pub fn parse(xml: &[u8]) -> Result<Self, Cause> {
        let mut events = read_events(xml)?.into_iter();

        let mut head = Vec::new();
        let (start, self_closing) = loop {
            match events.next() {
                Some(Event::Start(e)) if local_name(e.name().as_ref()) == b"sst" => break (e, false),
                Some(Event::Empty(e)) if local_name(e.name().as_ref()) == b"sst" => break (e, true),
                Some(ev) => head.push(ev),
                None => return Err(Cause::message("shared strings part has no sst element")),
            }
        };

        let mut body = Vec::new();
        if !self_closing {
            let mut depth = 0usize;
            loop {
                let ev = events
                    .next()
                    .ok_or_else(|| Cause::message("unterminated sst element"))?;
                match &ev {
                    Event::Start(_) => depth += 1,
                    Event::End(_) if depth == 0 => break,
                    Event::End(_) => depth -= 1,
                    _ => {}
                }
                body.push(ev);
            }
        }

        let texts = entry_texts(&body);
        let mut lookup = HashMap::new();
        for (idx, text) in texts.iter().enumerate() {
            lookup.entry(text.clone()).or_insert(idx);
        }

        let count = parse_count(&start, b"count")?.unwrap_or(texts.len() as u64);
        let unique_count = parse_count(&start, b"uniqueCount")?.unwrap_or(texts.len() as u64);

        Ok(Self {
            head,
            prefix: prefix_of(&start),
            start,
            self_closing,
            body,
            tail: events.collect(),
            texts,
            lookup,
            count,
            unique_count,
            appended: 0,
            reused: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Text of entry `idx`
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.texts.get(idx).map(String::as_str)
    }

    /// Index of the first entry with exactly this text
    pub fn find(&self, text: &str) -> Option<usize> {
        self.lookup.get(text).copied()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn unique_count(&self) -> u64 {
        self.unique_count
    }

    /// Entries appended since parsing
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Text writes that reused an existing entry
    pub fn reused(&self) -> usize {
        self.reused
    }

    /// Whether the part must be rewritten
    pub fn is_dirty(&self) -> bool {
        self.appended > 0 || self.reused > 0
    }

    /// Record one reference to `text` and return its index, appending an
    /// entry when no entry has the same text.
    pub fn intern(&mut self, text: &str) -> usize {
        self.count += 1;
        if let Some(idx) = self.find(text) {
            self.reused += 1;
            return idx;
        }

        let idx = self.texts.len();
        self.body.extend(string_item(&self.prefix, text));
        self.texts.push(text.to_string());
        self.lookup.insert(text.to_string(), idx);
        self.unique_count += 1;
        self.appended += 1;
        idx
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, Cause> {
        let mut start = BytesStart::new(element_name(&self.start));
        let mut has_count = false;
        let mut has_unique = false;
        let count = self.count.to_string();
        let unique_count = self.unique_count.to_string();
        for attr in self.start.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"count" => {
                    start.push_attribute(("count", count.as_str()));
                    has_count = true;
                }
                b"uniqueCount" => {
                    start.push_attribute(("uniqueCount", unique_count.as_str()));
                    has_unique = true;
                }
                _ => start.push_attribute(attr),
            }
        }
        if !has_count {
            start.push_attribute(("count", count.as_str()));
        }
        if !has_unique {
            start.push_attribute(("uniqueCount", unique_count.as_str()));
        }

        let mut writer = Writer::new(Vec::new());
        for ev in &self.head {
            writer.write_event(ev.borrow())?;
        }
        if self.self_closing && self.body.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start.borrow()))?;
            for ev in &self.body {
                writer.write_event(ev.borrow())?;
            }
            writer.write_event(Event::End(start.to_end()))?;
        }
        for ev in &self.tail {
            writer.write_event(ev.borrow())?;
        }
        Ok(writer.into_inner())
    }
}

fn parse_count(start: &BytesStart<'_>, key: &[u8]) -> Result<Option<u64>, Cause> {
    Ok(attr_value(start, key)?.and_then(|v| v.trim().parse().ok()))
}

/// Text of each top-level `<si>` in order
fn entry_texts(body: &[Event<'static>]) -> Vec<String> {
    let mut texts = Vec::new();
    let mut item_start: Option<usize> = None;
    let mut depth = 0usize;
    for (idx, ev) in body.iter().enumerate() {
        match ev {
            Event::Start(e) => {
                if depth == 0 && local_name(e.name().as_ref()) == b"si" {
                    item_start = Some(idx);
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 0 && local_name(e.name().as_ref()) == b"si" => {
                texts.push(String::new());
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0
                    && let Some(first) = item_start.take()
                {
                    texts.push(string_item_text(&body[first..=idx]));
                }
            }
            _ => {}
        }
    }
    texts
}

fn string_item(prefix: &str, text: &str) -> Vec<Event<'static>> {
    let si = format!("{}si", prefix);
    let t = format!("{}t", prefix);
    let mut t_start = BytesStart::new(t.clone());
    if needs_space_preserve(text) {
        t_start.push_attribute(("xml:space", "preserve"));
    }
    vec![
        Event::Start(BytesStart::new(si.clone())),
        Event::Start(t_start),
        Event::Text(BytesText::new(&encode_ooxml_text(text)).into_owned()),
        Event::End(BytesEnd::new(t)),
        Event::End(BytesEnd::new(si)),
    ]
}
