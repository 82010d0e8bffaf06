//! XML to canonical tree, and back.
//!
//! The root element's name is dropped and its content becomes the tree. Child
//! elements turn into object fields, siblings sharing a name collapse into an
//! array, attributes are plain fields, and an element without children or
//! attributes becomes its (possibly empty) text. Text mixed with child elements
//! is kept under the `""` key.

use quick_xml::{
    events::{BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use serde_json::{Map, Value};
use tracing::*;

use crate::{error::Location, Error, Result};

/// Field name used for text that sits next to child elements.
const TEXT_KEY: &str = "";
/// Element name used for items of an array that has no field name of its own.
const ITEM_ELEMENT: &str = "item";

struct Element {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>, raw: &str, position: usize) -> Result<Element> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut fields = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| syntax_error(raw, position, e))?;
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            if attribute.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let value = attribute
                .unescape_value()
                .map_err(|e| syntax_error(raw, position, e))?;
            insert_field(&mut fields, key, Value::String(value.into_owned()));
        }
        Ok(Element {
            name,
            fields,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let Element {
            name,
            mut fields,
            text,
        } = self;
        if fields.is_empty() {
            return (name, Value::String(text));
        }
        if !text.is_empty() {
            fields.insert(TEXT_KEY.to_string(), Value::String(text));
        }
        (name, Value::Object(fields))
    }
}

/// Values produced by elements are never arrays, so an existing array is always a
/// run of repeated siblings.
fn insert_field(fields: &mut Map<String, Value>, key: String, value: Value) {
    match fields.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(key, value);
        }
    }
}

/// Parse an XML document into an uncoerced tree of strings and objects.
pub fn parse(raw: &str) -> Result<Value> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(syntax_error(raw, reader.error_position() as usize, e)),
        };
        let position = reader.buffer_position() as usize;
        match event {
            Event::Start(start) => stack.push(Element::open(&start, raw, position)?),
            Event::Empty(start) => {
                let (name, value) = Element::open(&start, raw, position)?.close();
                attach(&mut stack, &mut root, name, value, raw, position)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| syntax_error(raw, position, "unexpected closing tag"))?;
                let (name, value) = element.close();
                attach(&mut stack, &mut root, name, value, raw, position)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| syntax_error(raw, position, e))?;
                if let Some(element) = stack.last_mut() {
                    element.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(element) = stack.last_mut() {
                    element
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(syntax_error(
            raw,
            raw.len(),
            format!("element <{}> is never closed", open.name),
        ));
    }
    root.ok_or_else(|| Error::invalid("XML document has no root element"))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Value>,
    name: String,
    value: Value,
    raw: &str,
    position: usize,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => insert_field(&mut parent.fields, name, value),
        None if root.is_none() => *root = Some(value),
        None => return Err(syntax_error(raw, position, "more than one root element")),
    }
    Ok(())
}

fn syntax_error(raw: &str, offset: usize, cause: impl std::fmt::Display) -> Error {
    let location = location_of(raw, offset);
    warn!("failed to parse XML spec at {location}: {cause}");
    Error::invalid_at(format!("failed to parse XML: {cause}"), Some(location))
}

fn location_of(raw: &str, offset: usize) -> Location {
    let before = &raw.as_bytes()[..offset.min(raw.len())];
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |newline| newline + 1);
    Location {
        line: before.iter().filter(|&&b| b == b'\n').count() + 1,
        column: before.len() - line_start + 1,
    }
}

/// Write a tree as an XML document whose root element is `root`.
pub fn write(tree: &Value, root: &str) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, root, tree)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::invalid(format!("failed to write XML: {e}")))
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null => emit(writer, Event::Empty(BytesStart::new(name))),
        Value::Object(fields) => {
            emit(writer, Event::Start(BytesStart::new(name)))?;
            if let Some(text) = fields.get(TEXT_KEY).and_then(leaf_text) {
                emit(writer, Event::Text(BytesText::new(&text)))?;
            }
            for (key, child) in fields.iter().filter(|(key, _)| key.as_str() != TEXT_KEY) {
                write_field(writer, key, child)?;
            }
            emit(writer, Event::End(BytesEnd::new(name)))
        }
        Value::Array(items) => {
            emit(writer, Event::Start(BytesStart::new(name)))?;
            for item in items {
                write_element(writer, ITEM_ELEMENT, item)?;
            }
            emit(writer, Event::End(BytesEnd::new(name)))
        }
        scalar => {
            let text = leaf_text(scalar).unwrap_or_default();
            emit(writer, Event::Start(BytesStart::new(name)))?;
            emit(writer, Event::Text(BytesText::new(&text)))?;
            emit(writer, Event::End(BytesEnd::new(name)))
        }
    }
}

/// Text content of a scalar leaf. Coerced numbers and booleans are written back
/// in the form the reader coerces again.
fn leaf_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Arrays under a field name repeat the element instead of nesting.
fn write_field(writer: &mut Writer<Vec<u8>>, key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| write_element(writer, key, item)),
        other => write_element(writer, key, other),
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::invalid(format!("failed to write XML: {e}")))
}
