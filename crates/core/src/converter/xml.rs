//! XML documents as an element tree.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

const MAX_NESTING: usize = 512;

pub struct XmlConverter;

#[async_trait]
impl Converter for XmlConverter {
    fn name(&self) -> &str {
        "xml"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Xml]
    }

    async fn convert(&self, task: &ConversionTask, _ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        run_blocking(move || {
            let bytes = std::fs::read(&path).map_err(|e| ConverterError::unreadable(&path, e))?;
            let text = String::from_utf8_lossy(&bytes);
            parse_xml(&text)
        })
        .await
    }
}

#[derive(Debug, Default)]
struct Element {
    tag: String,
    attributes: Map<String, Value>,
    text: String,
    children: Vec<Element>,
    tail: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, ConverterError> {
        let mut attributes = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(ConverterError::corrupt)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(ConverterError::corrupt)?;
            attributes.insert(key, Value::String(value.into_owned()));
        }
        Ok(Self {
            tag: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Default::default()
        })
    }

    /// Appends character data after the last child, or as leading text.
    fn push_text(&mut self, s: &str) {
        match self.children.last_mut() {
            Some(child) => child.tail.push_str(s),
            None => self.text.push_str(s),
        }
    }

    fn into_value(self) -> Value {
        let mut obj = Map::new();
        obj.insert("tag".into(), Value::String(self.tag));
        obj.insert("attributes".into(), Value::Object(self.attributes));
        obj.insert("text".into(), stripped(&self.text));
        if !self.children.is_empty() {
            let children = self.children.into_iter().map(Element::into_value).collect();
            obj.insert("children".into(), Value::Array(children));
        }
        if !self.tail.trim().is_empty() {
            obj.insert("tail".into(), stripped(&self.tail));
        }
        Value::Object(obj)
    }
}

fn stripped(s: &str) -> Value {
    match s.trim() {
        "" => Value::Null,
        t => Value::String(t.to_string()),
    }
}

pub(crate) fn parse_xml(text: &str) -> Result<Value, ConverterError> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ConverterError::corrupt(format!(
                "invalid XML at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(start) => {
                if stack.len() >= MAX_NESTING {
                    return Err(ConverterError::corrupt("XML nesting is too deep"));
                }
                stack.push(Element::from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ConverterError::corrupt("unexpected closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let s = t.unescape().map_err(ConverterError::corrupt)?;
                    top.push_text(&s);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ConverterError::corrupt(format!("unclosed element <{}>", open.tag)));
    }
    root.map(Element::into_value)
        .ok_or_else(|| ConverterError::corrupt("document has no root element"))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ConverterError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ConverterError::corrupt("junk after document element")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ErrorKind;

    #[test]
    fn test_tree_shape() {
        let data = parse_xml(r#"<?xml version="1.0"?><root><item id="1">Value</item></root>"#)
            .unwrap();
        assert_eq!(data["tag"], "root");
        assert_eq!(data["text"], Value::Null);
        let children = data["children"].as_array().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["tag"], "item");
        assert_eq!(children[0]["attributes"]["id"], "1");
        assert_eq!(children[0]["text"], "Value");
        assert!(children[0].get("children").is_none());
    }

    #[test]
    fn test_mixed_content_tail() {
        let data = parse_xml("<p>Hello <b>bold</b> world &amp; more<br/></p>").unwrap();
        assert_eq!(data["text"], "Hello");
        assert_eq!(data["children"][0]["tail"], "world & more");
        assert!(data["children"][1].get("tail").is_none());
    }

    #[test]
    fn test_cdata_is_text() {
        let data = parse_xml("<s><![CDATA[a < b]]></s>").unwrap();
        assert_eq!(data["text"], "a < b");
    }

    #[test]
    fn test_mismatched_tags_are_corrupt() {
        let err = parse_xml("<root><unclosed></root>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptInput);
    }

    #[test]
    fn test_unclosed_and_empty_documents() {
        assert_eq!(parse_xml("<a><b>").unwrap_err().kind(), ErrorKind::CorruptInput);
        assert_eq!(parse_xml("   ").unwrap_err().kind(), ErrorKind::CorruptInput);
        assert_eq!(parse_xml("<a/><b/>").unwrap_err().kind(), ErrorKind::CorruptInput);
    }
}
