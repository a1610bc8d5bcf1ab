//! Word documents: body paragraphs with their style names.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";

pub struct DocxConverter;

#[async_trait]
impl Converter for DocxConverter {
    fn name(&self) -> &str {
        "docx"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Docx]
    }

    async fn convert(&self, task: &ConversionTask, ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        let max_part_bytes = ctx.config().max_entry_bytes;
        run_blocking(move || {
            let file = File::open(&path).map_err(|e| ConverterError::unreadable(&path, e))?;
            let mut archive = zip::ZipArchive::new(file)
                .map_err(|e| ConverterError::corrupt(format!("not a DOCX container: {e}")))?;

            let document = read_part(&mut archive, DOCUMENT_PART, max_part_bytes)?
                .ok_or_else(|| ConverterError::corrupt("DOCX has no word/document.xml"))?;
            let styles = match read_part(&mut archive, STYLES_PART, max_part_bytes)? {
                Some(xml) => parse_styles(&xml)?,
                None => StyleTable::default(),
            };
            parse_document(&document, &styles)
        })
        .await
    }
}

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    max_bytes: u64,
) -> Result<Option<String>, ConverterError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ConverterError::corrupt(format!("cannot open {name}: {e}"))),
    };
    if part.size() > max_bytes {
        return Err(ConverterError::corrupt(format!(
            "{name} is larger than {max_bytes} bytes"
        )));
    }
    let mut bytes = Vec::new();
    part.by_ref()
        .take(max_bytes)
        .read_to_end(&mut bytes)
        .map_err(|e| ConverterError::corrupt(format!("cannot inflate {name}: {e}")))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Style id to display name, plus the default paragraph style.
#[derive(Debug, Default)]
pub(crate) struct StyleTable {
    names: HashMap<String, String>,
    default_paragraph: Option<String>,
}

impl StyleTable {
    fn resolve(&self, style_id: Option<&str>) -> Option<String> {
        match style_id {
            Some(id) => Some(self.names.get(id).cloned().unwrap_or_else(|| id.to_string())),
            None => self.default_paragraph.clone(),
        }
    }
}

fn attr(start: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parent_is_body(path: &[Vec<u8>]) -> bool {
    path.last().is_some_and(|parent| parent == b"body")
}

fn xml_error(e: quick_xml::Error) -> ConverterError {
    ConverterError::corrupt(format!("malformed DOCX XML: {e}"))
}

pub(crate) fn parse_styles(xml: &str) -> Result<StyleTable, ConverterError> {
    let mut reader = Reader::from_str(xml);
    let mut table = StyleTable::default();
    // (style id, is default paragraph style)
    let mut current: Option<(String, bool)> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"style" => {
                    current = attr(&e, b"styleId").map(|id| {
                        let is_default = attr(&e, b"type").as_deref() == Some("paragraph")
                            && matches!(attr(&e, b"default").as_deref(), Some("1" | "true"));
                        (id, is_default)
                    });
                }
                b"name" => {
                    if let (Some((id, is_default)), Some(name)) = (&current, attr(&e, b"val")) {
                        if *is_default {
                            table.default_paragraph = Some(name.clone());
                        }
                        table.names.insert(id.clone(), name);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"style" => current = None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(table)
}

pub(crate) fn parse_document(xml: &str, styles: &StyleTable) -> Result<Value, ConverterError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut paragraph_number = 0usize;
    let mut in_paragraph = false;
    let mut in_text = false;
    let mut text = String::new();
    let mut style_id: Option<String> = None;
    let mut paragraphs = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"p" if parent_is_body(&path) => {
                        in_paragraph = true;
                        paragraph_number += 1;
                        text.clear();
                        style_id = None;
                    }
                    b"t" if in_paragraph => in_text = true,
                    _ => {}
                }
                path.push(local);
            }
            Event::Empty(e) if in_paragraph => match e.local_name().as_ref() {
                b"pStyle" => style_id = attr(&e, b"val"),
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"p" && parent_is_body(&path) {
                    paragraph_number += 1;
                }
            }
            Event::Text(t) if in_text => {
                text.push_str(&t.unescape().map_err(xml_error)?);
            }
            Event::End(_) => {
                let local = path.pop().unwrap_or_default();
                match local.as_slice() {
                    b"t" => in_text = false,
                    b"p" if in_paragraph && parent_is_body(&path) => {
                        in_paragraph = false;
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            paragraphs.push(json!({
                                "paragraph_number": paragraph_number,
                                "text": trimmed,
                                "style": styles.resolve(style_id.as_deref()),
                            }));
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(json!({
        "paragraph_count": paragraphs.len(),
        "paragraphs": paragraphs,
    }))
}
