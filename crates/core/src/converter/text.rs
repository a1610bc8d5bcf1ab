//! Plain text and log files, one record per line.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

static ISO8601: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?")
        .expect("valid ISO 8601 pattern")
});

static EPOCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{10}(?:\.\d+)?\b").expect("valid epoch pattern"));

/// Longest line kept in full; the rest of the line is dropped.
const MAX_LINE_BYTES: u64 = 1024 * 1024;

pub struct TextConverter;

#[async_trait]
impl Converter for TextConverter {
    fn name(&self) -> &str {
        "text"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Txt]
    }

    async fn convert(&self, task: &ConversionTask, ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        let max_lines = ctx.config().max_records;
        run_blocking(move || {
            let file = File::open(&path).map_err(|e| ConverterError::unreadable(&path, e))?;
            read_lines(BufReader::new(file), max_lines, MAX_LINE_BYTES)
                .map_err(|e| ConverterError::unreadable(&path, e))
        })
        .await
    }
}

pub(crate) fn read_lines<R: BufRead>(
    mut reader: R,
    max_lines: usize,
    max_line_bytes: u64,
) -> io::Result<Value> {
    let mut lines = Vec::new();
    let mut truncated = false;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if (&mut reader).take(max_line_bytes).read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if lines.len() >= max_lines {
            truncated = true;
            break;
        }
        let mut cut = false;
        if buf.len() as u64 >= max_line_bytes && buf.last() != Some(&b'\n') {
            let next = reader.fill_buf()?.first().copied();
            match next {
                Some(b'\n') => reader.consume(1),
                Some(_) => {
                    skip_rest_of_line(&mut reader)?;
                    cut = true;
                    truncated = true;
                }
                None => {}
            }
        }

        let raw = String::from_utf8_lossy(&buf);
        let mut text = raw.trim_end_matches(['\n', '\r']);
        if lines.is_empty() {
            text = text.trim_start_matches('\u{feff}');
        }

        let mut line = Map::new();
        line.insert("line_number".into(), json!(lines.len() + 1));
        line.insert("text".into(), Value::String(text.to_string()));
        if let Some(ts) = extract_timestamp(text) {
            let format = ts["format"].clone();
            line.insert("timestamp".into(), ts);
            line.insert("timestamp_format".into(), format);
        }
        if cut {
            line.insert("truncated".into(), Value::Bool(true));
        }
        lines.push(Value::Object(line));
    }

    Ok(json!({
        "line_count": lines.len(),
        "lines": lines,
        "truncated": truncated,
    }))
}

/// Discards input up to and including the next newline without buffering it.
fn skip_rest_of_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

/// Finds the first ISO 8601 or epoch timestamp on a line.
pub(crate) fn extract_timestamp(text: &str) -> Option<Value> {
    if let Some(m) = ISO8601.find(text) {
        if let Some(value) = parse_iso8601(m.as_str()) {
            return Some(json!({"value": value, "raw": m.as_str(), "format": "iso8601"}));
        }
    }

    let m = EPOCH.find(text)?;
    let secs: f64 = m.as_str().parse().ok()?;
    let at = DateTime::<Utc>::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)?;
    Some(json!({
        "value": at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        "raw": m.as_str(),
        "format": "epoch",
    }))
}

fn parse_iso8601(raw: &str) -> Option<String> {
    let normalized = raw.replacen(' ', "T", 1);
    if let Ok(at) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(at.to_rfc3339_opts(SecondsFormat::AutoSi, false));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|at| at.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Value {
        read_lines(text.as_bytes(), 1000, MAX_LINE_BYTES).unwrap()
    }

    #[test]
    fn test_line_numbering() {
        let data = lines("Line 1\nLine 2\r\nLine 3\n");
        assert_eq!(data["line_count"], 3);
        assert_eq!(data["lines"][0]["line_number"], 1);
        assert_eq!(data["lines"][0]["text"], "Line 1");
        assert_eq!(data["lines"][1]["text"], "Line 2");
        assert!(data["lines"][0].get("timestamp").is_none());
    }

    #[test]
    fn test_last_line_without_newline() {
        let data = lines("a\nb");
        assert_eq!(data["line_count"], 2);
        assert_eq!(data["lines"][1]["text"], "b");
    }

    #[test]
    fn test_iso_timestamp() {
        let data = lines("2024-01-15T10:30:00Z - Log message here\n");
        let line = &data["lines"][0];
        assert_eq!(line["timestamp_format"], "iso8601");
        assert_eq!(line["timestamp"]["raw"], "2024-01-15T10:30:00Z");
        assert_eq!(line["timestamp"]["value"], "2024-01-15T10:30:00+00:00");
    }

    #[test]
    fn test_naive_iso_with_space() {
        let ts = extract_timestamp("[2023-03-01 08:00:01.250] started").unwrap();
        assert_eq!(ts["value"], "2023-03-01T08:00:01.250");
        assert_eq!(ts["raw"], "2023-03-01 08:00:01.250");
    }

    #[test]
    fn test_epoch_timestamp() {
        let ts = extract_timestamp("ts=1700000000 user=root").unwrap();
        assert_eq!(ts["format"], "epoch");
        assert_eq!(ts["value"], "2023-11-14T22:13:20Z");
        assert!(extract_timestamp("pid 12345").is_none());
    }

    #[test]
    fn test_invalid_bytes_and_cap() {
        let data = read_lines(&b"ok\n\xFF\xFE\nthird\n"[..], 2, MAX_LINE_BYTES).unwrap();
        assert_eq!(data["line_count"], 2);
        assert_eq!(data["truncated"], true);
        assert_eq!(data["lines"][1]["text"], "\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn test_overlong_line_is_cut() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nnext\n");
        let data = read_lines(&input[..], 10, 16).unwrap();

        assert_eq!(data["line_count"], 2);
        assert_eq!(data["truncated"], true);
        assert_eq!(data["lines"][0]["text"], "x".repeat(16));
        assert_eq!(data["lines"][0]["truncated"], true);
        assert_eq!(data["lines"][1]["text"], "next");
        assert!(data["lines"][1].get("truncated").is_none());
    }

    #[test]
    fn test_line_at_exact_cap_is_kept() {
        let data = read_lines(&b"abcd\nef\nwxyz"[..], 10, 4).unwrap();
        assert_eq!(data["line_count"], 3);
        assert_eq!(data["lines"][0]["text"], "abcd");
        assert_eq!(data["lines"][1]["text"], "ef");
        assert_eq!(data["lines"][2]["text"], "wxyz");
        assert_eq!(data["truncated"], false);
    }
}
