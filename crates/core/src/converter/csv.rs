//! Delimited text tables.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

const SAMPLE_LEN: u64 = 4096;
const CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
const EXTRA_KEY: &str = "_extra";

pub struct CsvConverter;

#[async_trait]
impl Converter for CsvConverter {
    fn name(&self) -> &str {
        "csv"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Csv]
    }

    async fn convert(&self, task: &ConversionTask, ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        let max_rows = ctx.config().max_records;
        run_blocking(move || {
            let unreadable = |e| ConverterError::unreadable(&path, e);
            let mut file = File::open(&path).map_err(unreadable)?;

            let mut sample = Vec::new();
            (&mut file).take(SAMPLE_LEN).read_to_end(&mut sample).map_err(unreadable)?;
            file.seek(SeekFrom::Start(0)).map_err(unreadable)?;

            parse_csv(BufReader::new(file), sniff_delimiter(&sample), max_rows)
        })
        .await
    }
}

/// Picks the candidate that occurs most often, outside quotes, on the header line.
pub(crate) fn sniff_delimiter(sample: &[u8]) -> u8 {
    let header = sample.split(|&b| b == b'\n').next().unwrap_or_default();
    let mut counts = [0usize; CANDIDATES.len()];
    let mut quoted = false;
    for &b in header {
        if b == b'"' {
            quoted = !quoted;
            continue;
        }
        if quoted {
            continue;
        }
        if let Some(i) = CANDIDATES.iter().position(|&c| c == b) {
            counts[i] += 1;
        }
    }

    let mut best = 0;
    for i in 1..CANDIDATES.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    CANDIDATES[best]
}

pub(crate) fn parse_csv<R: Read>(
    input: R,
    delimiter: u8,
    max_rows: usize,
) -> Result<Value, ConverterError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(input);

    let column_names: Vec<String> = reader
        .byte_headers()
        .map_err(|e| ConverterError::corrupt(format!("invalid CSV header: {e}")))?
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let name = String::from_utf8_lossy(field).into_owned();
            if i == 0 {
                name.trim_start_matches('\u{feff}').to_string()
            } else {
                name
            }
        })
        .collect();

    let mut rows = Vec::new();
    let mut truncated = false;
    for record in reader.byte_records() {
        let record = record.map_err(|e| ConverterError::corrupt(format!("invalid CSV row: {e}")))?;
        if rows.len() >= max_rows {
            truncated = true;
            break;
        }

        let mut row = Map::new();
        for (i, name) in column_names.iter().enumerate() {
            let value = record
                .get(i)
                .map(|f| Value::String(String::from_utf8_lossy(f).into_owned()))
                .unwrap_or(Value::Null);
            row.insert(name.clone(), value);
        }
        if record.len() > column_names.len() {
            let extra: Vec<Value> = record
                .iter()
                .skip(column_names.len())
                .map(|f| Value::String(String::from_utf8_lossy(f).into_owned()))
                .collect();
            row.insert(EXTRA_KEY.to_string(), Value::Array(extra));
        }
        rows.push(Value::Object(row));
    }

    Ok(json!({
        "column_names": column_names,
        "row_count": rows.len(),
        "rows": rows,
        "delimiter": (delimiter as char).to_string(),
        "truncated": truncated,
    }))
}
