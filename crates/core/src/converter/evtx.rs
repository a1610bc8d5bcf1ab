//! Windows event logs.

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::capabilities::BackendCapabilities;
use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

pub struct EvtxConverter;

#[async_trait]
impl Converter for EvtxConverter {
    fn name(&self) -> &str {
        "evtx"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Evtx]
    }

    fn availability(&self) -> Result<(), ConverterError> {
        if BackendCapabilities::detect().evtx {
            Ok(())
        } else {
            Err(unavailable())
        }
    }

    async fn convert(&self, task: &ConversionTask, ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        let max_records = ctx.config().max_records;
        run_blocking(move || backend::parse(&path, max_records)).await
    }
}

#[cfg_attr(feature = "evtx", allow(dead_code))]
fn unavailable() -> ConverterError {
    ConverterError::missing_dependency("evtx", "built without the `evtx` feature")
}

#[cfg(feature = "evtx")]
mod backend {
    use ::evtx::EvtxParser;
    use serde_json::{json, Map, Value};
    use std::path::Path;
    use tracing::debug;

    use super::ConverterError;

    pub(super) fn parse(path: &Path, max_records: usize) -> Result<Value, ConverterError> {
        if let Err(e) = std::fs::metadata(path) {
            return Err(ConverterError::unreadable(path, e));
        }
        let mut parser = EvtxParser::from_path(path)
            .map_err(|e| ConverterError::corrupt(format!("not an EVTX file: {e}")))?;

        let mut records = Vec::new();
        let mut parse_errors = 0usize;
        let mut truncated = false;

        for record in parser.records_json_value() {
            if records.len() >= max_records {
                truncated = true;
                break;
            }
            match record {
                Ok(record) => records.push(flatten(
                    record.event_record_id,
                    &record.timestamp.to_rfc3339(),
                    record.data,
                )),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable EVTX record");
                    parse_errors += 1;
                }
            }
        }

        if records.is_empty() && parse_errors > 0 {
            return Err(ConverterError::corrupt(format!(
                "none of {parse_errors} EVTX records could be parsed"
            )));
        }

        Ok(json!({
            "record_count": records.len(),
            "records": records,
            "parse_errors": parse_errors,
            "truncated": truncated,
        }))
    }

    /// Lifts the commonly queried `System` fields next to the full event.
    pub(super) fn flatten(record_id: u64, timestamp: &str, event: Value) -> Value {
        let system = &event["Event"]["System"];

        let event_id = match &system["EventID"] {
            Value::Object(obj) => obj.get("#text").cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let time_created = system["TimeCreated"]["#attributes"]["SystemTime"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| timestamp.to_string());
        let provider = system["Provider"]["#attributes"]["Name"].clone();
        let data = match (&event["Event"]["EventData"], &event["Event"]["UserData"]) {
            (Value::Null, user) => user.clone(),
            (event_data, _) => event_data.clone(),
        };

        let mut out = Map::new();
        out.insert("EventID".into(), event_id);
        out.insert("TimeCreated".into(), Value::String(time_created));
        out.insert("EventRecordID".into(), json!(record_id));
        out.insert("Channel".into(), system["Channel"].clone());
        out.insert("Computer".into(), system["Computer"].clone());
        out.insert("Provider".into(), provider);
        out.insert("data".into(), data);
        out.insert("event".into(), event);
        Value::Object(out)
    }
}

#[cfg(not(feature = "evtx"))]
mod backend {
    use serde_json::Value;
    use std::path::Path;

    use super::ConverterError;

    pub(super) fn parse(_path: &Path, _max_records: usize) -> Result<Value, ConverterError> {
        Err(super::unavailable())
    }
}
