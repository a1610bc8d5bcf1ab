//! JSON documents are validated and embedded as-is.

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

pub struct JsonConverter;

#[async_trait]
impl Converter for JsonConverter {
    fn name(&self) -> &str {
        "json"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Json]
    }

    async fn convert(&self, task: &ConversionTask, _ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        run_blocking(move || {
            let bytes = std::fs::read(&path).map_err(|e| ConverterError::unreadable(&path, e))?;
            parse_json(&bytes)
        })
        .await
    }
}

pub(crate) fn parse_json(bytes: &[u8]) -> Result<Value, ConverterError> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    serde_json::from_slice(body).map_err(|e| ConverterError::corrupt(format!("invalid JSON: {e}")))
}
