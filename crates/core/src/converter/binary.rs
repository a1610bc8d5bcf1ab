//! Fallback for anything unrecognised: size, a hex header and an optional preview.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::fs::File;
use std::io::Read;

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

const HEADER_LEN: u64 = 16;

pub struct BinaryConverter;

#[async_trait]
impl Converter for BinaryConverter {
    fn name(&self) -> &str {
        "binary"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Unknown]
    }

    async fn convert(&self, task: &ConversionTask, ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        let preview_limit = ctx
            .config()
            .include_base64
            .then_some(ctx.config().base64_limit);

        run_blocking(move || {
            let unreadable = |e| ConverterError::unreadable(&path, e);
            let mut file = File::open(&path).map_err(unreadable)?;
            let size = file.metadata().map_err(unreadable)?.len();

            let mut contents = Vec::new();
            let wanted = match preview_limit {
                Some(limit) if size <= limit => size,
                _ => HEADER_LEN,
            };
            (&mut file)
                .take(wanted)
                .read_to_end(&mut contents)
                .map_err(unreadable)?;

            Ok(describe(size, &contents, preview_limit))
        })
        .await
    }
}

/// `contents` holds either the whole file (when a preview fits) or its header.
pub(crate) fn describe(size: u64, contents: &[u8], preview_limit: Option<u64>) -> Value {
    let header: String = contents
        .iter()
        .take(HEADER_LEN as usize)
        .map(|b| format!("{b:02x}"))
        .collect();

    let mut data = json!({
        "binary_type": "unknown",
        "size": size,
        "header_hex": header,
        "has_preview": false,
    });

    if let Some(limit) = preview_limit {
        if size <= limit && contents.len() as u64 == size {
            data["has_preview"] = json!(true);
            data["base64_preview"] = json!(STANDARD.encode(contents));
        }
    }
    data
}
