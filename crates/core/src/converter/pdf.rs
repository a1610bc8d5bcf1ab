//! PDF text extraction, one entry per page.

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::capabilities::BackendCapabilities;
use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

pub struct PdfConverter;

#[async_trait]
impl Converter for PdfConverter {
    fn name(&self) -> &str {
        "pdf"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Pdf]
    }

    fn availability(&self) -> Result<(), ConverterError> {
        if BackendCapabilities::detect().pdf {
            Ok(())
        } else {
            Err(unavailable())
        }
    }

    async fn convert(&self, task: &ConversionTask, ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        let max_pages = ctx.config().max_pdf_pages;
        run_blocking(move || {
            let bytes = std::fs::read(&path).map_err(|e| ConverterError::unreadable(&path, e))?;
            backend::extract(&bytes, max_pages)
        })
        .await
    }
}

#[cfg_attr(feature = "pdf", allow(dead_code))]
fn unavailable() -> ConverterError {
    ConverterError::missing_dependency("pdf", "built without the `pdf` feature")
}

#[cfg(feature = "pdf")]
mod backend {
    use lopdf::Document;
    use serde_json::{json, Value};
    use tracing::debug;

    use super::ConverterError;

    pub(super) fn extract(bytes: &[u8], max_pages: usize) -> Result<Value, ConverterError> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| ConverterError::corrupt(format!("unreadable PDF: {e}")))?;
        if doc.is_encrypted() {
            return Err(ConverterError::corrupt("PDF is encrypted"));
        }

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let mut pages = Vec::new();
        for &number in page_numbers.iter().take(max_pages) {
            let text = match doc.extract_text(&[number]) {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    debug!(page = number, error = %e, "No text extracted from page");
                    String::new()
                }
            };
            pages.push(json!({"page_number": number, "text": text}));
        }

        Ok(json!({
            "page_count": page_numbers.len(),
            "pages": pages,
            "truncated": page_numbers.len() > max_pages,
            "extraction_method": "lopdf",
        }))
    }
}

#[cfg(not(feature = "pdf"))]
mod backend {
    use serde_json::Value;

    use super::ConverterError;

    pub(super) fn extract(_bytes: &[u8], _max_pages: usize) -> Result<Value, ConverterError> {
        Err(super::unavailable())
    }
}
