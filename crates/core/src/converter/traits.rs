//! Trait definitions for the converter module.

use async_trait::async_trait;

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::error::ConverterError;
use super::types::ConversionTask;

/// A format-specific conversion capability.
///
/// Implementations turn the bytes at `task.content_path` into a JSON payload.
/// The dispatcher wraps that payload with metadata; converters never see
/// outputs or other files, except through `ctx` for nested archive entries.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Type tags this converter handles.
    fn supported_types(&self) -> &[TypeTag];

    /// Checks that the backend is usable. Called once when registered.
    fn availability(&self) -> Result<(), ConverterError> {
        Ok(())
    }

    /// Converts one file.
    async fn convert(
        &self,
        task: &ConversionTask,
        ctx: &Dispatcher,
    ) -> Result<serde_json::Value, ConverterError>;
}

/// Runs blocking parser code on the blocking pool.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ConverterError>
where
    F: FnOnce() -> Result<T, ConverterError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
