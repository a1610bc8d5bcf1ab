//! Mock converter for testing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::converter::{ConversionTask, Converter, ConverterError};
use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

/// What the mock does when asked to convert a file.
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Return this payload.
    Payload(Value),
    /// Fail with `CorruptInput`.
    Corrupt(String),
    /// Panic with this message.
    Panic(String),
}

/// Mock implementation of the Converter trait.
///
/// Provides controllable behavior for testing:
/// - Track converted tasks for assertions
/// - Succeed, fail or panic, globally or per file name
/// - Simulate slow conversions
/// - Report an unavailable backend
///
/// Clones share their state, so a test can keep one handle while the
/// registry owns another.
///
/// # Example
///
/// ```rust,ignore
/// use jsonify_core::testing::MockConverter;
///
/// let mock = MockConverter::new("mock", &[TypeTag::Txt]);
/// mock.set_behavior_for("bad.txt", MockBehavior::Panic("boom".into()));
///
/// let mut registry = ConverterRegistry::new();
/// registry.register(Arc::new(mock.clone()));
///
/// // ... run a batch ...
/// assert_eq!(mock.conversion_count(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct MockConverter {
    name: String,
    types: Vec<TypeTag>,
    default_behavior: Arc<Mutex<Option<MockBehavior>>>,
    per_file: Arc<Mutex<HashMap<String, MockBehavior>>>,
    delay: Arc<Mutex<Duration>>,
    unavailable: Arc<Mutex<Option<String>>>,
    recorded: Arc<Mutex<Vec<ConversionTask>>>,
    availability_checks: Arc<AtomicUsize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockConverter {
    /// Create a mock handling the given types.
    pub fn new(name: &str, types: &[TypeTag]) -> Self {
        Self {
            name: name.to_string(),
            types: types.to_vec(),
            default_behavior: Arc::new(Mutex::new(None)),
            per_file: Arc::new(Mutex::new(HashMap::new())),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
            unavailable: Arc::new(Mutex::new(None)),
            recorded: Arc::new(Mutex::new(Vec::new())),
            availability_checks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Return `payload` for every file without a per-file behavior.
    pub fn set_payload(&self, payload: Value) {
        *lock(&self.default_behavior) = Some(MockBehavior::Payload(payload));
    }

    /// Fail every file without a per-file behavior.
    pub fn set_corrupt(&self, reason: &str) {
        *lock(&self.default_behavior) = Some(MockBehavior::Corrupt(reason.to_string()));
    }

    /// Panic on every file without a per-file behavior.
    pub fn set_panic(&self, message: &str) {
        *lock(&self.default_behavior) = Some(MockBehavior::Panic(message.to_string()));
    }

    /// Override the behavior for files named `file_name`.
    pub fn set_behavior_for(&self, file_name: &str, behavior: MockBehavior) {
        lock(&self.per_file).insert(file_name.to_string(), behavior);
    }

    /// Sleep this long before every conversion.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    /// Make `availability()` fail. Only affects registrations made afterwards.
    pub fn set_unavailable(&self, reason: &str) {
        *lock(&self.unavailable) = Some(reason.to_string());
    }

    /// Tasks handed to `convert`, in call order.
    pub fn recorded_tasks(&self) -> Vec<ConversionTask> {
        lock(&self.recorded).clone()
    }

    pub fn conversion_count(&self) -> usize {
        lock(&self.recorded).len()
    }

    /// How often `availability()` was called.
    pub fn availability_checks(&self) -> usize {
        self.availability_checks.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, task: &ConversionTask) -> MockBehavior {
        if let Some(behavior) = lock(&self.per_file).get(&task.source_filename) {
            return behavior.clone();
        }
        lock(&self.default_behavior).clone().unwrap_or_else(|| {
            MockBehavior::Payload(json!({
                "mock": self.name,
                "source_filename": task.source_filename,
            }))
        })
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_types(&self) -> &[TypeTag] {
        &self.types
    }

    fn availability(&self) -> Result<(), ConverterError> {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        match lock(&self.unavailable).clone() {
            Some(reason) => Err(ConverterError::missing_dependency(self.name.clone(), reason)),
            None => Ok(()),
        }
    }

    async fn convert(&self, task: &ConversionTask, _ctx: &Dispatcher) -> Result<Value, ConverterError> {
        lock(&self.recorded).push(task.clone());

        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.behavior_for(task) {
            MockBehavior::Payload(payload) => Ok(payload),
            MockBehavior::Corrupt(reason) => Err(ConverterError::corrupt(reason)),
            MockBehavior::Panic(message) => panic!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterConfig;
    use crate::fingerprint::Fingerprint;
    use crate::registry::ConverterRegistry;
    use std::path::Path;

    fn context() -> Dispatcher {
        Dispatcher::new(
            Arc::new(ConverterRegistry::new()),
            Arc::new(ConverterConfig::default()),
        )
    }

    fn task(name: &str) -> ConversionTask {
        ConversionTask::top_level(Path::new(name), Fingerprint::of(TypeTag::Txt))
    }

    #[tokio::test]
    async fn test_default_payload_names_the_file() {
        let mock = MockConverter::new("mock", &[TypeTag::Txt]);
        let data = mock.convert(&task("/in/a.txt"), &context()).await.unwrap();
        assert_eq!(data["source_filename"], "a.txt");
        assert_eq!(mock.recorded_tasks()[0].source_path, "/in/a.txt");
    }

    #[tokio::test]
    async fn test_per_file_behavior_wins() {
        let mock = MockConverter::new("mock", &[TypeTag::Txt]);
        mock.set_payload(json!(1));
        mock.set_behavior_for("b.txt", MockBehavior::Corrupt("nope".into()));

        assert_eq!(mock.convert(&task("/a.txt"), &context()).await.unwrap(), json!(1));
        assert!(mock.convert(&task("/b.txt"), &context()).await.is_err());
        assert_eq!(mock.conversion_count(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let mock = MockConverter::new("mock", &[TypeTag::Txt]);
        let other = mock.clone();
        other.set_unavailable("gone");
        assert!(mock.availability().is_err());
        assert_eq!(other.availability_checks(), 1);
    }
}
