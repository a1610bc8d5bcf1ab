//! Batch lifecycle integration tests.
//!
//! These tests run whole batches through the scheduler with the built-in
//! converters (and a mock where a backend would be needed):
//! - Completeness of outcomes and output files
//! - Per-file failure isolation
//! - Format allow-list and archive depth limits
//! - Idempotent reruns, overwrite handling, atomic writes

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use jsonify_core::{
    testing::{fixtures, MockBehavior, MockConverter},
    BatchReport, ConverterConfig, ConverterRegistry, ErrorKind, RunConfig, RunSummary, Scheduler,
    SkipReason, TypeTag,
};

const PEOPLE_CSV: &[u8] = b"name,age,city\nAlice,30,Paris\nBob,25,Rome\n";

/// Test helper holding an input tree and an output directory.
struct TestHarness {
    input: TempDir,
    output: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            input: TempDir::new().expect("Failed to create input dir"),
            output: TempDir::new().expect("Failed to create output dir"),
        }
    }

    fn add(&self, relative: &str, contents: &[u8]) {
        fixtures::write_file(self.input.path(), relative, contents);
    }

    fn config(&self) -> RunConfig {
        RunConfig::new(self.input.path(), self.output.path())
            .with_workers(3)
            .with_combine(true)
    }

    async fn run(&self, config: RunConfig) -> RunSummary {
        Scheduler::new(config).run().await.expect("Batch should run")
    }

    async fn run_with(&self, config: RunConfig, registry: ConverterRegistry) -> RunSummary {
        Scheduler::new(config)
            .with_registry(registry)
            .run()
            .await
            .expect("Batch should run")
    }

    fn output_json(&self, relative: &str) -> Value {
        let path = self.output.path().join(relative);
        let bytes = std::fs::read(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
        serde_json::from_slice(&bytes).expect("Output should be valid JSON")
    }

    fn master(&self) -> BatchReport {
        serde_json::from_value(self.output_json("master.json")).expect("Valid master.json")
    }
}

fn report(summary: &RunSummary) -> &BatchReport {
    summary.report.as_ref().expect("Combined report requested")
}

fn converted<'a>(report: &'a BatchReport, suffix: &str) -> &'a jsonify_core::ConversionResult {
    report
        .converted_files
        .iter()
        .find(|r| r.source_path.ends_with(suffix))
        .unwrap_or_else(|| panic!("{suffix} should be converted"))
}

/// Bytes that are neither text nor any known signature.
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if i % 7 == 0 {
                0
            } else {
                (state >> 24) as u8
            }
        })
        .collect()
}

fn strip_converted_at(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("converted_at");
            map.values_mut().for_each(strip_converted_at);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_converted_at),
        _ => {}
    }
}

fn tmp_leftovers(dir: &Path) -> Vec<String> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

// =============================================================================
// Converters through the whole pipeline
// =============================================================================

#[tokio::test]
async fn test_csv_rows_in_header_order() {
    let harness = TestHarness::new();
    harness.add("people.csv", PEOPLE_CSV);

    let summary = harness.run(harness.config()).await;
    assert_eq!(summary.counts.converted, 1);

    let data = &harness.output_json("people.csv.json")["data"];
    assert_eq!(data["column_names"], serde_json::json!(["name", "age", "city"]));
    assert_eq!(data["row_count"], 2);
    let first = data["rows"][0].as_object().unwrap();
    assert_eq!(first.keys().collect::<Vec<_>>(), ["name", "age", "city"]);
    assert_eq!(data["rows"][0]["name"], "Alice");
    assert_eq!(data["rows"][1]["city"], "Rome");
}

#[tokio::test]
async fn test_result_envelope_and_hashes() {
    let harness = TestHarness::new();
    harness.add("logs/people.csv", PEOPLE_CSV);

    harness.run(harness.config()).await;
    let result = harness.output_json("logs/people.csv.json");

    assert_eq!(result["source_filename"], "people.csv");
    assert_eq!(result["detected_type"], "csv");
    assert_eq!(result["mimetype"], "text/csv");
    assert!(result["converted_at"].as_str().unwrap().ends_with('Z'));

    let metadata = &result["metadata"];
    assert_eq!(metadata["size"], PEOPLE_CSV.len());
    assert_eq!(metadata["sha256"], format!("{:x}", Sha256::digest(PEOPLE_CSV)));
    assert_eq!(metadata["sha1"], format!("{:x}", Sha1::digest(PEOPLE_CSV)));
    assert_eq!(metadata["md5"], format!("{:x}", md5::compute(PEOPLE_CSV)));
    assert!(metadata["mtime"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_mixed_formats() {
    let harness = TestHarness::new();
    harness.add("a.json", br#"{"user": "alice", "ids": [1, 2]}"#);
    harness.add("b.xml", b"<root a=\"1\"><child>text</child></root>");
    harness.add("c.log", b"2024-01-02T03:04:05Z started\nplain line\n");
    harness.add("d.pcap", &fixtures::pcap_bytes(3));
    harness.add("e.bin", &noise(64));

    let summary = harness.run(harness.config()).await;
    assert_eq!(summary.counts.converted, 5, "{:?}", report(&summary).failed_files);
    let report = report(&summary);

    assert_eq!(converted(report, "a.json").data["ids"][1], 2);
    assert_eq!(converted(report, "b.xml").data["tag"], "root");
    assert_eq!(converted(report, "c.log").data["lines"][0]["timestamp_format"], "iso8601");
    assert_eq!(converted(report, "d.pcap").data["packet_count"], 3);
    assert_eq!(converted(report, "d.pcap").data["packets"][0]["protocol"], "UDP");
    assert_eq!(converted(report, "e.bin").detected_type, TypeTag::Unknown);
    assert_eq!(converted(report, "e.bin").data["size"], 64);
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn test_corrupt_evtx_fails_alone() {
    let harness = TestHarness::new();
    harness.add("broken.evtx", &noise(4096));
    harness.add("people.csv", PEOPLE_CSV);

    let summary = harness.run(harness.config()).await;
    let report = report(&summary);

    assert_eq!(report.failed_files.len(), 1);
    let failure = &report.failed_files[0];
    assert!(failure.source_path.ends_with("broken.evtx"));
    assert_eq!(failure.detected_type, TypeTag::Evtx);
    assert!(matches!(
        failure.error_kind,
        ErrorKind::CorruptInput | ErrorKind::MissingDependency
    ));
    converted(report, "people.csv");

    let written = harness.output_json("broken.evtx.error.json");
    assert_eq!(written["error_kind"], failure.error_kind.as_str());
}

#[tokio::test]
async fn test_panicking_converter_is_contained() {
    let harness = TestHarness::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        harness.add(name, b"hello\n");
    }
    let mock = MockConverter::new("mock", &[TypeTag::Txt]);
    mock.set_behavior_for("b.txt", MockBehavior::Panic("converter bug".into()));
    let mut registry = ConverterRegistry::with_defaults();
    registry.register(Arc::new(mock.clone()));

    let summary = harness.run_with(harness.config(), registry).await;

    assert_eq!(summary.counts.total, 3);
    assert_eq!(summary.counts.converted, 2);
    let failure = &report(&summary).failed_files[0];
    assert_eq!(failure.error_kind, ErrorKind::Internal);
    assert!(failure.error_message.contains("converter bug"));
}

// =============================================================================
// Format allow-list
// =============================================================================

#[tokio::test]
async fn test_formats_filter_skips_other_types() {
    let harness = TestHarness::new();
    harness.add("security.evtx", &noise(512));
    harness.add("people.csv", PEOPLE_CSV);

    // stands in for the EVTX backend so the test does not need a real log
    let evtx = MockConverter::new("evtx-mock", &[TypeTag::Evtx]);
    let mut registry = ConverterRegistry::with_defaults();
    registry.register(Arc::new(evtx.clone()));

    let config = harness.config().with_formats([TypeTag::Evtx]);
    let summary = harness.run_with(config, registry).await;
    let report = report(&summary);

    assert_eq!(summary.counts.converted, 1);
    assert_eq!(summary.counts.failed, 0);
    assert_eq!(summary.counts.skipped, 1);
    converted(report, "security.evtx");
    assert!(report.skipped_files[0].source_path.ends_with("people.csv"));
    assert_eq!(report.skipped_files[0].reason, SkipReason::Unsupported);
    assert!(!harness.output.path().join("people.csv.json").exists());
    assert_eq!(harness.master().skipped_files.len(), 1);
}

// =============================================================================
// Archives
// =============================================================================

#[tokio::test]
async fn test_nested_zip_stops_at_max_depth() {
    let harness = TestHarness::new();
    harness.add("outer.zip", &fixtures::nested_zip(5, "leaf.txt", b"deep\n"));

    let config = harness
        .config()
        .with_limits(ConverterConfig::default().with_max_depth(3));
    let summary = harness.run(config).await;

    assert_eq!(summary.counts.converted, 1);
    let outer = converted(report(&summary), "outer.zip");

    let mut level = &outer.data;
    for depth in 1..=3 {
        let entry = &level["entries"][0];
        assert_eq!(entry["name"], format!("level{depth}.zip"));
        assert_eq!(entry["depth"], depth);
        assert_eq!(entry["status"], "converted");
        level = &entry["result"]["data"];
    }

    let too_deep = &level["entries"][0];
    assert_eq!(too_deep["name"], "level4.zip");
    assert_eq!(too_deep["depth"], 4);
    assert_eq!(too_deep["status"], "MaxDepthExceeded");
    assert!(too_deep.get("result").is_none());
}

#[tokio::test]
async fn test_archive_entries_use_virtual_paths() {
    let harness = TestHarness::new();
    let zip = fixtures::zip_bytes(&[
        ("data/people.csv", PEOPLE_CSV),
        ("notes.txt", b"hello\n"),
        ("bad.evtx", &noise(256)),
    ]);
    harness.add("bundle.zip", &zip);

    let summary = harness.run(harness.config()).await;
    let bundle = converted(report(&summary), "bundle.zip");
    assert_eq!(bundle.data["archive_type"], "zip");
    assert_eq!(bundle.data["file_count"], 3);

    let entries = bundle.data["entries"].as_array().unwrap();
    let csv = entries.iter().find(|e| e["name"] == "data/people.csv").unwrap();
    assert_eq!(csv["result"]["source_filename"], "people.csv");
    assert!(csv["result"]["source_path"]
        .as_str()
        .unwrap()
        .ends_with("bundle.zip!/data/people.csv"));
    assert_eq!(csv["result"]["data"]["row_count"], 2);
    assert_eq!(csv["result"]["metadata"]["size"], PEOPLE_CSV.len());

    let bad = entries.iter().find(|e| e["name"] == "bad.evtx").unwrap();
    assert_eq!(bad["status"], "failed");
}

// =============================================================================
// Reruns and output integrity
// =============================================================================

#[tokio::test]
async fn test_rerun_with_overwrite_is_idempotent() {
    let harness = TestHarness::new();
    harness.add("people.csv", PEOPLE_CSV);
    harness.add("nested/bundle.zip", &fixtures::zip_bytes(&[("a.txt", b"one\ntwo\n")]));
    harness.add("capture.pcap", &fixtures::pcap_bytes(2));

    let config = harness.config().with_overwrite(true);
    harness.run(config.clone()).await;
    let first: Vec<Value> = ["people.csv.json", "nested/bundle.zip.json", "capture.pcap.json"]
        .iter()
        .map(|p| harness.output_json(p))
        .collect();

    harness.run(config).await;
    for (relative, mut before) in ["people.csv.json", "nested/bundle.zip.json", "capture.pcap.json"]
        .iter()
        .zip(first)
    {
        let mut after = harness.output_json(relative);
        strip_converted_at(&mut before);
        strip_converted_at(&mut after);
        assert_eq!(before, after, "{relative} changed between runs");
    }
}

#[tokio::test]
async fn test_rerun_without_overwrite_skips_everything() {
    let harness = TestHarness::new();
    harness.add("a.csv", PEOPLE_CSV);
    harness.add("b/c.txt", b"x\n");

    let first = harness.run(harness.config()).await;
    assert_eq!(first.counts.converted, 2);

    let second = harness.run(harness.config()).await;
    assert_eq!(second.counts.total, 2);
    assert_eq!(second.counts.skipped, 2);
    assert!(report(&second)
        .skipped_files
        .iter()
        .all(|s| s.reason == SkipReason::AlreadyExists));
}

#[tokio::test]
async fn test_failed_files_are_retried() {
    let harness = TestHarness::new();
    harness.add("a.txt", b"x\n");
    let mock = MockConverter::new("mock", &[TypeTag::Txt]);
    mock.set_corrupt("first attempt");
    let registry = || {
        let mut registry = ConverterRegistry::with_defaults();
        registry.register(Arc::new(mock.clone()));
        registry
    };

    harness.run_with(harness.config(), registry()).await;
    assert!(harness.output.path().join("a.txt.error.json").exists());

    mock.set_payload(serde_json::json!({"fixed": true}));
    let second = harness.run_with(harness.config(), registry()).await;
    assert_eq!(second.counts.converted, 1);
    assert!(harness.output.path().join("a.txt.json").exists());
    assert!(!harness.output.path().join("a.txt.error.json").exists());
}

#[tokio::test]
async fn test_completeness_and_no_partial_outputs() {
    let harness = TestHarness::new();
    for i in 0..20 {
        let contents: Vec<u8> = match i % 4 {
            0 => PEOPLE_CSV.to_vec(),
            1 => b"{\"n\": 1}".to_vec(),
            2 => noise(100),
            _ => b"{ not json".to_vec(),
        };
        let ext = ["csv", "json", "evtx", "json"][i % 4];
        harness.add(&format!("d{}/f{i}.{ext}", i % 5), &contents);
    }

    let summary = harness.run(harness.config().with_workers(6)).await;
    let counts = summary.counts;
    assert_eq!(counts.total, 20);
    assert_eq!(counts.converted + counts.failed + counts.skipped, counts.total);

    let master = harness.master();
    assert_eq!(master.total_files, 20);
    assert_eq!(
        master.converted_files.len() + master.failed_files.len() + master.skipped_files.len(),
        20
    );
    let paths: Vec<_> = master.converted_files.iter().map(|r| r.source_path.clone()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);

    assert!(tmp_leftovers(harness.output.path()).is_empty());
}

#[tokio::test]
async fn test_single_file_input() {
    let harness = TestHarness::new();
    harness.add("people.csv", PEOPLE_CSV);

    let config = RunConfig::new(harness.input.path().join("people.csv"), harness.output.path());
    let summary = harness.run(config).await;

    assert_eq!(summary.counts.converted, 1);
    assert!(summary.report.is_none());
    assert!(harness.output.path().join("people.csv.json").exists());
    assert!(!harness.output.path().join("master.json").exists());
}
