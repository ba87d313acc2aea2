use std::fs;
use std::path::{Path, PathBuf};

use pcscspy_core::{TraceOptions, TraceSummary, decode_trace_file};

fn golden_dir(dir: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join(dir)
}

fn decode_golden(dir: &str) -> (String, TraceSummary) {
    let input = golden_dir(dir).join("input.trace");
    let mut out = Vec::new();
    let summary =
        decode_trace_file(&input, &mut out, &TraceOptions::default()).expect("decode trace");
    (String::from_utf8(out).expect("utf8 output"), summary)
}

fn run_golden(dir: &str) -> TraceSummary {
    let expected_path = golden_dir(dir).join("expected.txt");
    let expected = fs::read_to_string(&expected_path).expect("read expected.txt");

    let (actual, summary) = decode_golden(dir);
    assert_eq!(actual, expected, "golden mismatch in {dir}");
    summary
}

#[test]
fn golden_release_context() {
    let summary = run_golden("tests/golden/release_context");
    assert_eq!(summary.calls, 1);
    assert!(!summary.truncated);
}

#[test]
fn golden_card_session() {
    let summary = run_golden("tests/golden/card_session");
    assert_eq!(summary.calls, 7);
    assert_eq!(summary.unknown_calls, 0);
    let transmit = summary.function("SCardTransmit").expect("transmit summary");
    assert_eq!(transmit.calls, 1);
    assert_eq!(transmit.failures, 0);
    assert_eq!(transmit.max_elapsed_usec, 200);
}

#[test]
fn golden_status_change() {
    let summary = run_golden("tests/golden/status_change");
    let change = summary
        .function("SCardGetStatusChange")
        .expect("status change summary");
    assert_eq!(change.total_elapsed_usec, 2_500_000);
}

#[test]
fn golden_truncated() {
    let summary = run_golden("tests/golden/truncated");
    assert!(summary.truncated);
    assert_eq!(summary.calls, 1);
}
