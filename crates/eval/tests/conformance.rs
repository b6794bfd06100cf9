//! Evaluator conformance test suite.
//!
//! Each test case is a fixture quartet:
//! - `<name>.instance.json`    -- the instance the evaluations read
//! - `<name>.assertions.json`  -- the assertion set
//! - `<name>.evaluations.json` -- the batch of bound variable sets
//! - `<name>.expected.json`    -- expected counts, messages and errors
//!
//! The runner evaluates the batch and compares the result's JSON form
//! against the expected output. Negative fixtures have no expected file
//! and must fail to load.

use std::path::{Path, PathBuf};

use xbrl_eval::CollectingSink;

fn read_json(path: &Path) -> serde_json::Value {
    let src = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    serde_json::from_str(&src)
        .unwrap_or_else(|e| panic!("Invalid JSON in {}: {}", path.display(), e))
}

fn load(fixture_dir: &Path, name: &str) -> [serde_json::Value; 3] {
    [
        read_json(&fixture_dir.join(format!("{}.instance.json", name))),
        read_json(&fixture_dir.join(format!("{}.assertions.json", name))),
        read_json(&fixture_dir.join(format!("{}.evaluations.json", name))),
    ]
}

/// Run a positive fixture.
///
/// 1. Load instance, assertion set and batch
/// 2. Evaluate
/// 3. Compare against .expected.json
fn run_eval_fixture(fixture_dir: &Path, name: &str) {
    let [instance, assertions, evaluations] = load(fixture_dir, name);
    let sink = CollectingSink::new();

    let result = xbrl_eval::evaluate(&instance, &assertions, &evaluations, &sink)
        .unwrap_or_else(|e| panic!("Evaluation failed for {}: {:?}", name, e));

    let expected = read_json(&fixture_dir.join(format!("{}.expected.json", name)));
    let actual = result.to_json();

    assert_eq!(
        actual,
        expected,
        "Result mismatch for {}\n\nActual:\n{}\n\nExpected:\n{}",
        name,
        serde_json::to_string_pretty(&actual).unwrap(),
        serde_json::to_string_pretty(&expected).unwrap(),
    );
}

/// Run a fixture that must fail before any assertion is evaluated.
fn run_eval_fixture_error(fixture_dir: &Path, name: &str) -> xbrl_eval::FormulaError {
    let [instance, assertions, evaluations] = load(fixture_dir, name);
    let sink = CollectingSink::new();
    match xbrl_eval::evaluate(&instance, &assertions, &evaluations, &sink) {
        Ok(_) => panic!("Expected evaluation error for {}, but got success", name),
        Err(e) => e,
    }
}

fn conformance_dir(kind: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("conformance")
        .join("eval")
        .join(kind)
}

// ──────────────────────────────────────────────
// Positive fixtures
// ──────────────────────────────────────────────

#[test]
fn value_balance() {
    run_eval_fixture(&conformance_dir("positive"), "value_balance");
}

#[test]
fn existence_periods() {
    run_eval_fixture(&conformance_dir("positive"), "existence_periods");
}

#[test]
fn consistency_radius() {
    run_eval_fixture(&conformance_dir("positive"), "consistency_radius");
}

// ──────────────────────────────────────────────
// Negative fixtures
// ──────────────────────────────────────────────

#[test]
fn unknown_derived_fact_is_rejected() {
    let err = run_eval_fixture_error(&conformance_dir("negative"), "unknown_derived");
    assert_eq!(
        err,
        xbrl_eval::FormulaError::UnknownDerivedFact("no-such-fact".to_string())
    );
}

#[test]
fn duplicate_assertion_ids_are_rejected() {
    let err = run_eval_fixture_error(&conformance_dir("negative"), "duplicate_ids");
    assert!(matches!(err, xbrl_eval::FormulaError::Definition(_)));
}

// ──────────────────────────────────────────────
// Diagnostics alongside results
// ──────────────────────────────────────────────

#[test]
fn unsatisfied_messages_are_reported_at_assertion_severity() {
    let [instance, assertions, evaluations] = load(&conformance_dir("positive"), "value_balance");
    let sink = CollectingSink::new();
    xbrl_eval::evaluate(&instance, &assertions, &evaluations, &sink).unwrap();

    let unsatisfied: Vec<_> = sink
        .diagnostics()
        .into_iter()
        .filter(|d| d.category == xbrl_eval::Category::AssertionUnsatisfied)
        .collect();
    assert_eq!(unsatisfied.len(), 1);
    assert_eq!(unsatisfied[0].level, xbrl_eval::Level::Warning);
    assert_eq!(
        unsatisfied[0].attributes.get("assertion").map(String::as_str),
        Some("assets-balance")
    );
}
