//! Validates every conformance assertion set against the formal schema at
//! schema/assertion-set-schema.json, and checks that the schema rejects
//! attributes on the wrong assertion kind.

use std::path::Path;

fn validator() -> jsonschema::Validator {
    let schema_path =
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../schema/assertion-set-schema.json");
    let schema_src = std::fs::read_to_string(&schema_path)
        .unwrap_or_else(|e| panic!("Failed to read schema at {}: {}", schema_path.display(), e));
    let schema_value: serde_json::Value = serde_json::from_str(&schema_src).unwrap();
    jsonschema::validator_for(&schema_value)
        .unwrap_or_else(|e| panic!("Failed to compile schema: {}", e))
}

fn collect_assertion_files(dir: &Path) -> Vec<std::path::PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().ends_with(".assertions.json"))
        .collect();
    paths.sort();
    paths
}

#[test]
fn validate_all_conformance_assertion_sets_against_schema() {
    let validator = validator();
    let conformance_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../conformance/eval");

    let mut tested = 0usize;
    let mut failures = Vec::new();
    for kind in ["positive", "negative"] {
        for path in collect_assertion_files(&conformance_root.join(kind)) {
            let src = std::fs::read_to_string(&path).unwrap();
            let instance: serde_json::Value = serde_json::from_str(&src).unwrap();
            if let Err(error) = validator.validate(&instance) {
                failures.push(format!("{}: {}", path.display(), error));
            }
            tested += 1;
        }
    }

    assert!(tested >= 4, "expected at least 4 assertion sets, found {}", tested);
    assert!(
        failures.is_empty(),
        "Schema validation failures:\n{}",
        failures.join("\n")
    );
}

#[test]
fn schema_rejects_misplaced_attributes() {
    let validator = validator();
    let value_with_radius = serde_json::json!({
        "id": "s",
        "assertions": [
            { "id": "v", "kind": "value", "test": "true()", "absoluteAcceptanceRadius": "1" }
        ]
    });
    assert!(validator.validate(&value_with_radius).is_err());

    let consistency_with_test = serde_json::json!({
        "id": "s",
        "assertions": [ { "id": "c", "kind": "consistency", "strict": true, "test": "true()" } ]
    });
    assert!(validator.validate(&consistency_with_test).is_err());

    let unknown_kind = serde_json::json!({
        "id": "s",
        "assertions": [ { "id": "f", "kind": "formula" } ]
    });
    assert!(validator.validate(&unknown_kind).is_err());
}

#[test]
fn schema_accepts_serialized_definitions() {
    let validator = validator();
    let def = xbrl_eval::AssertionSetDefinition::from_json(
        r#"{ "id": "s", "assertions": [
            { "id": "ca", "kind": "consistency", "implicitFiltering": true,
              "strict": false, "proportionalAcceptanceRadius": "0.01" } ] }"#,
    )
    .unwrap();
    let round_tripped = serde_json::to_value(&def).unwrap();
    if let Err(error) = validator.validate(&round_tripped) {
        panic!("serialized definition does not validate: {}", error);
    }
}
