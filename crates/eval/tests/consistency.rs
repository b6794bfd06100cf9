//! Consistency assertion behaviour against small in-memory instances.

use serde_json::json;
use xbrl_core::{FactId, FactStore, InstanceStore};
use xbrl_eval::{
    AssertionConfig, BoundValue, Category, CollectingSink, Collaborators, ConsistencyAssertion,
    Evaluation, EvaluationOutcome, FormulaError, Level, VariableBinding, VariableSetAssertion,
    XPathEngine,
};

fn store(facts: serde_json::Value) -> InstanceStore {
    InstanceStore::from_json(&json!({
        "namespaces": {
            "ex": "http://example.com/taxonomy",
            "iso4217": "http://www.xbrl.org/2003/iso4217"
        },
        "contexts": [{
            "id": "c1",
            "entity": { "scheme": "http://example.com/id", "identifier": "ACME" },
            "period": { "instant": "2024-12-31" }
        }],
        "units": [{ "id": "usd", "measures": ["iso4217:USD"] }],
        "facts": facts
    }))
    .unwrap()
}

fn monetary(id: &str, value: &str, decimals: &str) -> serde_json::Value {
    json!({ "id": id, "concept": "ex:Assets", "contextRef": "c1", "unitRef": "usd",
            "type": "monetary", "value": value, "decimals": decimals })
}

fn config(id: &str) -> AssertionConfig {
    AssertionConfig::new(id)
        .with_implicit_filtering(true)
        .with_variable("v")
}

fn binding(path: &str) -> VariableBinding {
    VariableBinding::new().with("v", BoundValue::Node(FactId::new(path)))
}

/// Validate `ca`, evaluate it once against derived fact `d`.
fn run_once(
    mut ca: ConsistencyAssertion<XPathEngine>,
    store: &InstanceStore,
    sink: &CollectingSink,
) -> (ConsistencyAssertion<XPathEngine>, Result<EvaluationOutcome, FormulaError>) {
    let engine = XPathEngine::new();
    let env = Collaborators::new(&engine, store, sink);
    ca.validate(&env).unwrap();
    let derived = store.fact(&FactId::new("d")).unwrap();
    let b = binding("i");
    let outcome = ca.evaluate(&Evaluation::new(&b).with_derived(derived), &env);
    (ca, outcome)
}

#[test]
fn absolute_radius_bounds_the_difference() {
    let s = store(json!([monetary("i", "100", "INF"), monetary("d", "103", "INF")]));
    let sink = CollectingSink::new();

    let wide = ConsistencyAssertion::new(config("wide"), Some(false)).with_absolute_radius("5");
    let (wide, outcome) = run_once(wide, &s, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Satisfied);
    assert_eq!(wide.radius_value(), Some(rust_decimal::Decimal::from(5)));

    let narrow = ConsistencyAssertion::new(config("narrow"), Some(false)).with_absolute_radius("2");
    let (narrow, outcome) = run_once(narrow, &s, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Unsatisfied);
    assert_eq!(narrow.results().unsatisfied, 1);
}

#[test]
fn proportional_radius_scales_with_the_derived_value() {
    let sink = CollectingSink::new();

    let near = store(json!([monetary("i", "1004", "INF"), monetary("d", "1000", "INF")]));
    let ca = ConsistencyAssertion::new(config("p"), Some(false)).with_proportional_radius("0.005");
    let (_, outcome) = run_once(ca, &near, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Satisfied);

    let far = store(json!([monetary("i", "1006", "INF"), monetary("d", "1000", "INF")]));
    let ca = ConsistencyAssertion::new(config("p"), Some(false)).with_proportional_radius("0.005");
    let (_, outcome) = run_once(ca, &far, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Unsatisfied);
}

#[test]
fn without_radius_values_are_compared_after_rounding() {
    let sink = CollectingSink::new();

    // Both round to 10.00 at the shared precision of 4.
    let same = store(json!([monetary("i", "10.004", "2"), monetary("d", "10.001", "2")]));
    let (_, outcome) = run_once(ConsistencyAssertion::new(config("r"), Some(false)), &same, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Satisfied);

    let pair = |decimals: &str| {
        store(json!([monetary("i", "10.004", decimals), monetary("d", "10.006", decimals)]))
    };
    let judge = |s: &InstanceStore| {
        let (_, outcome) = run_once(ConsistencyAssertion::new(config("r"), Some(false)), s, &sink);
        outcome.unwrap()
    };
    assert_eq!(judge(&pair("1")), EvaluationOutcome::Satisfied);
    // 10.006 rounds half away from zero to 10.01.
    assert_eq!(judge(&pair("2")), EvaluationOutcome::Unsatisfied);
    assert_eq!(judge(&pair("3")), EvaluationOutcome::Unsatisfied);
}

#[test]
fn zero_precision_derived_value_has_no_opinion() {
    let s = store(json!([monetary("i", "0", "2"), monetary("d", "0", "2")]));
    let sink = CollectingSink::new();
    let (ca, outcome) = run_once(ConsistencyAssertion::new(config("z"), Some(true)), &s, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::NoOpinion);
    assert_eq!((ca.results().satisfied, ca.results().unsatisfied), (0, 0));
}

#[test]
fn missing_inputs_depend_on_strictness() {
    let lonely = store(json!([monetary("d", "42", "0")]));
    let sink = CollectingSink::new();

    let (_, outcome) = run_once(ConsistencyAssertion::new(config("lax"), Some(false)), &lonely, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::NoOpinion);

    let (_, outcome) = run_once(ConsistencyAssertion::new(config("strict"), Some(true)), &lonely, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Unsatisfied);

    let nil = store(json!([{ "id": "d", "concept": "ex:Assets", "contextRef": "c1",
                             "unitRef": "usd", "type": "monetary", "nil": true }]));
    let (_, outcome) = run_once(ConsistencyAssertion::new(config("strict"), Some(true)), &nil, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Satisfied);
}

#[test]
fn nil_derived_fact_with_inputs_is_unsatisfied() {
    let s = store(json!([
        monetary("i", "10", "0"),
        { "id": "d", "concept": "ex:Assets", "contextRef": "c1", "unitRef": "usd",
          "type": "monetary", "nil": true }
    ]));
    let sink = CollectingSink::new();
    let (_, outcome) = run_once(ConsistencyAssertion::new(config("n"), Some(false)), &s, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Unsatisfied);
}

#[test]
fn non_numeric_facts_use_typed_equality() {
    let text = |id: &str, value: &str| {
        json!({ "id": id, "concept": "ex:Name", "contextRef": "c1", "value": value })
    };
    let sink = CollectingSink::new();

    let equal = store(json!([text("i", "ACME Corp"), text("d", "ACME Corp")]));
    let (_, outcome) = run_once(ConsistencyAssertion::new(config("t"), Some(false)), &equal, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Satisfied);

    let differ = store(json!([text("i", "ACME Corp"), text("d", "ACME Inc")]));
    let (_, outcome) = run_once(ConsistencyAssertion::new(config("t"), Some(false)), &differ, &sink);
    assert_eq!(outcome.unwrap(), EvaluationOutcome::Unsatisfied);
}

#[test]
fn both_radii_warn_and_the_absolute_radius_wins() {
    let s = store(json!([monetary("i", "100", "INF"), monetary("d", "103", "INF")]));
    let sink = CollectingSink::new();
    let ca = ConsistencyAssertion::new(config("both"), Some(false))
        .with_absolute_radius("1")
        .with_proportional_radius("0.5");
    let (_, outcome) = run_once(ca, &s, &sink);

    assert_eq!(outcome.unwrap(), EvaluationOutcome::Unsatisfied);
    let warnings: Vec<_> = sink
        .diagnostics()
        .into_iter()
        .filter(|d| d.category == Category::ConfigurationError)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].level, Level::Warning);
}

#[test]
fn missing_strict_is_reported_and_defaults_to_false() {
    let s = store(json!([monetary("d", "42", "0")]));
    let sink = CollectingSink::new();
    let (ca, outcome) = run_once(ConsistencyAssertion::new(config("m"), None), &s, &sink);
    assert!(!ca.strict());
    assert!(sink.has(Category::ConfigurationError));
    assert_eq!(outcome.unwrap(), EvaluationOutcome::NoOpinion);
}

#[test]
fn non_numeric_radius_is_a_type_error() {
    let s = store(json!([monetary("i", "100", "INF"), monetary("d", "103", "INF")]));
    let sink = CollectingSink::new();
    let ca = ConsistencyAssertion::new(config("bad"), Some(false)).with_absolute_radius("'wide'");
    let (_, outcome) = run_once(ca, &s, &sink);
    assert!(matches!(outcome, Err(FormulaError::EvaluationType { .. })));
    assert!(sink.has(Category::EvaluationTypeError));
}

#[test]
fn evaluation_without_derived_fact_is_rejected() {
    let s = store(json!([]));
    let sink = CollectingSink::new();
    let engine = XPathEngine::new();
    let env = Collaborators::new(&engine, &s, &sink);
    let mut ca: ConsistencyAssertion<XPathEngine> =
        ConsistencyAssertion::new(config("nd"), Some(true));
    ca.validate(&env).unwrap();
    let b = binding("i");
    assert_eq!(
        ca.evaluate(&Evaluation::new(&b), &env),
        Err(FormulaError::MissingDerivedFact("nd".to_string()))
    );
}

#[test]
fn uniqueness_counters_track_inputs_and_derived_facts_separately() {
    let s = store(json!([monetary("i", "100", "INF"), monetary("d", "100", "INF")]));
    let sink = CollectingSink::new();
    let engine = XPathEngine::new();
    let env = Collaborators::new(&engine, &s, &sink);
    let mut ca: ConsistencyAssertion<XPathEngine> =
        ConsistencyAssertion::new(config("u"), Some(false));
    ca.validate(&env).unwrap();
    let derived = s.fact(&FactId::new("d")).unwrap();

    let first = binding("i");
    let second = VariableBinding::new().with("v", BoundValue::Node(FactId::new("other")));
    for b in [&first, &second, &first] {
        let outcome = ca.evaluate(&Evaluation::new(b).with_derived(derived), &env);
        assert_eq!(outcome.unwrap(), EvaluationOutcome::Satisfied);
    }

    let counts = ca.uniqueness();
    assert_eq!(counts.input_satisfied, 2);
    assert_eq!(counts.derived_satisfied, 1);
    assert_eq!(counts.input_unsatisfied + counts.derived_unsatisfied, 0);
    assert_eq!(ca.results().satisfied, 3);
}
