//! XBRL Formula assertion evaluator -- accepts an instance, an assertion
//! set and a batch of variable-set evaluations, produces per-assertion
//! counts and messages.
//!
//! Variable binding, fact filtering and taxonomy resolution happen
//! upstream; evaluations arrive already bound. Expressions go through
//! the [`ExpressionEngine`] trait, with [`XPathEngine`] as the bundled
//! implementation.

pub mod aspect;
pub mod assertion;
pub mod binding;
pub mod comparator;
pub mod definition;
pub mod diagnostics;
pub mod error;
pub mod expression;
pub mod fingerprint;
pub mod message;
pub mod numeric;
pub mod set;
pub mod xpath;

pub use aspect::{Aspect, AspectMatcher};
pub use assertion::{
    AssertionConfig, AssertionKind, AssertionResults, Collaborators, ConsistencyAssertion,
    Evaluation, EvaluationOutcome, ExistenceAssertion, ExpectedResult, MatchResult, Phase,
    Severity, SkipReason, ValueAssertion, VariableSetAssertion,
};
pub use binding::{BoundValue, VariableBinding};
pub use comparator::FactComparator;
pub use definition::{AssertionDefinition, AssertionSetDefinition, EvaluationDefinition};
pub use diagnostics::{Category, CollectingSink, Diagnostic, DiagnosticsSink, Level, TracingSink};
pub use error::FormulaError;
pub use expression::{ExprValue, ExpressionEngine, ExpressionError, Item, Scope};
pub use set::{AssertionSet, AssertionSummary, BatchReport, EvaluationRequest};
pub use xpath::XPathEngine;

use serde::Deserialize;
use xbrl_core::{Fact, FactId, FactStore, InstanceStore};

/// Result of running one batch against one assertion set.
#[derive(Debug)]
pub struct EvalResult {
    pub summary: Vec<AssertionSummary>,
    /// Assertions disabled because they failed validation.
    pub validation_errors: Vec<(String, FormulaError)>,
    /// Evaluations (and finalizations) that failed; the rest still ran.
    pub evaluation_errors: Vec<(String, FormulaError)>,
}

impl EvalResult {
    pub fn assertion(&self, id: &str) -> Option<&AssertionSummary> {
        self.summary.iter().find(|s| s.id == id)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let errors = |list: &[(String, FormulaError)]| -> Vec<serde_json::Value> {
            list.iter()
                .map(|(id, e)| serde_json::json!({ "assertion": id, "error": e.to_string() }))
                .collect()
        };
        serde_json::json!({
            "assertions": self.summary,
            "validationErrors": errors(&self.validation_errors),
            "evaluationErrors": errors(&self.evaluation_errors),
        })
    }
}

/// Evaluate a batch of bound variable sets against an assertion set.
///
/// This is the top-level public API. Every assertion is validated, the
/// batch is processed in order and every enabled assertion is finalized.
///
/// # Arguments
/// * `instance` - Instance JSON, as read by [`InstanceStore::from_json`]
/// * `assertion_set` - Assertion set JSON ([`AssertionSetDefinition`])
/// * `evaluations` - JSON array of [`EvaluationDefinition`]
/// * `sink` - Receives every diagnostic raised along the way
///
/// # Returns
/// * `EvalResult` with counts and messages, or a `FormulaError` when
///   one of the three documents cannot be loaded
pub fn evaluate(
    instance: &serde_json::Value,
    assertion_set: &serde_json::Value,
    evaluations: &serde_json::Value,
    sink: &dyn DiagnosticsSink,
) -> Result<EvalResult, FormulaError> {
    let store = InstanceStore::from_json(instance)?;
    let definition = AssertionSetDefinition::from_value(assertion_set)?;
    let batch = Vec::<EvaluationDefinition>::deserialize(evaluations)
        .map_err(|e| FormulaError::Definition(e.to_string()))?;

    let engine = XPathEngine::new();
    let env = Collaborators::new(&engine, &store, sink);
    let mut set: AssertionSet<XPathEngine> = AssertionSet::from_definition(&definition)?;
    let validation_errors = set.validate(&env);

    let namespaces = definition.namespace_context();
    let bindings = batch
        .iter()
        .map(|entry| entry.binding(&namespaces))
        .collect::<Result<Vec<_>, _>>()?;
    let derived = batch
        .iter()
        .map(|entry| resolve_derived(&store, entry.derived.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;

    let requests: Vec<EvaluationRequest<'_>> = batch
        .iter()
        .zip(&bindings)
        .zip(&derived)
        .map(|((entry, binding), derived)| {
            let mut evaluation = Evaluation::new(binding).with_exists(entry.exists.unwrap_or(true));
            if let Some(fact) = *derived {
                evaluation = evaluation.with_derived(fact);
            }
            EvaluationRequest {
                assertion: entry.assertion.as_str(),
                evaluation,
            }
        })
        .collect();

    let report = set.run(&requests, &env);
    let mut evaluation_errors: Vec<(String, FormulaError)> = report
        .errors()
        .into_iter()
        .map(|(id, e)| (id.to_string(), e.clone()))
        .collect();
    evaluation_errors.extend(set.finalize(&env));

    tracing::info!(
        set = %set.id(),
        evaluations = requests.len(),
        failed = evaluation_errors.len(),
        "assertion set evaluated"
    );
    Ok(EvalResult {
        summary: set.summary(),
        validation_errors,
        evaluation_errors,
    })
}

fn resolve_derived<'a>(
    store: &'a InstanceStore,
    id: Option<&str>,
) -> Result<Option<&'a Fact>, FormulaError> {
    match id {
        None => Ok(None),
        Some(id) => store
            .fact(&FactId::new(id))
            .map(Some)
            .ok_or_else(|| FormulaError::UnknownDerivedFact(id.to_string())),
    }
}
