//! A group of assertions evaluated together.
//!
//! Errors are per evaluation: one failing evaluation never stops the
//! rest of a batch, and an assertion that fails validation is disabled
//! while the others proceed.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::assertion::{
    AssertionKind, Collaborators, Evaluation, EvaluationOutcome, ExpectedResult, MatchResult,
    Phase, VariableSetAssertion,
};
use crate::definition::AssertionSetDefinition;
use crate::error::FormulaError;
use crate::expression::ExpressionEngine;

/// Per-assertion line of a set summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionSummary {
    pub id: String,
    pub kind: AssertionKind,
    pub enabled: bool,
    pub satisfied: usize,
    pub unsatisfied: usize,
    pub satisfied_messages: Vec<String>,
    pub unsatisfied_messages: Vec<String>,
}

/// One entry of a batch run.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub assertion: &'a str,
    pub evaluation: Evaluation<'a>,
}

/// Outcome of every request in a batch, in request order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, Result<EvaluationOutcome, FormulaError>)>,
    /// Requests addressed to assertions disabled by validation; their
    /// failure is already in the validation report.
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn errors(&self) -> Vec<(&str, &FormulaError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id.as_str(), e)))
            .collect()
    }

    pub fn count(&self, outcome: EvaluationOutcome) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, r)| r.as_ref().ok() == Some(&outcome))
            .count()
    }
}

pub struct AssertionSet<E: ExpressionEngine + 'static> {
    id: String,
    assertions: Vec<Box<dyn VariableSetAssertion<E>>>,
    disabled: BTreeSet<String>,
}

impl<E: ExpressionEngine + 'static> AssertionSet<E> {
    pub fn new(id: impl Into<String>) -> Self {
        AssertionSet {
            id: id.into(),
            assertions: Vec::new(),
            disabled: BTreeSet::new(),
        }
    }

    pub fn from_definition(definition: &AssertionSetDefinition) -> Result<Self, FormulaError> {
        definition.check_unique_ids()?;
        let namespaces = definition.namespace_context();
        let mut set = AssertionSet::new(definition.id.clone());
        for assertion in &definition.assertions {
            set.push(assertion.build(&namespaces)?);
        }
        Ok(set)
    }

    pub fn push(&mut self, assertion: Box<dyn VariableSetAssertion<E>>) {
        self.assertions.push(assertion);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.assertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&dyn VariableSetAssertion<E>> {
        self.assertions
            .iter()
            .find(|a| a.id() == id)
            .map(|a| a.as_ref())
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        !self.disabled.contains(id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Box<dyn VariableSetAssertion<E>>, FormulaError> {
        self.assertions
            .iter_mut()
            .find(|a| a.id() == id)
            .ok_or_else(|| FormulaError::UnknownAssertion(id.to_string()))
    }

    /// Validate every assertion; failures are returned and disabled.
    pub fn validate(&mut self, env: &Collaborators<'_, E>) -> Vec<(String, FormulaError)> {
        let mut failures = Vec::new();
        for assertion in &mut self.assertions {
            if let Err(e) = assertion.validate(env) {
                tracing::warn!(
                    set = %self.id,
                    assertion = %assertion.id(),
                    error = %e,
                    "assertion disabled"
                );
                self.disabled.insert(assertion.id().to_string());
                failures.push((assertion.id().to_string(), e));
            }
        }
        failures
    }

    pub fn evaluate(
        &mut self,
        assertion: &str,
        evaluation: &Evaluation<'_>,
        env: &Collaborators<'_, E>,
    ) -> Result<EvaluationOutcome, FormulaError> {
        self.get_mut(assertion)?.evaluate(evaluation, env)
    }

    /// Process a batch in order, collecting each outcome. Requests for
    /// disabled assertions are not dispatched.
    pub fn run(&mut self, requests: &[EvaluationRequest<'_>], env: &Collaborators<'_, E>) -> BatchReport {
        let mut report = BatchReport::default();
        for request in requests {
            if self.disabled.contains(request.assertion) {
                tracing::debug!(assertion = request.assertion, "skipping disabled assertion");
                report.skipped.push(request.assertion.to_string());
                continue;
            }
            let outcome = self.evaluate(request.assertion, &request.evaluation, env);
            if let Err(e) = &outcome {
                tracing::debug!(assertion = request.assertion, error = %e, "evaluation failed");
            }
            report.outcomes.push((request.assertion.to_string(), outcome));
        }
        report
    }

    /// Finalize every enabled assertion that is not yet finalized.
    pub fn finalize(&mut self, env: &Collaborators<'_, E>) -> Vec<(String, FormulaError)> {
        let mut failures = Vec::new();
        for assertion in &mut self.assertions {
            if self.disabled.contains(assertion.id()) || assertion.phase() == Phase::Finalized {
                continue;
            }
            if let Err(e) = assertion.process_evaluation_result(env) {
                failures.push((assertion.id().to_string(), e));
            }
        }
        failures
    }

    pub fn summary(&self) -> Vec<AssertionSummary> {
        self.assertions
            .iter()
            .map(|a| {
                let results = a.results();
                AssertionSummary {
                    id: a.id().to_string(),
                    kind: a.kind(),
                    enabled: self.is_enabled(a.id()),
                    satisfied: results.satisfied,
                    unsatisfied: results.unsatisfied,
                    satisfied_messages: results.satisfied_messages,
                    unsatisfied_messages: results.unsatisfied_messages,
                }
            })
            .collect()
    }

    /// Compare each expected entry; unknown ids are mismatches.
    pub fn compare(&self, expected: &BTreeMap<String, ExpectedResult>) -> BTreeMap<String, MatchResult> {
        expected
            .iter()
            .map(|(id, want)| {
                let result = match self.get(id) {
                    Some(a) => a.compare_result(want),
                    None => MatchResult::Mismatch(format!("no assertion with id {}", id)),
                };
                (id.clone(), result)
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "assertions": self.summary(),
        })
    }
}
