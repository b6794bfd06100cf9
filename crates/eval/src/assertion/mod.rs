//! Assertion state machines.
//!
//! Every assertion moves `Idle → Evaluating → Finalized`. Value and
//! existence assertions are driven by variable-set evaluations;
//! consistency assertions by a formula's derived facts. All three share
//! bookkeeping through [`AssertionCore`] and expose the
//! [`VariableSetAssertion`] capability.

mod consistency;
mod existence;
mod value;

pub use consistency::ConsistencyAssertion;
pub use existence::ExistenceAssertion;
pub use value::ValueAssertion;

use std::fmt;

use serde::{Deserialize, Serialize};
use xbrl_core::{Fact, FactStore, NamespaceContext, TypedValue};

use crate::binding::VariableBinding;
use crate::diagnostics::{Category, Diagnostic, DiagnosticsSink, Level};
use crate::error::FormulaError;
use crate::expression::{ExprValue, ExpressionEngine, ExpressionError, Scope};
use crate::fingerprint::{Fingerprint, StructuralHashDictionary};
use crate::message::MessageTemplate;

// ──────────────────────────────────────────────
// Vocabulary
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionKind {
    Value,
    Existence,
    Consistency,
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionKind::Value => f.write_str("value"),
            AssertionKind::Existence => f.write_str("existence"),
            AssertionKind::Consistency => f.write_str("consistency"),
        }
    }
}

/// Severity classification of an assertion's unsatisfied result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Ok,
    Warning,
}

impl Severity {
    /// Level at which unsatisfied messages are reported.
    pub fn level(self) -> Level {
        match self {
            Severity::Error => Level::Error,
            Severity::Warning => Level::Warning,
            Severity::Ok => Level::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Evaluating,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A precondition expression was false.
    PreconditionUnmet,
    /// Every variable fell back.
    AllFallback,
    /// The binding's fingerprint was already processed.
    Duplicate,
}

/// Result of one evaluation. `NoOpinion` is neither satisfied nor
/// unsatisfied and leaves the counts untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    Satisfied,
    Unsatisfied,
    NoOpinion,
    Skipped(SkipReason),
}

impl EvaluationOutcome {
    fn judged(satisfied: bool) -> Self {
        if satisfied {
            EvaluationOutcome::Satisfied
        } else {
            EvaluationOutcome::Unsatisfied
        }
    }
}

/// One evaluation handed to an assertion.
///
/// `exists` drives existence assertions; `derived` is the formula's
/// output fact for consistency assertions. Other kinds ignore both.
#[derive(Debug, Clone, Copy)]
pub struct Evaluation<'a> {
    pub binding: &'a VariableBinding,
    pub exists: bool,
    pub derived: Option<&'a Fact>,
}

impl<'a> Evaluation<'a> {
    pub fn new(binding: &'a VariableBinding) -> Self {
        Evaluation {
            binding,
            exists: true,
            derived: None,
        }
    }

    pub fn with_exists(mut self, exists: bool) -> Self {
        self.exists = exists;
        self
    }

    pub fn with_derived(mut self, derived: &'a Fact) -> Self {
        self.derived = Some(derived);
        self
    }
}

/// The collaborators every operation needs, passed explicitly.
pub struct Collaborators<'a, E> {
    pub engine: &'a E,
    pub store: &'a dyn FactStore,
    pub sink: &'a dyn DiagnosticsSink,
}

impl<'a, E> Collaborators<'a, E> {
    pub fn new(engine: &'a E, store: &'a dyn FactStore, sink: &'a dyn DiagnosticsSink) -> Self {
        Collaborators {
            engine,
            store,
            sink,
        }
    }

    pub fn scope(&self, binding: &'a VariableBinding) -> Scope<'a> {
        Scope::new(binding, self.store, self.sink)
    }
}

impl<E> Clone for Collaborators<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Collaborators<'_, E> {}

// ──────────────────────────────────────────────
// Results
// ──────────────────────────────────────────────

/// Read-only view of an assertion's counts and generated messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResults {
    pub satisfied: usize,
    pub unsatisfied: usize,
    pub satisfied_messages: Vec<String>,
    pub unsatisfied_messages: Vec<String>,
}

/// Counts (and optionally messages) a harness expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedResult {
    pub satisfied: usize,
    pub unsatisfied: usize,
    #[serde(default)]
    pub messages: Option<Vec<String>>,
}

impl ExpectedResult {
    pub fn counts(satisfied: usize, unsatisfied: usize) -> Self {
        ExpectedResult {
            satisfied,
            unsatisfied,
            messages: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<String>) -> Self {
        self.messages = Some(messages);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Match,
    Mismatch(String),
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match)
    }
}

/// Compare counts, then (when given) messages. Messages compare as
/// multisets over satisfied and unsatisfied messages together.
pub fn compare_results(actual: &AssertionResults, expected: &ExpectedResult) -> MatchResult {
    if actual.satisfied != expected.satisfied || actual.unsatisfied != expected.unsatisfied {
        return MatchResult::Mismatch(format!(
            "expected satisfied={} unsatisfied={}, got satisfied={} unsatisfied={}",
            expected.satisfied, expected.unsatisfied, actual.satisfied, actual.unsatisfied
        ));
    }
    if let Some(expected_messages) = &expected.messages {
        let mut want = expected_messages.clone();
        let mut got: Vec<String> = actual
            .satisfied_messages
            .iter()
            .chain(&actual.unsatisfied_messages)
            .cloned()
            .collect();
        want.sort();
        got.sort();
        if want != got {
            return MatchResult::Mismatch(format!(
                "expected messages {:?}, got {:?}",
                want, got
            ));
        }
    }
    MatchResult::Match
}

// ──────────────────────────────────────────────
// Capability
// ──────────────────────────────────────────────

pub trait VariableSetAssertion<E: ExpressionEngine> {
    fn id(&self) -> &str;

    fn kind(&self) -> AssertionKind;

    fn phase(&self) -> Phase;

    /// Compile expressions and check attributes. A resource-level fault
    /// (an expression that does not compile) fails the whole assertion.
    fn validate(&mut self, env: &Collaborators<'_, E>) -> Result<(), FormulaError>;

    /// Names of the variables the assertion's variable set binds.
    fn variable_refs(&self) -> Vec<String>;

    fn evaluate(
        &mut self,
        evaluation: &Evaluation<'_>,
        env: &Collaborators<'_, E>,
    ) -> Result<EvaluationOutcome, FormulaError>;

    /// Close the assertion. Counts are immutable afterwards.
    fn process_evaluation_result(&mut self, env: &Collaborators<'_, E>) -> Result<(), FormulaError>;

    fn results(&self) -> AssertionResults;

    fn compare_result(&self, expected: &ExpectedResult) -> MatchResult {
        compare_results(&self.results(), expected)
    }
}

// ──────────────────────────────────────────────
// Configuration
// ──────────────────────────────────────────────

/// Attributes common to every assertion kind, as resolved from the
/// taxonomy (messages and severity arrive pre-resolved).
#[derive(Debug, Clone, Default)]
pub struct AssertionConfig {
    pub id: String,
    pub namespaces: NamespaceContext,
    pub variables: Vec<String>,
    /// `None` when the attribute was absent.
    pub implicit_filtering: Option<bool>,
    pub severity: Severity,
    pub description: Option<String>,
    pub preconditions: Vec<String>,
    pub satisfied_messages: Vec<String>,
    pub unsatisfied_messages: Vec<String>,
}

impl AssertionConfig {
    pub fn new(id: impl Into<String>) -> Self {
        AssertionConfig {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_namespaces(mut self, namespaces: NamespaceContext) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.variables.push(name.into());
        self
    }

    pub fn with_implicit_filtering(mut self, value: bool) -> Self {
        self.implicit_filtering = Some(value);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_description(mut self, template: impl Into<String>) -> Self {
        self.description = Some(template.into());
        self
    }

    pub fn with_precondition(mut self, test: impl Into<String>) -> Self {
        self.preconditions.push(test.into());
        self
    }

    pub fn with_satisfied_message(mut self, template: impl Into<String>) -> Self {
        self.satisfied_messages.push(template.into());
        self
    }

    pub fn with_unsatisfied_message(mut self, template: impl Into<String>) -> Self {
        self.unsatisfied_messages.push(template.into());
        self
    }
}

// ──────────────────────────────────────────────
// Shared core
// ──────────────────────────────────────────────

/// State and behaviour shared by all assertion kinds.
pub struct AssertionCore<E: ExpressionEngine> {
    config: AssertionConfig,
    implicit_filtering: bool,
    preconditions: Vec<E::Compiled>,
    satisfied_templates: Vec<MessageTemplate<E::Compiled>>,
    unsatisfied_templates: Vec<MessageTemplate<E::Compiled>>,
    description: Option<MessageTemplate<E::Compiled>>,
    validated: bool,
    phase: Phase,
    fingerprints: StructuralHashDictionary,
    evaluation_count: u64,
    satisfied: usize,
    unsatisfied: usize,
    satisfied_messages: Vec<String>,
    unsatisfied_messages: Vec<String>,
}

impl<E: ExpressionEngine> AssertionCore<E> {
    pub fn new(config: AssertionConfig) -> Self {
        AssertionCore {
            config,
            implicit_filtering: false,
            preconditions: Vec::new(),
            satisfied_templates: Vec::new(),
            unsatisfied_templates: Vec::new(),
            description: None,
            validated: false,
            phase: Phase::Idle,
            fingerprints: StructuralHashDictionary::new(),
            evaluation_count: 0,
            satisfied: 0,
            unsatisfied: 0,
            satisfied_messages: Vec::new(),
            unsatisfied_messages: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &AssertionConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn implicit_filtering(&self) -> bool {
        self.implicit_filtering
    }

    pub fn severity(&self) -> Severity {
        self.config.severity
    }

    pub fn satisfied(&self) -> usize {
        self.satisfied
    }

    pub fn unsatisfied(&self) -> usize {
        self.unsatisfied
    }

    /// Evaluations accepted so far, including skipped ones.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count
    }

    pub fn results(&self) -> AssertionResults {
        AssertionResults {
            satisfied: self.satisfied,
            unsatisfied: self.unsatisfied,
            satisfied_messages: self.satisfied_messages.clone(),
            unsatisfied_messages: self.unsatisfied_messages.clone(),
        }
    }

    /// A diagnostic tagged with this assertion's id.
    pub fn diagnostic(&self, level: Level, category: Category, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(level, category, message).with("assertion", &self.config.id)
    }

    pub fn configuration_error(&self, env: &Collaborators<'_, E>, level: Level, message: &str) {
        env.sink
            .report(self.diagnostic(level, Category::ConfigurationError, message));
    }

    /// Compile an assertion-level expression, reporting failures.
    pub fn compile(
        &self,
        text: &str,
        env: &Collaborators<'_, E>,
    ) -> Result<E::Compiled, FormulaError> {
        env.engine
            .compile(text, &self.config.namespaces)
            .map_err(|e| {
                env.sink.report(
                    self.diagnostic(Level::Error, Category::ExpressionError, e.to_string())
                        .with("expression", text),
                );
                FormulaError::from(e)
            })
    }

    /// Attributes and expressions every kind has. Message templates never
    /// fail validation; preconditions do.
    pub fn validate_common(&mut self, env: &Collaborators<'_, E>) -> Result<(), FormulaError> {
        self.implicit_filtering = match self.config.implicit_filtering {
            Some(v) => v,
            None => {
                self.configuration_error(
                    env,
                    Level::Error,
                    "missing implicitFiltering attribute; defaulting to false",
                );
                false
            }
        };

        let mut preconditions = Vec::with_capacity(self.config.preconditions.len());
        for text in &self.config.preconditions {
            preconditions.push(self.compile(text, env)?);
        }
        self.preconditions = preconditions;

        let ns = &self.config.namespaces;
        self.satisfied_templates = self
            .config
            .satisfied_messages
            .iter()
            .map(|t| MessageTemplate::compile(t, env.engine, ns, env.sink))
            .collect();
        self.unsatisfied_templates = self
            .config
            .unsatisfied_messages
            .iter()
            .map(|t| MessageTemplate::compile(t, env.engine, ns, env.sink))
            .collect();
        self.description = self
            .config
            .description
            .as_deref()
            .map(|t| MessageTemplate::compile(t, env.engine, ns, env.sink));
        Ok(())
    }

    /// Called by each kind once its own attributes have validated.
    pub fn mark_validated(&mut self) {
        self.validated = true;
    }

    /// Gate every evaluation: validated, not finalized.
    pub fn begin_evaluation(&mut self) -> Result<(), FormulaError> {
        match self.phase {
            Phase::Finalized => {
                return Err(FormulaError::AssertionFinalized(self.config.id.clone()))
            }
            _ if !self.validated => return Err(FormulaError::NotValidated(self.config.id.clone())),
            _ => {}
        }
        self.phase = Phase::Evaluating;
        self.evaluation_count += 1;
        Ok(())
    }

    /// `Some(reason)` when the evaluation must be skipped before dedup.
    pub fn unmet_precondition(
        &self,
        binding: &VariableBinding,
        env: &Collaborators<'_, E>,
    ) -> Result<Option<SkipReason>, FormulaError> {
        if binding.all_fallback() {
            return Ok(Some(SkipReason::AllFallback));
        }
        let scope = Scope::new(binding, env.store, env.sink);
        for precondition in &self.preconditions {
            let holds = env
                .engine
                .evaluate(precondition, &scope)
                .and_then(|v| v.effective_boolean_value())
                .map_err(|e| self.expression_failure(env, e))?;
            if !holds {
                return Ok(Some(SkipReason::PreconditionUnmet));
            }
        }
        Ok(None)
    }

    /// Record the binding's fingerprint; false when it was already seen.
    pub fn record_unique(&mut self, binding: &VariableBinding) -> bool {
        self.fingerprints
            .insert(Fingerprint::of(binding), self.evaluation_count)
    }

    pub fn skipped(&self, reason: SkipReason) -> EvaluationOutcome {
        tracing::debug!(assertion = %self.config.id, ?reason, "evaluation skipped");
        EvaluationOutcome::Skipped(reason)
    }

    /// Report a failed expression evaluation and convert it.
    pub fn expression_failure(&self, env: &Collaborators<'_, E>, error: ExpressionError) -> FormulaError {
        let category = if error.is_type_error() {
            Category::EvaluationTypeError
        } else {
            Category::ExpressionError
        };
        env.sink
            .report(self.diagnostic(Level::Error, category, error.to_string()));
        FormulaError::from(error)
    }

    /// Report a test that did not yield a single boolean.
    pub fn non_boolean_test(&self, env: &Collaborators<'_, E>, value: &ExprValue) -> FormulaError {
        let message = format!("test expression must yield xs:boolean, got {}", value);
        env.sink.report(self.diagnostic(
            Level::Error,
            Category::EvaluationTypeError,
            message.clone(),
        ));
        FormulaError::EvaluationType {
            assertion: self.config.id.clone(),
            message,
        }
    }

    /// Count a judgment without generating messages.
    pub fn tally(&mut self, satisfied: bool) -> EvaluationOutcome {
        if satisfied {
            self.satisfied += 1;
        } else {
            self.unsatisfied += 1;
        }
        EvaluationOutcome::judged(satisfied)
    }

    /// Count a judgment and generate its messages.
    pub fn record_outcome(
        &mut self,
        satisfied: bool,
        scope: &Scope<'_>,
        env: &Collaborators<'_, E>,
    ) -> EvaluationOutcome {
        let outcome = self.tally(satisfied);
        self.emit_messages(satisfied, scope, env);
        outcome
    }

    /// The single message path: render the satisfied or unsatisfied
    /// templates, keep the text, and report each message.
    pub fn emit_messages(&mut self, satisfied: bool, scope: &Scope<'_>, env: &Collaborators<'_, E>) {
        let (templates, category, level) = if satisfied {
            (&self.satisfied_templates, Category::AssertionSatisfied, Level::Info)
        } else {
            (
                &self.unsatisfied_templates,
                Category::AssertionUnsatisfied,
                self.config.severity.level(),
            )
        };
        let rendered: Vec<String> = templates
            .iter()
            .map(|t| t.render(env.engine, scope))
            .collect();
        for text in &rendered {
            env.sink
                .report(self.diagnostic(level, category, text.clone()));
        }
        if satisfied {
            self.satisfied_messages.extend(rendered);
        } else {
            self.unsatisfied_messages.extend(rendered);
        }
    }

    /// Render the description, if one is configured, and report it at
    /// info level under `category`.
    pub fn emit_description(&self, category: Category, scope: &Scope<'_>, env: &Collaborators<'_, E>) {
        if let Some(template) = &self.description {
            let text = template.render(env.engine, scope);
            env.sink.report(self.diagnostic(Level::Info, category, text));
        }
    }

    /// Enter `Finalized`; the second call is an error.
    pub fn finalize(&mut self) -> Result<(), FormulaError> {
        if self.phase == Phase::Finalized {
            return Err(FormulaError::AssertionFinalized(self.config.id.clone()));
        }
        self.phase = Phase::Finalized;
        tracing::info!(
            assertion = %self.config.id,
            satisfied = self.satisfied,
            unsatisfied = self.unsatisfied,
            "assertion finalized"
        );
        Ok(())
    }
}

/// Text of an expression as an `xs:string` context variable.
pub(crate) fn text_var(text: Option<&str>) -> ExprValue {
    match text {
        Some(t) => ExprValue::atomic(TypedValue::String(t.to_string())),
        None => ExprValue::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(s: usize, u: usize, messages: &[&str]) -> AssertionResults {
        AssertionResults {
            satisfied: s,
            unsatisfied: u,
            satisfied_messages: messages.iter().map(|m| m.to_string()).collect(),
            unsatisfied_messages: Vec::new(),
        }
    }

    #[test]
    fn compare_reports_count_mismatch() {
        let actual = results(1, 0, &[]);
        assert!(compare_results(&actual, &ExpectedResult::counts(1, 0)).is_match());
        match compare_results(&actual, &ExpectedResult::counts(0, 1)) {
            MatchResult::Mismatch(text) => {
                assert!(text.contains("expected satisfied=0 unsatisfied=1"));
                assert!(text.contains("got satisfied=1 unsatisfied=0"));
            }
            MatchResult::Match => panic!("counts differ"),
        }
    }

    #[test]
    fn compare_checks_messages_when_given() {
        let actual = results(2, 0, &["b", "a"]);
        let expected = ExpectedResult::counts(2, 0).with_messages(vec!["a".into(), "b".into()]);
        assert!(compare_results(&actual, &expected).is_match());
        let expected = ExpectedResult::counts(2, 0).with_messages(vec!["a".into()]);
        assert!(!compare_results(&actual, &expected).is_match());
    }

    #[test]
    fn severity_maps_to_report_level() {
        assert_eq!(Severity::default(), Severity::Error);
        assert_eq!(Severity::Ok.level(), Level::Info);
        assert_eq!(Severity::Warning.level(), Level::Warning);
    }
}
