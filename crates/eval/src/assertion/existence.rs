use xbrl_core::TypedValue;

use crate::binding::VariableBinding;
use crate::error::FormulaError;
use crate::expression::{ExprValue, ExpressionEngine, Item};

use super::{
    text_var, AssertionConfig, AssertionCore, AssertionKind, AssertionResults, Collaborators,
    Evaluation, EvaluationOutcome, Phase, SkipReason, VariableSetAssertion,
};

/// An assertion about whether evaluations produced usable fact
/// combinations.
///
/// Without a `test`, every unique evaluation is judged by its `exists`
/// flag and generates messages immediately. With a `test`, evaluations
/// only feed private tallies and the test decides once, at finalization,
/// against them (`$ea:satisfied-count`, `$ea:unsatisfied-count`,
/// `$ea:evaluation-count`; the context item is the evaluation count).
/// That single judgment is the assertion's recorded result.
pub struct ExistenceAssertion<E: ExpressionEngine> {
    core: AssertionCore<E>,
    test: Option<String>,
    compiled: Option<E::Compiled>,
    tallies: Tallies,
    verdict: Option<bool>,
}

/// Per-evaluation counts behind the `$ea:` variables.
#[derive(Debug, Default, Clone, Copy)]
struct Tallies {
    satisfied: i64,
    unsatisfied: i64,
}

impl<E: ExpressionEngine> ExistenceAssertion<E> {
    pub fn new(config: AssertionConfig, test: Option<String>) -> Self {
        ExistenceAssertion {
            core: AssertionCore::new(config),
            test,
            compiled: None,
            tallies: Tallies::default(),
            verdict: None,
        }
    }

    pub fn core(&self) -> &AssertionCore<E> {
        &self.core
    }

    /// Overall result, available once finalized.
    pub fn verdict(&self) -> Option<bool> {
        self.verdict
    }

    fn judge_aggregate(
        &mut self,
        env: &Collaborators<'_, E>,
    ) -> Result<bool, FormulaError> {
        let compiled = match &self.compiled {
            Some(c) => c,
            None => return Ok(self.core.satisfied() > 0),
        };
        let Tallies { satisfied, unsatisfied } = self.tallies;
        let count = satisfied + unsatisfied;
        let integer = |n: i64| ExprValue::atomic(TypedValue::Integer(n));

        let no_bindings = VariableBinding::new();
        let scope = env
            .scope(&no_bindings)
            .with_var("ea:satisfied-count", integer(satisfied))
            .with_var("ea:unsatisfied-count", integer(unsatisfied))
            .with_var("ea:evaluation-count", integer(count))
            .with_var("ea:test-expression", text_var(self.test.as_deref()))
            .with_context_item(Item::Atomic(TypedValue::Integer(count)));

        let result = env
            .engine
            .evaluate(compiled, &scope)
            .map_err(|e| self.core.expression_failure(env, e))?;
        let verdict = result
            .as_boolean()
            .ok_or_else(|| self.core.non_boolean_test(env, &result))?;
        self.core.record_outcome(verdict, &scope, env);
        Ok(verdict)
    }
}

impl<E: ExpressionEngine> VariableSetAssertion<E> for ExistenceAssertion<E> {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn kind(&self) -> AssertionKind {
        AssertionKind::Existence
    }

    fn phase(&self) -> Phase {
        self.core.phase()
    }

    fn validate(&mut self, env: &Collaborators<'_, E>) -> Result<(), FormulaError> {
        self.core.validate_common(env)?;
        if let Some(test) = &self.test {
            self.compiled = Some(self.core.compile(test, env)?);
        }
        self.core.mark_validated();
        Ok(())
    }

    fn variable_refs(&self) -> Vec<String> {
        self.core.config().variables.clone()
    }

    fn evaluate(
        &mut self,
        evaluation: &Evaluation<'_>,
        env: &Collaborators<'_, E>,
    ) -> Result<EvaluationOutcome, FormulaError> {
        self.core.begin_evaluation()?;
        if let Some(reason) = self.core.unmet_precondition(evaluation.binding, env)? {
            return Ok(self.core.skipped(reason));
        }
        if !self.core.record_unique(evaluation.binding) {
            return Ok(self.core.skipped(SkipReason::Duplicate));
        }

        if self.compiled.is_some() {
            if evaluation.exists {
                self.tallies.satisfied += 1;
            } else {
                self.tallies.unsatisfied += 1;
            }
            return Ok(EvaluationOutcome::judged(evaluation.exists));
        }
        let scope = env
            .scope(evaluation.binding)
            .with_var("ea:test-expression", text_var(None));
        Ok(self.core.record_outcome(evaluation.exists, &scope, env))
    }

    /// With a test, judge the aggregate and generate messages once; the
    /// assertion is finalized even when the test fails to evaluate.
    fn process_evaluation_result(&mut self, env: &Collaborators<'_, E>) -> Result<(), FormulaError> {
        if self.core.phase() == Phase::Finalized {
            return Err(FormulaError::AssertionFinalized(self.core.id().to_string()));
        }
        let judged = self.judge_aggregate(env);
        self.core.finalize()?;
        self.verdict = Some(judged?);
        Ok(())
    }

    fn results(&self) -> AssertionResults {
        self.core.results()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::ExpectedResult;
    use crate::binding::BoundValue;
    use crate::diagnostics::{Category, CollectingSink};
    use crate::xpath::XPathEngine;
    use xbrl_core::{FactId, InstanceStore};

    fn binding(path: &str) -> VariableBinding {
        VariableBinding::new().with("x", BoundValue::Node(FactId::new(path)))
    }

    fn config() -> AssertionConfig {
        AssertionConfig::new("ea1")
            .with_variable("x")
            .with_implicit_filtering(true)
            .with_satisfied_message("found")
            .with_unsatisfied_message("missing")
    }

    #[test]
    fn without_test_each_unique_evaluation_is_judged() {
        let engine = XPathEngine::new();
        let store = InstanceStore::new();
        let sink = CollectingSink::new();
        let env = Collaborators::new(&engine, &store, &sink);
        let mut ea = ExistenceAssertion::new(config(), None);
        ea.validate(&env).unwrap();

        let a = binding("/a");
        let b = binding("/b");
        ea.evaluate(&Evaluation::new(&a), &env).unwrap();
        ea.evaluate(&Evaluation::new(&a), &env).unwrap();
        ea.evaluate(&Evaluation::new(&b).with_exists(false), &env).unwrap();
        ea.process_evaluation_result(&env).unwrap();

        let expected = ExpectedResult::counts(1, 1)
            .with_messages(vec!["found".into(), "missing".into()]);
        assert!(ea.compare_result(&expected).is_match());
        assert_eq!(ea.verdict(), Some(true));
    }

    #[test]
    fn with_test_messages_are_generated_once_at_finalization() {
        let engine = XPathEngine::new();
        let store = InstanceStore::new();
        let sink = CollectingSink::new();
        let env = Collaborators::new(&engine, &store, &sink);
        let cfg = config().with_satisfied_message("{$ea:satisfied-count} of {.}");
        let mut ea = ExistenceAssertion::new(cfg, Some("$ea:satisfied-count ge 2".into()));
        ea.validate(&env).unwrap();

        for path in ["/a", "/b", "/c"] {
            let b = binding(path);
            ea.evaluate(&Evaluation::new(&b).with_exists(path != "/c"), &env)
                .unwrap();
        }
        assert!(!sink.has(Category::AssertionSatisfied));
        ea.process_evaluation_result(&env).unwrap();

        assert_eq!(ea.verdict(), Some(true));
        let results = ea.results();
        assert_eq!((results.satisfied, results.unsatisfied), (1, 0));
        assert_eq!(results.satisfied_messages, vec!["found".to_string(), "2 of 3".to_string()]);
        assert!(results.unsatisfied_messages.is_empty());
    }

    #[test]
    fn failing_test_is_recorded_even_when_every_evaluation_exists() {
        let engine = XPathEngine::new();
        let store = InstanceStore::new();
        let sink = CollectingSink::new();
        let env = Collaborators::new(&engine, &store, &sink);
        let cfg = config().with_unsatisfied_message("only {$ea:satisfied-count}");
        let mut ea = ExistenceAssertion::new(cfg, Some("$ea:satisfied-count ge 3".into()));
        ea.validate(&env).unwrap();

        for path in ["/a", "/b"] {
            let b = binding(path);
            let outcome = ea.evaluate(&Evaluation::new(&b), &env).unwrap();
            assert_eq!(outcome, EvaluationOutcome::Satisfied);
        }
        assert_eq!(ea.results(), AssertionResults::default());
        ea.process_evaluation_result(&env).unwrap();

        assert_eq!(ea.verdict(), Some(false));
        let expected = ExpectedResult::counts(0, 1)
            .with_messages(vec!["missing".into(), "only 2".into()]);
        assert!(ea.compare_result(&expected).is_match());
        assert!(!ea.compare_result(&ExpectedResult::counts(2, 0)).is_match());
        assert!(!sink.has(Category::AssertionSatisfied));
    }

    #[test]
    fn constant_tests_decide_the_recorded_result() {
        let run = |test: &str| {
            let engine = XPathEngine::new();
            let store = InstanceStore::new();
            let sink = CollectingSink::new();
            let env = Collaborators::new(&engine, &store, &sink);
            let mut ea = ExistenceAssertion::new(config(), Some(test.to_string()));
            ea.validate(&env).unwrap();
            for path in ["/a", "/b"] {
                let b = binding(path);
                ea.evaluate(&Evaluation::new(&b), &env).unwrap();
            }
            ea.process_evaluation_result(&env).unwrap();
            let results = ea.results();
            (results.satisfied, results.unsatisfied)
        };
        assert_eq!(run("true()"), (1, 0));
        assert_eq!(run("false()"), (0, 1));
    }

    #[test]
    fn all_fallback_bindings_are_skipped() {
        let engine = XPathEngine::new();
        let store = InstanceStore::new();
        let sink = CollectingSink::new();
        let env = Collaborators::new(&engine, &store, &sink);
        let mut ea = ExistenceAssertion::new(config(), None);
        ea.validate(&env).unwrap();
        let b = VariableBinding::new().with("x", BoundValue::Fallback);
        assert_eq!(
            ea.evaluate(&Evaluation::new(&b), &env).unwrap(),
            EvaluationOutcome::Skipped(SkipReason::AllFallback)
        );
        assert_eq!(ea.results(), AssertionResults::default());
    }

    #[test]
    fn missing_implicit_filtering_is_reported_and_defaulted() {
        let engine = XPathEngine::new();
        let store = InstanceStore::new();
        let sink = CollectingSink::new();
        let env = Collaborators::new(&engine, &store, &sink);
        let mut ea: ExistenceAssertion<XPathEngine> =
            ExistenceAssertion::new(AssertionConfig::new("ea2"), None);
        ea.validate(&env).unwrap();
        assert!(sink.has(Category::ConfigurationError));
        assert!(!ea.core().implicit_filtering());
    }
}
