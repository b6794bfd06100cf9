use crate::diagnostics::Level;
use crate::error::FormulaError;
use crate::expression::ExpressionEngine;

use super::{
    text_var, AssertionConfig, AssertionCore, AssertionKind, AssertionResults, Collaborators,
    Evaluation, EvaluationOutcome, Phase, SkipReason, VariableSetAssertion,
};

/// An assertion whose boolean `test` is judged once per unique evaluation.
pub struct ValueAssertion<E: ExpressionEngine> {
    core: AssertionCore<E>,
    test: Option<String>,
    compiled: Option<E::Compiled>,
}

impl<E: ExpressionEngine> ValueAssertion<E> {
    pub fn new(config: AssertionConfig, test: Option<String>) -> Self {
        ValueAssertion {
            core: AssertionCore::new(config),
            test,
            compiled: None,
        }
    }

    pub fn core(&self) -> &AssertionCore<E> {
        &self.core
    }

    pub fn test(&self) -> Option<&str> {
        self.test.as_deref()
    }
}

impl<E: ExpressionEngine> VariableSetAssertion<E> for ValueAssertion<E> {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn kind(&self) -> AssertionKind {
        AssertionKind::Value
    }

    fn phase(&self) -> Phase {
        self.core.phase()
    }

    fn validate(&mut self, env: &Collaborators<'_, E>) -> Result<(), FormulaError> {
        self.core.validate_common(env)?;
        let test = match &self.test {
            Some(t) => t,
            None => {
                self.core
                    .configuration_error(env, Level::Error, "missing test attribute");
                return Err(FormulaError::Configuration {
                    assertion: self.core.id().to_string(),
                    message: "value assertion has no test expression".to_string(),
                });
            }
        };
        self.compiled = Some(self.core.compile(test, env)?);
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
        let compiled = self
            .compiled
            .as_ref()
            .ok_or_else(|| FormulaError::NotValidated(self.core.id().to_string()))?;

        if let Some(reason) = self.core.unmet_precondition(evaluation.binding, env)? {
            return Ok(self.core.skipped(reason));
        }
        if !self.core.record_unique(evaluation.binding) {
            return Ok(self.core.skipped(SkipReason::Duplicate));
        }

        let scope = env
            .scope(evaluation.binding)
            .with_var("va:test-expression", text_var(self.test.as_deref()));
        let result = env
            .engine
            .evaluate(compiled, &scope)
            .map_err(|e| self.core.expression_failure(env, e))?;
        match result.as_boolean() {
            Some(satisfied) => Ok(self.core.record_outcome(satisfied, &scope, env)),
            None => Err(self.core.non_boolean_test(env, &result)),
        }
    }

    fn process_evaluation_result(&mut self, _env: &Collaborators<'_, E>) -> Result<(), FormulaError> {
        self.core.finalize()
    }

    fn results(&self) -> AssertionResults {
        self.core.results()
    }
}
