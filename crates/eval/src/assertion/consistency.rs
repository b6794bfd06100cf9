use rust_decimal::Decimal;
use xbrl_core::{Fact, TypedValue};

use crate::binding::VariableBinding;
use crate::comparator::FactComparator;
use crate::diagnostics::{Category, Level};
use crate::error::FormulaError;
use crate::expression::{ExprValue, ExpressionEngine, ExpressionError, Item, Scope};
use crate::fingerprint::{Fingerprint, StructuralHashDictionary};
use crate::numeric::{fact_precision, round_to_precision};

use super::{
    text_var, AssertionConfig, AssertionCore, AssertionKind, AssertionResults, Collaborators,
    Evaluation, EvaluationOutcome, Phase, VariableSetAssertion,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RadiusKind {
    Absolute,
    Proportional,
}

/// Counters that only consistency assertions keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniquenessCounts {
    pub input_satisfied: usize,
    pub input_unsatisfied: usize,
    pub derived_satisfied: usize,
    pub derived_unsatisfied: usize,
}

/// Checks each fact a formula derives against the reported facts it
/// aspect-matches.
pub struct ConsistencyAssertion<E: ExpressionEngine> {
    core: AssertionCore<E>,
    strict_attribute: Option<bool>,
    strict: bool,
    absolute_radius: Option<String>,
    proportional_radius: Option<String>,
    radius: Option<(RadiusKind, E::Compiled)>,
    /// Evaluated once, against the first derived fact that needs it.
    radius_value: Option<Decimal>,
    derived_fingerprints: StructuralHashDictionary,
    uniqueness: UniquenessCounts,
}

impl<E: ExpressionEngine> ConsistencyAssertion<E> {
    pub fn new(config: AssertionConfig, strict: Option<bool>) -> Self {
        ConsistencyAssertion {
            core: AssertionCore::new(config),
            strict_attribute: strict,
            strict: false,
            absolute_radius: None,
            proportional_radius: None,
            radius: None,
            radius_value: None,
            derived_fingerprints: StructuralHashDictionary::new(),
            uniqueness: UniquenessCounts::default(),
        }
    }

    pub fn with_absolute_radius(mut self, expression: impl Into<String>) -> Self {
        self.absolute_radius = Some(expression.into());
        self
    }

    pub fn with_proportional_radius(mut self, expression: impl Into<String>) -> Self {
        self.proportional_radius = Some(expression.into());
        self
    }

    pub fn core(&self) -> &AssertionCore<E> {
        &self.core
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn uniqueness(&self) -> UniquenessCounts {
        self.uniqueness
    }

    /// The cached radius scalar, once it has been resolved.
    pub fn radius_value(&self) -> Option<Decimal> {
        self.radius_value
    }

    /// Judge one derived fact. Both uniqueness dictionaries are updated
    /// first; they select which secondary counters move but never gate
    /// processing.
    pub fn check_fact_consistency(
        &mut self,
        derived: &Fact,
        binding: &VariableBinding,
        env: &Collaborators<'_, E>,
    ) -> Result<EvaluationOutcome, FormulaError> {
        let input_unique = self.core.record_unique(binding);
        let derived_unique = self
            .derived_fingerprints
            .insert(Fingerprint::of_fact(derived), self.core.evaluation_count());

        let comparator = FactComparator::new(env.store, env.engine);
        let derived_value = derived.value.as_ref();
        let derived_numeric = derived_value.and_then(TypedValue::as_decimal);

        if derived_numeric.is_some() && self.radius.is_none() && fact_precision(derived).is_zero() {
            return Ok(self.no_opinion(derived, "derived value has zero precision"));
        }

        let matched = comparator.aspect_matched_inputs(derived);

        let satisfied = if matched.is_empty() {
            if !self.strict {
                return Ok(self.no_opinion(derived, "no aspect-matched input facts"));
            }
            derived.is_nil()
        } else if derived.is_nil() {
            false
        } else {
            let mut satisfied = true;
            for input in &matched {
                match self.judge(derived, input, binding, &comparator, env)? {
                    Some(true) => {}
                    Some(false) => {
                        satisfied = false;
                        break;
                    }
                    None => {
                        return Ok(self.no_opinion(derived, "combined precision is zero"));
                    }
                }
            }
            satisfied
        };

        let matched_nodes = ExprValue::nodes(matched.iter().map(|f| &f.id));
        let radius = self
            .radius_value
            .map(|r| ExprValue::atomic(TypedValue::Decimal(r)))
            .unwrap_or_default();
        let mut scope = env
            .scope(binding)
            .with_var("ca:aspect-matched-facts", matched_nodes)
            .with_var("ca:acceptance-radius", radius)
            .with_var(
                "ca:absolute-acceptance-radius-expression",
                text_var(self.absolute_radius.as_deref()),
            )
            .with_var(
                "ca:proportional-acceptance-radius-expression",
                text_var(self.proportional_radius.as_deref()),
            )
            .with_var(
                "ca:strict",
                ExprValue::atomic(TypedValue::Boolean(self.strict)),
            );
        if let Some(v) = derived_value {
            scope = scope.with_context_item(Item::Atomic(v.clone()));
        }

        let outcome = self.core.record_outcome(satisfied, &scope, env);
        let counts = &mut self.uniqueness;
        match (satisfied, input_unique, derived_unique) {
            (true, i, d) => {
                counts.input_satisfied += usize::from(i);
                counts.derived_satisfied += usize::from(d);
            }
            (false, i, d) => {
                counts.input_unsatisfied += usize::from(i);
                counts.derived_unsatisfied += usize::from(d);
            }
        }
        self.core.emit_description(Category::ConsistencyCheck, &scope, env);
        Ok(outcome)
    }

    fn no_opinion(&self, derived: &Fact, reason: &str) -> EvaluationOutcome {
        tracing::debug!(
            assertion = %self.core.id(),
            derived = %derived.id,
            reason,
            "no opinion"
        );
        EvaluationOutcome::NoOpinion
    }

    /// `Some(consistent)` for one matched input, `None` when precision
    /// leaves no basis for a judgment.
    fn judge(
        &mut self,
        derived: &Fact,
        input: &Fact,
        binding: &VariableBinding,
        comparator: &FactComparator<'_, E>,
        env: &Collaborators<'_, E>,
    ) -> Result<Option<bool>, FormulaError> {
        let (derived_value, input_value) = match (&derived.value, &input.value) {
            (Some(d), Some(i)) => (d, i),
            (Some(_), None) => return Ok(Some(false)),
            (None, _) => return Ok(Some(false)),
        };

        let dv = match derived_value.as_decimal() {
            Some(dv) => dv,
            None => return Ok(Some(comparator.typed_value_equal(derived_value, input_value))),
        };
        let iv = match input_value.as_decimal() {
            Some(iv) => iv,
            None => return Ok(Some(false)),
        };

        if let Some(radius) = self.acceptance_radius(dv, binding, env)? {
            return Ok(Some((dv - iv).abs() <= radius.abs()));
        }

        let precision = fact_precision(derived).min(fact_precision(input));
        if precision.is_zero() {
            return Ok(None);
        }
        Ok(Some(
            round_to_precision(dv, precision) == round_to_precision(iv, precision),
        ))
    }

    /// Absolute radius as cached; proportional radius scaled by the
    /// derived value on every call.
    fn acceptance_radius(
        &mut self,
        derived_value: Decimal,
        binding: &VariableBinding,
        env: &Collaborators<'_, E>,
    ) -> Result<Option<Decimal>, FormulaError> {
        let kind = match &self.radius {
            Some((kind, _)) => *kind,
            None => return Ok(None),
        };
        let value = match self.radius_value {
            Some(v) => v,
            None => {
                let v = self.evaluate_radius(derived_value, binding, env)?;
                self.radius_value = Some(v);
                v
            }
        };
        match kind {
            RadiusKind::Absolute => Ok(Some(value)),
            RadiusKind::Proportional => value
                .checked_mul(derived_value)
                .map(Some)
                .ok_or_else(|| {
                    FormulaError::from(ExpressionError::Arithmetic(
                        "proportional acceptance radius overflows".to_string(),
                    ))
                }),
        }
    }

    fn evaluate_radius(
        &self,
        derived_value: Decimal,
        binding: &VariableBinding,
        env: &Collaborators<'_, E>,
    ) -> Result<Decimal, FormulaError> {
        let compiled = match &self.radius {
            Some((_, c)) => c,
            None => return Ok(Decimal::ZERO),
        };
        let scope: Scope<'_> = env
            .scope(binding)
            .with_context_item(Item::Atomic(TypedValue::Decimal(derived_value)));
        let result = env
            .engine
            .evaluate(compiled, &scope)
            .map_err(|e| self.core.expression_failure(env, e))?;
        match result.atomize(env.store).as_slice() {
            [v] if v.is_numeric() => Ok(v.as_decimal().unwrap_or_default()),
            _ => {
                let message = format!("acceptance radius must be a single number, got {}", result);
                env.sink.report(self.core.diagnostic(
                    Level::Error,
                    Category::EvaluationTypeError,
                    message.clone(),
                ));
                Err(FormulaError::EvaluationType {
                    assertion: self.core.id().to_string(),
                    message,
                })
            }
        }
    }
}

impl<E: ExpressionEngine> VariableSetAssertion<E> for ConsistencyAssertion<E> {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn kind(&self) -> AssertionKind {
        AssertionKind::Consistency
    }

    fn phase(&self) -> Phase {
        self.core.phase()
    }

    /// Both radius kinds is a configuration error; the absolute radius
    /// wins. A missing `strict` defaults to false.
    fn validate(&mut self, env: &Collaborators<'_, E>) -> Result<(), FormulaError> {
        self.core.validate_common(env)?;
        self.strict = match self.strict_attribute {
            Some(v) => v,
            None => {
                self.core.configuration_error(
                    env,
                    Level::Error,
                    "missing strict attribute; defaulting to false",
                );
                false
            }
        };

        if self.absolute_radius.is_some() && self.proportional_radius.is_some() {
            self.core.configuration_error(
                env,
                Level::Warning,
                "both absoluteAcceptanceRadius and proportionalAcceptanceRadius are set; using the absolute radius",
            );
        }
        let chosen = match (&self.absolute_radius, &self.proportional_radius) {
            (Some(text), _) => Some((RadiusKind::Absolute, text)),
            (None, Some(text)) => Some((RadiusKind::Proportional, text)),
            (None, None) => None,
        };
        self.radius = match chosen {
            Some((kind, text)) => Some((kind, self.core.compile(text, env)?)),
            None => None,
        };
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
        let derived = evaluation
            .derived
            .ok_or_else(|| FormulaError::MissingDerivedFact(self.core.id().to_string()))?;
        self.check_fact_consistency(derived, evaluation.binding, env)
    }

    fn process_evaluation_result(&mut self, _env: &Collaborators<'_, E>) -> Result<(), FormulaError> {
        self.core.finalize()
    }

    fn results(&self) -> AssertionResults {
        self.core.results()
    }
}
