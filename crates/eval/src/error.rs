use xbrl_core::InstanceError;

use crate::expression::ExpressionError;

/// Errors raised while validating or evaluating an assertion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    /// `evaluate` was called before a successful `validate`.
    #[error("assertion {0} has not been validated")]
    NotValidated(String),

    /// The assertion already produced its final result.
    #[error("assertion {0} is finalized; no further evaluations are accepted")]
    AssertionFinalized(String),

    /// A required attribute is missing or attributes conflict in a way
    /// that cannot be defaulted.
    #[error("configuration error in assertion {assertion}: {message}")]
    Configuration { assertion: String, message: String },

    /// A test expression produced something other than a boolean.
    #[error("evaluation type error in assertion {assertion}: {message}")]
    EvaluationType { assertion: String, message: String },

    /// A consistency evaluation arrived without the formula's derived fact.
    #[error("consistency assertion {0} needs a derived fact for every evaluation")]
    MissingDerivedFact(String),

    /// A batch referred to a derived fact the store does not hold.
    #[error("derived fact {0} is not in the fact store")]
    UnknownDerivedFact(String),

    #[error("no assertion with id {0}")]
    UnknownAssertion(String),

    #[error("invalid assertion definition: {0}")]
    Definition(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Instance(#[from] InstanceError),
}
