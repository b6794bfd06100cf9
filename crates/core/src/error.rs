/// Errors raised while building or loading an instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstanceError {
    /// A prefixed name used a prefix with no namespace binding.
    #[error("undeclared namespace prefix '{prefix}' in '{name}'")]
    UndeclaredPrefix { prefix: String, name: String },

    /// A name could not be read as a QName at all.
    #[error("invalid qualified name '{0}'")]
    InvalidQName(String),

    /// A lexical value does not parse under its declared type.
    #[error("invalid {type_name} value '{lexical}'")]
    InvalidValue { type_name: String, lexical: String },

    /// A `decimals` or `precision` attribute is neither an integer nor INF.
    #[error("invalid {attribute} attribute '{value}'")]
    InvalidAccuracy { attribute: String, value: String },

    /// A fact refers to a context that is not part of the instance.
    #[error("fact '{fact_id}' refers to unknown context '{context_ref}'")]
    UnknownContext { fact_id: String, context_ref: String },

    /// A fact refers to a unit that is not part of the instance.
    #[error("fact '{fact_id}' refers to unknown unit '{unit_ref}'")]
    UnknownUnit { fact_id: String, unit_ref: String },

    /// Two facts share a structural identifier.
    #[error("duplicate fact id '{0}'")]
    DuplicateFact(String),

    /// The instance JSON is structurally invalid.
    #[error("invalid instance document: {0}")]
    Deserialize(String),
}
