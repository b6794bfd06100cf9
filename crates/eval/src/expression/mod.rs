//! The expression-engine seam.
//!
//! The assertion core never interprets expression text itself. It
//! compiles test, precondition, radius and message expressions through an
//! [`ExpressionEngine`] and evaluates them against a [`Scope`]: the
//! evaluation's bindings plus assertion-specific context variables.

use std::collections::BTreeMap;
use std::fmt;

use xbrl_core::{FactId, FactStore, NamespaceContext, TypedValue};

use crate::binding::VariableBinding;
use crate::diagnostics::DiagnosticsSink;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors from compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// Syntax or static type error in expression text.
    #[error("cannot compile '{expression}': {message}")]
    Compilation { expression: String, message: String },

    #[error("variable ${0} is not bound")]
    UnboundVariable(String),

    #[error("unknown function {0}()")]
    UnknownFunction(String),

    #[error("{function}() expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("{function}() argument {position}: expected {expected}, got {got}")]
    ArgumentType {
        function: String,
        position: usize,
        expected: String,
        got: String,
    },

    /// Dynamic type error (XPTY0004 and friends).
    #[error("type error: {0}")]
    Type(String),

    #[error("arithmetic error: {0}")]
    Arithmetic(String),
}

impl ExpressionError {
    /// True for errors caused by the shape of arguments rather than data.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            ExpressionError::Arity { .. }
                | ExpressionError::ArgumentType { .. }
                | ExpressionError::Type(_)
        )
    }
}

// ──────────────────────────────────────────────
// Values
// ──────────────────────────────────────────────

/// One member of a result sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Node(FactId),
    Atomic(TypedValue),
}

/// A result sequence: a node sequence, a typed scalar (singleton), or
/// any mix the engine produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExprValue(pub Vec<Item>);

impl ExprValue {
    pub fn empty() -> Self {
        ExprValue(Vec::new())
    }

    pub fn atomic(value: TypedValue) -> Self {
        ExprValue(vec![Item::Atomic(value)])
    }

    pub fn node(id: FactId) -> Self {
        ExprValue(vec![Item::Node(id)])
    }

    pub fn nodes<'a>(ids: impl IntoIterator<Item = &'a FactId>) -> Self {
        ExprValue(ids.into_iter().cloned().map(Item::Node).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.0
    }

    /// `Some(b)` only for a singleton `xs:boolean`.
    pub fn as_boolean(&self) -> Option<bool> {
        match self.0.as_slice() {
            [Item::Atomic(TypedValue::Boolean(b))] => Some(*b),
            _ => None,
        }
    }

    /// `Some(v)` only for a singleton atomic value.
    pub fn as_single_atomic(&self) -> Option<&TypedValue> {
        match self.0.as_slice() {
            [Item::Atomic(v)] => Some(v),
            _ => None,
        }
    }

    pub fn is_node_sequence(&self) -> bool {
        self.0.iter().all(|i| matches!(i, Item::Node(_)))
    }

    /// Atomize: nodes become their fact values (nil facts contribute nothing).
    pub fn atomize(&self, store: &dyn FactStore) -> Vec<TypedValue> {
        self.0
            .iter()
            .filter_map(|item| match item {
                Item::Atomic(v) => Some(v.clone()),
                Item::Node(id) => store.fact(id).and_then(|f| f.value.clone()),
            })
            .collect()
    }

    /// XPath effective boolean value.
    pub fn effective_boolean_value(&self) -> Result<bool, ExpressionError> {
        match self.0.as_slice() {
            [] => Ok(false),
            [Item::Node(_), ..] => Ok(true),
            [Item::Atomic(v)] => match v {
                TypedValue::Boolean(b) => Ok(*b),
                TypedValue::String(s) => Ok(!s.is_empty()),
                TypedValue::Integer(i) => Ok(*i != 0),
                TypedValue::Decimal(d) => Ok(!d.is_zero()),
                other => Err(ExpressionError::Type(format!(
                    "effective boolean value not defined for {}",
                    other.type_name()
                ))),
            },
            _ => Err(ExpressionError::Type(
                "effective boolean value not defined for a sequence of atomic values".to_string(),
            )),
        }
    }

    /// Text for message output: nodes concatenate their text, a scalar
    /// uses its canonical form, anything else joins with spaces.
    pub fn to_message_text(&self, store: &dyn FactStore) -> String {
        if self.is_node_sequence() {
            return self
                .0
                .iter()
                .filter_map(|item| match item {
                    Item::Node(id) => store.fact(id).map(|f| f.text()),
                    Item::Atomic(_) => None,
                })
                .collect();
        }
        if let Some(v) = self.as_single_atomic() {
            return v.canonical();
        }
        self.0
            .iter()
            .map(|item| match item {
                Item::Atomic(v) => v.canonical(),
                Item::Node(id) => store.fact(id).map(|f| f.text()).unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|item| match item {
                Item::Node(id) => id.to_string(),
                Item::Atomic(v) => v.canonical(),
            })
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

// ──────────────────────────────────────────────
// Scope
// ──────────────────────────────────────────────

/// Everything an expression can see while it is evaluated.
pub struct Scope<'a> {
    pub bindings: &'a VariableBinding,
    /// Assertion-specific variables such as `ca:acceptance-radius`.
    pub context_vars: BTreeMap<String, ExprValue>,
    pub context_item: Option<Item>,
    pub store: &'a dyn FactStore,
    pub sink: &'a dyn DiagnosticsSink,
}

impl<'a> Scope<'a> {
    pub fn new(
        bindings: &'a VariableBinding,
        store: &'a dyn FactStore,
        sink: &'a dyn DiagnosticsSink,
    ) -> Self {
        Scope {
            bindings,
            context_vars: BTreeMap::new(),
            context_item: None,
            store,
            sink,
        }
    }

    pub fn with_var(mut self, name: &str, value: ExprValue) -> Self {
        self.context_vars.insert(name.to_string(), value);
        self
    }

    pub fn with_context_item(mut self, item: Item) -> Self {
        self.context_item = Some(item);
        self
    }

    /// Bindings take precedence over context variables of the same name.
    pub fn variable(&self, name: &str) -> Option<ExprValue> {
        if let Some(bound) = self.bindings.get(name) {
            return Some(bound.to_expr_value());
        }
        self.context_vars.get(name).cloned()
    }
}

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Compile-once, evaluate-many expression capability.
pub trait ExpressionEngine {
    type Compiled: Clone + fmt::Debug;

    fn compile(
        &self,
        text: &str,
        namespaces: &NamespaceContext,
    ) -> Result<Self::Compiled, ExpressionError>;

    fn evaluate(
        &self,
        expression: &Self::Compiled,
        scope: &Scope<'_>,
    ) -> Result<ExprValue, ExpressionError>;

    /// Equality primitive respecting the schema type of each operand.
    fn typed_value_equal(&self, a: &TypedValue, b: &TypedValue) -> bool {
        a.typed_eq(b)
    }
}
