//! Variable bindings produced by the (external) binding resolver.

use std::collections::BTreeMap;

use xbrl_core::{FactId, TypedValue};

use crate::expression::{ExprValue, Item};

/// The value bound to one variable for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundValue {
    /// A single fact node.
    Node(FactId),
    /// A sequence of fact nodes, order significant.
    Sequence(Vec<FactId>),
    /// A typed scalar (general variables, parameters).
    Scalar(TypedValue),
    /// No qualifying fact; the variable fell back.
    Fallback,
}

impl BoundValue {
    pub fn is_fallback(&self) -> bool {
        matches!(self, BoundValue::Fallback)
    }

    /// The value as an expression-language sequence. Fallback is the empty sequence.
    pub fn to_expr_value(&self) -> ExprValue {
        match self {
            BoundValue::Node(id) => ExprValue::node(id.clone()),
            BoundValue::Sequence(ids) => {
                ExprValue(ids.iter().cloned().map(Item::Node).collect())
            }
            BoundValue::Scalar(v) => ExprValue::atomic(v.clone()),
            BoundValue::Fallback => ExprValue::empty(),
        }
    }
}

/// Name-to-value mapping for one evaluation. Names are kept as written
/// (`x`, `ex:x`), ordered for deterministic fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableBinding {
    values: BTreeMap<String, BoundValue>,
}

impl VariableBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: BoundValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: BoundValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BoundValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when there is at least one variable and every one fell back.
    pub fn all_fallback(&self) -> bool {
        !self.values.is_empty() && self.values.values().all(BoundValue::is_fallback)
    }
}
