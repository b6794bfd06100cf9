//! JSON assertion definitions.
//!
//! The taxonomy layer resolves assertion resources, their messages and
//! their severity; this module is the hand-off format. Keys are
//! camelCase and validated by `schema/assertion-set-schema.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use xbrl_core::{FactId, NamespaceContext, TypedValue};

use crate::assertion::{
    AssertionConfig, AssertionKind, ConsistencyAssertion, ExistenceAssertion, Severity,
    ValueAssertion, VariableSetAssertion,
};
use crate::binding::{BoundValue, VariableBinding};
use crate::error::FormulaError;
use crate::expression::ExpressionEngine;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDefinitions {
    #[serde(default)]
    pub satisfied: Vec<String>,
    #[serde(default)]
    pub unsatisfied: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionDefinition {
    pub id: String,
    pub kind: AssertionKind,
    #[serde(default)]
    pub variables: Vec<String>,
    /// Optional so that an absent attribute can be reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implicit_filtering: Option<bool>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub messages: MessageDefinitions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_acceptance_radius: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proportional_acceptance_radius: Option<String>,
}

impl AssertionDefinition {
    fn config(&self, namespaces: &NamespaceContext) -> AssertionConfig {
        AssertionConfig {
            id: self.id.clone(),
            namespaces: namespaces.clone(),
            variables: self.variables.clone(),
            implicit_filtering: self.implicit_filtering,
            severity: self.severity,
            description: self.description.clone(),
            preconditions: self.preconditions.clone(),
            satisfied_messages: self.messages.satisfied.clone(),
            unsatisfied_messages: self.messages.unsatisfied.clone(),
        }
    }

    /// Attributes that belong to another kind are a definition error.
    fn check_attributes(&self) -> Result<(), FormulaError> {
        let misplaced = match self.kind {
            AssertionKind::Value | AssertionKind::Existence => {
                if self.strict.is_some() {
                    Some("strict")
                } else if self.absolute_acceptance_radius.is_some() {
                    Some("absoluteAcceptanceRadius")
                } else if self.proportional_acceptance_radius.is_some() {
                    Some("proportionalAcceptanceRadius")
                } else {
                    None
                }
            }
            AssertionKind::Consistency => self.test.as_ref().map(|_| "test"),
        };
        match misplaced {
            Some(attribute) => Err(FormulaError::Definition(format!(
                "{} assertion {} cannot carry {}",
                self.kind, self.id, attribute
            ))),
            None => Ok(()),
        }
    }

    /// Build the assertion this definition describes.
    pub fn build<E>(
        &self,
        namespaces: &NamespaceContext,
    ) -> Result<Box<dyn VariableSetAssertion<E>>, FormulaError>
    where
        E: ExpressionEngine + 'static,
    {
        self.check_attributes()?;
        let config = self.config(namespaces);
        let assertion: Box<dyn VariableSetAssertion<E>> = match self.kind {
            AssertionKind::Value => Box::new(ValueAssertion::<E>::new(config, self.test.clone())),
            AssertionKind::Existence => {
                Box::new(ExistenceAssertion::<E>::new(config, self.test.clone()))
            }
            AssertionKind::Consistency => {
                let mut ca = ConsistencyAssertion::<E>::new(config, self.strict);
                if let Some(r) = &self.absolute_acceptance_radius {
                    ca = ca.with_absolute_radius(r.clone());
                }
                if let Some(r) = &self.proportional_acceptance_radius {
                    ca = ca.with_proportional_radius(r.clone());
                }
                Box::new(ca)
            }
        };
        Ok(assertion)
    }
}

/// The assertions of one linkbase with their namespace bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionSetDefinition {
    pub id: String,
    /// Prefix to namespace URI.
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
    pub assertions: Vec<AssertionDefinition>,
}

impl AssertionSetDefinition {
    pub fn from_json(src: &str) -> Result<Self, FormulaError> {
        serde_json::from_str(src).map_err(|e| FormulaError::Definition(e.to_string()))
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, FormulaError> {
        Self::deserialize(value).map_err(|e| FormulaError::Definition(e.to_string()))
    }

    pub fn namespace_context(&self) -> NamespaceContext {
        let mut ns = NamespaceContext::new();
        for (prefix, uri) in &self.namespaces {
            ns.bind(prefix.clone(), uri.clone());
        }
        ns
    }

    /// Assertion ids must be unique within a set.
    pub fn check_unique_ids(&self) -> Result<(), FormulaError> {
        let mut seen = std::collections::BTreeSet::new();
        for a in &self.assertions {
            if !seen.insert(a.id.as_str()) {
                return Err(FormulaError::Definition(format!(
                    "duplicate assertion id {}",
                    a.id
                )));
            }
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Evaluation batches
// ──────────────────────────────────────────────

/// One bound value as written in a batch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoundValueDefinition {
    /// Fact id of a single node.
    Node(String),
    Sequence(Vec<String>),
    Scalar {
        #[serde(rename = "type")]
        type_name: String,
        value: String,
    },
    Fallback,
}

impl BoundValueDefinition {
    pub fn to_bound_value(&self, namespaces: &NamespaceContext) -> Result<BoundValue, FormulaError> {
        Ok(match self {
            BoundValueDefinition::Node(id) => BoundValue::Node(FactId::new(id.as_str())),
            BoundValueDefinition::Sequence(ids) => {
                BoundValue::Sequence(ids.iter().map(|id| FactId::new(id.as_str())).collect())
            }
            BoundValueDefinition::Scalar { type_name, value } => {
                BoundValue::Scalar(TypedValue::parse_lexical(type_name, value, namespaces)?)
            }
            BoundValueDefinition::Fallback => BoundValue::Fallback,
        })
    }
}

/// One evaluation addressed to one assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDefinition {
    pub assertion: String,
    #[serde(default)]
    pub bindings: BTreeMap<String, BoundValueDefinition>,
    /// Existence flag; defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    /// Fact id of the derived fact, for consistency assertions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<String>,
}

impl EvaluationDefinition {
    pub fn binding(&self, namespaces: &NamespaceContext) -> Result<VariableBinding, FormulaError> {
        let mut binding = VariableBinding::new();
        for (name, value) in &self.bindings {
            binding.insert(name.clone(), value.to_bound_value(namespaces)?);
        }
        Ok(binding)
    }
}
