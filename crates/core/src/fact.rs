//! Reported facts and their accuracy attributes.

use std::fmt;

use crate::error::InstanceError;
use crate::qname::QName;
use crate::value::TypedValue;

/// Stable structural identifier of a fact node, e.g. `/xbrl/us-gaap:Assets[2]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactId(pub String);

impl FactId {
    pub fn new(path: impl Into<String>) -> Self {
        FactId(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `decimals` attribute: digits to the right of the decimal point
/// that are accurate, or `Infinite` for an exact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decimals {
    Finite(i32),
    Infinite,
}

/// The `precision` attribute: number of significant digits that are
/// accurate, or `Infinite` for an exact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Finite(u32),
    Infinite,
}

impl Decimals {
    pub fn parse(text: &str) -> Result<Decimals, InstanceError> {
        let t = text.trim();
        if t == "INF" {
            return Ok(Decimals::Infinite);
        }
        t.parse::<i32>()
            .map(Decimals::Finite)
            .map_err(|_| InstanceError::InvalidAccuracy {
                attribute: "decimals".to_string(),
                value: text.to_string(),
            })
    }
}

impl Precision {
    pub fn parse(text: &str) -> Result<Precision, InstanceError> {
        let t = text.trim();
        if t == "INF" {
            return Ok(Precision::Infinite);
        }
        t.parse::<u32>()
            .map(Precision::Finite)
            .map_err(|_| InstanceError::InvalidAccuracy {
                attribute: "precision".to_string(),
                value: text.to_string(),
            })
    }

    /// The lesser of two precisions; `Infinite` is the identity.
    pub fn min(self, other: Precision) -> Precision {
        match (self, other) {
            (Precision::Infinite, p) | (p, Precision::Infinite) => p,
            (Precision::Finite(a), Precision::Finite(b)) => Precision::Finite(a.min(b)),
        }
    }

    pub fn is_zero(self) -> bool {
        self == Precision::Finite(0)
    }
}

impl fmt::Display for Decimals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decimals::Finite(d) => write!(f, "{}", d),
            Decimals::Infinite => f.write_str("INF"),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Finite(p) => write!(f, "{}", p),
            Precision::Infinite => f.write_str("INF"),
        }
    }
}

/// A reported (or derived) fact. `value` is `None` for nil facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub id: FactId,
    pub concept: QName,
    pub context_ref: String,
    pub unit_ref: Option<String>,
    pub value: Option<TypedValue>,
    pub decimals: Option<Decimals>,
    pub precision: Option<Precision>,
}

impl Fact {
    pub fn new(
        id: FactId,
        concept: QName,
        context_ref: impl Into<String>,
        value: Option<TypedValue>,
    ) -> Self {
        Fact {
            id,
            concept,
            context_ref: context_ref.into(),
            unit_ref: None,
            value,
            decimals: None,
            precision: None,
        }
    }

    /// A numeric fact with a unit and a `decimals` attribute.
    pub fn numeric(
        id: FactId,
        concept: QName,
        context_ref: impl Into<String>,
        unit_ref: impl Into<String>,
        value: TypedValue,
        decimals: Decimals,
    ) -> Self {
        Fact {
            id,
            concept,
            context_ref: context_ref.into(),
            unit_ref: Some(unit_ref.into()),
            value: Some(value),
            decimals: Some(decimals),
            precision: None,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.value.is_none()
    }

    /// True when the value is numeric, or, for nil facts, when a unit is present.
    pub fn is_numeric(&self) -> bool {
        match &self.value {
            Some(v) => v.is_numeric(),
            None => self.unit_ref.is_some(),
        }
    }

    /// Text content of the fact node; empty for nil facts.
    pub fn text(&self) -> String {
        self.value.as_ref().map(TypedValue::canonical).unwrap_or_default()
    }
}
