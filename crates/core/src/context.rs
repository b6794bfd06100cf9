//! Contexts and units.

use std::collections::BTreeMap;

use time::Date;

use crate::qname::QName;

/// Entity identifier: scheme URI plus identifier token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityIdentifier {
    pub scheme: String,
    pub value: String,
}

/// Reporting period of a context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Period {
    Instant(Date),
    Duration { start: Date, end: Date },
    Forever,
}

/// Member of a dimension in a context's segment or scenario.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimensionValue {
    Explicit(QName),
    /// Typed dimension content in canonical serialized form.
    Typed(String),
}

/// An XBRL context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub id: String,
    pub entity: EntityIdentifier,
    pub period: Period,
    pub dimensions: BTreeMap<QName, DimensionValue>,
    /// Non-dimensional segment content in canonical serialized form.
    pub segment: Option<String>,
    /// Non-dimensional scenario content in canonical serialized form.
    pub scenario: Option<String>,
}

impl Context {
    pub fn new(id: impl Into<String>, entity: EntityIdentifier, period: Period) -> Self {
        Context {
            id: id.into(),
            entity,
            period,
            dimensions: BTreeMap::new(),
            segment: None,
            scenario: None,
        }
    }

    pub fn with_dimension(mut self, dimension: QName, value: DimensionValue) -> Self {
        self.dimensions.insert(dimension, value);
        self
    }

    pub fn dimension(&self, dimension: &QName) -> Option<&DimensionValue> {
        self.dimensions.get(dimension)
    }

    /// Structural equality ignoring the context id.
    pub fn is_equivalent(&self, other: &Context) -> bool {
        self.entity == other.entity
            && self.period == other.period
            && self.dimensions == other.dimensions
            && self.segment == other.segment
            && self.scenario == other.scenario
    }
}

/// An XBRL unit: product of numerator measures over denominator measures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: String,
    pub numerators: Vec<QName>,
    pub denominators: Vec<QName>,
}

impl Unit {
    pub fn simple(id: impl Into<String>, measure: QName) -> Self {
        Unit {
            id: id.into(),
            numerators: vec![measure],
            denominators: Vec::new(),
        }
    }

    /// Measure multisets are equal, ignoring order and the unit id.
    pub fn is_equivalent(&self, other: &Unit) -> bool {
        sorted(&self.numerators) == sorted(&other.numerators)
            && sorted(&self.denominators) == sorted(&other.denominators)
    }
}

fn sorted(measures: &[QName]) -> Vec<&QName> {
    let mut v: Vec<&QName> = measures.iter().collect();
    v.sort();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::parse_date;

    fn entity() -> EntityIdentifier {
        EntityIdentifier {
            scheme: "http://www.sec.gov/CIK".into(),
            value: "0000320193".into(),
        }
    }

    fn instant(s: &str) -> Period {
        Period::Instant(parse_date(s).unwrap())
    }

    #[test]
    fn contexts_with_different_ids_can_be_equivalent() {
        let a = Context::new("c1", entity(), instant("2024-12-31"));
        let b = Context::new("c2", entity(), instant("2024-12-31"));
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn dimensions_participate_in_equivalence() {
        let dim = QName::new("http://example.com", "SegmentAxis");
        let a = Context::new("c1", entity(), instant("2024-12-31"));
        let b = Context::new("c2", entity(), instant("2024-12-31")).with_dimension(
            dim,
            DimensionValue::Explicit(QName::new("http://example.com", "Retail")),
        );
        assert!(!a.is_equivalent(&b));
    }

    #[test]
    fn unit_equivalence_ignores_measure_order() {
        let m1 = QName::new("http://www.xbrl.org/2003/iso4217", "USD");
        let m2 = QName::new("http://www.xbrl.org/2003/instance", "shares");
        let a = Unit {
            id: "u1".into(),
            numerators: vec![m1.clone(), m2.clone()],
            denominators: vec![],
        };
        let b = Unit {
            id: "u2".into(),
            numerators: vec![m2, m1.clone()],
            denominators: vec![],
        };
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&Unit::simple("u3", m1)));
    }
}
