//! Read-only fact store.
//!
//! `FactStore` is the seam the assertion core consumes. `InstanceStore`
//! is an in-memory implementation that can be built programmatically or
//! loaded from the JSON instance format described on [`InstanceStore::from_json`].

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::context::{Context, DimensionValue, EntityIdentifier, Period, Unit};
use crate::error::InstanceError;
use crate::fact::{Decimals, Fact, FactId, Precision};
use crate::qname::{NamespaceContext, QName};
use crate::value::{parse_date, TypedValue};

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Read-only access to the facts, contexts and units of one instance.
///
/// Equality routines have structural defaults; stores with a richer
/// notion of equivalence (e.g. XML-canonical segment comparison) override them.
pub trait FactStore {
    fn fact(&self, id: &FactId) -> Option<&Fact>;

    fn context(&self, id: &str) -> Option<&Context>;

    fn unit(&self, id: &str) -> Option<&Unit>;

    /// All facts whose value is not nil, in document order.
    fn non_nil_facts(&self) -> Vec<&Fact>;

    /// Default member of a dimension, if the taxonomy declares one.
    fn dimension_default(&self, dimension: &QName) -> Option<&QName>;

    fn context_equal(&self, a: &Context, b: &Context) -> bool {
        a.is_equivalent(b)
    }

    fn unit_equal(&self, a: &Unit, b: &Unit) -> bool {
        a.is_equivalent(b)
    }
}

// ──────────────────────────────────────────────
// In-memory store
// ──────────────────────────────────────────────

/// An instance held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InstanceStore {
    facts: Vec<Fact>,
    index: HashMap<FactId, usize>,
    contexts: HashMap<String, Context>,
    units: HashMap<String, Unit>,
    dimension_defaults: BTreeMap<QName, QName>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_context(&mut self, context: Context) {
        self.contexts.insert(context.id.clone(), context);
    }

    pub fn add_unit(&mut self, unit: Unit) {
        self.units.insert(unit.id.clone(), unit);
    }

    pub fn set_dimension_default(&mut self, dimension: QName, member: QName) {
        self.dimension_defaults.insert(dimension, member);
    }

    /// Add a fact. Its context and unit must already be present.
    pub fn add_fact(&mut self, fact: Fact) -> Result<(), InstanceError> {
        if !self.contexts.contains_key(&fact.context_ref) {
            return Err(InstanceError::UnknownContext {
                fact_id: fact.id.to_string(),
                context_ref: fact.context_ref.clone(),
            });
        }
        if let Some(unit_ref) = &fact.unit_ref {
            if !self.units.contains_key(unit_ref) {
                return Err(InstanceError::UnknownUnit {
                    fact_id: fact.id.to_string(),
                    unit_ref: unit_ref.clone(),
                });
            }
        }
        if self.index.contains_key(&fact.id) {
            return Err(InstanceError::DuplicateFact(fact.id.to_string()));
        }
        self.index.insert(fact.id.clone(), self.facts.len());
        self.facts.push(fact);
        Ok(())
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    /// Load an instance from JSON.
    ///
    /// ```json
    /// {
    ///   "namespaces": { "ex": "http://example.com" },
    ///   "contexts": [{ "id": "c1",
    ///                  "entity": { "scheme": "http://example.com/id", "identifier": "ACME" },
    ///                  "period": { "instant": "2024-12-31" },
    ///                  "dimensions": { "ex:RegionAxis": { "explicit": "ex:Europe" } } }],
    ///   "units": [{ "id": "usd", "measures": ["iso4217:USD"] }],
    ///   "facts": [{ "concept": "ex:Assets", "contextRef": "c1", "unitRef": "usd",
    ///               "type": "monetary", "value": "1000", "decimals": "-3" }],
    ///   "dimensionDefaults": { "ex:RegionAxis": "ex:AllRegions" }
    /// }
    /// ```
    ///
    /// Facts without an `id` get a structural path `/xbrl/{concept}[n]`,
    /// where `n` counts occurrences of that concept in document order.
    pub fn from_json(doc: &serde_json::Value) -> Result<InstanceStore, InstanceError> {
        let raw: RawInstance = serde_json::from_value(doc.clone())
            .map_err(|e| InstanceError::Deserialize(e.to_string()))?;

        let mut namespaces = NamespaceContext::new();
        for (prefix, uri) in &raw.namespaces {
            namespaces.bind(prefix.clone(), uri.clone());
        }

        let mut store = InstanceStore::new();
        for rc in &raw.contexts {
            store.add_context(rc.to_context(&namespaces)?);
        }
        for ru in &raw.units {
            store.add_unit(Unit {
                id: ru.id.clone(),
                numerators: resolve_all(&ru.measures, &namespaces)?,
                denominators: resolve_all(&ru.divide, &namespaces)?,
            });
        }
        for (dim, member) in &raw.dimension_defaults {
            store.set_dimension_default(namespaces.resolve(dim)?, namespaces.resolve(member)?);
        }

        let mut occurrences: HashMap<String, usize> = HashMap::new();
        for rf in &raw.facts {
            let n = occurrences.entry(rf.concept.clone()).or_insert(0);
            *n += 1;
            let id = match &rf.id {
                Some(id) => FactId::new(id.clone()),
                None => FactId::new(format!("/xbrl/{}[{}]", rf.concept, n)),
            };
            store.add_fact(rf.to_fact(id, &namespaces)?)?;
        }
        Ok(store)
    }
}

impl FactStore for InstanceStore {
    fn fact(&self, id: &FactId) -> Option<&Fact> {
        self.index.get(id).map(|&i| &self.facts[i])
    }

    fn context(&self, id: &str) -> Option<&Context> {
        self.contexts.get(id)
    }

    fn unit(&self, id: &str) -> Option<&Unit> {
        self.units.get(id)
    }

    fn non_nil_facts(&self) -> Vec<&Fact> {
        self.facts.iter().filter(|f| !f.is_nil()).collect()
    }

    fn dimension_default(&self, dimension: &QName) -> Option<&QName> {
        self.dimension_defaults.get(dimension)
    }
}

// ──────────────────────────────────────────────
// JSON representation
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawInstance {
    #[serde(default)]
    namespaces: BTreeMap<String, String>,
    #[serde(default)]
    contexts: Vec<RawContext>,
    #[serde(default)]
    units: Vec<RawUnit>,
    #[serde(default)]
    facts: Vec<RawFact>,
    #[serde(default)]
    dimension_defaults: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContext {
    id: String,
    entity: RawEntity,
    period: RawPeriod,
    #[serde(default)]
    dimensions: BTreeMap<String, RawDimensionValue>,
    segment: Option<String>,
    scenario: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    scheme: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPeriod {
    instant: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    #[serde(default)]
    forever: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum RawDimensionValue {
    Explicit(String),
    Typed(String),
}

#[derive(Debug, Deserialize)]
struct RawUnit {
    id: String,
    measures: Vec<String>,
    #[serde(default)]
    divide: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAccuracy {
    Int(i64),
    Text(String),
}

impl RawAccuracy {
    fn as_text(&self) -> String {
        match self {
            RawAccuracy::Int(i) => i.to_string(),
            RawAccuracy::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFact {
    id: Option<String>,
    concept: String,
    context_ref: String,
    unit_ref: Option<String>,
    #[serde(rename = "type", default = "default_fact_type")]
    fact_type: String,
    value: Option<String>,
    #[serde(default)]
    nil: bool,
    decimals: Option<RawAccuracy>,
    precision: Option<RawAccuracy>,
}

fn default_fact_type() -> String {
    "string".to_string()
}

fn resolve_all(names: &[String], ns: &NamespaceContext) -> Result<Vec<QName>, InstanceError> {
    names.iter().map(|n| ns.resolve(n)).collect()
}

fn date(text: &str) -> Result<time::Date, InstanceError> {
    parse_date(text).ok_or_else(|| InstanceError::InvalidValue {
        type_name: "date".to_string(),
        lexical: text.to_string(),
    })
}

impl RawContext {
    fn to_context(&self, ns: &NamespaceContext) -> Result<Context, InstanceError> {
        let period = match (&self.period.instant, &self.period.start_date, &self.period.end_date) {
            (Some(i), None, None) if !self.period.forever => Period::Instant(date(i)?),
            (None, Some(s), Some(e)) if !self.period.forever => Period::Duration {
                start: date(s)?,
                end: date(e)?,
            },
            (None, None, None) if self.period.forever => Period::Forever,
            _ => {
                return Err(InstanceError::Deserialize(format!(
                    "context '{}' has an invalid period",
                    self.id
                )))
            }
        };
        let mut context = Context::new(
            self.id.clone(),
            EntityIdentifier {
                scheme: self.entity.scheme.clone(),
                value: self.entity.identifier.clone(),
            },
            period,
        );
        for (dim, member) in &self.dimensions {
            let value = match member {
                RawDimensionValue::Explicit(m) => DimensionValue::Explicit(ns.resolve(m)?),
                RawDimensionValue::Typed(content) => DimensionValue::Typed(content.clone()),
            };
            context.dimensions.insert(ns.resolve(dim)?, value);
        }
        context.segment = self.segment.clone();
        context.scenario = self.scenario.clone();
        Ok(context)
    }
}

impl RawFact {
    fn to_fact(&self, id: FactId, ns: &NamespaceContext) -> Result<Fact, InstanceError> {
        let value = match (&self.value, self.nil) {
            (_, true) => None,
            (Some(lexical), false) => Some(TypedValue::parse_lexical(&self.fact_type, lexical, ns)?),
            (None, false) => {
                return Err(InstanceError::Deserialize(format!(
                    "fact '{}' has no value and is not nil",
                    id
                )))
            }
        };
        let decimals = self
            .decimals
            .as_ref()
            .map(|d| Decimals::parse(&d.as_text()))
            .transpose()?;
        let precision = self
            .precision
            .as_ref()
            .map(|p| Precision::parse(&p.as_text()))
            .transpose()?;
        Ok(Fact {
            id,
            concept: ns.resolve(&self.concept)?,
            context_ref: self.context_ref.clone(),
            unit_ref: self.unit_ref.clone(),
            value,
            decimals,
            precision,
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "namespaces": {
                "ex": "http://example.com",
                "iso4217": "http://www.xbrl.org/2003/iso4217"
            },
            "contexts": [
                {
                    "id": "c1",
                    "entity": { "scheme": "http://example.com/id", "identifier": "ACME" },
                    "period": { "instant": "2024-12-31" }
                },
                {
                    "id": "c1-copy",
                    "entity": { "scheme": "http://example.com/id", "identifier": "ACME" },
                    "period": { "instant": "2024-12-31" }
                },
                {
                    "id": "fy",
                    "entity": { "scheme": "http://example.com/id", "identifier": "ACME" },
                    "period": { "startDate": "2024-01-01", "endDate": "2024-12-31" },
                    "dimensions": { "ex:RegionAxis": { "explicit": "ex:Europe" } }
                }
            ],
            "units": [{ "id": "usd", "measures": ["iso4217:USD"] }],
            "facts": [
                { "concept": "ex:Assets", "contextRef": "c1", "unitRef": "usd",
                  "type": "monetary", "value": "1000", "decimals": -3 },
                { "concept": "ex:Assets", "contextRef": "c1-copy", "unitRef": "usd",
                  "type": "monetary", "value": "1000", "decimals": "INF" },
                { "concept": "ex:Revenue", "contextRef": "fy", "unitRef": "usd",
                  "type": "monetary", "nil": true },
                { "id": "note", "concept": "ex:Note", "contextRef": "c1", "value": "hello" }
            ],
            "dimensionDefaults": { "ex:RegionAxis": "ex:AllRegions" }
        })
    }

    #[test]
    fn loads_instance_json() {
        let store = InstanceStore::from_json(&sample()).unwrap();
        assert_eq!(store.facts().len(), 4);
        assert_eq!(store.non_nil_facts().len(), 3);

        let second = store.fact(&FactId::new("/xbrl/ex:Assets[2]")).unwrap();
        assert_eq!(second.decimals, Some(Decimals::Infinite));
        let note = store.fact(&FactId::new("note")).unwrap();
        assert_eq!(note.text(), "hello");

        let region = QName::new("http://example.com", "RegionAxis");
        assert_eq!(
            store.dimension_default(&region),
            Some(&QName::new("http://example.com", "AllRegions"))
        );
        assert!(store.context("fy").unwrap().dimension(&region).is_some());
    }

    #[test]
    fn default_context_equality_is_structural() {
        let store = InstanceStore::from_json(&sample()).unwrap();
        let a = store.context("c1").unwrap();
        let b = store.context("c1-copy").unwrap();
        let fy = store.context("fy").unwrap();
        assert!(store.context_equal(a, b));
        assert!(!store.context_equal(a, fy));
    }

    #[test]
    fn rejects_fact_with_unknown_context() {
        let mut store = InstanceStore::new();
        let fact = Fact::new(
            FactId::new("/xbrl/ex:A[1]"),
            QName::new("http://example.com", "A"),
            "missing",
            Some(TypedValue::String("x".into())),
        );
        match store.add_fact(fact) {
            Err(InstanceError::UnknownContext { context_ref, .. }) => {
                assert_eq!(context_ref, "missing")
            }
            other => panic!("expected UnknownContext, got {:?}", other),
        }
    }

    #[test]
    fn rejects_invalid_period() {
        let doc = json!({
            "contexts": [{
                "id": "bad",
                "entity": { "scheme": "s", "identifier": "i" },
                "period": { "instant": "2024-12-31", "forever": true }
            }]
        });
        assert!(matches!(
            InstanceStore::from_json(&doc),
            Err(InstanceError::Deserialize(_))
        ));
    }

    #[test]
    fn rejects_malformed_decimals() {
        let mut doc = sample();
        doc["facts"][0]["decimals"] = json!("lots");
        assert!(matches!(
            InstanceStore::from_json(&doc),
            Err(InstanceError::InvalidAccuracy { .. })
        ));
    }
}
