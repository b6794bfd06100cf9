//! Value and fact equivalence primitives used by consistency checking.
//!
//! Context and unit equality are delegated to the [`FactStore`]; typed
//! value equality to the [`ExpressionEngine`]. The numeric primitives live
//! in [`crate::numeric`] and are re-exposed here so callers need a single
//! handle.

use rust_decimal::Decimal;
use xbrl_core::{Decimals, Fact, FactStore, Precision, TypedValue};

use crate::expression::ExpressionEngine;
use crate::numeric;

pub struct FactComparator<'a, E: ExpressionEngine> {
    store: &'a dyn FactStore,
    engine: &'a E,
}

impl<'a, E: ExpressionEngine> FactComparator<'a, E> {
    pub fn new(store: &'a dyn FactStore, engine: &'a E) -> Self {
        FactComparator { store, engine }
    }

    pub fn infer_precision(&self, value: Decimal, decimals: Decimals) -> Precision {
        numeric::infer_precision(value, decimals)
    }

    pub fn infer_decimals(&self, value: Decimal, precision: Precision) -> Decimals {
        numeric::infer_decimals(value, precision)
    }

    pub fn round_to_precision(&self, value: Decimal, precision: Precision) -> Decimal {
        numeric::round_to_precision(value, precision)
    }

    /// Same reference, or both contexts resolve and are equivalent.
    pub fn context_equal(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        match (self.store.context(a), self.store.context(b)) {
            (Some(ca), Some(cb)) => self.store.context_equal(ca, cb),
            _ => false,
        }
    }

    /// Both absent, same reference, or both units resolve and are equivalent.
    pub fn unit_equal(&self, a: Option<&str>, b: Option<&str>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) if a == b => true,
            (Some(a), Some(b)) => match (self.store.unit(a), self.store.unit(b)) {
                (Some(ua), Some(ub)) => self.store.unit_equal(ua, ub),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn typed_value_equal(&self, a: &TypedValue, b: &TypedValue) -> bool {
        self.engine.typed_value_equal(a, b)
    }

    /// Whether `candidate` is an input fact aspect-matched to `derived`:
    /// same concept, equal context, and (for numeric derived facts) equal unit.
    pub fn is_aspect_matched_input(&self, derived: &Fact, candidate: &Fact) -> bool {
        if candidate.id == derived.id || candidate.concept != derived.concept {
            return false;
        }
        if !self.context_equal(&derived.context_ref, &candidate.context_ref) {
            return false;
        }
        !derived.is_numeric()
            || self.unit_equal(derived.unit_ref.as_deref(), candidate.unit_ref.as_deref())
    }

    /// Non-nil facts from the store that are aspect-matched to `derived`,
    /// in document order.
    pub fn aspect_matched_inputs(&self, derived: &Fact) -> Vec<&'a Fact> {
        self.store
            .non_nil_facts()
            .into_iter()
            .filter(|f| self.is_aspect_matched_input(derived, f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpath::XPathEngine;
    use xbrl_core::{Context, EntityIdentifier, FactId, InstanceStore, Period, QName, Unit};

    const EX: &str = "http://example.com";

    fn entity(value: &str) -> EntityIdentifier {
        EntityIdentifier {
            scheme: "http://example.com/id".into(),
            value: value.into(),
        }
    }

    fn instant() -> Period {
        Period::Instant(xbrl_core::parse_date("2024-12-31").unwrap())
    }

    fn usd(id: &str) -> Unit {
        Unit::simple(id, QName::new("http://www.xbrl.org/2003/iso4217", "USD"))
    }

    fn assets(id: &str, ctx: &str, unit: &str, v: i64) -> Fact {
        Fact::numeric(
            FactId::new(id),
            QName::new(EX, "Assets"),
            ctx,
            unit,
            TypedValue::Decimal(Decimal::from(v)),
            Decimals::Finite(0),
        )
    }

    /// `c1`/`c1dup` are equivalent contexts, `c2` another entity; `usd`/`usd2`
    /// are equivalent units.
    fn store() -> InstanceStore {
        let mut s = InstanceStore::new();
        s.add_context(Context::new("c1", entity("ACME"), instant()));
        s.add_context(Context::new("c1dup", entity("ACME"), instant()));
        s.add_context(Context::new("c2", entity("OTHER"), instant()));
        s.add_unit(usd("usd"));
        s.add_unit(usd("usd2"));
        s.add_unit(Unit::simple("eur", QName::new("http://www.xbrl.org/2003/iso4217", "EUR")));
        for f in [
            assets("derived", "c1", "usd", 100),
            assets("same", "c1", "usd", 100),
            assets("equiv", "c1dup", "usd2", 100),
            assets("other-entity", "c2", "usd", 100),
            assets("euros", "c1", "eur", 100),
        ] {
            s.add_fact(f).unwrap();
        }
        s.add_fact(Fact::new(
            FactId::new("nil"),
            QName::new(EX, "Assets"),
            "c1",
            None,
        ))
        .unwrap();
        s
    }

    #[test]
    fn context_and_unit_equality_go_through_store() {
        let s = store();
        let engine = XPathEngine::new();
        let cmp = FactComparator::new(&s, &engine);
        assert!(cmp.context_equal("c1", "c1dup"));
        assert!(!cmp.context_equal("c1", "c2"));
        assert!(!cmp.context_equal("c1", "missing"));
        assert!(cmp.unit_equal(Some("usd"), Some("usd2")));
        assert!(!cmp.unit_equal(Some("usd"), Some("eur")));
        assert!(cmp.unit_equal(None, None));
        assert!(!cmp.unit_equal(Some("usd"), None));
    }

    #[test]
    fn collects_aspect_matched_non_nil_inputs() {
        let s = store();
        let engine = XPathEngine::new();
        let cmp = FactComparator::new(&s, &engine);
        let derived = s.fact(&FactId::new("derived")).unwrap();
        let ids: Vec<&str> = cmp
            .aspect_matched_inputs(derived)
            .iter()
            .map(|f| f.id.as_str())
            .collect();
        assert_eq!(ids, vec!["same", "equiv"]);
    }

    #[test]
    fn typed_equality_is_numeric_across_integer_and_decimal() {
        let s = InstanceStore::new();
        let engine = XPathEngine::new();
        let cmp = FactComparator::new(&s, &engine);
        assert!(cmp.typed_value_equal(
            &TypedValue::Integer(5),
            &TypedValue::Decimal(Decimal::new(50, 1))
        ));
        assert!(!cmp.typed_value_equal(
            &TypedValue::String("5".into()),
            &TypedValue::Integer(5)
        ));
    }
}
