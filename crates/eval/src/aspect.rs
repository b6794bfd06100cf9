//! Aspect matching between a candidate fact and comparison facts.
//!
//! Aspect names with a leading `#` are built-in aspects; any other name
//! is the QName of an explicit or typed dimension.

use std::fmt;

use xbrl_core::{
    Context, DimensionValue, Fact, FactStore, NamespaceContext, QName, TypedValue,
};

use crate::diagnostics::{Category, Diagnostic, DiagnosticsSink};
use crate::expression::{ExprValue, ExpressionError, Item};

/// An aspect of fact identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Aspect {
    Concept,
    EntityIdentifier,
    Period,
    Unit,
    /// Non-dimensional segment content.
    Segment,
    /// Non-dimensional scenario content.
    Scenario,
    Dimension(QName),
}

impl Aspect {
    /// Parse `#concept`, `#entityIdentifier`, `#period`, `#unit`,
    /// `#segment`/`#nonXDTSegment`, `#scenario`/`#nonXDTScenario`, or a
    /// dimension QName.
    pub fn parse(name: &str, namespaces: &NamespaceContext) -> Result<Aspect, String> {
        if let Some(builtin) = name.strip_prefix('#') {
            return match builtin {
                "concept" => Ok(Aspect::Concept),
                "entityIdentifier" => Ok(Aspect::EntityIdentifier),
                "period" => Ok(Aspect::Period),
                "unit" => Ok(Aspect::Unit),
                "segment" | "nonXDTSegment" => Ok(Aspect::Segment),
                "scenario" | "nonXDTScenario" => Ok(Aspect::Scenario),
                other => Err(format!("unknown built-in aspect '#{}'", other)),
            };
        }
        namespaces
            .resolve(name)
            .map(Aspect::Dimension)
            .map_err(|e| e.to_string())
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aspect::Concept => f.write_str("#concept"),
            Aspect::EntityIdentifier => f.write_str("#entityIdentifier"),
            Aspect::Period => f.write_str("#period"),
            Aspect::Unit => f.write_str("#unit"),
            Aspect::Segment => f.write_str("#segment"),
            Aspect::Scenario => f.write_str("#scenario"),
            Aspect::Dimension(q) => write!(f, "{}", q),
        }
    }
}

/// Aspect-match decisions against one fact store.
pub struct AspectMatcher<'a> {
    store: &'a dyn FactStore,
    sink: &'a dyn DiagnosticsSink,
}

impl<'a> AspectMatcher<'a> {
    pub fn new(store: &'a dyn FactStore, sink: &'a dyn DiagnosticsSink) -> Self {
        AspectMatcher { store, sink }
    }

    /// True when every aspect matches across the whole comparison set or
    /// is legitimately skipped.
    ///
    /// A candidate lacking a requested dimension skips that aspect when
    /// `relative`; otherwise the dimension default stands in, and the
    /// aspect is skipped only if there is no default. Mixed outcomes for
    /// one aspect report `inconsistentMatchedVariableSequence` and count
    /// as a failure.
    pub fn aspect_match(
        &self,
        candidate: &Fact,
        comparison: &[&Fact],
        aspects: &[Aspect],
        relative: bool,
    ) -> bool {
        for aspect in aspects {
            if let Aspect::Dimension(dim) = aspect {
                let carried = self.dimension_of(candidate, dim, false);
                let defaulted = self.dimension_of(candidate, dim, true);
                let skip = if relative {
                    carried.is_none()
                } else {
                    defaulted.is_none()
                };
                if skip {
                    continue;
                }
            }

            let mut matched = 0usize;
            let mut mismatched = 0usize;
            for other in comparison {
                if self.fact_matches(aspect, candidate, other) {
                    matched += 1;
                } else {
                    mismatched += 1;
                }
            }

            if matched > 0 && mismatched > 0 {
                self.sink.report(
                    Diagnostic::warning(
                        Category::InconsistentMatchedVariableSequence,
                        format!(
                            "comparison sequence is inconsistent on aspect {}: {} matched, {} did not",
                            aspect, matched, mismatched
                        ),
                    )
                    .with("aspect", aspect)
                    .with("candidate", &candidate.id),
                );
            }
            if mismatched > 0 {
                return false;
            }
        }
        true
    }

    /// Whether two facts agree on a single aspect.
    pub fn fact_matches(&self, aspect: &Aspect, a: &Fact, b: &Fact) -> bool {
        match aspect {
            Aspect::Concept => a.concept == b.concept,
            Aspect::Unit => match (&a.unit_ref, &b.unit_ref) {
                (None, None) => true,
                (Some(ua), Some(ub)) if ua == ub => true,
                (Some(ua), Some(ub)) => match (self.store.unit(ua), self.store.unit(ub)) {
                    (Some(x), Some(y)) => self.store.unit_equal(x, y),
                    _ => false,
                },
                _ => false,
            },
            Aspect::Dimension(dim) => {
                match (
                    self.dimension_of(a, dim, true),
                    self.dimension_of(b, dim, true),
                ) {
                    (Some(x), Some(y)) => x == y,
                    (None, None) => true,
                    _ => false,
                }
            }
            context_aspect => match (self.context_of(a), self.context_of(b)) {
                (Some(ca), Some(cb)) => match context_aspect {
                    Aspect::EntityIdentifier => ca.entity == cb.entity,
                    Aspect::Period => ca.period == cb.period,
                    Aspect::Segment => ca.segment == cb.segment,
                    Aspect::Scenario => ca.scenario == cb.scenario,
                    _ => false,
                },
                _ => false,
            },
        }
    }

    fn context_of(&self, fact: &Fact) -> Option<&Context> {
        self.store.context(&fact.context_ref)
    }

    /// Member of `dim` in the fact's context, optionally falling back to
    /// the dimension default.
    fn dimension_of(&self, fact: &Fact, dim: &QName, with_default: bool) -> Option<DimensionValue> {
        if let Some(v) = self.context_of(fact).and_then(|c| c.dimension(dim)) {
            return Some(v.clone());
        }
        if with_default {
            return self
                .store
                .dimension_default(dim)
                .map(|m| DimensionValue::Explicit(m.clone()));
        }
        None
    }

    // ──────────────────────────────────────────
    // Expression-language entry point
    // ──────────────────────────────────────────

    /// `aspect-match($candidate, $comparison, $aspects [, $relative])`.
    ///
    /// The candidate must be a single fact node, the comparison one or
    /// more fact nodes, the aspects one or more strings or QNames, and
    /// `relative` a single boolean (default false).
    pub fn call(
        &self,
        args: &[ExprValue],
        namespaces: &NamespaceContext,
    ) -> Result<bool, ExpressionError> {
        const NAME: &str = "aspect-match";
        if !(3..=4).contains(&args.len()) {
            return Err(ExpressionError::Arity {
                function: NAME.to_string(),
                expected: "3 or 4".to_string(),
                got: args.len(),
            });
        }
        let arg_error = |position: usize, expected: &str, got: &ExprValue| {
            ExpressionError::ArgumentType {
                function: NAME.to_string(),
                position,
                expected: expected.to_string(),
                got: describe(got),
            }
        };

        let candidate = match args[0].items() {
            [Item::Node(id)] => self
                .store
                .fact(id)
                .ok_or_else(|| arg_error(1, "a fact node", &args[0]))?,
            _ => return Err(arg_error(1, "a single fact node", &args[0])),
        };

        if args[1].is_empty() || !args[1].is_node_sequence() {
            return Err(arg_error(2, "one or more fact nodes", &args[1]));
        }
        let mut comparison = Vec::with_capacity(args[1].len());
        for item in args[1].items() {
            if let Item::Node(id) = item {
                comparison.push(
                    self.store
                        .fact(id)
                        .ok_or_else(|| arg_error(2, "fact nodes", &args[1]))?,
                );
            }
        }

        if args[2].is_empty() {
            return Err(arg_error(3, "one or more aspect names", &args[2]));
        }
        let mut aspects = Vec::with_capacity(args[2].len());
        for item in args[2].items() {
            let aspect = match item {
                Item::Atomic(TypedValue::String(s)) => {
                    Aspect::parse(s, namespaces).map_err(|_| arg_error(3, "aspect names", &args[2]))?
                }
                Item::Atomic(TypedValue::QName(q)) => Aspect::Dimension(q.clone()),
                _ => return Err(arg_error(3, "xs:string or xs:QName aspect names", &args[2])),
            };
            aspects.push(aspect);
        }

        let relative = match args.get(3) {
            None => false,
            Some(v) => v
                .as_boolean()
                .ok_or_else(|| arg_error(4, "a single xs:boolean", v))?,
        };

        Ok(self.aspect_match(candidate, &comparison, &aspects, relative))
    }
}

fn describe(value: &ExprValue) -> String {
    match value.items() {
        [] => "empty sequence".to_string(),
        [Item::Node(_)] => "a node".to_string(),
        [Item::Atomic(v)] => v.type_name().to_string(),
        items => format!("a sequence of {} items", items.len()),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
