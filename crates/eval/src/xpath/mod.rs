//! Reference [`ExpressionEngine`]: a small XPath 2.0 subset.
//!
//! Supported: numeric and string literals, `$variables` (prefixed names
//! kept as written), the context item `.`, sequences, arithmetic
//! (`+ - * div idiv mod`), general and value comparisons, `and`/`or`,
//! `if/then/else`, the `xs:` constructor functions for the instance
//! model's types, and the functions `true false not boolean count empty
//! exists data sum abs string string-length concat aspect-match`.
//! Function prefixes other than `xs` are ignored. Path expressions over
//! the instance are not supported; facts reach expressions only through
//! variables.

mod eval;
mod lexer;
mod parser;

use xbrl_core::NamespaceContext;

use crate::expression::{ExprValue, ExpressionEngine, ExpressionError, Scope};

pub use parser::Expr;

/// A parsed expression together with the namespace bindings in force
/// where it was declared.
#[derive(Debug, Clone)]
pub struct CompiledXPath {
    pub text: String,
    pub expr: Expr,
    pub namespaces: NamespaceContext,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XPathEngine;

impl XPathEngine {
    pub fn new() -> Self {
        XPathEngine
    }
}

impl ExpressionEngine for XPathEngine {
    type Compiled = CompiledXPath;

    fn compile(
        &self,
        text: &str,
        namespaces: &NamespaceContext,
    ) -> Result<CompiledXPath, ExpressionError> {
        let compilation = |message: String| ExpressionError::Compilation {
            expression: text.to_string(),
            message,
        };
        if text.trim().is_empty() {
            return Err(compilation("empty expression".to_string()));
        }
        let tokens = lexer::lex(text).map_err(compilation)?;
        let expr = parser::Parser::new(&tokens).parse().map_err(compilation)?;
        Ok(CompiledXPath {
            text: text.to_string(),
            expr,
            namespaces: namespaces.clone(),
        })
    }

    fn evaluate(
        &self,
        expression: &CompiledXPath,
        scope: &Scope<'_>,
    ) -> Result<ExprValue, ExpressionError> {
        let evaluator = eval::Evaluator {
            scope,
            namespaces: &expression.namespaces,
        };
        evaluator.eval(&expression.expr)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BoundValue, VariableBinding};
    use crate::diagnostics::{Category, CollectingSink};
    use crate::expression::Item;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use xbrl_core::{
        Context, Decimals, EntityIdentifier, Fact, FactId, InstanceStore, Period, QName,
        TypedValue, Unit,
    };

    const EX: &str = "http://example.com";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn store() -> InstanceStore {
        let mut s = InstanceStore::new();
        let entity = EntityIdentifier {
            scheme: "http://example.com/id".into(),
            value: "ACME".into(),
        };
        let period = |d: &str| Period::Instant(xbrl_core::parse_date(d).unwrap());
        s.add_context(Context::new("c1", entity.clone(), period("2024-12-31")));
        s.add_context(Context::new("c2", entity, period("2023-12-31")));
        s.add_unit(Unit::simple(
            "usd",
            QName::new("http://www.xbrl.org/2003/iso4217", "USD"),
        ));
        for (id, ctx, v) in [("a", "c1", "10.5"), ("b", "c1", "4.5"), ("c", "c2", "7")] {
            s.add_fact(Fact::numeric(
                FactId::new(id),
                QName::new(EX, "Assets"),
                ctx,
                "usd",
                TypedValue::Decimal(dec(v)),
                Decimals::Finite(1),
            ))
            .unwrap();
        }
        s
    }

    fn run(src: &str, bindings: &VariableBinding, store: &InstanceStore) -> Result<ExprValue, ExpressionError> {
        let engine = XPathEngine::new();
        let sink = CollectingSink::new();
        let ns = NamespaceContext::new().with_prefix("ex", EX);
        let compiled = engine.compile(src, &ns)?;
        engine.evaluate(&compiled, &Scope::new(bindings, store, &sink))
    }

    fn eval_bool(src: &str) -> bool {
        let s = store();
        let b = VariableBinding::new()
            .with("a", BoundValue::Node(FactId::new("a")))
            .with("b", BoundValue::Node(FactId::new("b")))
            .with("all", BoundValue::Sequence(vec![FactId::new("a"), FactId::new("b"), FactId::new("c")]))
            .with("missing", BoundValue::Fallback);
        run(src, &b, &s).unwrap().as_boolean().unwrap()
    }

    #[test]
    fn boolean_functions_and_logic() {
        assert!(eval_bool("true()"));
        assert!(eval_bool("fn:true()"));
        assert!(!eval_bool("true() and false()"));
        assert!(eval_bool("false() or not(false())"));
        assert!(eval_bool("empty($missing)"));
        assert!(eval_bool("exists($a)"));
    }

    #[test]
    fn arithmetic_over_fact_values() {
        assert!(eval_bool("$a + $b = 15"));
        assert!(eval_bool("$a - $b eq 6"));
        assert!(eval_bool("sum($all) = 22"));
        assert!(eval_bool("count($all) = 3"));
        assert!(eval_bool("abs($b - $a) = 6"));
        assert!(eval_bool("7 idiv 2 = 3 and 7 mod 2 = 1"));
        assert!(eval_bool("1 div 4 = 0.25"));
    }

    #[test]
    fn general_comparison_is_existential() {
        assert!(eval_bool("$all = 7"));
        assert!(!eval_bool("$all = 8"));
        assert!(!eval_bool("$missing = 1"));
    }

    #[test]
    fn strings_and_conditionals() {
        assert!(eval_bool("concat('a', 'b', 1) = 'ab1'"));
        assert!(eval_bool("string-length('four') = 4"));
        assert!(eval_bool("(if ($a gt $b) then 'big' else 'small') = 'big'"));
        assert!(eval_bool("string($a) = '10.5'"));
        assert!(eval_bool("xs:decimal('1.50') = 1.5"));
    }

    #[test]
    fn context_variables_and_context_item() {
        let s = store();
        let engine = XPathEngine::new();
        let sink = CollectingSink::new();
        let ns = NamespaceContext::new();
        let b = VariableBinding::new();
        let scope = Scope::new(&b, &s, &sink)
            .with_var("ea:satisfied-count", ExprValue::atomic(TypedValue::Integer(2)))
            .with_context_item(Item::Atomic(TypedValue::Integer(3)));
        let e = engine.compile("$ea:satisfied-count lt .", &ns).unwrap();
        assert_eq!(engine.evaluate(&e, &scope).unwrap().as_boolean(), Some(true));
    }

    #[test]
    fn errors_are_typed() {
        let s = store();
        let b = VariableBinding::new();
        assert!(matches!(
            run("$nope", &b, &s),
            Err(ExpressionError::UnboundVariable(_))
        ));
        assert!(matches!(
            run("frobnicate()", &b, &s),
            Err(ExpressionError::UnknownFunction(_))
        ));
        assert!(matches!(
            run("'a' + 1", &b, &s),
            Err(ExpressionError::Type(_))
        ));
        assert!(matches!(
            run("1 div 0", &b, &s),
            Err(ExpressionError::Arithmetic(_))
        ));
        assert!(matches!(
            run("not()", &b, &s),
            Err(ExpressionError::Arity { .. })
        ));
        assert!(matches!(
            run("1 +", &b, &s),
            Err(ExpressionError::Compilation { .. })
        ));
    }

    #[test]
    fn aspect_match_is_callable_and_reports_inconsistency() {
        let s = store();
        let engine = XPathEngine::new();
        let sink = CollectingSink::new();
        let ns = NamespaceContext::new();
        let b = VariableBinding::new()
            .with("a", BoundValue::Node(FactId::new("a")))
            .with("others", BoundValue::Sequence(vec![FactId::new("b"), FactId::new("c")]));
        let e = engine
            .compile("aspect-match($a, $others, '#period')", &ns)
            .unwrap();
        let result = engine.evaluate(&e, &Scope::new(&b, &s, &sink)).unwrap();
        assert_eq!(result.as_boolean(), Some(false));
        assert_eq!(sink.count(Category::InconsistentMatchedVariableSequence), 1);

        let e = engine
            .compile("aspect-match($a, $others, ('#concept', '#unit'), true())", &ns)
            .unwrap();
        let result = engine.evaluate(&e, &Scope::new(&b, &s, &sink)).unwrap();
        assert_eq!(result.as_boolean(), Some(true));
    }
}
