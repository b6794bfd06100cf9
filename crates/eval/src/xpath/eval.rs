//! Tree-walking evaluator for parsed expressions.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use xbrl_core::{NamespaceContext, TypedValue};

use super::parser::{ArithOp, CompKind, CompOp, Expr};
use crate::aspect::AspectMatcher;
use crate::expression::{ExprValue, ExpressionError, Item, Scope};

pub(super) struct Evaluator<'s, 'a> {
    pub scope: &'s Scope<'a>,
    pub namespaces: &'s NamespaceContext,
}

impl<'s, 'a> Evaluator<'s, 'a> {
    pub fn eval(&self, expr: &Expr) -> Result<ExprValue, ExpressionError> {
        match expr {
            Expr::Literal(v) => Ok(ExprValue::atomic(v.clone())),
            Expr::Var(name) => self
                .scope
                .variable(name)
                .ok_or_else(|| ExpressionError::UnboundVariable(name.clone())),
            Expr::ContextItem => match &self.scope.context_item {
                Some(item) => Ok(ExprValue(vec![item.clone()])),
                None => Err(ExpressionError::Type(
                    "the context item is undefined".to_string(),
                )),
            },
            Expr::Sequence(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.eval(item)?.0);
                }
                Ok(ExprValue(out))
            }
            Expr::Neg(inner) => {
                let v = self.eval(inner)?;
                match self.single_numeric(&v, "unary minus")? {
                    None => Ok(ExprValue::empty()),
                    Some(TypedValue::Integer(i)) => i
                        .checked_neg()
                        .map(|n| ExprValue::atomic(TypedValue::Integer(n)))
                        .ok_or_else(|| ExpressionError::Arithmetic("integer overflow".into())),
                    Some(other) => Ok(ExprValue::atomic(TypedValue::Decimal(
                        -other.as_decimal().unwrap_or_default(),
                    ))),
                }
            }
            Expr::Arith(op, l, r) => {
                let lv = self.eval(l)?;
                let rv = self.eval(r)?;
                let name = arith_name(*op);
                match (self.single_numeric(&lv, name)?, self.single_numeric(&rv, name)?) {
                    (Some(a), Some(b)) => arithmetic(*op, &a, &b).map(ExprValue::atomic),
                    _ => Ok(ExprValue::empty()),
                }
            }
            Expr::Compare(kind, op, l, r) => {
                let lv = self.eval(l)?.atomize(self.scope.store);
                let rv = self.eval(r)?.atomize(self.scope.store);
                match kind {
                    CompKind::General => {
                        for a in &lv {
                            for b in &rv {
                                if compare(*op, a, b)? {
                                    return Ok(boolean(true));
                                }
                            }
                        }
                        Ok(boolean(false))
                    }
                    CompKind::Value => match (lv.as_slice(), rv.as_slice()) {
                        ([], _) | (_, []) => Ok(ExprValue::empty()),
                        ([a], [b]) => Ok(boolean(compare(*op, a, b)?)),
                        _ => Err(ExpressionError::Type(
                            "value comparison requires single values".to_string(),
                        )),
                    },
                }
            }
            Expr::And(l, r) => {
                if !self.eval(l)?.effective_boolean_value()? {
                    return Ok(boolean(false));
                }
                Ok(boolean(self.eval(r)?.effective_boolean_value()?))
            }
            Expr::Or(l, r) => {
                if self.eval(l)?.effective_boolean_value()? {
                    return Ok(boolean(true));
                }
                Ok(boolean(self.eval(r)?.effective_boolean_value()?))
            }
            Expr::If(cond, then, otherwise) => {
                if self.eval(cond)?.effective_boolean_value()? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call {
                prefix,
                local,
                args,
            } => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(prefix.as_deref(), local, values)
            }
        }
    }

    /// Atomize `value` to at most one numeric value.
    fn single_numeric(
        &self,
        value: &ExprValue,
        what: &str,
    ) -> Result<Option<TypedValue>, ExpressionError> {
        let atoms = value.atomize(self.scope.store);
        match atoms.as_slice() {
            [] => Ok(None),
            [v] if v.is_numeric() => Ok(Some(v.clone())),
            [v] => Err(ExpressionError::Type(format!(
                "{} is not defined for {}",
                what,
                v.type_name()
            ))),
            _ => Err(ExpressionError::Type(format!(
                "{} requires a single value, got {}",
                what,
                atoms.len()
            ))),
        }
    }

    // ──────────────────────────────────────────
    // Function library
    // ──────────────────────────────────────────

    fn call(
        &self,
        prefix: Option<&str>,
        local: &str,
        args: Vec<ExprValue>,
    ) -> Result<ExprValue, ExpressionError> {
        if prefix == Some("xs") {
            return self.construct(local, args);
        }
        let arity = |expected: &str, ok: bool| -> Result<(), ExpressionError> {
            if ok {
                Ok(())
            } else {
                Err(ExpressionError::Arity {
                    function: local.to_string(),
                    expected: expected.to_string(),
                    got: args.len(),
                })
            }
        };
        match local {
            "true" | "false" => {
                arity("0", args.is_empty())?;
                Ok(boolean(local == "true"))
            }
            "not" => {
                arity("1", args.len() == 1)?;
                Ok(boolean(!args[0].effective_boolean_value()?))
            }
            "boolean" => {
                arity("1", args.len() == 1)?;
                Ok(boolean(args[0].effective_boolean_value()?))
            }
            "count" => {
                arity("1", args.len() == 1)?;
                Ok(ExprValue::atomic(TypedValue::Integer(args[0].len() as i64)))
            }
            "empty" => {
                arity("1", args.len() == 1)?;
                Ok(boolean(args[0].is_empty()))
            }
            "exists" => {
                arity("1", args.len() == 1)?;
                Ok(boolean(!args[0].is_empty()))
            }
            "data" => {
                arity("1", args.len() == 1)?;
                Ok(ExprValue(
                    args[0]
                        .atomize(self.scope.store)
                        .into_iter()
                        .map(Item::Atomic)
                        .collect(),
                ))
            }
            "sum" => {
                arity("1", args.len() == 1)?;
                self.sum(&args[0])
            }
            "abs" => {
                arity("1", args.len() == 1)?;
                match self.single_numeric(&args[0], "abs")? {
                    None => Ok(ExprValue::empty()),
                    Some(TypedValue::Integer(i)) => i
                        .checked_abs()
                        .map(|n| ExprValue::atomic(TypedValue::Integer(n)))
                        .ok_or_else(|| ExpressionError::Arithmetic("integer overflow".into())),
                    Some(v) => Ok(ExprValue::atomic(TypedValue::Decimal(
                        v.as_decimal().unwrap_or_default().abs(),
                    ))),
                }
            }
            "string" => {
                arity("0 or 1", args.len() <= 1)?;
                let value = match args.first() {
                    Some(v) => v.clone(),
                    None => self.eval(&Expr::ContextItem)?,
                };
                Ok(string(self.string_of(&value, "string")?))
            }
            "string-length" => {
                arity("1", args.len() == 1)?;
                let s = self.string_of(&args[0], "string-length")?;
                Ok(ExprValue::atomic(TypedValue::Integer(s.chars().count() as i64)))
            }
            "concat" => {
                arity("2 or more", args.len() >= 2)?;
                let mut out = String::new();
                for arg in &args {
                    out.push_str(&self.string_of(arg, "concat")?);
                }
                Ok(string(out))
            }
            "aspect-match" => {
                let matcher = AspectMatcher::new(self.scope.store, self.scope.sink);
                Ok(boolean(matcher.call(&args, self.namespaces)?))
            }
            _ => Err(ExpressionError::UnknownFunction(match prefix {
                Some(p) => format!("{}:{}", p, local),
                None => local.to_string(),
            })),
        }
    }

    /// `xs:decimal(...)` and friends: cast a single atomized value.
    fn construct(&self, local: &str, args: Vec<ExprValue>) -> Result<ExprValue, ExpressionError> {
        let function = format!("xs:{}", local);
        if args.len() != 1 {
            return Err(ExpressionError::Arity {
                function,
                expected: "1".to_string(),
                got: args.len(),
            });
        }
        let atoms = args[0].atomize(self.scope.store);
        let source = match atoms.as_slice() {
            [] => return Ok(ExprValue::empty()),
            [v] => v,
            _ => {
                return Err(ExpressionError::Type(format!(
                    "{} requires a single value",
                    function
                )))
            }
        };
        if !matches!(local, "decimal" | "integer" | "string" | "boolean" | "date" | "QName") {
            return Err(ExpressionError::UnknownFunction(function));
        }
        // Integer casts from decimals truncate instead of failing on the lexical form.
        if local == "integer" {
            if let TypedValue::Decimal(d) = source {
                let truncated = d.trunc().normalize().to_string();
                return TypedValue::parse_lexical("integer", &truncated, self.namespaces)
                    .map(ExprValue::atomic)
                    .map_err(|e| ExpressionError::Type(e.to_string()));
            }
        }
        TypedValue::parse_lexical(local, &source.canonical(), self.namespaces)
            .map(ExprValue::atomic)
            .map_err(|e| ExpressionError::Type(e.to_string()))
    }

    fn sum(&self, value: &ExprValue) -> Result<ExprValue, ExpressionError> {
        let atoms = value.atomize(self.scope.store);
        let mut total = TypedValue::Integer(0);
        for atom in &atoms {
            if !atom.is_numeric() {
                return Err(ExpressionError::Type(format!(
                    "sum() is not defined for {}",
                    atom.type_name()
                )));
            }
            total = arithmetic(ArithOp::Add, &total, atom)?;
        }
        Ok(ExprValue::atomic(total))
    }

    /// String value of an optional single item; empty sequence is `""`.
    fn string_of(&self, value: &ExprValue, function: &str) -> Result<String, ExpressionError> {
        match value.items() {
            [] => Ok(String::new()),
            [Item::Node(id)] => Ok(self
                .scope
                .store
                .fact(id)
                .map(|f| f.text())
                .unwrap_or_default()),
            [Item::Atomic(v)] => Ok(v.canonical()),
            items => Err(ExpressionError::ArgumentType {
                function: function.to_string(),
                position: 1,
                expected: "at most one item".to_string(),
                got: format!("a sequence of {} items", items.len()),
            }),
        }
    }
}

fn boolean(b: bool) -> ExprValue {
    ExprValue::atomic(TypedValue::Boolean(b))
}

fn string(s: String) -> ExprValue {
    ExprValue::atomic(TypedValue::String(s))
}

fn arith_name(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "addition",
        ArithOp::Sub => "subtraction",
        ArithOp::Mul => "multiplication",
        ArithOp::Div => "div",
        ArithOp::IDiv => "idiv",
        ArithOp::Mod => "mod",
    }
}

/// Integer op integer stays integer (except `div`); anything else is decimal.
fn arithmetic(op: ArithOp, a: &TypedValue, b: &TypedValue) -> Result<TypedValue, ExpressionError> {
    let overflow = || ExpressionError::Arithmetic(format!("overflow in {}", arith_name(op)));
    let div_zero = || ExpressionError::Arithmetic("division by zero".to_string());

    if let (TypedValue::Integer(x), TypedValue::Integer(y)) = (a, b) {
        let (x, y) = (*x, *y);
        let result = match op {
            ArithOp::Add => x.checked_add(y),
            ArithOp::Sub => x.checked_sub(y),
            ArithOp::Mul => x.checked_mul(y),
            ArithOp::IDiv => {
                if y == 0 {
                    return Err(div_zero());
                }
                x.checked_div(y)
            }
            ArithOp::Mod => {
                if y == 0 {
                    return Err(div_zero());
                }
                x.checked_rem(y)
            }
            ArithOp::Div => None,
        };
        if op != ArithOp::Div {
            return result.map(TypedValue::Integer).ok_or_else(overflow);
        }
    }

    let (x, y) = match (a.as_decimal(), b.as_decimal()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(ExpressionError::Type(format!(
                "{} is not defined for {} and {}",
                arith_name(op),
                a.type_name(),
                b.type_name()
            )))
        }
    };
    if matches!(op, ArithOp::Div | ArithOp::IDiv | ArithOp::Mod) && y.is_zero() {
        return Err(div_zero());
    }
    let result: Option<Decimal> = match op {
        ArithOp::Add => x.checked_add(y),
        ArithOp::Sub => x.checked_sub(y),
        ArithOp::Mul => x.checked_mul(y),
        ArithOp::Div => x.checked_div(y),
        ArithOp::Mod => x.checked_rem(y),
        ArithOp::IDiv => {
            let q = x.checked_div(y).ok_or_else(overflow)?.trunc();
            return q
                .normalize()
                .to_string()
                .parse::<i64>()
                .map(TypedValue::Integer)
                .map_err(|_| overflow());
        }
    };
    result.map(TypedValue::Decimal).ok_or_else(overflow)
}

fn compare(op: CompOp, a: &TypedValue, b: &TypedValue) -> Result<bool, ExpressionError> {
    let ordering: Option<Ordering> = match (a, b) {
        _ if a.is_numeric() && b.is_numeric() => a
            .as_decimal()
            .zip(b.as_decimal())
            .map(|(x, y)| x.cmp(&y)),
        (TypedValue::String(x), TypedValue::String(y)) => Some(x.cmp(y)),
        (TypedValue::Boolean(x), TypedValue::Boolean(y)) => Some(x.cmp(y)),
        (TypedValue::Date(x), TypedValue::Date(y)) => Some(x.cmp(y)),
        (TypedValue::QName(x), TypedValue::QName(y)) => {
            return match op {
                CompOp::Eq => Ok(x == y),
                CompOp::Ne => Ok(x != y),
                _ => Err(ExpressionError::Type(
                    "xs:QName values are not ordered".to_string(),
                )),
            };
        }
        _ => None,
    };
    let ordering = ordering.ok_or_else(|| {
        ExpressionError::Type(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))
    })?;
    Ok(match op {
        CompOp::Eq => ordering == Ordering::Equal,
        CompOp::Ne => ordering != Ordering::Equal,
        CompOp::Lt => ordering == Ordering::Less,
        CompOp::Le => ordering != Ordering::Greater,
        CompOp::Gt => ordering == Ordering::Greater,
        CompOp::Ge => ordering != Ordering::Less,
    })
}
