//! Typed fact and scalar values.
//!
//! Numeric values use `rust_decimal::Decimal` -- never `f64`. Lexical
//! parsing follows the XML Schema lexical spaces for the handful of
//! types the instance model distinguishes.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use time::macros::format_description;
use time::Date;

use crate::error::InstanceError;
use crate::qname::{NamespaceContext, QName};

/// A schema-typed atomic value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    Decimal(Decimal),
    Integer(i64),
    Boolean(bool),
    String(String),
    Date(Date),
    QName(QName),
}

impl TypedValue {
    /// Returns the XML Schema type name, for diagnostics and fingerprints.
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Decimal(_) => "xs:decimal",
            TypedValue::Integer(_) => "xs:integer",
            TypedValue::Boolean(_) => "xs:boolean",
            TypedValue::String(_) => "xs:string",
            TypedValue::Date(_) => "xs:date",
            TypedValue::QName(_) => "xs:QName",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypedValue::Decimal(_) | TypedValue::Integer(_))
    }

    /// Numeric value as a Decimal, or `None` for non-numeric values.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            TypedValue::Decimal(d) => Some(*d),
            TypedValue::Integer(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    /// Canonical lexical form (trailing fractional zeros dropped).
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Value equality respecting the declared type of each operand.
    ///
    /// Integers and decimals compare numerically; every other pairing must
    /// share a type. Mismatched types are unequal, never an error.
    pub fn typed_eq(&self, other: &TypedValue) -> bool {
        match (self.as_decimal(), other.as_decimal()) {
            (Some(l), Some(r)) => return l == r,
            (Some(_), None) | (None, Some(_)) => return false,
            (None, None) => {}
        }
        match (self, other) {
            (TypedValue::Boolean(l), TypedValue::Boolean(r)) => l == r,
            (TypedValue::String(l), TypedValue::String(r)) => l == r,
            (TypedValue::Date(l), TypedValue::Date(r)) => l == r,
            (TypedValue::QName(l), TypedValue::QName(r)) => l == r,
            _ => false,
        }
    }

    /// Parse a lexical value under a schema type name.
    ///
    /// Accepted type names: `decimal`, `monetary`, `shares`, `pure`,
    /// `integer`, `boolean`, `string`, `date`, `QName` (with or without an
    /// `xs:`/`xbrli:` style prefix and an `ItemType` suffix).
    pub fn parse_lexical(
        type_name: &str,
        lexical: &str,
        namespaces: &NamespaceContext,
    ) -> Result<TypedValue, InstanceError> {
        let invalid = || InstanceError::InvalidValue {
            type_name: type_name.to_string(),
            lexical: lexical.to_string(),
        };
        let base = type_name.rsplit(':').next().unwrap_or(type_name);
        let base = base.strip_suffix("ItemType").unwrap_or(base);
        let trimmed = lexical.trim();
        match base {
            "decimal" | "monetary" | "shares" | "pure" | "float" | "double" => {
                parse_decimal(trimmed).map(TypedValue::Decimal).ok_or_else(invalid)
            }
            "integer" | "int" | "long" | "nonNegativeInteger" | "positiveInteger" => trimmed
                .parse::<i64>()
                .map(TypedValue::Integer)
                .map_err(|_| invalid()),
            "boolean" => match trimmed {
                "true" | "1" => Ok(TypedValue::Boolean(true)),
                "false" | "0" => Ok(TypedValue::Boolean(false)),
                _ => Err(invalid()),
            },
            "date" => parse_date(trimmed).map(TypedValue::Date).ok_or_else(invalid),
            "QName" => namespaces.resolve(trimmed).map(TypedValue::QName),
            "string" | "token" | "normalizedString" | "anyURI" => {
                Ok(TypedValue::String(lexical.to_string()))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Decimal(d) => write!(f, "{}", d.normalize()),
            TypedValue::Integer(i) => write!(f, "{}", i),
            TypedValue::Boolean(b) => write!(f, "{}", b),
            TypedValue::String(s) => write!(f, "{}", s),
            TypedValue::Date(d) => write!(f, "{}", d),
            TypedValue::QName(q) => write!(f, "{}", q),
        }
    }
}

/// Parse an xs:decimal lexical form, also accepting scientific notation.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

/// Parse an xs:date lexical form (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Option<Date> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).ok()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
