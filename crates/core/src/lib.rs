//! XBRL instance model consumed by the formula assertion evaluator.
//!
//! Facts, contexts and units are immutable once loaded. The evaluator
//! reaches them only through the read-only [`FactStore`] trait;
//! [`InstanceStore`] is the in-memory implementation used by tests and
//! by callers that load instances from JSON.

pub mod context;
pub mod error;
pub mod fact;
pub mod qname;
pub mod store;
pub mod value;

pub use context::{Context, DimensionValue, EntityIdentifier, Period, Unit};
pub use error::InstanceError;
pub use fact::{Decimals, Fact, FactId, Precision};
pub use qname::{NamespaceContext, QName};
pub use store::{FactStore, InstanceStore};
pub use value::{parse_date, parse_decimal, TypedValue};
