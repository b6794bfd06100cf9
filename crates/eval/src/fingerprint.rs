//! Structural fingerprints of evaluations and the dictionary that
//! deduplicates them.
//!
//! Canonicalization is total over [`BoundValue`]: every binding has a
//! fingerprint and two fingerprints are equal iff every entry is equal
//! under exact comparison.

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};
use xbrl_core::{Fact, FactId};

use crate::binding::{BoundValue, VariableBinding};

/// Canonical representation of one bound value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalValue {
    /// Structural path of a single node.
    Path(String),
    /// Order-sensitive hash over the member paths of a sequence.
    SequenceHash(String),
    /// Type name and canonical lexical form of a scalar.
    Scalar { type_name: String, lexical: String },
    /// The fallback sentinel.
    Fallback,
}

impl CanonicalValue {
    pub fn of(value: &BoundValue) -> CanonicalValue {
        match value {
            BoundValue::Node(id) => CanonicalValue::Path(id.to_string()),
            BoundValue::Sequence(ids) => CanonicalValue::SequenceHash(sequence_hash(ids)),
            BoundValue::Scalar(v) => CanonicalValue::Scalar {
                type_name: v.type_name().to_string(),
                lexical: v.canonical(),
            },
            BoundValue::Fallback => CanonicalValue::Fallback,
        }
    }

    /// Textual form: the path, the hash, the lexical value, or `""` for fallback.
    pub fn as_text(&self) -> &str {
        match self {
            CanonicalValue::Path(p) => p,
            CanonicalValue::SequenceHash(h) => h,
            CanonicalValue::Scalar { lexical, .. } => lexical,
            CanonicalValue::Fallback => "",
        }
    }
}

/// SHA-256 over each member's own path hash, in sequence order.
fn sequence_hash(ids: &[FactId]) -> String {
    let mut outer = Sha256::new();
    for id in ids {
        outer.update(Sha256::digest(id.as_str().as_bytes()));
    }
    hex(&outer.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Ordered mapping from binding name to canonical value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint(BTreeMap<String, CanonicalValue>);

impl Fingerprint {
    pub fn of(binding: &VariableBinding) -> Fingerprint {
        Fingerprint(
            binding
                .iter()
                .map(|(name, value)| (name.clone(), CanonicalValue::of(value)))
                .collect(),
        )
    }

    /// Fingerprint of a derived fact: concept, context, unit and value.
    pub fn of_fact(fact: &Fact) -> Fingerprint {
        let mut entries = BTreeMap::new();
        entries.insert(
            "concept".to_string(),
            CanonicalValue::Path(fact.concept.to_string()),
        );
        entries.insert(
            "context".to_string(),
            CanonicalValue::Path(fact.context_ref.clone()),
        );
        if let Some(unit) = &fact.unit_ref {
            entries.insert("unit".to_string(), CanonicalValue::Path(unit.clone()));
        }
        let value = match &fact.value {
            Some(v) => CanonicalValue::of(&BoundValue::Scalar(v.clone())),
            None => CanonicalValue::Fallback,
        };
        entries.insert("value".to_string(), value);
        Fingerprint(entries)
    }

    pub fn get(&self, name: &str) -> Option<&CanonicalValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ──────────────────────────────────────────────
// Dictionary
// ──────────────────────────────────────────────

/// Deduplicating store of fingerprints, each tagged with the evaluation
/// number that first produced it. No eviction.
#[derive(Debug, Clone, Default)]
pub struct StructuralHashDictionary {
    entries: HashMap<Fingerprint, u64>,
}

impl StructuralHashDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, key: &Fingerprint) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert `key` unless present. Returns true when the key was new;
    /// an existing key keeps its original tag.
    pub fn insert(&mut self, key: Fingerprint, tag: u64) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, tag);
        true
    }

    pub fn tag(&self, key: &Fingerprint) -> Option<u64> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
