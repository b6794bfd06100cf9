//! Qualified names and prefix resolution.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InstanceError;

/// An expanded XML name: namespace URI plus local name.
///
/// Prefixes are resolved away on construction, so two QNames are equal
/// exactly when namespace and local name are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    pub namespace: String,
    pub local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        QName {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Parse Clark notation (`{uri}local`) or a bare local name in no namespace.
    pub fn from_clark(text: &str) -> Result<QName, InstanceError> {
        if let Some(rest) = text.strip_prefix('{') {
            let (ns, local) = rest
                .split_once('}')
                .ok_or_else(|| InstanceError::InvalidQName(text.to_string()))?;
            if !is_ncname(local) {
                return Err(InstanceError::InvalidQName(text.to_string()));
            }
            return Ok(QName::new(ns, local));
        }
        if is_ncname(text) {
            Ok(QName::new("", text))
        } else {
            Err(InstanceError::InvalidQName(text.to_string()))
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

// ──────────────────────────────────────────────
// Namespace context
// ──────────────────────────────────────────────

/// In-scope prefix bindings used to resolve `prefix:local` names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceContext {
    prefixes: BTreeMap<String, String>,
    #[serde(default)]
    default_namespace: Option<String>,
}

impl NamespaceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.bind(prefix, uri);
        self
    }

    pub fn bind(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), uri.into());
    }

    pub fn set_default_namespace(&mut self, uri: impl Into<String>) {
        self.default_namespace = Some(uri.into());
    }

    pub fn namespace_for(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Resolve `prefix:local`, Clark notation, or an unprefixed name.
    ///
    /// Unprefixed names take the default namespace when one is set.
    pub fn resolve(&self, name: &str) -> Result<QName, InstanceError> {
        if name.starts_with('{') {
            return QName::from_clark(name);
        }
        match name.split_once(':') {
            Some((prefix, local)) => {
                if !is_ncname(prefix) || !is_ncname(local) {
                    return Err(InstanceError::InvalidQName(name.to_string()));
                }
                let ns = self
                    .namespace_for(prefix)
                    .ok_or_else(|| InstanceError::UndeclaredPrefix {
                        prefix: prefix.to_string(),
                        name: name.to_string(),
                    })?;
                Ok(QName::new(ns, local))
            }
            None => {
                if !is_ncname(name) {
                    return Err(InstanceError::InvalidQName(name.to_string()));
                }
                let ns = self.default_namespace.clone().unwrap_or_default();
                Ok(QName::new(ns, name))
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
