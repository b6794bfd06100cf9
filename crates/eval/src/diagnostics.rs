//! Diagnostics sink.
//!
//! Every operation that may need to report takes an explicit
//! `&dyn DiagnosticsSink`. Reporting never aborts evaluation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    /// Invalid or missing assertion attributes, reported at validation.
    ConfigurationError,
    /// A test yielded a non-boolean, or a function got wrong arguments.
    EvaluationTypeError,
    /// An expression failed to compile or evaluate.
    ExpressionError,
    /// Unbalanced braces in a message template.
    MessageFormatWarning,
    /// A comparison sequence both matched and failed to match one aspect.
    InconsistentMatchedVariableSequence,
    /// A generated satisfied message.
    AssertionSatisfied,
    /// A generated unsatisfied message.
    AssertionUnsatisfied,
    /// Per-evaluation description of a consistency check.
    ConsistencyCheck,
}

impl Category {
    pub fn code(&self) -> &'static str {
        match self {
            Category::ConfigurationError => "configurationError",
            Category::EvaluationTypeError => "evaluationTypeError",
            Category::ExpressionError => "expressionError",
            Category::MessageFormatWarning => "messageFormatWarning",
            Category::InconsistentMatchedVariableSequence => "inconsistentMatchedVariableSequence",
            Category::AssertionSatisfied => "assertionSatisfied",
            Category::AssertionUnsatisfied => "assertionUnsatisfied",
            Category::ConsistencyCheck => "consistencyCheck",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One structured report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: Level,
    pub category: Category,
    pub message: String,
    pub attributes: BTreeMap<String, String>,
}

impl Diagnostic {
    pub fn new(level: Level, category: Category, message: impl Into<String>) -> Self {
        Diagnostic {
            level,
            category,
            message: message.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn info(category: Category, message: impl Into<String>) -> Self {
        Self::new(Level::Info, category, message)
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self::new(Level::Warning, category, message)
    }

    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self::new(Level::Error, category, message)
    }

    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }
}

/// Receiver of validation diagnostics and evaluation summaries.
pub trait DiagnosticsSink {
    fn report(&self, diagnostic: Diagnostic);
}

// ──────────────────────────────────────────────
// Sinks
// ──────────────────────────────────────────────

/// Forwards diagnostics to `tracing` as structured events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, d: Diagnostic) {
        let category = d.category.code();
        let attributes = &d.attributes;
        match d.level {
            Level::Info => tracing::info!(category, ?attributes, "{}", d.message),
            Level::Warning => tracing::warn!(category, ?attributes, "{}", d.message),
            Level::Error => tracing::error!(category, ?attributes, "{}", d.message),
        }
    }
}

/// Keeps every diagnostic in memory, in report order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn count(&self, category: Category) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.category == category)
            .count()
    }

    pub fn has(&self, category: Category) -> bool {
        self.count(category) > 0
    }

    pub fn messages(&self, category: Category) -> Vec<String> {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.category == category)
            .map(|d| d.message.clone())
            .collect()
    }
}

impl DiagnosticsSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }
}
