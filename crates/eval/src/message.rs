//! Message templates: literal text with `{expression}` substitutions.
//!
//! `{{` and `}}` stand for literal braces. An expression runs to the first
//! closing brace; an opening brace that is never closed stays literal.
//! Templates are compiled once and rendered per evaluation.

use xbrl_core::NamespaceContext;

use crate::diagnostics::{Category, Diagnostic, DiagnosticsSink};
use crate::expression::{ExpressionEngine, Scope};

/// A template piece before compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSegment {
    Literal(String),
    Expression(String),
}

/// True when every unescaped `{` opens an expression that is closed and
/// no unescaped `}` appears outside one. Expression bodies are skipped the
/// way [`tokenize`] skips them, so a `{` inside a substitution is not
/// counted.
pub fn braces_balanced(template: &str) -> bool {
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1).copied()) {
            ('{', Some('{')) | ('}', Some('}')) => i += 2,
            ('{', _) => match chars[i + 1..].iter().position(|&ch| ch == '}') {
                Some(len) => i += len + 2,
                None => return false,
            },
            ('}', _) => return false,
            _ => i += 1,
        }
    }
    true
}

/// Split a template into literal and expression segments, in order.
/// Adjacent literal text is merged; trailing literal text is kept.
pub fn tokenize(template: &str) -> Vec<RawSegment> {
    let chars: Vec<char> = template.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match (c, next) {
            ('{', Some('{')) | ('}', Some('}')) => {
                literal.push(c);
                i += 2;
            }
            ('{', _) => match chars[i + 1..].iter().position(|&ch| ch == '}') {
                Some(len) => {
                    if !literal.is_empty() {
                        segments.push(RawSegment::Literal(std::mem::take(&mut literal)));
                    }
                    let expr: String = chars[i + 1..i + 1 + len].iter().collect();
                    segments.push(RawSegment::Expression(expr));
                    i += len + 2;
                }
                None => {
                    literal.extend(&chars[i..]);
                    i = chars.len();
                }
            },
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        segments.push(RawSegment::Literal(literal));
    }
    segments
}

#[derive(Debug, Clone)]
enum Segment<C> {
    Literal(String),
    /// `None` when the expression failed to compile; renders as `""`.
    Expression { text: String, compiled: Option<C> },
}

/// A template compiled against one expression engine.
#[derive(Debug, Clone)]
pub struct MessageTemplate<C> {
    source: String,
    segments: Vec<Segment<C>>,
}

impl<C: Clone + std::fmt::Debug> MessageTemplate<C> {
    /// Check balance, tokenize and compile every substitution.
    ///
    /// Imbalance is reported as a warning, a failed compile as an error;
    /// neither stops the template from being built.
    pub fn compile<E>(
        template: &str,
        engine: &E,
        namespaces: &NamespaceContext,
        sink: &dyn DiagnosticsSink,
    ) -> MessageTemplate<C>
    where
        E: ExpressionEngine<Compiled = C>,
    {
        if !braces_balanced(template) {
            sink.report(
                Diagnostic::warning(
                    Category::MessageFormatWarning,
                    "message template has unbalanced braces",
                )
                .with("template", template),
            );
        }
        let segments = tokenize(template)
            .into_iter()
            .map(|raw| match raw {
                RawSegment::Literal(s) => Segment::Literal(s),
                RawSegment::Expression(text) => {
                    let compiled = match engine.compile(&text, namespaces) {
                        Ok(c) => Some(c),
                        Err(e) => {
                            sink.report(
                                Diagnostic::error(Category::ExpressionError, e.to_string())
                                    .with("template", template)
                                    .with("expression", &text),
                            );
                            None
                        }
                    };
                    Segment::Expression { text, compiled }
                }
            })
            .collect();
        MessageTemplate {
            source: template.to_string(),
            segments,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against one evaluation's scope.
    pub fn render<E>(&self, engine: &E, scope: &Scope<'_>) -> String
    where
        E: ExpressionEngine<Compiled = C>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Expression {
                    compiled: Some(compiled),
                    text,
                } => match engine.evaluate(compiled, scope) {
                    Ok(value) => out.push_str(&value.to_message_text(scope.store)),
                    Err(e) => scope.sink.report(
                        Diagnostic::error(Category::ExpressionError, e.to_string())
                            .with("template", &self.source)
                            .with("expression", text),
                    ),
                },
                Segment::Expression { compiled: None, .. } => {}
            }
        }
        out
    }
}

/// Compile and render each template; one output per template, in order.
pub fn process_messages<E: ExpressionEngine>(
    templates: &[String],
    engine: &E,
    namespaces: &NamespaceContext,
    scope: &Scope<'_>,
) -> Vec<String> {
    templates
        .iter()
        .map(|t| MessageTemplate::compile(t, engine, namespaces, scope.sink).render(engine, scope))
        .collect()
}
