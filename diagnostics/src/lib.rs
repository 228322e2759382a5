//! Diagnostic infrastructure shared by the Veld front end.
//!
//! The compiler reports recoverable problems through a [`DiagnosticSink`]
//! and keeps going; the sink decides what to do with them (collect, print,
//! count). Reporting never unwinds compilation.

use std::fmt;

use serde::Serialize;

/// Source location for error reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(line: usize, col: usize) -> Self {
        Span { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Stable message-kind tags, so callers can match on a diagnostic without
/// parsing its rendered text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// The left side of an assignment is not a name or an index expression.
    InvalidAssignment,
    /// A result-producing block whose final item is a statement.
    InvalidBlock,
    /// A reference-of operand that cannot be resolved to a storage cell.
    UnresolvedReference,
    /// A construct the compiler recognizes but does not implement yet.
    NotSupported,
}

impl DiagnosticKind {
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticKind::InvalidAssignment => "invalid-assignment",
            DiagnosticKind::InvalidBlock => "invalid-block",
            DiagnosticKind::UnresolvedReference => "unresolved-reference",
            DiagnosticKind::NotSupported => "not-supported",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One reported problem: where, what kind, and the rendered text.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.span, self.kind, self.message)
    }
}

/// Fire-and-forget receiver for diagnostics. Implementations must not fail.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Collects diagnostics so a caller can batch everything from one run
/// before deciding whether to proceed.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl DiagnosticSink for DiagnosticBag {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
