//! Structured, non-fatal diagnostics.

use std::fmt;

/// How serious a [`Diagnostic`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// The [`log::Level`] a diagnostic of this severity is forwarded to.
    pub fn level(self) -> log::Level {
        match self {
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A (severity, message) pair describing something the caller may want to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    /// Creates a new diagnostic.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, message: message.into() }
    }
}

/// A type that collects the diagnostics emitted by an algorithm.
///
/// [`DiagnosticCollector`] is also implemented for the unit type `()`, which discards every
/// diagnostic. They are still forwarded to the [`log`] facade by [`report`].
pub trait DiagnosticCollector {
    /// Adds a diagnostic to the collector.
    fn push(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticCollector for () {
    #[inline]
    fn push(&mut self, _: Diagnostic) {}
}

impl DiagnosticCollector for Vec<Diagnostic> {
    #[inline]
    fn push(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Logs the diagnostic at the level matching its severity, then hands it to the collector.
pub fn report(
    collector: &mut dyn DiagnosticCollector,
    severity: Severity,
    message: impl Into<String>,
) {
    let diagnostic = Diagnostic::new(severity, message);
    log::log!(severity.level(), "{}", diagnostic.message);
    collector.push(diagnostic);
}
