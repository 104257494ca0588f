//! Contains the common [`ErrorKind`] trait used by all errors, and the [`Diagnostic`] type used
//! to report conditions that are worth mentioning but not fatal.
//!
//! Nothing in this crate formats output for a terminal. Errors and diagnostics only carry their
//! message content, and it is up to the caller to decide how to present them.

pub mod diagnostic;

pub use diagnostic::{report, Diagnostic, DiagnosticCollector, Severity};

use std::{any::Any, fmt::{self, Debug, Display}};

/// Represents any kind of error that can occur during some operation.
pub trait ErrorKind: Debug + Send + Sync {
    /// Returns `self` as [`Any`], so that the concrete kind can be recovered.
    fn as_any(&self) -> &dyn Any;

    /// The message describing what went wrong.
    fn message(&self) -> String;

    /// Optional help text describing what can be done to fix the error.
    fn help(&self) -> Option<String>;
}

/// An error produced by one of the wform crates.
#[derive(Debug)]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: Box<dyn ErrorKind>,
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: impl ErrorKind + 'static) -> Self {
        Self { kind: Box::new(kind) }
    }

    /// Returns true if the error is of the given kind.
    pub fn is<K: ErrorKind + 'static>(&self) -> bool {
        self.kind.as_any().is::<K>()
    }

    /// Returns the concrete kind of the error, if it is of the given kind.
    pub fn downcast_ref<K: ErrorKind + 'static>(&self) -> Option<&K> {
        self.kind.as_any().downcast_ref::<K>()
    }

    /// The message describing what went wrong.
    pub fn message(&self) -> String {
        self.kind.message()
    }

    /// Optional help text describing what can be done to fix the error.
    pub fn help(&self) -> Option<String> {
        self.kind.help()
    }
}

impl<K: ErrorKind + 'static> From<K> for Error {
    fn from(kind: K) -> Self {
        Self::new(kind)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.message())?;
        if let Some(help) = self.kind.help() {
            write!(f, " (help: {})", help)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use wform_attrs::ErrorKind;

    #[derive(Debug, ErrorKind)]
    #[error(message = "form has no integrals")]
    struct Empty;

    #[derive(Debug, ErrorKind)]
    #[error(
        message = format!("expected {} operands, got {}", expected, given),
        help = "check the operand list",
    )]
    struct Arity {
        expected: usize,
        given: usize,
    }

    #[test]
    fn unit_kind() {
        let err = Error::new(Empty);
        assert_eq!(err.message(), "form has no integrals");
        assert_eq!(err.help(), None);
        assert_eq!(err.to_string(), "form has no integrals");
    }

    #[test]
    fn fields_in_scope() {
        let err: Error = Arity { expected: 2, given: 3 }.into();
        assert_eq!(err.message(), "expected 2 operands, got 3");
        assert_eq!(err.to_string(), "expected 2 operands, got 3 (help: check the operand list)");
    }

    #[test]
    fn downcast() {
        let err: Error = Arity { expected: 1, given: 0 }.into();
        assert!(err.is::<Arity>());
        assert!(!err.is::<Empty>());
        assert_eq!(err.downcast_ref::<Arity>().map(|kind| kind.given), Some(0));
    }
}
