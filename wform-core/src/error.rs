//! Every error that can be produced while building, traversing, differentiating or analyzing
//! expressions.
//!
//! All of these are wrapped in a [`wform_error::Error`] when returned. Use
//! [`Error::is`](wform_error::Error::is) or
//! [`Error::downcast_ref`](wform_error::Error::downcast_ref) to inspect the concrete kind.

use crate::expr::{Arity, Kind, Shape};
use wform_attrs::ErrorKind;
use wform_error::ErrorKind;

/// Formats a list of shapes as `[(), (3,)]`.
fn fmt_shapes(shapes: &[Shape]) -> String {
    let shapes = shapes.iter().map(ToString::to_string).collect::<Vec<_>>();
    format!("[{}]", shapes.join(", "))
}

/// The operands given to a node have shapes or free indices that are incompatible with the
/// node's kind.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!(
        "shape mismatch in `{}` with operand shapes {}: {}",
        self.kind,
        fmt_shapes(&self.shapes),
        self.reason,
    ),
)]
pub struct ShapeMismatch {
    /// The kind of node being built.
    pub kind: Kind,

    /// The shapes of the operands, in order.
    pub shapes: Vec<Shape>,

    /// What rule of the kind was broken.
    pub reason: String,
}

/// The wrong number of operands was given to a node.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!("`{}` expects {} operands, but {} were given", self.kind, self.expected, self.given),
)]
pub struct InvalidArity {
    /// The kind of node being built.
    pub kind: Kind,

    /// The arity of the kind.
    pub expected: Arity,

    /// The number of operands that were given.
    pub given: usize,
}

/// An operand has the wrong kind for its position, for example a number given as the condition
/// of a conditional.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!(
        "operand {} of `{}` must be {}, but a `{}` node was given",
        self.position,
        self.kind,
        self.expected,
        self.found,
    ),
)]
pub struct InvalidOperand {
    /// The kind of node being built.
    pub kind: Kind,

    /// The position of the offending operand.
    pub position: usize,

    /// A description of what is accepted at that position.
    pub expected: &'static str,

    /// The kind of the offending operand.
    pub found: Kind,
}

/// A rewriting or collecting visitor met a node kind it has no handler for, and did not declare
/// a fallback that accepts it.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!(
        "`{}` has no handler for `{}` nodes (shape {})",
        self.visitor,
        self.kind,
        self.shape,
    ),
    help = "add a handler for this kind, or declare `Fallback::Identity` if leaving the node unchanged is correct",
)]
pub struct UnsupportedNodeKind {
    /// The kind of the unhandled node.
    pub kind: Kind,

    /// The shape of the unhandled node.
    pub shape: Shape,

    /// The name of the visitor.
    pub visitor: &'static str,
}

/// The differentiation engine was given a node it must never see, such as an unevaluated
/// derivative request.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!("precondition violated at `{}` node: {}", self.kind, self.reason),
    help = "derivative requests must be resolved with `expand_derivatives` before partial derivatives are taken",
)]
pub struct PreconditionViolation {
    /// The kind of the offending node.
    pub kind: Kind,

    /// What was expected of the node.
    pub reason: String,
}

/// A differentiation rule that is only implemented for scalars met a non-scalar operand.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!(
        "differentiation of `{}` is only implemented for scalar operands, but an operand has shape {}",
        self.kind,
        self.shape,
    ),
)]
pub struct UnsupportedRank {
    /// The kind of the node being differentiated.
    pub kind: Kind,

    /// The shape of the first non-scalar operand.
    pub shape: Shape,
}

/// Form data was requested for a form without any integrals.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = "form has no integrals",
    help = "every integral of the form may have been dropped because its integrand is zero",
)]
pub struct EmptyForm;

/// No cell could be found to supply the geometric and topological dimensions of a form.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!("no cell is defined for form `{}`: {}", self.form, self.reason),
    help = "build the elements of the form's arguments and coefficients on a cell",
)]
pub struct MissingDomain {
    /// The name of the form.
    pub form: String,

    /// Why no cell could be determined.
    pub reason: String,
}

/// The arguments of a form are not numbered `0, 1, ..., rank - 1`.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!("invalid argument numbering {:?}: {}", self.numbers, self.reason),
    help = "number the arguments of a form of rank `r` consecutively from 0 to `r - 1`",
)]
pub struct InvalidArgumentNumbering {
    /// The argument numbers found in the form, in sorted order.
    pub numbers: Vec<usize>,

    /// What is wrong with them.
    pub reason: String,
}

/// No node kind has the given name.
#[derive(Debug, Clone, ErrorKind, PartialEq)]
#[error(
    message = format!("unknown node kind `{}`", self.name),
    help = if self.suggestions.is_empty() {
        "kind names are snake_case, such as `component_tensor`".to_string()
    } else {
        let suggestions = self.suggestions
            .iter()
            .map(|name| format!("`{}`", name))
            .collect::<Vec<_>>();
        format!("did you mean {}?", suggestions.join(", "))
    },
)]
pub struct UnknownKind {
    /// The name that was looked up.
    pub name: String,

    /// Names of existing kinds that are close to the given name.
    pub suggestions: Vec<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wform_error::Error;

    #[test]
    fn shape_mismatch_names_kind_and_shapes() {
        let err = Error::new(ShapeMismatch {
            kind: Kind::Product,
            shapes: vec![Shape::from([3]), Shape::from([4])],
            reason: "at least one factor must be scalar".to_string(),
        });
        assert_eq!(
            err.message(),
            "shape mismatch in `product` with operand shapes [(3,), (4,)]: at least one factor must be scalar",
        );
    }

    #[test]
    fn arity_message() {
        let err = Error::new(InvalidArity { kind: Kind::Division, expected: Arity::Exact(2), given: 3 });
        assert_eq!(err.message(), "`division` expects exactly 2 operands, but 3 were given");
    }

    #[test]
    fn unknown_kind_help() {
        let err = Error::new(UnknownKind { name: "prodct".to_string(), suggestions: vec!["product"] });
        assert_eq!(err.help().as_deref(), Some("did you mean `product`?"));
    }
}
