//! Shapes, and the rules that compute the shape and free indices of a node from its operands.

use crate::error::{InvalidArity, InvalidOperand, PreconditionViolation, ShapeMismatch};
use std::fmt;
use super::{
    index::{contract, insert_sorted, merge_disjoint, remove, Index, IndexItem},
    Arena,
    Category,
    ExprId,
    Kind,
    Node,
};
use wform_error::Error;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The dimensions of a tensor-valued expression. Scalars have the empty shape `()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Shape(Vec<usize>);

impl Shape {
    /// The shape of a scalar.
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    /// The number of axes.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Returns the shape with the axes of `other` appended.
    pub fn concat(&self, other: &Shape) -> Shape {
        Shape(self.0.iter().chain(&other.0).copied().collect())
    }

    /// Returns true if this is the shape of a square matrix.
    fn is_square(&self) -> bool {
        self.rank() == 2 && self.0[0] == self.0[1]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "()"),
            [dim] => write!(f, "({},)", dim),
            dims => {
                let dims = dims.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "({})", dims.join(", "))
            },
        }
    }
}

/// The shape and free indices of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Meta {
    pub shape: Shape,
    pub free_indices: Vec<Index>,
}

impl Meta {
    pub fn new(shape: Shape, free_indices: Vec<Index>) -> Self {
        Self { shape, free_indices }
    }

    fn of(node: &Node) -> Self {
        Self::new(node.shape.clone(), node.free_indices.clone())
    }
}

/// What an operand position accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Value,
    Indices,
    Condition,
    Variable,
    Coefficient,
}

impl Role {
    fn of(kind: Kind, position: usize) -> Self {
        match (kind, position) {
            (Kind::Indexed | Kind::IndexSum | Kind::ComponentTensor | Kind::SpatialDerivative, 1) => Self::Indices,
            (Kind::Conditional, 0) => Self::Condition,
            (Kind::VariableDerivative, 1) => Self::Variable,
            (Kind::CoefficientDerivative, 1) => Self::Coefficient,
            _ => Self::Value,
        }
    }

    fn accepts(self, node: &Node) -> bool {
        match self {
            Self::Value => !matches!(node.kind.info().category, Category::Index | Category::Condition),
            Self::Indices => node.kind == Kind::MultiIndex,
            Self::Condition => node.kind.info().category == Category::Condition,
            Self::Variable => node.kind == Kind::Variable,
            Self::Coefficient => node.kind == Kind::Coefficient,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Value => "a value",
            Self::Indices => "a multi-index",
            Self::Condition => "a condition",
            Self::Variable => "a variable",
            Self::Coefficient => "a coefficient",
        }
    }
}

/// Builds a [`ShapeMismatch`] error for the given operands.
fn mismatch(kind: Kind, nodes: &[&Node], reason: impl Into<String>) -> Error {
    Error::new(ShapeMismatch {
        kind,
        shapes: nodes.iter().map(|node| node.shape.clone()).collect(),
        reason: reason.into(),
    })
}

/// Computes the shape and free indices of a node of the given kind with the given operands,
/// checking that the operands are valid for the kind.
pub(crate) fn infer(arena: &Arena, kind: Kind, operands: &[ExprId]) -> Result<Meta, Error> {
    let info = kind.info();
    if !info.arity.accepts(operands.len()) {
        return Err(Error::new(InvalidArity { kind, expected: info.arity, given: operands.len() }));
    }

    let nodes = operands.iter().map(|&id| arena.get(id)).collect::<Vec<_>>();
    for (position, node) in nodes.iter().enumerate() {
        let role = Role::of(kind, position);
        if !role.accepts(node) {
            return Err(Error::new(InvalidOperand {
                kind,
                position,
                expected: role.describe(),
                found: node.kind,
            }));
        }
    }

    let fail = |reason: &str| mismatch(kind, &nodes, reason);
    let no_free = |node: &Node, reason: &str| {
        if node.free_indices.is_empty() {
            Ok(())
        } else {
            Err(mismatch(kind, &nodes, reason))
        }
    };

    match kind {
        Kind::Zero
            | Kind::IntValue
            | Kind::FloatValue
            | Kind::Identity
            | Kind::Argument
            | Kind::Coefficient
            | Kind::SpatialCoordinate
            | Kind::FacetNormal
            | Kind::MultiIndex => Err(Error::new(PreconditionViolation {
                kind,
                reason: "terminal nodes are built with their own constructors".to_string(),
            })),

        Kind::Sum | Kind::ListTensor => {
            let first = nodes[0];
            if nodes.iter().any(|node| node.shape != first.shape) {
                return Err(fail("all operands must have the same shape"));
            }
            if nodes.iter().any(|node| node.free_indices != first.free_indices) {
                return Err(fail("all operands must have the same free indices"));
            }
            if kind == Kind::Sum {
                Ok(Meta::of(first))
            } else {
                let shape = Shape::from([nodes.len()]).concat(&first.shape);
                Ok(Meta::new(shape, first.free_indices.clone()))
            }
        },
        Kind::Product => {
            let (a, b) = (nodes[0], nodes[1]);
            let shape = match (a.shape.is_scalar(), b.shape.is_scalar()) {
                (true, _) => b.shape.clone(),
                (false, true) => a.shape.clone(),
                (false, false) => return Err(fail(
                    "at least one factor must be scalar; use `inner`, `dot` or `outer` for tensor products",
                )),
            };
            let (free, repeated) = contract(&a.free_indices, &b.free_indices);
            if !repeated.is_empty() && !shape.is_scalar() {
                return Err(fail("implicit summation over a repeated index requires scalar factors"));
            }
            Ok(Meta::new(shape, free))
        },
        Kind::Division => {
            let (a, b) = (nodes[0], nodes[1]);
            if !b.shape.is_scalar() {
                return Err(fail("the denominator must be scalar"));
            }
            no_free(b, "the denominator cannot have free indices")?;
            Ok(Meta::of(a))
        },
        Kind::Power => {
            let (base, exponent) = (nodes[0], nodes[1]);
            if !base.shape.is_scalar() || !exponent.shape.is_scalar() {
                return Err(fail("the base and exponent must be scalar"));
            }
            no_free(base, "the base cannot have free indices")?;
            no_free(exponent, "the exponent cannot have free indices")?;
            Ok(Meta::new(Shape::scalar(), Vec::new()))
        },
        Kind::Abs | Kind::PositiveRestricted | Kind::NegativeRestricted | Kind::Variable => {
            Ok(Meta::of(nodes[0]))
        },

        Kind::Transposed
            | Kind::Outer
            | Kind::Inner
            | Kind::Dot
            | Kind::Cross
            | Kind::Trace
            | Kind::Determinant
            | Kind::Cofactor
            | Kind::Inverse
            | Kind::Deviatoric
            | Kind::Skew => {
            for node in &nodes {
                no_free(node, "compound tensor operators do not accept operands with free indices")?;
            }
            tensor_algebra(kind, &nodes).map(|shape| Meta::new(shape, Vec::new()))
        },

        Kind::Sqrt | Kind::Exp | Kind::Ln | Kind::Cos | Kind::Sin => {
            if !nodes[0].shape.is_scalar() {
                return Err(fail("math functions only accept scalar operands"));
            }
            no_free(nodes[0], "math functions do not accept operands with free indices")?;
            Ok(Meta::new(Shape::scalar(), Vec::new()))
        },

        Kind::Indexed => indexed(kind, &nodes),
        Kind::IndexSum => {
            let (summand, indices) = (nodes[0], nodes[1].payload.indices());
            let index = match indices {
                [IndexItem::Free(index)] => *index,
                _ => return Err(fail("an index sum binds exactly one free index")),
            };
            if !summand.shape.is_scalar() {
                return Err(fail("the summand must be scalar"));
            }
            if !summand.free_indices.contains(&index) {
                return Err(fail("the summation index must be free in the summand"));
            }
            Ok(Meta::new(Shape::scalar(), remove(&summand.free_indices, &[index])))
        },
        Kind::ComponentTensor => {
            let (component, items) = (nodes[0], nodes[1].payload.indices());
            if !component.shape.is_scalar() {
                return Err(fail("the component expression must be scalar"));
            }
            let mut bound = Vec::new();
            for item in items {
                let index = item.free().ok_or_else(|| fail("a component tensor can only bind free indices"))?;
                if !component.free_indices.contains(&index) {
                    return Err(fail("every bound index must be free in the component expression"));
                }
                if bound.contains(&index) {
                    return Err(fail("an index can only be bound once"));
                }
                bound.push(index);
            }
            let shape = Shape::from(bound.iter().map(|index| index.dim).collect::<Vec<_>>());
            Ok(Meta::new(shape, remove(&component.free_indices, &bound)))
        },

        Kind::Eq | Kind::Ne | Kind::Le | Kind::Ge | Kind::Lt | Kind::Gt => {
            for node in &nodes {
                if !node.shape.is_scalar() {
                    return Err(fail("comparisons only accept scalar operands"));
                }
                no_free(node, "comparisons do not accept operands with free indices")?;
            }
            Ok(Meta::new(Shape::scalar(), Vec::new()))
        },
        Kind::Conditional => {
            let (when_true, when_false) = (nodes[1], nodes[2]);
            if when_true.shape != when_false.shape {
                return Err(fail("both branches must have the same shape"));
            }
            if when_true.free_indices != when_false.free_indices {
                return Err(fail("both branches must have the same free indices"));
            }
            Ok(Meta::of(when_true))
        },

        Kind::SpatialDerivative => {
            let (f, items) = (nodes[0], nodes[1].payload.indices());
            if items.is_empty() {
                return Err(fail("a spatial derivative needs at least one direction"));
            }
            let mut free = f.free_indices.clone();
            for index in items.iter().filter_map(IndexItem::free) {
                if !insert_sorted(&mut free, index) {
                    return Err(fail("a derivative index cannot already be free in the operand; use an index sum to contract it"));
                }
            }
            Ok(Meta::new(f.shape.clone(), free))
        },
        Kind::VariableDerivative => {
            let (f, variable) = (nodes[0], nodes[1]);
            no_free(variable, "cannot differentiate with respect to an expression with free indices")?;
            Ok(Meta::new(f.shape.concat(&variable.shape), f.free_indices.clone()))
        },
        Kind::CoefficientDerivative => {
            let (f, coefficient, direction) = (nodes[0], nodes[1], nodes[2]);
            if direction.shape != coefficient.shape {
                return Err(fail("the direction must have the shape of the coefficient"));
            }
            no_free(direction, "the direction cannot have free indices")?;
            Ok(Meta::of(f))
        },
    }
}

/// Shape rules of the compound tensor operators. Operands are known to have no free indices.
fn tensor_algebra(kind: Kind, nodes: &[&Node]) -> Result<Shape, Error> {
    let fail = |reason: &str| mismatch(kind, nodes, reason);
    let a = &nodes[0].shape;
    match kind {
        Kind::Transposed => match a.dims() {
            &[m, n] => Ok(Shape::from([n, m])),
            _ => Err(fail("only matrices can be transposed")),
        },
        Kind::Outer => Ok(a.concat(&nodes[1].shape)),
        Kind::Inner => {
            if *a != nodes[1].shape {
                return Err(fail("both operands must have the same shape"));
            }
            Ok(Shape::scalar())
        },
        Kind::Dot => {
            let b = &nodes[1].shape;
            match (a.dims().split_last(), b.dims().split_first()) {
                (Some((last, init)), Some((first, tail))) if last == first => {
                    Ok(Shape::from(init.iter().chain(tail).copied().collect::<Vec<_>>()))
                },
                (Some(_), Some(_)) => Err(fail("the last axis of the left operand must match the first axis of the right operand")),
                _ => Err(fail("both operands must have rank of at least 1")),
            }
        },
        Kind::Cross => {
            if a.dims() != [3] || nodes[1].shape.dims() != [3] {
                return Err(fail("both operands must be 3-vectors"));
            }
            Ok(Shape::from([3]))
        },
        Kind::Trace => {
            if !a.is_square() {
                return Err(fail("the operand must be a square matrix"));
            }
            Ok(Shape::scalar())
        },
        Kind::Determinant => {
            if !a.is_scalar() && !a.is_square() {
                return Err(fail("the operand must be a scalar or a square matrix"));
            }
            Ok(Shape::scalar())
        },
        Kind::Inverse => {
            if !a.is_scalar() && !a.is_square() {
                return Err(fail("the operand must be a scalar or a square matrix"));
            }
            Ok(a.clone())
        },
        Kind::Cofactor | Kind::Deviatoric | Kind::Skew => {
            if !a.is_square() {
                return Err(fail("the operand must be a square matrix"));
            }
            Ok(a.clone())
        },
        _ => Err(fail("not a compound tensor operator")),
    }
}

/// Shape rule of [`Kind::Indexed`]. An index repeated twice in the multi-index is summed over.
fn indexed(kind: Kind, nodes: &[&Node]) -> Result<Meta, Error> {
    let fail = |reason: String| mismatch(kind, nodes, reason);
    let (tensor, items) = (nodes[0], nodes[1].payload.indices());
    if items.len() != tensor.shape.rank() {
        return Err(fail(format!(
            "a tensor of rank {} needs {} indices, but {} were given",
            tensor.shape.rank(),
            tensor.shape.rank(),
            items.len(),
        )));
    }

    let mut once = Vec::new();
    let mut twice = Vec::new();
    for (item, &dim) in items.iter().zip(tensor.shape.dims()) {
        match *item {
            IndexItem::Fixed(value) => if value >= dim {
                return Err(fail(format!("fixed index {} is out of range for an axis of dimension {}", value, dim)));
            },
            IndexItem::Free(index) => {
                if index.dim != dim {
                    return Err(fail(format!(
                        "index {} ranges over {} values, but indexes an axis of dimension {}",
                        index,
                        index.dim,
                        dim,
                    )));
                }
                if twice.contains(&index) {
                    return Err(fail(format!("index {} is repeated more than twice", index)));
                }
                if !insert_sorted(&mut once, index) {
                    once.retain(|other| *other != index);
                    twice.push(index);
                }
            },
        }
    }

    let free = merge_disjoint(&tensor.free_indices, &once)
        .ok_or_else(|| fail("an index is already free in the indexed expression".to_string()))?;
    Ok(Meta::new(Shape::scalar(), free))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Cell, Element};
    use crate::expr::Arity;
    use pretty_assertions::assert_eq;

    fn vector(arena: &mut Arena, dim: usize) -> ExprId {
        let cell = Cell::new("tetrahedron", dim, dim, dim + 1);
        arena.coefficient(Element::vector("Lagrange", 1, cell))
    }

    #[test]
    fn display() {
        assert_eq!(Shape::scalar().to_string(), "()");
        assert_eq!(Shape::from([3]).to_string(), "(3,)");
        assert_eq!(Shape::from([3, 3]).to_string(), "(3, 3)");
    }

    #[test]
    fn product_of_scalars() {
        let mut arena = Arena::new();
        let (a, b) = (arena.float(1.5), arena.int(2));
        let product = arena.product(a, b).unwrap();
        assert_eq!(arena.shape(product), &Shape::scalar());
    }

    #[test]
    fn outer_of_vectors() {
        let mut arena = Arena::new();
        let (u, v) = (vector(&mut arena, 3), vector(&mut arena, 3));
        let outer = arena.outer(u, v).unwrap();
        assert_eq!(arena.shape(outer), &Shape::from([3, 3]));
    }

    #[test]
    fn product_of_vectors_fails() {
        let mut arena = Arena::new();
        let u = vector(&mut arena, 3);
        let cell = Cell::new("quadrilateral", 4, 2, 4);
        let v = arena.coefficient(Element::vector("Lagrange", 1, cell));
        let err = arena.product(u, v).unwrap_err();
        let kind = err.downcast_ref::<ShapeMismatch>().unwrap();
        assert_eq!(kind.kind, Kind::Product);
        assert_eq!(kind.shapes, vec![Shape::from([3]), Shape::from([4])]);
    }

    #[test]
    fn wrong_arity() {
        let mut arena = Arena::new();
        let one = arena.int(1);
        let err = arena.add(Kind::Division, vec![one]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<InvalidArity>(),
            Some(&InvalidArity { kind: Kind::Division, expected: Arity::Exact(2), given: 1 }),
        );
    }

    #[test]
    fn indexing_removes_axes() {
        let mut arena = Arena::new();
        let (u, v) = (vector(&mut arena, 3), vector(&mut arena, 3));
        let outer = arena.outer(u, v).unwrap();
        let (i, j) = (arena.index(3), arena.index(3));
        let component = arena.indexed(outer, vec![i.into(), j.into()]).unwrap();
        assert_eq!(arena.shape(component), &Shape::scalar());
        assert_eq!(arena.get(component).free_indices, vec![i, j]);

        let matrix = arena.component_tensor(component, vec![j, i]).unwrap();
        assert_eq!(arena.shape(matrix), &Shape::from([3, 3]));
        assert!(arena.get(matrix).free_indices.is_empty());
    }

    #[test]
    fn repeated_index_contracts() {
        let mut arena = Arena::new();
        let (u, v) = (vector(&mut arena, 2), vector(&mut arena, 2));
        let i = arena.index(2);
        let (ui, vi) = (arena.indexed(u, vec![i.into()]).unwrap(), arena.indexed(v, vec![i.into()]).unwrap());
        let dot = arena.product(ui, vi).unwrap();
        assert!(arena.get(dot).free_indices.is_empty());

        let outer = arena.outer(u, v).unwrap();
        let trace = arena.indexed(outer, vec![i.into(), i.into()]).unwrap();
        assert!(arena.get(trace).free_indices.is_empty());
    }

    #[test]
    fn index_out_of_range() {
        let mut arena = Arena::new();
        let u = vector(&mut arena, 2);
        assert!(arena.indexed(u, vec![IndexItem::Fixed(2)]).unwrap_err().is::<ShapeMismatch>());
    }

    #[test]
    fn condition_must_be_comparison() {
        let mut arena = Arena::new();
        let (one, two) = (arena.int(1), arena.int(2));
        let err = arena.conditional(one, one, two).unwrap_err();
        let kind = err.downcast_ref::<InvalidOperand>().unwrap();
        assert_eq!((kind.position, kind.found), (0, Kind::IntValue));
    }

    #[test]
    fn dot_shapes() {
        let mut arena = Arena::new();
        let u = vector(&mut arena, 3);
        let a = arena.outer(u, u).unwrap();
        let au = arena.dot(a, u).unwrap();
        assert_eq!(arena.shape(au), &Shape::from([3]));
        let uau = arena.dot(u, au).unwrap();
        assert_eq!(arena.shape(uau), &Shape::scalar());
    }
}
