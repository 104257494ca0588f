//! Constructors for every kind of node.

use crate::element::{Cell, Element};
use crate::primitive::{float, int};
use rug::{Assign, Float, Integer};
use std::sync::Arc;
use super::{Arena, ExprId, Index, IndexItem, Kind, Meta, Payload, Shape};
use wform_error::Error;

/// The side of a facet an expression is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Restriction {
    Positive,
    Negative,
}

impl Restriction {
    /// The kind of the restriction node.
    pub fn kind(self) -> Kind {
        match self {
            Self::Positive => Kind::PositiveRestricted,
            Self::Negative => Kind::NegativeRestricted,
        }
    }
}

/// Generates constructors for kinds with a fixed list of value operands.
macro_rules! operators {
    ($($name:ident($($operand:ident),+) => $kind:ident),* $(,)?) => {
        $(
            #[doc = concat!("Builds a [`Kind::", stringify!($kind), "`] node.")]
            pub fn $name(&mut self, $($operand: ExprId),+) -> Result<ExprId, Error> {
                self.add(Kind::$kind, vec![$($operand),+])
            }
        )*
    };
}

impl Arena {
    pub(crate) fn fresh_label(&mut self) -> u32 {
        self.counters.label += 1;
        self.counters.label - 1
    }

    /// Creates an integer constant.
    pub fn int<T>(&mut self, n: T) -> ExprId
    where
        Integer: From<T>,
    {
        self.terminal(Kind::IntValue, Payload::Int(int(n)), Meta::new(Shape::scalar(), Vec::new()))
    }

    /// Creates a float constant.
    ///
    /// # Panics
    ///
    /// Panics if the value is NaN. Float constants are compared and hashed by value, and NaN is not
    /// equal to itself.
    pub fn float<T>(&mut self, n: T) -> ExprId
    where
        Float: Assign<T>,
    {
        let value = float(n);
        assert!(!value.is_nan(), "cannot create a NaN float constant");
        self.terminal(Kind::FloatValue, Payload::Float(value), Meta::new(Shape::scalar(), Vec::new()))
    }

    /// Creates a zero of the given shape.
    pub fn zero(&mut self, shape: Shape) -> ExprId {
        self.zero_with_indices(shape, Vec::new())
    }

    /// Creates a zero of the given shape and free indices.
    pub fn zero_with_indices(&mut self, shape: Shape, mut free_indices: Vec<Index>) -> ExprId {
        free_indices.sort_unstable();
        free_indices.dedup();
        self.terminal(Kind::Zero, Payload::None, Meta::new(shape, free_indices))
    }

    /// Creates the `dim` by `dim` identity matrix.
    pub fn identity(&mut self, dim: usize) -> ExprId {
        self.terminal(Kind::Identity, Payload::None, Meta::new(Shape::from([dim, dim]), Vec::new()))
    }

    /// Creates the argument at the given position of a form's argument list, e.g. 0 for the test
    /// function and 1 for the trial function.
    pub fn argument(&mut self, number: usize, element: Element) -> ExprId {
        let shape = element.value_shape.clone();
        let payload = Payload::Argument { number, element: Arc::new(element) };
        self.terminal(Kind::Argument, payload, Meta::new(shape, Vec::new()))
    }

    /// Creates a new coefficient, distinct from every coefficient created before.
    pub fn coefficient(&mut self, element: Element) -> ExprId {
        let count = self.counters.coefficient;
        self.coefficient_numbered(count, element)
    }

    /// Creates the coefficient with the given count. Calling this twice with the same arguments
    /// returns the same node.
    pub fn coefficient_numbered(&mut self, count: u32, element: Element) -> ExprId {
        self.counters.coefficient = self.counters.coefficient.max(count.saturating_add(1));
        let shape = element.value_shape.clone();
        let payload = Payload::Coefficient { count, element: Arc::new(element) };
        self.terminal(Kind::Coefficient, payload, Meta::new(shape, Vec::new()))
    }

    /// Creates the spatial coordinate `x` of the given cell.
    pub fn spatial_coordinate(&mut self, cell: Cell) -> ExprId {
        let shape = Shape::from([cell.geometric_dimension]);
        self.terminal(Kind::SpatialCoordinate, Payload::Cell(Arc::new(cell)), Meta::new(shape, Vec::new()))
    }

    /// Creates the outward unit normal of the facets of the given cell.
    pub fn facet_normal(&mut self, cell: Cell) -> ExprId {
        let shape = Shape::from([cell.geometric_dimension]);
        self.terminal(Kind::FacetNormal, Payload::Cell(Arc::new(cell)), Meta::new(shape, Vec::new()))
    }

    /// Creates a fresh free index ranging over `dim` values.
    pub fn index(&mut self, dim: usize) -> Index {
        let count = self.counters.index;
        self.counters.index += 1;
        Index { count, dim }
    }

    /// Makes sure that indices created by [`Arena::index`] from now on have a count of at least
    /// `count`.
    pub(crate) fn reserve_index_counts(&mut self, count: u32) {
        self.counters.index = self.counters.index.max(count);
    }

    /// Creates a multi-index, the index operand of indexing nodes.
    pub fn multi_index(&mut self, items: Vec<IndexItem>) -> ExprId {
        self.terminal(Kind::MultiIndex, Payload::Indices(items), Meta::new(Shape::scalar(), Vec::new()))
    }

    /// Wraps an expression in a new [`Kind::Variable`], which can be differentiated against.
    pub fn variable(&mut self, expr: ExprId) -> Result<ExprId, Error> {
        self.add(Kind::Variable, vec![expr])
    }

    /// Builds a [`Kind::Sum`] node.
    pub fn sum(&mut self, terms: Vec<ExprId>) -> Result<ExprId, Error> {
        self.add(Kind::Sum, terms)
    }

    operators! {
        product(a, b) => Product,
        division(numerator, denominator) => Division,
        power(base, exponent) => Power,
        abs(operand) => Abs,
        transposed(operand) => Transposed,
        outer(a, b) => Outer,
        inner(a, b) => Inner,
        dot(a, b) => Dot,
        cross(a, b) => Cross,
        trace(operand) => Trace,
        determinant(operand) => Determinant,
        cofactor(operand) => Cofactor,
        inverse(operand) => Inverse,
        deviatoric(operand) => Deviatoric,
        skew(operand) => Skew,
        sqrt(operand) => Sqrt,
        exp(operand) => Exp,
        ln(operand) => Ln,
        cos(operand) => Cos,
        sin(operand) => Sin,
        eq(a, b) => Eq,
        ne(a, b) => Ne,
        le(a, b) => Le,
        ge(a, b) => Ge,
        lt(a, b) => Lt,
        gt(a, b) => Gt,
        conditional(condition, when_true, when_false) => Conditional,
        variable_derivative(f, variable) => VariableDerivative,
        coefficient_derivative(f, coefficient, direction) => CoefficientDerivative,
    }

    /// Builds `-x`, as the product of `-1` and `x`.
    pub fn neg(&mut self, x: ExprId) -> Result<ExprId, Error> {
        let minus_one = self.int(-1);
        self.product(minus_one, x)
    }

    /// Builds the sign of a scalar: `0` if `x == 0`, `-1` if `x < 0` and `1` otherwise.
    pub fn sign(&mut self, x: ExprId) -> Result<ExprId, Error> {
        let (zero, one, minus_one) = (self.int(0), self.int(1), self.int(-1));
        let is_zero = self.eq(x, zero)?;
        let is_negative = self.lt(x, zero)?;
        let nonzero = self.conditional(is_negative, minus_one, one)?;
        self.conditional(is_zero, zero, nonzero)
    }

    /// Builds the component of a tensor at the given indices.
    pub fn indexed(&mut self, tensor: ExprId, items: Vec<IndexItem>) -> Result<ExprId, Error> {
        let indices = self.multi_index(items);
        self.add(Kind::Indexed, vec![tensor, indices])
    }

    /// Builds the sum of `summand` over every value of `index`.
    pub fn index_sum(&mut self, summand: ExprId, index: Index) -> Result<ExprId, Error> {
        let indices = self.multi_index(vec![IndexItem::Free(index)]);
        self.add(Kind::IndexSum, vec![summand, indices])
    }

    /// Builds a tensor whose components along a new first axis are the given expressions.
    pub fn list_tensor(&mut self, components: Vec<ExprId>) -> Result<ExprId, Error> {
        self.add(Kind::ListTensor, components)
    }

    /// Builds a tensor from a scalar component expression, with one axis per bound index.
    pub fn component_tensor(&mut self, component: ExprId, indices: Vec<Index>) -> Result<ExprId, Error> {
        let indices = self.multi_index(indices.into_iter().map(IndexItem::Free).collect());
        self.add(Kind::ComponentTensor, vec![component, indices])
    }

    /// Builds the restriction of an expression to one side of a facet.
    pub fn restricted(&mut self, operand: ExprId, side: Restriction) -> Result<ExprId, Error> {
        self.add(side.kind(), vec![operand])
    }

    /// Builds the unevaluated derivative of `f` with respect to the spatial coordinates given by
    /// the items, in order.
    pub fn spatial_derivative(&mut self, f: ExprId, items: Vec<IndexItem>) -> Result<ExprId, Error> {
        let indices = self.multi_index(items);
        self.add(Kind::SpatialDerivative, vec![f, indices])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidOperand;
    use pretty_assertions::assert_eq;

    #[test]
    fn fresh_coefficients_are_distinct() {
        let mut arena = Arena::new();
        let element = Element::without_cell("Real", 0);
        let a = arena.coefficient(element.clone());
        let b = arena.coefficient(element.clone());
        assert_ne!(a, b);
        assert_eq!(arena.coefficient_numbered(0, element.clone()), a);

        let c = arena.coefficient(element);
        assert_ne!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn variables_have_distinct_labels() {
        let mut arena = Arena::new();
        let x = arena.float(2.5);
        let (a, b) = (arena.variable(x).unwrap(), arena.variable(x).unwrap());
        assert_ne!(a, b);
        assert_eq!(arena.shape(a), &Shape::scalar());
    }

    #[test]
    fn sign_of_scalar() {
        let mut arena = Arena::new();
        let x = arena.float(-0.5);
        let sign = arena.sign(x).unwrap();
        assert_eq!(arena.kind(sign), Kind::Conditional);
    }

    #[test]
    fn restriction_kinds() {
        let mut arena = Arena::new();
        let cell = Cell::new("triangle", 2, 2, 3);
        let n = arena.facet_normal(cell);
        let plus = arena.restricted(n, Restriction::Positive).unwrap();
        assert_eq!(arena.kind(plus), Kind::PositiveRestricted);
        assert_eq!(arena.shape(plus), &Shape::from([2]));
    }

    #[test]
    fn multi_index_is_not_a_value() {
        let mut arena = Arena::new();
        let i = arena.index(2);
        let indices = arena.multi_index(vec![i.into()]);
        let err = arena.exp(indices).unwrap_err();
        assert_eq!(err.downcast_ref::<InvalidOperand>().map(|kind| kind.found), Some(Kind::MultiIndex));
    }

    #[test]
    fn largest_coefficient_count() {
        let mut arena = Arena::new();
        let element = Element::without_cell("Real", 0);
        let last = arena.coefficient_numbered(u32::MAX, element.clone());
        assert_eq!(arena.coefficient_numbered(u32::MAX, element), last);
    }

    #[test]
    #[should_panic(expected = "NaN")]
    fn nan_float_is_rejected() {
        let mut arena = Arena::new();
        arena.float(f64::NAN);
    }

    #[test]
    fn equal_floats_are_interned_once() {
        let mut arena = Arena::new();
        let (a, b) = (arena.float(0.25), arena.float(0.25));
        assert_eq!(a, b);
        assert_eq!(arena.len(), 1);
    }
}
