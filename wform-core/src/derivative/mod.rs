//! Symbolic differentiation of expression trees.
//!
//! Differentiation happens in three layers:
//!
//! - [`partials`] gives, for one node, the partial derivative of the node with respect to each of
//!   its operands. This is the table of differentiation rules, one per kind.
//! - [`differentiate`] walks a tree bottom-up and combines the derivatives of the operands of each
//!   node with the chain rule, giving the derivative of the whole tree with respect to a
//!   variable, a coefficient (in a given direction), or a spatial coordinate.
//! - [`expand_derivatives`] finds the unevaluated derivative requests in a tree and replaces each
//!   of them with the derivative it asks for.
//!
//! [`partials`] must never see a derivative request; run [`expand_derivatives`] first.

mod expand;
mod forward;
mod partials;

pub use expand::expand_derivatives;
pub use forward::{differentiate, Wrt};
pub use partials::{partials, Partial};

use crate::expr::{Arena, ExprId, Kind, Payload};
use wform_error::Error;

/// Returns `true` if the given expression is "clearly" zero. This is intended to keep
/// derivatives small and is not mathematically rigorous.
pub(crate) fn is_trivially_zero(arena: &Arena, id: ExprId) -> bool {
    let node = arena.get(id);
    match (&node.kind, &node.payload) {
        (Kind::Zero, _) => true,
        (Kind::IntValue, Payload::Int(int)) => int.is_zero(),
        (Kind::FloatValue, Payload::Float(float)) => float.is_zero(),
        (Kind::Sum, _) => node.operands.iter().all(|&term| arena.kind(term) == Kind::Zero),
        (Kind::Product, _) => node.operands.iter().any(|&factor| arena.kind(factor) == Kind::Zero),
        _ => false,
    }
}

/// Returns `true` if the given expression is "clearly" one.
fn is_trivially_unity(arena: &Arena, id: ExprId) -> bool {
    match &arena.get(id).payload {
        Payload::Int(int) => *int == 1,
        Payload::Float(float) => *float == 1,
        _ => false,
    }
}

/// Helper struct to build a product of expressions while applying basic simplification rules.
/// Factors of one are skipped, and if any factor is zero, the product is zero.
#[derive(Default)]
struct MultBuilder {
    factors: Vec<ExprId>,
    zero: bool,
}

impl MultBuilder {
    fn mult(&mut self, arena: &Arena, e: ExprId) {
        if self.zero {
            return;
        }
        if is_trivially_zero(arena, e) {
            self.zero = true;
            self.factors.clear();
            return;
        }
        if !is_trivially_unity(arena, e) {
            self.factors.push(e);
        }
    }

    /// Builds the product, or returns [`None`] if it is zero.
    fn build(self, arena: &mut Arena) -> Result<Option<ExprId>, Error> {
        if self.zero {
            return Ok(None);
        }
        let mut factors = self.factors.into_iter();
        let Some(first) = factors.next() else {
            return Ok(Some(arena.int(1)));
        };
        factors
            .try_fold(first, |product, factor| arena.product(product, factor))
            .map(Some)
    }
}

/// Helper struct to build a summation of expressions while applying basic simplification rules.
/// Only non-zero expressions are added to the sum.
#[derive(Default)]
struct SumBuilder(Vec<ExprId>);

impl SumBuilder {
    fn add(&mut self, arena: &Arena, e: ExprId) {
        if !is_trivially_zero(arena, e) {
            self.0.push(e);
        }
    }

    /// Builds the sum, or returns [`None`] if it is zero.
    fn build(self, arena: &mut Arena) -> Result<Option<ExprId>, Error> {
        match self.0.len() {
            0 => Ok(None),
            1 => Ok(Some(self.0[0])),
            _ => arena.sum(self.0).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use pretty_assertions::assert_eq;

    #[test]
    fn mult_builder_folds() {
        let mut arena = Arena::new();
        let w = arena.coefficient(Element::without_cell("Real", 0));
        let (zero, one) = (arena.int(0), arena.float(1.0));

        let mut product = MultBuilder::default();
        product.mult(&arena, one);
        product.mult(&arena, w);
        assert_eq!(product.build(&mut arena).unwrap(), Some(w));

        let mut product = MultBuilder::default();
        product.mult(&arena, w);
        product.mult(&arena, zero);
        product.mult(&arena, w);
        assert_eq!(product.build(&mut arena).unwrap(), None);

        assert_eq!(MultBuilder::default().build(&mut arena).unwrap(), Some(arena.int(1)));
    }

    #[test]
    fn sum_builder_skips_zeros() {
        let mut arena = Arena::new();
        let w = arena.coefficient(Element::without_cell("Real", 0));
        let zero = arena.zero(crate::expr::Shape::scalar());

        let mut sum = SumBuilder::default();
        sum.add(&arena, zero);
        assert_eq!(SumBuilder::default().build(&mut arena).unwrap(), None);
        sum.add(&arena, w);
        assert_eq!(sum.build(&mut arena).unwrap(), Some(w));
    }
}
