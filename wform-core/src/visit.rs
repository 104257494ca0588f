//! Generic traversal of expression trees.
//!
//! There are two kinds of traversal, both post-order (operands are handled before the nodes
//! using them):
//!
//! - A [`Visitor`] reads the tree and accumulates results in its own state.
//! - A [`Transformer`] rebuilds the tree bottom-up. Its handler receives the already-rewritten
//!   operands of each node and returns the node's replacement.
//!
//! Both traversals use an explicit stack, so arbitrarily deep trees can be traversed, and both
//! handle each distinct node once, no matter how many parents share it. For a [`Transformer`],
//! this means every position that refers to a shared node receives the same rewritten result.
//!
//! Every visitor must declare what happens to nodes it has no handler for, through
//! [`Visitor::fallback`] or [`Transformer::fallback`]. There is no implicit default, because a
//! rewrite that silently passes through an operator it does not understand produces wrong results
//! instead of an error.
//!
//! ```
//! use wform_core::element::Element;
//! use wform_core::expr::{Arena, ExprId, Kind};
//! use wform_core::visit::{transform, Fallback, Transformer};
//! use wform_error::Error;
//!
//! /// Replaces `sin` with `cos`.
//! struct SinToCos;
//!
//! impl Transformer for SinToCos {
//!     fn fallback(&self) -> Fallback {
//!         Fallback::Identity
//!     }
//!
//!     fn transform(&mut self, arena: &mut Arena, id: ExprId, operands: &[ExprId]) -> Result<Option<ExprId>, Error> {
//!         match arena.kind(id) {
//!             Kind::Sin => arena.cos(operands[0]).map(Some),
//!             _ => Ok(None),
//!         }
//!     }
//! }
//!
//! let mut arena = Arena::new();
//! let w = arena.coefficient(Element::without_cell("Real", 0));
//! let sin = arena.sin(w).unwrap();
//! let two = arena.int(2);
//! let f = arena.product(two, sin).unwrap();
//!
//! let g = transform(&mut arena, &[f], &mut SinToCos).unwrap()[0];
//! let cos = arena.cos(w).unwrap();
//! assert_eq!(g, arena.product(two, cos).unwrap());
//! ```

use crate::error::UnsupportedNodeKind;
use crate::expr::{Arena, ExprId};
use std::collections::HashMap;
use wform_error::Error;

/// What a traversal does with a node its visitor has no handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Fail with [`UnsupportedNodeKind`].
    Reject,

    /// Leave the node as it is. A [`Visitor`] ignores it, and a [`Transformer`] rebuilds it from
    /// its rewritten operands.
    Identity,
}

/// Whether a [`Visitor`] handled a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Handled,
    Unhandled,
}

/// A read-only traversal that collects data into its own state.
pub trait Visitor {
    /// Declares what to do with nodes [`Visitor::visit`] does not handle.
    fn fallback(&self) -> Fallback;

    /// Handles one node. Operands of the node have already been visited.
    fn visit(&mut self, arena: &Arena, id: ExprId) -> Result<Visit, Error>;

    /// The name used in error messages.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A traversal that rebuilds trees bottom-up.
pub trait Transformer {
    /// Declares what to do with nodes [`Transformer::transform`] does not handle.
    fn fallback(&self) -> Fallback;

    /// Returns the replacement of the node `id`, given the replacements of its operands, or
    /// [`None`] if this transformer has no handler for the node.
    fn transform(
        &mut self,
        arena: &mut Arena,
        id: ExprId,
        operands: &[ExprId],
    ) -> Result<Option<ExprId>, Error>;

    /// The name used in error messages.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

fn unsupported(arena: &Arena, id: ExprId, visitor: &'static str) -> Error {
    let node = arena.get(id);
    Error::new(UnsupportedNodeKind {
        kind: node.kind,
        shape: node.shape.clone(),
        visitor,
    })
}

/// Visits every distinct node reachable from the roots, in post-order.
pub fn visit<V: Visitor + ?Sized>(arena: &Arena, roots: &[ExprId], visitor: &mut V) -> Result<(), Error> {
    for id in arena.post_order(roots) {
        if visitor.visit(arena, id)? == Visit::Unhandled && visitor.fallback() == Fallback::Reject {
            return Err(unsupported(arena, id, visitor.name()));
        }
    }
    Ok(())
}

/// Rewrites the trees rooted at `roots`, returning the replacement of each root.
///
/// The handler is called once per distinct node. Results are cached for the duration of this
/// call only.
pub fn transform<T: Transformer + ?Sized>(
    arena: &mut Arena,
    roots: &[ExprId],
    transformer: &mut T,
) -> Result<Vec<ExprId>, Error> {
    let mut cache: HashMap<ExprId, ExprId> = HashMap::new();
    let mut stack = roots.iter().rev().map(|&root| (root, false)).collect::<Vec<_>>();

    while let Some((id, expanded)) = stack.pop() {
        if cache.contains_key(&id) {
            continue;
        }

        if !expanded {
            stack.push((id, true));
            for &operand in arena.operands(id).iter().rev() {
                if !cache.contains_key(&operand) {
                    stack.push((operand, false));
                }
            }
            continue;
        }

        let operands = arena.operands(id)
            .iter()
            .map(|operand| cache[operand])
            .collect::<Vec<_>>();
        let result = match transformer.transform(arena, id, &operands)? {
            Some(result) => result,
            None => match transformer.fallback() {
                Fallback::Reject => return Err(unsupported(arena, id, transformer.name())),
                Fallback::Identity => arena.rebuild(id, operands)?,
            },
        };
        cache.insert(id, result);
    }

    Ok(roots.iter().map(|root| cache[root]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Cell, Element};
    use crate::expr::Kind;
    use pretty_assertions::assert_eq;

    /// Replaces each coefficient with `2 * w`, counting how often it is called per node.
    #[derive(Default)]
    struct DoubleCoefficients {
        calls: HashMap<ExprId, usize>,
    }

    impl Transformer for DoubleCoefficients {
        fn fallback(&self) -> Fallback {
            Fallback::Identity
        }

        fn transform(&mut self, arena: &mut Arena, id: ExprId, _: &[ExprId]) -> Result<Option<ExprId>, Error> {
            if arena.kind(id) != Kind::Coefficient {
                return Ok(None);
            }
            *self.calls.entry(id).or_default() += 1;
            let two = arena.int(2);
            arena.product(two, id).map(Some)
        }
    }

    /// Handles nothing but arguments and constants.
    struct Strict;

    impl Transformer for Strict {
        fn fallback(&self) -> Fallback {
            Fallback::Reject
        }

        fn transform(&mut self, arena: &mut Arena, id: ExprId, _: &[ExprId]) -> Result<Option<ExprId>, Error> {
            match arena.kind(id) {
                Kind::Argument | Kind::IntValue => Ok(Some(id)),
                _ => Ok(None),
            }
        }
    }

    /// Counts every node it sees.
    struct Counter {
        count: usize,
        fallback: Fallback,
    }

    impl Visitor for Counter {
        fn fallback(&self) -> Fallback {
            self.fallback
        }

        fn visit(&mut self, arena: &Arena, id: ExprId) -> Result<Visit, Error> {
            if arena.kind(id) == Kind::Coefficient {
                return Ok(Visit::Unhandled);
            }
            self.count += 1;
            Ok(Visit::Handled)
        }
    }

    fn element() -> Element {
        Element::new("Lagrange", 1, Cell::new("triangle", 2, 2, 3))
    }

    #[test]
    fn shared_subtree_rewritten_once() {
        let mut arena = Arena::new();
        let w = arena.coefficient(element());
        let (v0, v1) = (arena.argument(0, element()), arena.argument(1, element()));
        let left = arena.product(w, v0).unwrap();
        let right = arena.product(w, v1).unwrap();
        let root = arena.sum(vec![left, right]).unwrap();

        let mut doubler = DoubleCoefficients::default();
        let result = transform(&mut arena, &[root], &mut doubler).unwrap()[0];
        assert_eq!(doubler.calls.get(&w), Some(&1));

        // both terms refer to the same rewritten coefficient
        let two = arena.int(2);
        let doubled = arena.product(two, w).unwrap();
        for &term in arena.operands(result) {
            assert!(arena.operands(term).contains(&doubled));
        }
    }

    #[test]
    fn reject_unhandled() {
        let mut arena = Arena::new();
        let v = arena.argument(0, element());
        let one = arena.int(1);
        let sum = arena.sum(vec![v, one]).unwrap();
        let err = transform(&mut arena, &[sum], &mut Strict).unwrap_err();
        let kind = err.downcast_ref::<UnsupportedNodeKind>().unwrap();
        assert_eq!(kind.kind, Kind::Sum);
        assert!(kind.visitor.ends_with("Strict"));
    }

    #[test]
    fn identity_rebuilds_only_changed_nodes() {
        let mut arena = Arena::new();
        let v = arena.argument(0, element());
        let sin = arena.sin(v).unwrap();
        let result = transform(&mut arena, &[sin], &mut DoubleCoefficients::default()).unwrap();
        assert_eq!(result, vec![sin]);
    }

    #[test]
    fn visitor_fallback() {
        let mut arena = Arena::new();
        let w = arena.coefficient(element());
        let v = arena.argument(0, element());
        let product = arena.product(w, v).unwrap();

        let mut lenient = Counter { count: 0, fallback: Fallback::Identity };
        visit(&arena, &[product], &mut lenient).unwrap();
        assert_eq!(lenient.count, 2);

        let mut strict = Counter { count: 0, fallback: Fallback::Reject };
        let err = visit(&arena, &[product], &mut strict).unwrap_err();
        assert!(err.is::<UnsupportedNodeKind>());
    }

    #[test]
    fn deep_rewrite() {
        let mut arena = Arena::new();
        let w = arena.coefficient(element());
        let mut expr = w;
        for _ in 0..50_000 {
            expr = arena.abs(expr).unwrap();
        }
        let result = transform(&mut arena, &[expr], &mut DoubleCoefficients::default()).unwrap()[0];
        assert_eq!(arena.kind(result), Kind::Abs);
    }
}
