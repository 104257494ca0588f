use std::collections::HashSet;
use super::{Arena, ExprId};

/// An iterator that iteratively traverses the distinct nodes reachable from a set of roots in
/// left-to-right post-order (i.e. depth-first). A node shared by several parents is yielded once,
/// before the first parent that uses it.
///
/// This iterator is created by [`Arena::post_order`].
pub struct PostOrder<'a> {
    arena: &'a Arena,

    /// Nodes to visit, paired with whether their operands have already been pushed.
    stack: Vec<(ExprId, bool)>,

    seen: HashSet<ExprId>,
}

impl<'a> PostOrder<'a> {
    pub fn new(arena: &'a Arena, roots: &[ExprId]) -> Self {
        Self {
            arena,
            stack: roots.iter().rev().map(|&root| (root, false)).collect(),
            seen: HashSet::new(),
        }
    }
}

impl Iterator for PostOrder<'_> {
    type Item = ExprId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, expanded)) = self.stack.pop() {
            if expanded {
                return Some(id);
            }
            if !self.seen.insert(id) {
                continue;
            }

            self.stack.push((id, true));
            for &operand in self.arena.operands(id).iter().rev() {
                if !self.seen.contains(&operand) {
                    self.stack.push((operand, false));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use pretty_assertions::assert_eq;

    #[test]
    fn shared_nodes_once() {
        let mut arena = Arena::new();
        let w = arena.coefficient(Element::without_cell("Real", 0));
        let two = arena.int(2);
        let sin = arena.sin(w).unwrap();
        let cos = arena.cos(w).unwrap();
        let quotient = arena.division(sin, cos).unwrap();
        let root = arena.power(quotient, two).unwrap();

        let order = arena.post_order(&[root]).collect::<Vec<_>>();
        assert_eq!(order, vec![w, sin, cos, quotient, two, root]);
    }

    #[test]
    fn deep_tree() {
        let mut arena = Arena::new();
        let mut expr = arena.float(0.5);
        for _ in 0..100_000 {
            expr = arena.exp(expr).unwrap();
        }
        assert_eq!(arena.post_order(&[expr]).count(), 100_001);
    }
}
