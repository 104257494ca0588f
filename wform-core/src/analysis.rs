//! Queries that collect data from expression trees.

use crate::element::{Cell, Element};
use crate::expr::{Arena, ExprId, Kind, Payload};
use crate::visit::{visit, Fallback, Visit, Visitor};
use std::collections::{BTreeSet, HashMap};
use wform_error::Error;

/// Collects every node of the given kinds.
struct KindCollector {
    kinds: &'static [Kind],
    found: Vec<ExprId>,
}

impl KindCollector {
    fn collect(arena: &Arena, roots: &[ExprId], kinds: &'static [Kind]) -> Result<Vec<ExprId>, Error> {
        let mut collector = Self { kinds, found: Vec::new() };
        visit(arena, roots, &mut collector)?;
        Ok(collector.found)
    }
}

impl Visitor for KindCollector {
    fn fallback(&self) -> Fallback {
        Fallback::Identity
    }

    fn visit(&mut self, arena: &Arena, id: ExprId) -> Result<Visit, Error> {
        if !self.kinds.contains(&arena.kind(id)) {
            return Ok(Visit::Unhandled);
        }
        self.found.push(id);
        Ok(Visit::Handled)
    }
}

/// Returns the distinct arguments in the trees, sorted by their number.
pub fn extract_arguments(arena: &Arena, roots: &[ExprId]) -> Result<Vec<ExprId>, Error> {
    let mut arguments = KindCollector::collect(arena, roots, &[Kind::Argument])?;
    arguments.sort_by_key(|&id| match arena.get(id).payload {
        Payload::Argument { number, .. } => (number, id),
        _ => (usize::MAX, id),
    });
    Ok(arguments)
}

/// Returns the distinct coefficients in the trees, sorted by their count.
pub fn extract_coefficients(arena: &Arena, roots: &[ExprId]) -> Result<Vec<ExprId>, Error> {
    let mut coefficients = KindCollector::collect(arena, roots, &[Kind::Coefficient])?;
    coefficients.sort_by_key(|&id| match arena.get(id).payload {
        Payload::Coefficient { count, .. } => (count, id),
        _ => (u32::MAX, id),
    });
    Ok(coefficients)
}

/// Returns the distinct variables in the trees, sorted by their label.
pub fn extract_variables(arena: &Arena, roots: &[ExprId]) -> Result<Vec<ExprId>, Error> {
    let mut variables = KindCollector::collect(arena, roots, &[Kind::Variable])?;
    variables.sort_by_key(|&id| match arena.get(id).payload {
        Payload::Label(label) => (label, id),
        _ => (u32::MAX, id),
    });
    Ok(variables)
}

/// Returns the distinct elements of the arguments and coefficients in the trees, in sorted order.
pub fn extract_elements(arena: &Arena, roots: &[ExprId]) -> Result<Vec<Element>, Error> {
    let elements = KindCollector::collect(arena, roots, &[Kind::Argument, Kind::Coefficient])?
        .into_iter()
        .filter_map(|id| arena.get(id).payload.element().cloned())
        .collect::<BTreeSet<_>>();
    Ok(elements.into_iter().collect())
}

/// Returns the distinct cells of the geometric quantities in the trees, in sorted order.
pub fn extract_cells(arena: &Arena, roots: &[ExprId]) -> Result<Vec<Cell>, Error> {
    let cells = KindCollector::collect(arena, roots, &[Kind::SpatialCoordinate, Kind::FacetNormal])?
        .into_iter()
        .filter_map(|id| arena.get(id).payload.cell().cloned())
        .collect::<BTreeSet<_>>();
    Ok(cells.into_iter().collect())
}

/// Returns the nodes of the tree that are referenced by more than one operand position, in
/// post-order. These are the subtrees that a tree without sharing would store more than once.
pub fn duplications(arena: &Arena, root: ExprId) -> Vec<ExprId> {
    let order = arena.post_order(&[root]).collect::<Vec<_>>();
    let mut references: HashMap<ExprId, usize> = HashMap::new();
    for &id in &order {
        for &operand in arena.operands(id) {
            *references.entry(operand).or_default() += 1;
        }
    }
    order
        .into_iter()
        .filter(|id| references.get(id).is_some_and(|&count| count > 1))
        .collect()
}

/// Counts the nodes of the tree as if no subtree were shared, so a subtree used twice is counted
/// twice. Saturates at [`usize::MAX`].
pub fn count_nodes(arena: &Arena, root: ExprId) -> usize {
    let mut sizes: HashMap<ExprId, usize> = HashMap::new();
    for id in arena.post_order(&[root]) {
        let size = arena.operands(id)
            .iter()
            .fold(1usize, |total, operand| total.saturating_add(sizes[operand]));
        sizes.insert(id, size);
    }
    sizes[&root]
}
