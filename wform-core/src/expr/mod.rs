//! The expression node model.
//!
//! Expressions are stored in an [`Arena`] and addressed by [`ExprId`]. Every node is immutable
//! once built, and nodes are interned: building a node that is identical to an existing one
//! returns the existing [`ExprId`]. Combined with the canonical operand order of commutative
//! kinds, this means that two structurally equal expressions in the same arena always share the
//! same [`ExprId`].
//!
//! Building an operator node checks its operands against the rules of its [`Kind`] and computes
//! its [`Shape`] and free indices. Invalid trees cannot be built.
//!
//! ```
//! use wform_core::element::{Cell, Element};
//! use wform_core::expr::{Arena, Shape};
//!
//! let mut arena = Arena::new();
//! let element = Element::new("Lagrange", 1, Cell::new("triangle", 2, 2, 3));
//! let v = arena.argument(0, element.clone());
//! let w = arena.coefficient(element);
//!
//! let wv = arena.product(w, v).unwrap();
//! let vw = arena.product(v, w).unwrap();
//! assert_eq!(wv, vw);
//! assert_eq!(arena.shape(wv), &Shape::scalar());
//! ```

mod build;
mod index;
mod iter;
mod kind;
mod shape;

pub use index::{Index, IndexItem};
pub use iter::PostOrder;
pub use kind::{Arity, Category, Differentiation, Kind, KindInfo};
pub use shape::Shape;
pub use build::Restriction;
pub(crate) use shape::Meta;

use crate::element::{Cell, Element};
use crate::primitive::hash_float;
use crate::signature;
use rug::{Float, Integer};
use std::{collections::HashMap, fmt, hash::{Hash, Hasher}, sync::Arc};
use wform_error::Error;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A handle to a node stored in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExprId(u32);

impl ExprId {
    /// The position of the node in its arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The data carried by a node in addition to its kind and operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Int(Integer),
    Float(Float),

    /// A basis function placeholder. The number is its position in the form's argument list.
    Argument {
        number: usize,
        element: Arc<Element>,
    },

    /// A field placeholder. The count identifies the coefficient.
    Coefficient {
        count: u32,
        element: Arc<Element>,
    },

    /// The cell of a geometric quantity.
    Cell(Arc<Cell>),

    /// The entries of a multi-index.
    Indices(Vec<IndexItem>),

    /// The label identifying a variable.
    Label(u32),
}

/// Floats stored in a payload are never NaN, see [`Arena::float`].
impl Eq for Payload {}

impl Hash for Payload {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::None => {},
            Self::Int(int) => int.hash(state),
            Self::Float(float) => hash_float(float, state),
            Self::Argument { number, element } => {
                number.hash(state);
                element.hash(state);
            },
            Self::Coefficient { count, element } => {
                count.hash(state);
                element.hash(state);
            },
            Self::Cell(cell) => cell.hash(state),
            Self::Indices(items) => items.hash(state),
            Self::Label(label) => label.hash(state),
        }
    }
}

impl Payload {
    /// The entries of a multi-index. Empty for any other payload.
    pub fn indices(&self) -> &[IndexItem] {
        match self {
            Self::Indices(items) => items,
            _ => &[],
        }
    }

    /// The element of an argument or coefficient.
    pub fn element(&self) -> Option<&Element> {
        match self {
            Self::Argument { element, .. } | Self::Coefficient { element, .. } => Some(element),
            _ => None,
        }
    }

    /// The cell of a geometric quantity.
    pub fn cell(&self) -> Option<&Cell> {
        match self {
            Self::Cell(cell) => Some(cell),
            _ => None,
        }
    }
}

/// A node of an expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub kind: Kind,
    pub operands: Vec<ExprId>,
    pub payload: Payload,
    pub shape: Shape,

    /// The free indices of the node, sorted by count.
    pub free_indices: Vec<Index>,
}

impl Node {
    pub fn is_terminal(&self) -> bool {
        self.kind.info().category.is_terminal()
    }
}

/// Counters used to hand out fresh coefficient counts, index counts and variable labels.
#[derive(Debug, Clone, Default)]
struct Counters {
    coefficient: u32,
    index: u32,
    label: u32,
}

/// Owns the nodes of any number of expression trees.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: Vec<Arc<Node>>,
    lookup: HashMap<Arc<Node>, ExprId>,
    counters: Counters,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of distinct nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id was not created by this arena.
    pub fn get(&self, id: ExprId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> Kind {
        self.get(id).kind
    }

    pub fn shape(&self, id: ExprId) -> &Shape {
        &self.get(id).shape
    }

    pub fn operands(&self, id: ExprId) -> &[ExprId] {
        &self.get(id).operands
    }

    /// Returns a handle to the expression, which compares structurally.
    pub fn expr(&self, id: ExprId) -> Expr<'_> {
        Expr { arena: self, id }
    }

    /// Iterates over the distinct nodes reachable from the roots, in post-order.
    pub fn post_order(&self, roots: &[ExprId]) -> PostOrder<'_> {
        PostOrder::new(self, roots)
    }

    /// Stores the node, or returns the id of an identical node already stored.
    fn intern(&mut self, node: Node) -> ExprId {
        if let Some(&id) = self.lookup.get(&node) {
            return id;
        }
        let id = ExprId(self.nodes.len() as u32);
        let node = Arc::new(node);
        self.nodes.push(Arc::clone(&node));
        self.lookup.insert(node, id);
        id
    }

    /// Builds an operator node of the given kind.
    ///
    /// Nested sums are flattened into one, and the operands of commutative kinds are put in a
    /// canonical order. A [`Kind::Variable`] node gets a fresh label.
    pub fn add(&mut self, kind: Kind, operands: Vec<ExprId>) -> Result<ExprId, Error> {
        let payload = match kind {
            Kind::Variable => Payload::Label(self.fresh_label()),
            _ => Payload::None,
        };
        self.add_with_payload(kind, operands, payload)
    }

    fn add_with_payload(
        &mut self,
        kind: Kind,
        mut operands: Vec<ExprId>,
        payload: Payload,
    ) -> Result<ExprId, Error> {
        if kind == Kind::Sum {
            operands = operands
                .into_iter()
                .flat_map(|id| {
                    let node = self.get(id);
                    if node.kind == Kind::Sum {
                        node.operands.clone()
                    } else {
                        vec![id]
                    }
                })
                .collect();
        }
        if kind.info().commutative {
            operands.sort_unstable();
        }

        let meta = shape::infer(self, kind, &operands)?;
        Ok(self.intern(Node {
            kind,
            operands,
            payload,
            shape: meta.shape,
            free_indices: meta.free_indices,
        }))
    }

    /// Stores a terminal node.
    fn terminal(&mut self, kind: Kind, payload: Payload, meta: Meta) -> ExprId {
        self.intern(Node {
            kind,
            operands: Vec::new(),
            payload,
            shape: meta.shape,
            free_indices: meta.free_indices,
        })
    }

    /// Builds a node with the kind and payload of `id`, but with new operands. Returns `id` itself
    /// if the operands are unchanged.
    pub fn rebuild(&mut self, id: ExprId, operands: Vec<ExprId>) -> Result<ExprId, Error> {
        let node = self.get(id);
        if node.operands == operands {
            return Ok(id);
        }
        let (kind, payload) = (node.kind, node.payload.clone());
        self.add_with_payload(kind, operands, payload)
    }

    /// Returns true if the two expressions are structurally equal: same kind, shape and payload,
    /// and equal operands, ignoring the order of the operands of commutative kinds.
    ///
    /// The expressions may live in different arenas.
    pub fn structurally_equal(&self, a: ExprId, other: &Arena, b: ExprId) -> bool {
        if std::ptr::eq(self, other) {
            return a == b;
        }
        signature::structure(self, a) == signature::structure(other, b)
    }
}

/// A borrowed expression. Two handles compare equal if their expressions are structurally
/// equal, even if they come from different arenas.
#[derive(Clone, Copy)]
pub struct Expr<'a> {
    arena: &'a Arena,
    id: ExprId,
}

impl<'a> Expr<'a> {
    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn node(&self) -> &'a Node {
        self.arena.get(self.id)
    }

    pub fn kind(&self) -> Kind {
        self.node().kind
    }

    pub fn shape(&self) -> &'a Shape {
        &self.node().shape
    }

    /// Returns handles to the operands of this expression.
    pub fn operands(&self) -> impl Iterator<Item = Expr<'a>> + 'a {
        let arena = self.arena;
        self.node().operands.iter().map(move |&id| Expr { arena, id })
    }
}

impl PartialEq for Expr<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.arena.structurally_equal(self.id, other.arena, other.id)
    }
}

impl Eq for Expr<'_> {}

impl fmt::Debug for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", signature::structure(self.arena, self.id))
    }
}
