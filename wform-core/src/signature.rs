//! Canonical encodings of expression trees.
//!
//! The [`signature`] of a set of trees is a string that only depends on their mathematical
//! structure. It does not depend on:
//!
//! - the arena the trees live in, or the [`ExprId`]s of their nodes,
//! - the order in which the operands of commutative kinds (sums and products) were given,
//! - the counts of the indices, coefficients and variables in the trees, which are renumbered in
//!   order of first appearance.
//!
//! The encoding lists each distinct node once, in a canonical post-order, as a line referring to
//! its operands by their position in the listing. Shared subtrees therefore do not blow up the
//! size of the signature.
//!
//! The order of commutative operands is decided by a hash that ignores naming. The hash starts
//! from the structure of each subtree, and is then refined with the places each node and each
//! label is used in, until no more nodes can be told apart. Operands that still hash the same are
//! ordered by the lines they would add to the listing, given the names handed out so far.

use crate::element::{Cell, Element};
use crate::expr::{Arena, ExprId, IndexItem, Node, Payload};
use crate::primitive::hash_float;
use rustc_hash::FxHasher;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// How the labels of indices, coefficients and variables are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Naming {
    /// Use the labels as stored.
    Original,

    /// Renumber labels in order of first appearance.
    Canonical,
}

/// A label renamed by [`Naming::Canonical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Label {
    Index(u32),
    Coefficient(u32),
    Variable(u32),
}

/// A place a node is used in.
#[derive(Debug, Clone, Copy)]
enum Context {
    /// Root of the given group.
    Root(usize),

    /// Operand of `parent`. The position is always 0 for commutative parents.
    Operand { parent: ExprId, position: usize },
}

/// The labels written in a node's own line, with the slot they are written in.
fn carried_labels(node: &Node) -> Vec<(Label, usize)> {
    let mut labels = match &node.payload {
        Payload::Coefficient { count, .. } => vec![(Label::Coefficient(*count), 0)],
        Payload::Label(label) => vec![(Label::Variable(*label), 0)],
        Payload::Indices(items) => items
            .iter()
            .enumerate()
            .filter_map(|(slot, item)| match item {
                IndexItem::Free(index) => Some((Label::Index(index.count), slot)),
                IndexItem::Fixed(_) => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    if node.is_terminal() {
        // free indices of a terminal are a set, stored sorted by count
        labels.extend(node.free_indices.iter().map(|index| (Label::Index(index.count), usize::MAX)));
    }
    labels
}

/// The renaming and listing built up while encoding.
#[derive(Debug, Clone, Default)]
struct Listing {
    numbers: HashMap<ExprId, usize>,
    lines: Vec<String>,
    order: HashMap<ExprId, Vec<ExprId>>,
    indices: HashMap<u32, usize>,
    coefficients: HashMap<u32, usize>,
    labels: HashMap<u32, usize>,
}

struct Encoder<'a> {
    arena: &'a Arena,
    naming: Naming,
    hashes: HashMap<ExprId, u64>,
    listing: Listing,
}

/// Returns the name of `key` in `names`, giving it the next free number if it has none.
fn rename(names: &mut HashMap<u32, usize>, key: u32) -> usize {
    let next = names.len();
    *names.entry(key).or_insert(next)
}

fn cell_key(cell: &Cell) -> String {
    format!("{}{}", cell.domain, cell.geometric_dimension)
}

fn element_key(element: &Element) -> String {
    let cell = element.cell.as_ref().map(cell_key).unwrap_or_else(|| "-".to_string());
    let mut key = format!("{}{}:{}:{}", element.family, element.degree, cell, element.value_shape);
    if !element.sub_elements.is_empty() {
        let subs = element.sub_elements.iter().map(element_key).collect::<Vec<_>>();
        key.push_str(&format!("[{}]", subs.join("|")));
    }
    key
}

fn count_distinct(hashes: &HashMap<ExprId, u64>) -> usize {
    let mut values = hashes.values().copied().collect::<Vec<_>>();
    values.sort_unstable();
    values.dedup();
    values.len()
}

impl<'a> Encoder<'a> {
    fn new(arena: &'a Arena, naming: Naming, groups: &[Vec<ExprId>]) -> Self {
        let mut encoder = Self {
            arena,
            naming,
            hashes: HashMap::new(),
            listing: Listing::default(),
        };
        let nodes = arena.post_order(&groups.concat()).collect::<Vec<_>>();
        for &id in &nodes {
            let hash = encoder.structural_hash(id);
            encoder.hashes.insert(id, hash);
        }
        if naming == Naming::Canonical {
            encoder.refine(&nodes, groups);
        }
        encoder
    }

    /// Hashes a node whose operands are already hashed. With [`Naming::Canonical`], labels are
    /// left out of the hash.
    fn structural_hash(&self, id: ExprId) -> u64 {
        let node = self.arena.get(id);
        let canonical = self.naming == Naming::Canonical;
        let mut hasher = FxHasher::default();
        node.kind.hash(&mut hasher);
        node.shape.hash(&mut hasher);

        match &node.payload {
            Payload::None => {},
            Payload::Int(int) => int.hash(&mut hasher),
            Payload::Float(float) => hash_float(float, &mut hasher),
            Payload::Argument { number, element } => {
                number.hash(&mut hasher);
                element.hash(&mut hasher);
            },
            Payload::Coefficient { count, element } => {
                if !canonical {
                    count.hash(&mut hasher);
                }
                element.hash(&mut hasher);
            },
            Payload::Cell(cell) => cell.hash(&mut hasher),
            Payload::Indices(items) => for item in items {
                match item {
                    IndexItem::Fixed(value) => (0u8, *value).hash(&mut hasher),
                    IndexItem::Free(index) if canonical => (1u8, index.dim).hash(&mut hasher),
                    IndexItem::Free(index) => (1u8, index).hash(&mut hasher),
                }
            },
            Payload::Label(label) => if !canonical {
                label.hash(&mut hasher);
            },
        }
        for index in &node.free_indices {
            if canonical {
                index.dim.hash(&mut hasher);
            } else {
                index.hash(&mut hasher);
            }
        }

        let mut operands = node.operands.iter().map(|operand| self.hashes[operand]).collect::<Vec<_>>();
        if node.kind.info().commutative {
            operands.sort_unstable();
        }
        operands.hash(&mut hasher);
        hasher.finish()
    }

    /// Refines the structural hashes with the contexts each node and each label is used in, until
    /// the partition of the nodes into equal hashes stops changing.
    fn refine(&mut self, nodes: &[ExprId], groups: &[Vec<ExprId>]) {
        let mut contexts: HashMap<ExprId, Vec<Context>> = HashMap::new();
        for (group, roots) in groups.iter().enumerate() {
            for &root in roots {
                contexts.entry(root).or_default().push(Context::Root(group));
            }
        }
        for &id in nodes {
            let node = self.arena.get(id);
            let commutative = node.kind.info().commutative;
            for (position, &operand) in node.operands.iter().enumerate() {
                let position = if commutative { 0 } else { position };
                contexts.entry(operand).or_default().push(Context::Operand { parent: id, position });
            }
        }

        let mut classes = count_distinct(&self.hashes);
        for _ in 0..nodes.len() {
            let colors = self.label_colors(nodes);
            let refined = nodes
                .iter()
                .map(|&id| (id, self.refined_hash(id, &contexts, &colors)))
                .collect::<HashMap<_, _>>();
            self.hashes = refined;

            let refined_classes = count_distinct(&self.hashes);
            if refined_classes == classes {
                break;
            }
            classes = refined_classes;
        }
    }

    /// Hashes each label from the hashes of the nodes it is written in.
    fn label_colors(&self, nodes: &[ExprId]) -> HashMap<Label, u64> {
        let mut uses: HashMap<Label, Vec<(u64, usize)>> = HashMap::new();
        for &id in nodes {
            for (label, slot) in carried_labels(self.arena.get(id)) {
                uses.entry(label).or_default().push((self.hashes[&id], slot));
            }
        }
        uses.into_iter()
            .map(|(label, mut uses)| {
                uses.sort_unstable();
                let mut hasher = FxHasher::default();
                uses.hash(&mut hasher);
                (label, hasher.finish())
            })
            .collect()
    }

    fn refined_hash(
        &self,
        id: ExprId,
        contexts: &HashMap<ExprId, Vec<Context>>,
        colors: &HashMap<Label, u64>,
    ) -> u64 {
        let node = self.arena.get(id);
        let mut hasher = FxHasher::default();
        self.hashes[&id].hash(&mut hasher);

        let mut operands = node.operands.iter().map(|operand| self.hashes[operand]).collect::<Vec<_>>();
        if node.kind.info().commutative {
            operands.sort_unstable();
        }
        operands.hash(&mut hasher);

        let mut uses = contexts
            .get(&id)
            .map(|contexts| contexts
                .iter()
                .map(|context| match *context {
                    Context::Root(group) => (0u8, group as u64, 0),
                    Context::Operand { parent, position } => (1u8, self.hashes[&parent], position),
                })
                .collect::<Vec<_>>())
            .unwrap_or_default();
        uses.sort_unstable();
        uses.hash(&mut hasher);

        let mut labels = carried_labels(node)
            .into_iter()
            .map(|(label, slot)| (slot, colors.get(&label).copied().unwrap_or_default()))
            .collect::<Vec<_>>();
        labels.sort_unstable();
        labels.hash(&mut hasher);
        hasher.finish()
    }

    /// Puts `ids` in canonical order: by hash, then by how each would be encoded next.
    fn canonical_order(&mut self, mut ids: Vec<ExprId>) -> Vec<ExprId> {
        ids.sort_by_key(|id| self.hashes[id]);

        let mut start = 0;
        while start < ids.len() {
            let hash = self.hashes[&ids[start]];
            let end = start + ids[start..].iter().take_while(|&id| self.hashes[id] == hash).count();
            if end - start > 1 {
                let mut tied = ids[start..end]
                    .iter()
                    .map(|&id| (self.trial(id), id))
                    .collect::<Vec<_>>();
                tied.sort();
                for (slot, (_, id)) in ids[start..end].iter_mut().zip(tied) {
                    *slot = id;
                }
            }
            start = end;
        }
        ids
    }

    /// The lines that encoding `id` would add to the listing, and its position. The listing is
    /// left unchanged.
    fn trial(&mut self, id: ExprId) -> String {
        let saved = self.listing.clone();
        let number = self.encode(id);
        let added = self.listing.lines[saved.lines.len()..].join(";");
        self.listing = saved;
        format!("{}->#{}", added, number)
    }

    /// The operands of a node in canonical order. The order is decided once, the first time the
    /// node is reached.
    fn ordered_operands(&mut self, id: ExprId) -> Vec<ExprId> {
        if let Some(order) = self.listing.order.get(&id) {
            return order.clone();
        }
        let node = self.arena.get(id);
        let operands = if node.kind.info().commutative {
            self.canonical_order(node.operands.clone())
        } else {
            node.operands.clone()
        };
        self.listing.order.insert(id, operands.clone());
        operands
    }

    fn index_name(&mut self, count: u32) -> usize {
        match self.naming {
            Naming::Original => count as usize,
            Naming::Canonical => rename(&mut self.listing.indices, count),
        }
    }

    fn coefficient_name(&mut self, count: u32) -> usize {
        match self.naming {
            Naming::Original => count as usize,
            Naming::Canonical => rename(&mut self.listing.coefficients, count),
        }
    }

    fn label_name(&mut self, label: u32) -> usize {
        match self.naming {
            Naming::Original => label as usize,
            Naming::Canonical => rename(&mut self.listing.labels, label),
        }
    }

    /// Encodes a node whose operands are already encoded.
    fn line(&mut self, id: ExprId) -> String {
        let node = self.arena.get(id);
        let mut payload = match &node.payload {
            Payload::None => String::new(),
            Payload::Int(int) => int.to_string(),
            Payload::Float(float) => float.to_string_radix(10, None),
            Payload::Argument { number, element } => format!("v{}@{}", number, element_key(element)),
            Payload::Coefficient { count, element } => {
                format!("w{}@{}", self.coefficient_name(*count), element_key(element))
            },
            Payload::Cell(cell) => cell_key(cell),
            Payload::Indices(items) => items
                .iter()
                .map(|item| match item {
                    IndexItem::Fixed(value) => value.to_string(),
                    IndexItem::Free(index) => format!("i{}", self.index_name(index.count)),
                })
                .collect::<Vec<_>>()
                .join(","),
            Payload::Label(label) => format!("l{}", self.label_name(*label)),
        };
        if node.is_terminal() && !node.free_indices.is_empty() {
            let free = node.free_indices
                .iter()
                .map(|index| format!("i{}", self.index_name(index.count)))
                .collect::<Vec<_>>();
            payload.push_str(&format!("[{}]", free.join(",")));
        }

        let operands = self.ordered_operands(id)
            .iter()
            .map(|operand| format!("#{}", self.listing.numbers[operand]))
            .collect::<Vec<_>>();
        format!("{}{}{{{}}}({})", node.kind, node.shape, payload, operands.join(","))
    }

    /// Encodes the tree rooted at `root`, returning the position of the root in the listing.
    fn encode(&mut self, root: ExprId) -> usize {
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if self.listing.numbers.contains_key(&id) {
                continue;
            }
            if expanded {
                let line = self.line(id);
                self.listing.numbers.insert(id, self.listing.lines.len());
                self.listing.lines.push(line);
                continue;
            }

            stack.push((id, true));
            for operand in self.ordered_operands(id).into_iter().rev() {
                if !self.listing.numbers.contains_key(&operand) {
                    stack.push((operand, false));
                }
            }
        }
        self.listing.numbers[&root]
    }

    fn finish(mut self, groups: &[Vec<ExprId>]) -> String {
        let mut markers = Vec::with_capacity(groups.len());
        for roots in groups {
            let roots = self.canonical_order(roots.clone());
            let numbers = roots
                .into_iter()
                .map(|root| format!("#{}", self.encode(root)))
                .collect::<Vec<_>>();
            markers.push(format!("->{}", numbers.join(",")));
        }
        let mut listing = self.listing.lines.join(";");
        for marker in markers {
            listing.push(';');
            listing.push_str(&marker);
        }
        listing
    }
}

/// Computes the signature of the trees rooted at `roots`, which is equal for any two lists of
/// trees that are the same up to the naming of indices, coefficients and variables and the order
/// of commutative operands.
///
/// The roots are encoded in the given order and share one renaming, so a coefficient used in two
/// of the trees has the same name in both.
pub fn signature(arena: &Arena, roots: &[ExprId]) -> String {
    let groups = roots.iter().map(|&root| vec![root]).collect::<Vec<_>>();
    Encoder::new(arena, Naming::Canonical, &groups).finish(&groups)
}

/// Computes the signature of groups of trees, like [`signature`], where the order of the groups
/// matters but the order of the trees within a group does not.
pub fn grouped_signature(arena: &Arena, groups: &[Vec<ExprId>]) -> String {
    Encoder::new(arena, Naming::Canonical, groups).finish(groups)
}

/// Computes the structural encoding of the tree, keeping the names of indices, coefficients and
/// variables as stored.
pub(crate) fn structure(arena: &Arena, root: ExprId) -> String {
    let groups = [vec![root]];
    Encoder::new(arena, Naming::Original, &groups).finish(&groups)
}

/// Returns the hex-encoded SHA-256 digest of a signature, suitable as a cache key.
pub fn digest(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    format!("{:x}", hasher.finalize())
}
