use std::fmt;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A free index label used in tensor index notation.
///
/// Two indices are the same label if their counts are equal. The count is assigned by
/// [`Arena::index`](super::Arena::index), and the dimension is the size of the axes the index
/// ranges over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Index {
    pub count: u32,
    pub dim: usize,
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.count)
    }
}

/// One entry of a multi-index: either a fixed component or a free index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IndexItem {
    Fixed(usize),
    Free(Index),
}

impl IndexItem {
    /// Returns the free index, if this item is one.
    pub fn free(&self) -> Option<Index> {
        match self {
            Self::Fixed(_) => None,
            Self::Free(index) => Some(*index),
        }
    }
}

impl From<Index> for IndexItem {
    fn from(index: Index) -> Self {
        Self::Free(index)
    }
}

impl From<usize> for IndexItem {
    fn from(value: usize) -> Self {
        Self::Fixed(value)
    }
}

impl fmt::Display for IndexItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => write!(f, "{}", value),
            Self::Free(index) => write!(f, "{}", index),
        }
    }
}

/// Inserts `index` into a list of indices sorted by count, returning false if it is already
/// present.
pub(crate) fn insert_sorted(indices: &mut Vec<Index>, index: Index) -> bool {
    match indices.binary_search(&index) {
        Ok(_) => false,
        Err(position) => {
            indices.insert(position, index);
            true
        },
    }
}

/// Merges two sorted index lists. Returns [`None`] if an index is present in both.
pub(crate) fn merge_disjoint(a: &[Index], b: &[Index]) -> Option<Vec<Index>> {
    let mut merged = a.to_vec();
    for &index in b {
        if !insert_sorted(&mut merged, index) {
            return None;
        }
    }
    Some(merged)
}

/// Splits two sorted index lists into the indices present in exactly one of them, and the
/// indices present in both.
pub(crate) fn contract(a: &[Index], b: &[Index]) -> (Vec<Index>, Vec<Index>) {
    let mut free = Vec::new();
    let mut repeated = Vec::new();
    for &index in a {
        if b.contains(&index) {
            repeated.push(index);
        } else {
            free.push(index);
        }
    }
    for &index in b {
        if !a.contains(&index) {
            free.push(index);
        }
    }
    free.sort();
    (free, repeated)
}

/// Removes the given indices from a sorted index list.
pub(crate) fn remove(indices: &[Index], removed: &[Index]) -> Vec<Index> {
    indices.iter().copied().filter(|index| !removed.contains(index)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i(count: u32) -> Index {
        Index { count, dim: 3 }
    }

    #[test]
    fn contraction() {
        let (free, repeated) = contract(&[i(0), i(2)], &[i(1), i(2)]);
        assert_eq!(free, vec![i(0), i(1)]);
        assert_eq!(repeated, vec![i(2)]);
    }

    #[test]
    fn disjoint_merge() {
        assert_eq!(merge_disjoint(&[i(3)], &[i(1)]), Some(vec![i(1), i(3)]));
        assert_eq!(merge_disjoint(&[i(1)], &[i(1)]), None);
    }
}
