//! Descriptions of the cells and finite elements that arguments and coefficients live on.
//!
//! These are plain data supplied by the caller. Tabulating basis functions, or looking up the
//! dimensions of a cell by name, is not done here.

use crate::expr::Shape;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A reference cell, such as a triangle or a tetrahedron.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cell {
    /// The name of the cell, e.g. `"triangle"`.
    pub domain: String,

    /// The dimension of the space the cell is embedded in.
    pub geometric_dimension: usize,

    /// The dimension of the cell itself.
    pub topological_dimension: usize,

    /// The number of facets of the cell.
    pub num_facets: usize,
}

impl Cell {
    /// Creates a new cell.
    pub fn new(
        domain: impl Into<String>,
        geometric_dimension: usize,
        topological_dimension: usize,
        num_facets: usize,
    ) -> Self {
        Self {
            domain: domain.into(),
            geometric_dimension,
            topological_dimension,
            num_facets,
        }
    }
}

/// A finite element: a function space family and degree on a cell, with the shape of the values
/// its functions take.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Element {
    /// The name of the family, e.g. `"Lagrange"`.
    pub family: String,

    /// The polynomial degree.
    pub degree: u32,

    /// The cell the element is defined on, if any.
    pub cell: Option<Cell>,

    /// The shape of a function value.
    pub value_shape: Shape,

    /// The elements this element is built from. Empty for scalar elements.
    pub sub_elements: Vec<Element>,
}

impl Element {
    /// Creates a scalar-valued element on the given cell.
    pub fn new(family: impl Into<String>, degree: u32, cell: Cell) -> Self {
        Self {
            family: family.into(),
            degree,
            cell: Some(cell),
            value_shape: Shape::scalar(),
            sub_elements: Vec::new(),
        }
    }

    /// Creates a scalar-valued element that is not attached to any cell.
    pub fn without_cell(family: impl Into<String>, degree: u32) -> Self {
        Self {
            family: family.into(),
            degree,
            cell: None,
            value_shape: Shape::scalar(),
            sub_elements: Vec::new(),
        }
    }

    /// Creates a vector-valued element with one scalar component per geometric dimension of the
    /// cell.
    pub fn vector(family: impl Into<String>, degree: u32, cell: Cell) -> Self {
        let dim = cell.geometric_dimension;
        let scalar = Self::new(family, degree, cell);
        Self {
            family: scalar.family.clone(),
            degree,
            cell: scalar.cell.clone(),
            value_shape: Shape::from([dim]),
            sub_elements: vec![scalar; dim],
        }
    }

    /// Creates a tensor-valued element with `dim * dim` scalar components, where `dim` is the
    /// geometric dimension of the cell.
    pub fn tensor(family: impl Into<String>, degree: u32, cell: Cell) -> Self {
        let dim = cell.geometric_dimension;
        let scalar = Self::new(family, degree, cell);
        Self {
            family: scalar.family.clone(),
            degree,
            cell: scalar.cell.clone(),
            value_shape: Shape::from([dim, dim]),
            sub_elements: vec![scalar; dim * dim],
        }
    }

    /// Combines elements into a mixed element. Its values are the flattened values of each
    /// sub-element, concatenated. The mixed element lives on the first cell among its
    /// sub-elements.
    pub fn mixed(elements: Vec<Element>) -> Self {
        let degree = elements.iter().map(|e| e.degree).max().unwrap_or(0);
        let cell = elements.iter().find_map(|e| e.cell.clone());
        let size = elements.iter().map(Element::value_size).sum::<usize>();
        Self {
            family: "Mixed".to_string(),
            degree,
            cell,
            value_shape: Shape::from([size]),
            sub_elements: elements,
        }
    }

    /// The number of scalar components of a function value.
    pub fn value_size(&self) -> usize {
        self.value_shape.dims().iter().product()
    }
}
