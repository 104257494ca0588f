//! Integrals and forms, and the data extracted from them.
//!
//! A [`Form`] is a sum of [`Integral`]s. Before any data is extracted from it, a form is
//! [`preprocess`]ed into a [`PreprocessedForm`], which cannot be changed anymore. [`FormData`] is
//! then computed from the preprocessed form.
//!
//! ```
//! use wform_core::element::{Cell, Element};
//! use wform_core::expr::Arena;
//! use wform_core::form::{Form, FormData, FormDataOptions, Integral, IntegralType};
//!
//! let mut arena = Arena::new();
//! let element = Element::new("Lagrange", 1, Cell::new("triangle", 2, 2, 3));
//! let v = arena.argument(0, element.clone());
//! let u = arena.argument(1, element);
//! let uv = arena.product(u, v).unwrap();
//!
//! let mass = Form::from(Integral::new(&arena, uv, IntegralType::Cell, 0).unwrap());
//! let data = FormData::from_form(&mut arena, mass, &FormDataOptions::default(), &mut ()).unwrap();
//! assert_eq!(data.rank, 2);
//! assert_eq!(data.geometric_dimension, Some(2));
//! ```

mod data;
mod preprocess;

pub use data::{FormData, FormDataOptions, IntegralData};
pub use preprocess::{preprocess, PreprocessedForm};

use crate::error::ShapeMismatch;
use crate::expr::{Arena, ExprId};
use std::{fmt, ops::Add};
use wform_error::Error;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of domain an integral is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegralType {
    /// The interior of each cell.
    Cell,

    /// The facets on the boundary of the domain.
    ExteriorFacet,

    /// The facets shared by two cells.
    InteriorFacet,

    /// Patches of neighboring cells.
    MacroCell,

    /// A custom surface.
    Surface,
}

impl IntegralType {
    /// Every integral type.
    pub const ALL: [IntegralType; 5] = [
        IntegralType::Cell,
        IntegralType::ExteriorFacet,
        IntegralType::InteriorFacet,
        IntegralType::MacroCell,
        IntegralType::Surface,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Cell => "cell",
            Self::ExteriorFacet => "exterior_facet",
            Self::InteriorFacet => "interior_facet",
            Self::MacroCell => "macro_cell",
            Self::Surface => "surface",
        }
    }
}

impl fmt::Display for IntegralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A scalar integrand, integrated over one sub-domain of one kind of domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Integral {
    integrand: ExprId,
    integral_type: IntegralType,
    domain_id: usize,
}

impl Integral {
    /// Creates an integral. The integrand must be a scalar without free indices.
    pub fn new(
        arena: &Arena,
        integrand: ExprId,
        integral_type: IntegralType,
        domain_id: usize,
    ) -> Result<Self, Error> {
        let node = arena.get(integrand);
        if !node.shape.is_scalar() || !node.free_indices.is_empty() {
            return Err(Error::new(ShapeMismatch {
                kind: node.kind,
                shapes: vec![node.shape.clone()],
                reason: "an integrand must be a scalar without free indices".to_string(),
            }));
        }
        Ok(Self { integrand, integral_type, domain_id })
    }

    pub fn integrand(&self) -> ExprId {
        self.integrand
    }

    pub fn integral_type(&self) -> IntegralType {
        self.integral_type
    }

    /// The number of the sub-domain the integral is taken over.
    pub fn domain_id(&self) -> usize {
        self.domain_id
    }

    /// Returns the same integral, with a different integrand.
    pub fn with_integrand(&self, arena: &Arena, integrand: ExprId) -> Result<Self, Error> {
        Self::new(arena, integrand, self.integral_type, self.domain_id)
    }
}

/// A sum of integrals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    integrals: Vec<Integral>,
}

impl Form {
    /// Creates a form from its integrals.
    pub fn new(integrals: Vec<Integral>) -> Self {
        Self { integrals }
    }

    pub fn integrals(&self) -> &[Integral] {
        &self.integrals
    }

    pub fn is_empty(&self) -> bool {
        self.integrals.is_empty()
    }

    /// Adds an integral to the form.
    pub fn push(&mut self, integral: Integral) {
        self.integrals.push(integral);
    }

    /// Multiplies every integrand by a scalar factor.
    pub fn scaled(self, arena: &mut Arena, factor: ExprId) -> Result<Self, Error> {
        let integrals = self.integrals
            .into_iter()
            .map(|integral| {
                let integrand = arena.product(factor, integral.integrand)?;
                integral.with_integrand(arena, integrand)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { integrals })
    }
}

impl From<Integral> for Form {
    fn from(integral: Integral) -> Self {
        Self { integrals: vec![integral] }
    }
}

impl Add for Form {
    type Output = Form;

    fn add(mut self, rhs: Form) -> Self::Output {
        self.integrals.extend(rhs.integrals);
        self
    }
}
