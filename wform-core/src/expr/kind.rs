//! The closed set of node kinds, and the registry of their metadata.
//!
//! Every property of a kind is a pure function of the kind, computed by an exhaustive `match`.
//! The [`KindInfo`] table collecting them is built once, on first use, and never changes.

use crate::error::UnknownKind;
use levenshtein::levenshtein;
use once_cell::sync::Lazy;
use std::{collections::HashMap, fmt};
use wform_error::Error;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Kind {
    Zero,
    IntValue,
    FloatValue,
    Identity,
    Argument,
    Coefficient,
    SpatialCoordinate,
    FacetNormal,
    MultiIndex,

    Sum,
    Product,
    Division,
    Power,
    Abs,

    Transposed,
    Outer,
    Inner,
    Dot,
    Cross,
    Trace,
    Determinant,
    Cofactor,
    Inverse,
    Deviatoric,
    Skew,

    Sqrt,
    Exp,
    Ln,
    Cos,
    Sin,

    Indexed,
    IndexSum,
    ListTensor,
    ComponentTensor,

    PositiveRestricted,
    NegativeRestricted,

    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Conditional,

    SpatialDerivative,
    VariableDerivative,
    CoefficientDerivative,

    Variable,
}

/// The number of operands a kind accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    /// Returns true if `count` operands are accepted.
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n,
            Self::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "exactly {}", n),
            Self::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// The family a kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Numbers, zero and the identity matrix.
    Constant,

    /// Arguments and coefficients.
    FormArgument,

    /// Quantities of the cell geometry.
    Geometry,

    /// Index labels. These are operands of indexing nodes, not values.
    Index,

    Algebra,
    TensorAlgebra,
    MathFunction,
    Indexing,
    Restriction,

    /// Boolean-valued comparisons. These are only valid as the condition of a conditional.
    Condition,

    Conditional,

    /// Unevaluated derivative requests.
    Derivative,

    Variable,
}

impl Category {
    /// Returns true for categories whose nodes have no operands.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Constant | Self::FormArgument | Self::Geometry | Self::Index)
    }
}

/// How a kind takes part in differentiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Differentiation {
    /// A leaf, whose derivative depends only on what is being differentiated with respect to.
    Terminal,

    /// Linear in its operands, so the derivative is the same operator applied to the operand
    /// derivatives.
    Linear,

    /// Differentiated through the chain rule, using the partial derivatives of the kind.
    Partials,

    /// An unevaluated derivative request, which must be expanded before differentiating.
    Request,

    /// Not a value, so it has no derivative.
    Inert,
}

/// Metadata describing a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindInfo {
    pub kind: Kind,

    /// The snake_case name of the kind, also used as the name of its handler.
    pub name: &'static str,

    pub arity: Arity,
    pub category: Category,

    /// Whether the order of the operands is irrelevant.
    pub commutative: bool,

    pub differentiation: Differentiation,
}

impl KindInfo {
    fn compute(kind: Kind) -> Self {
        Self {
            kind,
            name: kind.compute_name(),
            arity: kind.compute_arity(),
            category: kind.compute_category(),
            commutative: matches!(kind, Kind::Sum | Kind::Product),
            differentiation: kind.compute_differentiation(),
        }
    }
}

/// The table of [`KindInfo`] for every kind, along with a name lookup.
struct Registry {
    infos: Vec<KindInfo>,
    by_name: HashMap<&'static str, Kind>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let infos = Kind::ALL.iter().map(|&kind| KindInfo::compute(kind)).collect::<Vec<_>>();
    let by_name = infos.iter().map(|info| (info.name, info.kind)).collect();
    Registry { infos, by_name }
});

impl Kind {
    /// Every kind, in declaration order.
    pub const ALL: &'static [Kind] = &[
        Kind::Zero,
        Kind::IntValue,
        Kind::FloatValue,
        Kind::Identity,
        Kind::Argument,
        Kind::Coefficient,
        Kind::SpatialCoordinate,
        Kind::FacetNormal,
        Kind::MultiIndex,
        Kind::Sum,
        Kind::Product,
        Kind::Division,
        Kind::Power,
        Kind::Abs,
        Kind::Transposed,
        Kind::Outer,
        Kind::Inner,
        Kind::Dot,
        Kind::Cross,
        Kind::Trace,
        Kind::Determinant,
        Kind::Cofactor,
        Kind::Inverse,
        Kind::Deviatoric,
        Kind::Skew,
        Kind::Sqrt,
        Kind::Exp,
        Kind::Ln,
        Kind::Cos,
        Kind::Sin,
        Kind::Indexed,
        Kind::IndexSum,
        Kind::ListTensor,
        Kind::ComponentTensor,
        Kind::PositiveRestricted,
        Kind::NegativeRestricted,
        Kind::Eq,
        Kind::Ne,
        Kind::Le,
        Kind::Ge,
        Kind::Lt,
        Kind::Gt,
        Kind::Conditional,
        Kind::SpatialDerivative,
        Kind::VariableDerivative,
        Kind::CoefficientDerivative,
        Kind::Variable,
    ];

    /// Returns the metadata of this kind.
    pub fn info(self) -> &'static KindInfo {
        &REGISTRY.infos[self as usize]
    }

    /// The snake_case name of this kind.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Looks up a kind by its snake_case name.
    pub fn from_name(name: &str) -> Result<Kind, Error> {
        if let Some(&kind) = REGISTRY.by_name.get(name) {
            return Ok(kind);
        }

        let mut suggestions = REGISTRY.infos
            .iter()
            .map(|info| info.name)
            .filter(|candidate| levenshtein(candidate, name) <= 2)
            .collect::<Vec<_>>();
        suggestions.sort_unstable();
        Err(Error::new(UnknownKind { name: name.to_string(), suggestions }))
    }

    fn compute_name(self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::IntValue => "int_value",
            Self::FloatValue => "float_value",
            Self::Identity => "identity",
            Self::Argument => "argument",
            Self::Coefficient => "coefficient",
            Self::SpatialCoordinate => "spatial_coordinate",
            Self::FacetNormal => "facet_normal",
            Self::MultiIndex => "multi_index",
            Self::Sum => "sum",
            Self::Product => "product",
            Self::Division => "division",
            Self::Power => "power",
            Self::Abs => "abs",
            Self::Transposed => "transposed",
            Self::Outer => "outer",
            Self::Inner => "inner",
            Self::Dot => "dot",
            Self::Cross => "cross",
            Self::Trace => "trace",
            Self::Determinant => "determinant",
            Self::Cofactor => "cofactor",
            Self::Inverse => "inverse",
            Self::Deviatoric => "deviatoric",
            Self::Skew => "skew",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Cos => "cos",
            Self::Sin => "sin",
            Self::Indexed => "indexed",
            Self::IndexSum => "index_sum",
            Self::ListTensor => "list_tensor",
            Self::ComponentTensor => "component_tensor",
            Self::PositiveRestricted => "positive_restricted",
            Self::NegativeRestricted => "negative_restricted",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Le => "le",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Conditional => "conditional",
            Self::SpatialDerivative => "spatial_derivative",
            Self::VariableDerivative => "variable_derivative",
            Self::CoefficientDerivative => "coefficient_derivative",
            Self::Variable => "variable",
        }
    }

    fn compute_arity(self) -> Arity {
        match self {
            Self::Zero
                | Self::IntValue
                | Self::FloatValue
                | Self::Identity
                | Self::Argument
                | Self::Coefficient
                | Self::SpatialCoordinate
                | Self::FacetNormal
                | Self::MultiIndex => Arity::Exact(0),
            Self::Sum => Arity::AtLeast(2),
            Self::ListTensor => Arity::AtLeast(1),
            Self::Abs
                | Self::Transposed
                | Self::Trace
                | Self::Determinant
                | Self::Cofactor
                | Self::Inverse
                | Self::Deviatoric
                | Self::Skew
                | Self::Sqrt
                | Self::Exp
                | Self::Ln
                | Self::Cos
                | Self::Sin
                | Self::PositiveRestricted
                | Self::NegativeRestricted
                | Self::Variable => Arity::Exact(1),
            Self::Product
                | Self::Division
                | Self::Power
                | Self::Outer
                | Self::Inner
                | Self::Dot
                | Self::Cross
                | Self::Indexed
                | Self::IndexSum
                | Self::ComponentTensor
                | Self::Eq
                | Self::Ne
                | Self::Le
                | Self::Ge
                | Self::Lt
                | Self::Gt
                | Self::SpatialDerivative
                | Self::VariableDerivative => Arity::Exact(2),
            Self::Conditional | Self::CoefficientDerivative => Arity::Exact(3),
        }
    }

    fn compute_category(self) -> Category {
        match self {
            Self::Zero | Self::IntValue | Self::FloatValue | Self::Identity => Category::Constant,
            Self::Argument | Self::Coefficient => Category::FormArgument,
            Self::SpatialCoordinate | Self::FacetNormal => Category::Geometry,
            Self::MultiIndex => Category::Index,
            Self::Sum | Self::Product | Self::Division | Self::Power | Self::Abs => Category::Algebra,
            Self::Transposed
                | Self::Outer
                | Self::Inner
                | Self::Dot
                | Self::Cross
                | Self::Trace
                | Self::Determinant
                | Self::Cofactor
                | Self::Inverse
                | Self::Deviatoric
                | Self::Skew => Category::TensorAlgebra,
            Self::Sqrt | Self::Exp | Self::Ln | Self::Cos | Self::Sin => Category::MathFunction,
            Self::Indexed | Self::IndexSum | Self::ListTensor | Self::ComponentTensor => Category::Indexing,
            Self::PositiveRestricted | Self::NegativeRestricted => Category::Restriction,
            Self::Eq | Self::Ne | Self::Le | Self::Ge | Self::Lt | Self::Gt => Category::Condition,
            Self::Conditional => Category::Conditional,
            Self::SpatialDerivative
                | Self::VariableDerivative
                | Self::CoefficientDerivative => Category::Derivative,
            Self::Variable => Category::Variable,
        }
    }

    fn compute_differentiation(self) -> Differentiation {
        match self.compute_category() {
            Category::Constant | Category::FormArgument | Category::Geometry => Differentiation::Terminal,
            Category::Index | Category::Condition => Differentiation::Inert,
            Category::Derivative => Differentiation::Request,
            Category::Indexing | Category::Restriction | Category::Variable => Differentiation::Linear,
            Category::Algebra => match self {
                Self::Sum => Differentiation::Linear,
                _ => Differentiation::Partials,
            },
            Category::TensorAlgebra
                | Category::MathFunction
                | Category::Conditional => Differentiation::Partials,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
