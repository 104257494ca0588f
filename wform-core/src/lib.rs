//! Symbolic representation and analysis of finite element weak forms.
//!
//! Expressions are built in an [`Arena`](expr::Arena), which checks every node against the rules
//! of its [`Kind`](expr::Kind) as it is built. On top of the node model, this crate provides:
//!
//! - generic traversals of expression trees ([`visit`]),
//! - canonical signatures that identify expressions up to renumbering ([`signature`]),
//! - symbolic differentiation ([`derivative`]),
//! - forms, their preprocessing, and the data extracted from them ([`form`]).

pub mod analysis;
pub mod derivative;
pub mod element;
pub mod error;
pub mod expr;
pub mod form;
pub mod primitive;
pub mod signature;
pub mod visit;

#[cfg(test)]
pub(crate) mod eval;
