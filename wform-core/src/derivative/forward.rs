use super::{is_trivially_zero, partials, MultBuilder, Partial, SumBuilder};
use crate::error::{InvalidOperand, PreconditionViolation, ShapeMismatch, UnsupportedRank};
use crate::expr::{Arena, Category, Differentiation, ExprId, Index, IndexItem, Kind, Payload};
use crate::visit::{transform, Fallback, Transformer};
use wform_error::Error;

/// What to differentiate with respect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrt {
    /// The [`Kind::Variable`] with the given label.
    Variable(u32),

    /// A coefficient, perturbed in the given direction. This is the Gateaux derivative used to
    /// linearize forms.
    Coefficient {
        coefficient: ExprId,
        direction: ExprId,
    },

    /// The spatial coordinate selected by the index item. A free index becomes a free index of
    /// the derivative.
    Spatial(IndexItem),
}

/// Rewrites each node into its derivative, given the derivatives of its operands.
///
/// Conditions and multi-indices are not values, so they are "rewritten" into themselves, which
/// lets linear kinds be rebuilt directly from the rewritten operand list.
struct Differentiator {
    wrt: Wrt,
}

fn is_condition(arena: &Arena, id: ExprId) -> bool {
    arena.kind(id).info().category == Category::Condition
}

impl Differentiator {
    /// The free index the derivative adds to every node, if any.
    fn added_index(&self) -> Option<Index> {
        match self.wrt {
            Wrt::Spatial(IndexItem::Free(index)) => Some(index),
            _ => None,
        }
    }

    /// The zero with the shape and free indices of the derivative of `id`.
    fn zero(&self, arena: &mut Arena, id: ExprId) -> ExprId {
        let node = arena.get(id);
        let shape = node.shape.clone();
        let mut free_indices = node.free_indices.clone();
        free_indices.extend(self.added_index());
        arena.zero_with_indices(shape, free_indices)
    }

    fn terminal(&self, arena: &mut Arena, id: ExprId) -> Result<ExprId, Error> {
        match (arena.kind(id), self.wrt) {
            (Kind::Argument | Kind::Coefficient, Wrt::Spatial(item)) => arena.spatial_derivative(id, vec![item]),
            (Kind::Coefficient, Wrt::Coefficient { coefficient, direction }) if id == coefficient => Ok(direction),

            // dx_j / dx_i is the identity
            (Kind::SpatialCoordinate, Wrt::Spatial(item)) => {
                let dim = arena.shape(id).dims()[0];
                let identity = arena.identity(dim);
                let j = arena.index(dim);
                let component = arena.indexed(identity, vec![j.into(), item])?;
                arena.component_tensor(component, vec![j])
            },
            _ => Ok(self.zero(arena, id)),
        }
    }

    /// Differentiates a spatial derivative that survived expansion. Its operand is always an
    /// argument or coefficient.
    fn spatial_derivative(&self, arena: &mut Arena, id: ExprId) -> Result<ExprId, Error> {
        let (f, indices) = (arena.operands(id)[0], arena.operands(id)[1]);
        if !matches!(arena.kind(f), Kind::Argument | Kind::Coefficient) {
            return Err(Error::new(PreconditionViolation {
                kind: Kind::SpatialDerivative,
                reason: "spatial derivatives of compound expressions must be expanded first".to_string(),
            }));
        }

        let mut items = arena.get(indices).payload.indices().to_vec();
        match self.wrt {
            Wrt::Spatial(item) => {
                items.push(item);
                arena.spatial_derivative(f, items)
            },
            Wrt::Coefficient { coefficient, direction } if f == coefficient => {
                let mut result = direction;
                for item in items {
                    result = differentiate(arena, result, Wrt::Spatial(item))?;
                }
                Ok(result)
            },
            _ => Ok(self.zero(arena, id)),
        }
    }

    /// Linear kinds apply themselves to the derivatives of their operands.
    fn linear(&self, arena: &mut Arena, id: ExprId, derivatives: &[ExprId]) -> Result<ExprId, Error> {
        let node = arena.get(id);
        if let (Kind::Variable, Payload::Label(label), Wrt::Variable(wrt)) = (node.kind, &node.payload, self.wrt) {
            if *label == wrt {
                if !node.shape.is_scalar() {
                    return Err(Error::new(UnsupportedRank { kind: Kind::Variable, shape: node.shape.clone() }));
                }
                return Ok(arena.int(1));
            }
        }

        let kind = node.kind;
        let all_zero = node.operands
            .iter()
            .zip(derivatives)
            .filter(|(&operand, _)| arena.kind(operand) != Kind::MultiIndex)
            .all(|(_, &derivative)| is_trivially_zero(arena, derivative));
        if all_zero {
            return Ok(self.zero(arena, id));
        }

        match kind {
            Kind::Sum => {
                let mut sum = SumBuilder::default();
                for &derivative in derivatives {
                    sum.add(arena, derivative);
                }
                match sum.build(arena)? {
                    Some(sum) => Ok(sum),
                    None => Ok(self.zero(arena, id)),
                }
            },

            // the derivative of a variable is the derivative of its expression
            Kind::Variable => Ok(derivatives[0]),

            _ => arena.rebuild(id, derivatives.to_vec()),
        }
    }

    /// Combines the derivatives of the operands of a nonlinear kind with the chain rule.
    fn chain_rule(&self, arena: &mut Arena, id: ExprId, derivatives: &[ExprId]) -> Result<ExprId, Error> {
        let kind = arena.kind(id);
        let operands = arena.operands(id).to_vec();
        let all_zero = operands
            .iter()
            .zip(derivatives)
            .all(|(&operand, &derivative)| is_condition(arena, operand) || is_trivially_zero(arena, derivative));
        if all_zero {
            return Ok(self.zero(arena, id));
        }

        let mut sum = SumBuilder::default();
        match kind {
            // (a * b)' = a' * b + a * b'
            Kind::Product => {
                for (position, &derivative) in derivatives.iter().enumerate() {
                    let mut mult = MultBuilder::default();
                    mult.mult(arena, derivative);
                    mult.mult(arena, operands[1 - position]);
                    if let Some(term) = mult.build(arena)? {
                        sum.add(arena, term);
                    }
                }
            },

            // (x / y)' = x' / y - x * y' / y^2
            Kind::Division => {
                let (x, y) = (operands[0], operands[1]);
                let (dx, dy) = (derivatives[0], derivatives[1]);
                if !is_trivially_zero(arena, dx) {
                    let term = arena.division(dx, y)?;
                    sum.add(arena, term);
                }
                if !is_trivially_zero(arena, dy) {
                    let mut mult = MultBuilder::default();
                    mult.mult(arena, x);
                    mult.mult(arena, dy);
                    if let Some(numerator) = mult.build(arena)? {
                        let two = arena.int(2);
                        let y2 = arena.power(y, two)?;
                        let quotient = arena.division(numerator, y2)?;
                        let term = arena.neg(quotient)?;
                        sum.add(arena, term);
                    }
                }
            },

            // the condition is piecewise constant, so only the branches are differentiated
            Kind::Conditional => return arena.rebuild(id, derivatives.to_vec()),

            _ => {
                let partials = partials(arena, id)?;
                for ((&operand, &derivative), partial) in operands.iter().zip(derivatives).zip(partials) {
                    if is_condition(arena, operand) || is_trivially_zero(arena, derivative) {
                        continue;
                    }
                    let Partial::Defined(partial) = partial else {
                        return Err(Error::new(PreconditionViolation {
                            kind,
                            reason: "the node is not differentiable with respect to one of its operands".to_string(),
                        }));
                    };

                    let mut mult = MultBuilder::default();
                    mult.mult(arena, partial);
                    mult.mult(arena, derivative);
                    if let Some(term) = mult.build(arena)? {
                        sum.add(arena, term);
                    }
                }
            },
        }

        match sum.build(arena)? {
            Some(sum) => Ok(sum),
            None => Ok(self.zero(arena, id)),
        }
    }
}

impl Transformer for Differentiator {
    /// Every kind is handled.
    fn fallback(&self) -> Fallback {
        Fallback::Reject
    }

    fn transform(&mut self, arena: &mut Arena, id: ExprId, derivatives: &[ExprId]) -> Result<Option<ExprId>, Error> {
        let kind = arena.kind(id);
        let derivative = match kind.info().differentiation {
            Differentiation::Terminal => self.terminal(arena, id)?,
            Differentiation::Inert => id,
            Differentiation::Linear => self.linear(arena, id, derivatives)?,
            Differentiation::Partials => self.chain_rule(arena, id, derivatives)?,
            Differentiation::Request if kind == Kind::SpatialDerivative => self.spatial_derivative(arena, id)?,
            Differentiation::Request => return Err(Error::new(PreconditionViolation {
                kind,
                reason: "derivative requests must be expanded before differentiating the expression containing them".to_string(),
            })),
        };
        Ok(Some(derivative))
    }
}

/// Checks that the index of a spatial derivative does not already appear in `f`. The index would
/// otherwise be bound twice.
fn check_spatial_index(arena: &Arena, f: ExprId, index: Index) -> Result<(), Error> {
    let clash = arena.post_order(&[f]).find(|&id| {
        let node = arena.get(id);
        node.free_indices.contains(&index) || node.payload.indices().contains(&IndexItem::Free(index))
    });
    match clash {
        Some(id) => Err(Error::new(PreconditionViolation {
            kind: arena.kind(id),
            reason: format!("cannot differentiate with respect to x[{}]: the index is already used in the expression", index),
        })),
        None => Ok(()),
    }
}

/// Computes the derivative of `f`.
///
/// - With respect to a variable, the derivative has the shape of `f`. Only scalar variables are
///   supported.
/// - With respect to a coefficient, the result is the derivative in the given direction, which
///   must have the shape of the coefficient.
/// - With respect to a spatial coordinate, spatial derivatives of arguments and coefficients stay
///   unevaluated as [`Kind::SpatialDerivative`] nodes.
///
/// `f` must not contain derivative requests, except spatial derivatives of arguments and
/// coefficients; see [`expand_derivatives`](super::expand_derivatives).
pub fn differentiate(arena: &mut Arena, f: ExprId, wrt: Wrt) -> Result<ExprId, Error> {
    match wrt {
        Wrt::Spatial(IndexItem::Free(index)) => check_spatial_index(arena, f, index)?,
        Wrt::Coefficient { coefficient, direction } => {
            let kind = arena.kind(coefficient);
            if kind != Kind::Coefficient {
                return Err(Error::new(InvalidOperand {
                    kind: Kind::CoefficientDerivative,
                    position: 1,
                    expected: "a coefficient",
                    found: kind,
                }));
            }
            let shapes = vec![arena.shape(coefficient).clone(), arena.shape(direction).clone()];
            if shapes[0] != shapes[1] {
                return Err(Error::new(ShapeMismatch {
                    kind: Kind::CoefficientDerivative,
                    shapes,
                    reason: "the direction must have the shape of the coefficient".to_string(),
                }));
            }
        },
        _ => {},
    }

    log::trace!("differentiating {} with respect to {:?}", f, wrt);
    let mut differentiator = Differentiator { wrt };
    Ok(transform(arena, &[f], &mut differentiator)?[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Cell, Element};
    use crate::eval::eval;
    use crate::expr::Shape;
    use assert_float_eq::assert_float_relative_eq;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn triangle() -> Cell {
        Cell::new("triangle", 2, 2, 3)
    }

    fn scalar() -> Element {
        Element::new("Lagrange", 1, triangle())
    }

    fn label(arena: &Arena, variable: ExprId) -> u32 {
        match arena.get(variable).payload {
            Payload::Label(label) => label,
            _ => panic!("not a variable"),
        }
    }

    #[test]
    fn gateaux_derivative() {
        let mut arena = Arena::new();
        let w = arena.coefficient(scalar());
        let v = arena.argument(0, scalar());
        let two = arena.int(2);
        let f = arena.power(w, two).unwrap();

        let df = differentiate(&mut arena, f, Wrt::Coefficient { coefficient: w, direction: v }).unwrap();
        let bindings = HashMap::from([(w, 3.0), (v, 2.0)]);
        assert_float_relative_eq!(eval(&arena, df, &bindings), 12.0);
    }

    #[test]
    fn variable_derivative() {
        let mut arena = Arena::new();
        let w = arena.coefficient(scalar());
        let x = arena.variable(w).unwrap();
        let sin = arena.sin(x).unwrap();
        let f = arena.product(sin, x).unwrap();

        let wrt = Wrt::Variable(label(&arena, x));
        let df = differentiate(&mut arena, f, wrt).unwrap();
        let bindings = HashMap::from([(w, 0.5)]);
        assert_float_relative_eq!(eval(&arena, df, &bindings), 0.5f64.cos() * 0.5 + 0.5f64.sin());
    }

    #[test]
    fn zero_keeps_shape() {
        let mut arena = Arena::new();
        let u = arena.coefficient(Element::vector("Lagrange", 1, triangle()));
        let w = arena.coefficient(scalar());
        let x = arena.variable(w).unwrap();

        let wrt = Wrt::Variable(label(&arena, x));
        let du = differentiate(&mut arena, u, wrt).unwrap();
        assert_eq!(arena.kind(du), Kind::Zero);
        assert_eq!(arena.shape(du), &Shape::from([2]));
    }

    #[test]
    fn spatial_derivative_of_product() {
        let mut arena = Arena::new();
        let w = arena.coefficient(scalar());
        let f = arena.product(w, w).unwrap();

        let df = differentiate(&mut arena, f, Wrt::Spatial(IndexItem::Fixed(0))).unwrap();
        let dw = arena.spatial_derivative(w, vec![IndexItem::Fixed(0)]).unwrap();
        let bindings = HashMap::from([(w, 3.0), (dw, 2.0)]);
        assert_float_relative_eq!(eval(&arena, df, &bindings), 12.0);
    }

    #[test]
    fn spatial_coordinate_gradient() {
        let mut arena = Arena::new();
        let x = arena.spatial_coordinate(triangle());
        let i = arena.index(2);
        let dx = differentiate(&mut arena, x, Wrt::Spatial(i.into())).unwrap();
        assert_eq!(arena.shape(dx), &Shape::from([2]));
        assert_eq!(arena.get(dx).free_indices, vec![i]);
    }

    #[test]
    fn spatial_index_already_used() {
        let mut arena = Arena::new();
        let u = arena.coefficient(Element::vector("Lagrange", 1, triangle()));
        let i = arena.index(2);
        let ui = arena.indexed(u, vec![i.into()]).unwrap();
        let f = arena.product(ui, ui).unwrap();

        let err = differentiate(&mut arena, f, Wrt::Spatial(i.into())).unwrap_err();
        assert!(err.is::<PreconditionViolation>());
    }

    #[test]
    fn tensor_rules_are_unsupported() {
        let mut arena = Arena::new();
        let u = arena.coefficient(Element::vector("Lagrange", 1, triangle()));
        let v = arena.argument(0, Element::vector("Lagrange", 1, triangle()));
        let f = arena.dot(u, u).unwrap();

        let err = differentiate(&mut arena, f, Wrt::Coefficient { coefficient: u, direction: v }).unwrap_err();
        assert!(err.is::<UnsupportedRank>());

        let i = arena.index(2);
        let ui = arena.indexed(u, vec![i.into()]).unwrap();
        let abs = arena.abs(ui).unwrap();
        let err = differentiate(&mut arena, abs, Wrt::Coefficient { coefficient: u, direction: v }).unwrap_err();
        assert!(err.is::<UnsupportedRank>());
        assert!(!err.is::<ShapeMismatch>());
    }

    #[test]
    fn index_notation_is_linear() {
        let mut arena = Arena::new();
        let element = Element::vector("Lagrange", 1, triangle());
        let (u, v) = (arena.coefficient(element.clone()), arena.argument(0, element));
        let i = arena.index(2);
        let ui = arena.indexed(u, vec![i.into()]).unwrap();
        let uu = arena.product(ui, ui).unwrap();

        // d/du (u_i u_i)[v] = 2 v_i u_i
        let df = differentiate(&mut arena, uu, Wrt::Coefficient { coefficient: u, direction: v }).unwrap();
        let vi = arena.indexed(v, vec![i.into()]).unwrap();
        let term = arena.product(vi, ui).unwrap();
        assert_eq!(df, arena.sum(vec![term, term]).unwrap());
    }

    #[test]
    fn conditional_branches() {
        let mut arena = Arena::new();
        let w = arena.coefficient(scalar());
        let zero = arena.int(0);
        let negative = arena.lt(w, zero).unwrap();
        let w2 = arena.product(w, w).unwrap();
        let f = arena.conditional(negative, w2, w).unwrap();
        let direction = arena.float(1.0);

        let df = differentiate(&mut arena, f, Wrt::Coefficient { coefficient: w, direction }).unwrap();
        assert_float_relative_eq!(eval(&arena, df, &HashMap::from([(w, -2.0)])), -4.0);
        assert_float_relative_eq!(eval(&arena, df, &HashMap::from([(w, 3.0)])), 1.0);
    }
}
