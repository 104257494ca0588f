use super::{differentiate, Wrt};
use crate::error::{PreconditionViolation, UnsupportedRank};
use crate::expr::{Arena, ExprId, Kind, Payload};
use crate::visit::{transform, Fallback, Transformer};
use wform_error::Error;

/// Replaces derivative requests with the derivatives they ask for. Requests are resolved
/// innermost first, so the operand of each request is already free of requests when it is
/// differentiated.
struct Expander;

impl Transformer for Expander {
    fn fallback(&self) -> Fallback {
        Fallback::Identity
    }

    fn transform(&mut self, arena: &mut Arena, id: ExprId, operands: &[ExprId]) -> Result<Option<ExprId>, Error> {
        match arena.kind(id) {
            Kind::SpatialDerivative => {
                let (f, indices) = (operands[0], operands[1]);
                if matches!(arena.kind(f), Kind::Argument | Kind::Coefficient) {
                    return arena.rebuild(id, operands.to_vec()).map(Some);
                }

                let mut result = f;
                for item in arena.get(indices).payload.indices().to_vec() {
                    result = differentiate(arena, result, Wrt::Spatial(item))?;
                }
                Ok(Some(result))
            },
            Kind::VariableDerivative => {
                let (f, variable) = (operands[0], operands[1]);
                let node = arena.get(variable);
                if !node.shape.is_scalar() {
                    return Err(Error::new(UnsupportedRank {
                        kind: Kind::VariableDerivative,
                        shape: node.shape.clone(),
                    }));
                }
                let Payload::Label(label) = node.payload else {
                    return Err(Error::new(PreconditionViolation {
                        kind: node.kind,
                        reason: "a variable must carry a label".to_string(),
                    }));
                };
                differentiate(arena, f, Wrt::Variable(label)).map(Some)
            },
            Kind::CoefficientDerivative => {
                let (f, coefficient, direction) = (operands[0], operands[1], operands[2]);
                differentiate(arena, f, Wrt::Coefficient { coefficient, direction }).map(Some)
            },
            _ => Ok(None),
        }
    }
}

/// Resolves every unevaluated derivative request in the tree into an ordinary expression,
/// returning the new root.
///
/// Spatial derivatives of arguments and coefficients cannot be resolved symbolically, so they
/// remain as [`Kind::SpatialDerivative`] nodes, with all their directions merged into one node.
pub fn expand_derivatives(arena: &mut Arena, root: ExprId) -> Result<ExprId, Error> {
    Ok(transform(arena, &[root], &mut Expander)?[0])
}
