//! A scalar evaluator used to check derivative rules numerically.

use crate::expr::{Arena, ExprId, Kind, Payload};
use std::collections::HashMap;

/// Evaluates a scalar expression, substituting the given values for bound nodes. Any node in
/// `bindings` is replaced by its value, whatever its kind.
///
/// # Panics
///
/// Panics on unbound arguments and coefficients, and on kinds that have no scalar meaning.
pub fn eval(arena: &Arena, id: ExprId, bindings: &HashMap<ExprId, f64>) -> f64 {
    if let Some(&value) = bindings.get(&id) {
        return value;
    }

    let node = arena.get(id);
    let arg = |i: usize| eval(arena, node.operands[i], bindings);
    let truth = |b: bool| if b { 1.0 } else { 0.0 };
    match node.kind {
        Kind::Zero => 0.0,
        Kind::IntValue => match &node.payload {
            Payload::Int(int) => int.to_f64(),
            _ => unreachable!(),
        },
        Kind::FloatValue => match &node.payload {
            Payload::Float(float) => float.to_f64(),
            _ => unreachable!(),
        },
        Kind::Sum => (0..node.operands.len()).map(arg).sum(),
        Kind::Product | Kind::Inner | Kind::Outer => arg(0) * arg(1),
        Kind::Division => arg(0) / arg(1),
        Kind::Power => arg(0).powf(arg(1)),
        Kind::Abs => arg(0).abs(),
        Kind::Sqrt => arg(0).sqrt(),
        Kind::Exp => arg(0).exp(),
        Kind::Ln => arg(0).ln(),
        Kind::Cos => arg(0).cos(),
        Kind::Sin => arg(0).sin(),
        Kind::Determinant => arg(0),
        Kind::Inverse => 1.0 / arg(0),
        Kind::Eq => truth(arg(0) == arg(1)),
        Kind::Ne => truth(arg(0) != arg(1)),
        Kind::Le => truth(arg(0) <= arg(1)),
        Kind::Ge => truth(arg(0) >= arg(1)),
        Kind::Lt => truth(arg(0) < arg(1)),
        Kind::Gt => truth(arg(0) > arg(1)),
        Kind::Conditional => if arg(0) != 0.0 { arg(1) } else { arg(2) },
        Kind::Variable | Kind::PositiveRestricted | Kind::NegativeRestricted => arg(0),
        kind => panic!("cannot evaluate `{}` node {} as a scalar", kind, id),
    }
}
