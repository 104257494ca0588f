use crate::error::{PreconditionViolation, UnsupportedRank};
use crate::expr::{Arena, Category, Differentiation, ExprId, Kind};
use wform_error::Error;

/// The partial derivative of a node with respect to one of its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partial {
    Defined(ExprId),

    /// The node is not differentiable with respect to the operand, such as a conditional with
    /// respect to its condition.
    Undefined,
}

/// Fails with [`UnsupportedRank`] if any value operand of the node is not a scalar.
fn require_scalar_operands(arena: &Arena, id: ExprId) -> Result<(), Error> {
    let kind = arena.kind(id);
    let non_scalar = arena.operands(id)
        .iter()
        .map(|&operand| arena.get(operand))
        .find(|node| node.kind != Kind::MultiIndex && !node.shape.is_scalar());
    match non_scalar {
        Some(node) => Err(Error::new(UnsupportedRank { kind, shape: node.shape.clone() })),
        None => Ok(()),
    }
}

fn defined(ids: Vec<ExprId>) -> Result<Vec<Partial>, Error> {
    Ok(ids.into_iter().map(Partial::Defined).collect())
}

/// Computes the partial derivative of the node `id` with respect to each of its operands, in
/// operand order. Terminals have no operands, so their list is empty.
///
/// The rules assume scalar operands. Kinds whose operands are tensors, or carry free indices
/// through indexing, fail with [`UnsupportedRank`]. Unevaluated derivative requests fail with
/// [`PreconditionViolation`].
pub fn partials(arena: &mut Arena, id: ExprId) -> Result<Vec<Partial>, Error> {
    let kind = arena.kind(id);
    let info = kind.info();
    if info.differentiation == Differentiation::Request {
        return Err(Error::new(PreconditionViolation {
            kind,
            reason: "unevaluated derivative requests must be expanded before taking partial derivatives".to_string(),
        }));
    }
    if info.category.is_terminal() {
        return Ok(Vec::new());
    }
    if info.category == Category::Indexing {
        let shape = arena.shape(arena.operands(id)[0]).clone();
        return Err(Error::new(UnsupportedRank { kind, shape }));
    }
    require_scalar_operands(arena, id)?;

    let operands = arena.operands(id).to_vec();
    match kind {
        // d/dx_i (x_1 + ... + x_n) = 1
        Kind::Sum => {
            let one = arena.int(1);
            defined(vec![one; operands.len()])
        },

        // d/da (a * b) = b, d/db (a * b) = a
        Kind::Product | Kind::Inner | Kind::Outer => defined(vec![operands[1], operands[0]]),

        // d/dx (x / y) = 1 / y, d/dy (x / y) = -x / y^2
        Kind::Division => {
            let (x, y) = (operands[0], operands[1]);
            let one = arena.int(1);
            let reciprocal = arena.division(one, y)?;
            let two = arena.int(2);
            let y2 = arena.power(y, two)?;
            let quotient = arena.division(x, y2)?;
            let by_denominator = arena.neg(quotient)?;
            defined(vec![reciprocal, by_denominator])
        },

        // d/dx x^y = y * x^(y - 1), d/dy x^y = ln(x) * x^y
        Kind::Power => {
            let (x, y) = (operands[0], operands[1]);
            let minus_one = arena.int(-1);
            let exponent = arena.sum(vec![y, minus_one])?;
            let lowered = arena.power(x, exponent)?;
            let base = arena.product(y, lowered)?;
            let ln = arena.ln(x)?;
            let exponent = arena.product(ln, id)?;
            defined(vec![base, exponent])
        },

        // d/dx |x| = sign(x)
        // sign is a conditional, which cannot carry free indices
        Kind::Abs if !arena.get(operands[0]).free_indices.is_empty() => {
            Err(Error::new(UnsupportedRank { kind, shape: arena.shape(operands[0]).clone() }))
        },
        Kind::Abs => {
            let sign = arena.sign(operands[0])?;
            defined(vec![sign])
        },

        Kind::Determinant
            | Kind::PositiveRestricted
            | Kind::NegativeRestricted
            | Kind::Variable => defined(vec![arena.int(1)]),

        // d/dx x^-1 = -1 / x^2
        Kind::Inverse => {
            let (one, two) = (arena.int(1), arena.int(2));
            let x2 = arena.power(operands[0], two)?;
            let reciprocal = arena.division(one, x2)?;
            let partial = arena.neg(reciprocal)?;
            defined(vec![partial])
        },

        Kind::Transposed
            | Kind::Dot
            | Kind::Cross
            | Kind::Trace
            | Kind::Cofactor
            | Kind::Deviatoric
            | Kind::Skew => Err(Error::new(UnsupportedRank { kind, shape: arena.shape(id).clone() })),

        // d/dx sqrt(x) = 1 / (2 * sqrt(x))
        Kind::Sqrt => {
            let (one, two) = (arena.int(1), arena.int(2));
            let denominator = arena.product(two, id)?;
            let partial = arena.division(one, denominator)?;
            defined(vec![partial])
        },
        Kind::Exp => defined(vec![id]),
        Kind::Ln => {
            let one = arena.int(1);
            let partial = arena.division(one, operands[0])?;
            defined(vec![partial])
        },
        Kind::Cos => {
            let sin = arena.sin(operands[0])?;
            let partial = arena.neg(sin)?;
            defined(vec![partial])
        },
        Kind::Sin => {
            let partial = arena.cos(operands[0])?;
            defined(vec![partial])
        },

        Kind::Eq | Kind::Ne | Kind::Le | Kind::Ge | Kind::Lt | Kind::Gt => {
            Ok(vec![Partial::Undefined; 2])
        },
        Kind::Conditional => {
            let condition = operands[0];
            let (zero, one) = (arena.int(0), arena.int(1));
            let when_true = arena.conditional(condition, one, zero)?;
            let when_false = arena.conditional(condition, zero, one)?;
            Ok(vec![Partial::Undefined, Partial::Defined(when_true), Partial::Defined(when_false)])
        },

        _ => Err(Error::new(PreconditionViolation {
            kind,
            reason: "no partial derivative rule for this kind".to_string(),
        })),
    }
}
