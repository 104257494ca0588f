use super::{Form, Integral, IntegralType};
use crate::analysis::{extract_arguments, extract_coefficients};
use crate::derivative::{expand_derivatives, is_trivially_zero};
use crate::error::InvalidArgumentNumbering;
use crate::expr::{Arena, ExprId, Index, IndexItem, Kind, Payload};
use crate::signature::{digest, grouped_signature};
use crate::visit::{transform, Fallback, Transformer};
use std::collections::HashMap;
use wform_error::{report, DiagnosticCollector, Error, Severity};

/// A form that has been through [`preprocess`]. It cannot be modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessedForm {
    integrals: Vec<Integral>,
    arguments: Vec<ExprId>,
    coefficients: Vec<ExprId>,
    original_arguments: Vec<ExprId>,
    original_coefficients: Vec<ExprId>,
    signature: String,
}

impl PreprocessedForm {
    /// The integrals that remain after preprocessing, sorted by integral type and sub-domain.
    pub fn integrals(&self) -> &[Integral] {
        &self.integrals
    }

    /// The arguments of the form, sorted by number.
    pub fn arguments(&self) -> &[ExprId] {
        &self.arguments
    }

    /// The renumbered coefficients of the form. The coefficient at position `i` has count `i`.
    pub fn coefficients(&self) -> &[ExprId] {
        &self.coefficients
    }

    pub fn original_arguments(&self) -> &[ExprId] {
        &self.original_arguments
    }

    /// The coefficients as they appeared in the form, before renumbering. The coefficient at
    /// position `i` was renumbered to `coefficients()[i]`.
    pub fn original_coefficients(&self) -> &[ExprId] {
        &self.original_coefficients
    }

    /// The hex digest identifying the form. Forms that differ only in the counts of their
    /// coefficients and indices have the same signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Renames the free indices of a tree to `0, 1, ...`, in order of first appearance.
#[derive(Default)]
struct IndexRenumberer {
    renamed: HashMap<u32, u32>,
}

impl IndexRenumberer {
    fn rename(&mut self, index: Index) -> Index {
        let next = self.renamed.len() as u32;
        let count = *self.renamed.entry(index.count).or_insert(next);
        Index { count, dim: index.dim }
    }
}

impl Transformer for IndexRenumberer {
    fn fallback(&self) -> Fallback {
        Fallback::Identity
    }

    fn transform(&mut self, arena: &mut Arena, id: ExprId, _: &[ExprId]) -> Result<Option<ExprId>, Error> {
        let node = arena.get(id);
        match node.kind {
            Kind::MultiIndex => {
                let items = node.payload.indices()
                    .iter()
                    .map(|item| match *item {
                        IndexItem::Free(index) => IndexItem::Free(self.rename(index)),
                        fixed => fixed,
                    })
                    .collect::<Vec<_>>();
                Ok(Some(arena.multi_index(items)))
            },
            Kind::Zero if !node.free_indices.is_empty() => {
                let shape = node.shape.clone();
                let free_indices = node.free_indices
                    .iter()
                    .map(|&index| self.rename(index))
                    .collect();
                Ok(Some(arena.zero_with_indices(shape, free_indices)))
            },
            _ => Ok(None),
        }
    }
}

/// Replaces coefficients with the coefficient of the same element and a new count.
struct CoefficientRenumberer {
    counts: HashMap<ExprId, u32>,
}

impl Transformer for CoefficientRenumberer {
    fn fallback(&self) -> Fallback {
        Fallback::Identity
    }

    fn transform(&mut self, arena: &mut Arena, id: ExprId, _: &[ExprId]) -> Result<Option<ExprId>, Error> {
        Ok(self.counts
            .get(&id)
            .and_then(|&count| renumbered_coefficient(arena, id, count)))
    }
}

/// Returns the coefficient with the element of `id` and the given count, or [`None`] if `id` is
/// not a coefficient.
fn renumbered_coefficient(arena: &mut Arena, id: ExprId, count: u32) -> Option<ExprId> {
    let element = arena.get(id).payload.element()?.clone();
    Some(arena.coefficient_numbered(count, element))
}

/// Checks that the arguments are numbered `0..rank`, with one element per number.
fn check_argument_numbering(arena: &Arena, arguments: &[ExprId]) -> Result<(), Error> {
    let numbers = arguments
        .iter()
        .filter_map(|&id| match arena.get(id).payload {
            Payload::Argument { number, .. } => Some(number),
            _ => None,
        })
        .collect::<Vec<_>>();

    // distinct arguments with the same number differ in their element
    if let Some(pair) = numbers.windows(2).find(|pair| pair[0] == pair[1]) {
        let reason = format!("argument {} is used with two different elements", pair[0]);
        return Err(Error::new(InvalidArgumentNumbering { numbers, reason }));
    }

    if numbers.iter().enumerate().any(|(expected, &number)| expected != number) {
        return Err(Error::new(InvalidArgumentNumbering {
            numbers,
            reason: "argument numbers must be consecutive, starting from 0".to_string(),
        }));
    }
    Ok(())
}

/// Prepares a form for analysis.
///
/// The derivative requests of every integrand are expanded, and integrals whose integrand became
/// zero are dropped. The indices of each integrand are renamed in order of first appearance, and
/// the coefficients of the form are renumbered `0..n`, keeping the order of their counts. Finally,
/// the integrals are sorted by type and sub-domain, and the form's signature is computed.
///
/// Fails with [`InvalidArgumentNumbering`] if the arguments are not numbered `0..rank`.
pub fn preprocess(
    arena: &mut Arena,
    form: Form,
    diagnostics: &mut dyn DiagnosticCollector,
) -> Result<PreprocessedForm, Error> {
    log::debug!("preprocessing form with {} integral(s)", form.integrals.len());

    let mut integrals = Vec::with_capacity(form.integrals.len());
    let mut index_counts = 0;
    for integral in form.integrals {
        let expanded = expand_derivatives(arena, integral.integrand)?;
        if is_trivially_zero(arena, expanded) {
            report(
                diagnostics,
                Severity::Info,
                format!(
                    "dropped {} integral over sub-domain {}: integrand is zero",
                    integral.integral_type,
                    integral.domain_id,
                ),
            );
            continue;
        }

        let mut renumberer = IndexRenumberer::default();
        let renumbered = transform(arena, &[expanded], &mut renumberer)?[0];
        index_counts = index_counts.max(renumberer.renamed.len() as u32);
        log::trace!("integrand {} expanded to {}", integral.integrand, renumbered);
        integrals.push(integral.with_integrand(arena, renumbered)?);
    }
    arena.reserve_index_counts(index_counts);

    let integrands = integrals.iter().map(Integral::integrand).collect::<Vec<_>>();
    let arguments = extract_arguments(arena, &integrands)?;
    check_argument_numbering(arena, &arguments)?;

    let original_coefficients = extract_coefficients(arena, &integrands)?;
    let mut renumberer = CoefficientRenumberer {
        counts: original_coefficients
            .iter()
            .enumerate()
            .map(|(count, &id)| (id, count as u32))
            .collect(),
    };
    let renumbered = transform(arena, &integrands, &mut renumberer)?;
    let mut integrals = integrals
        .iter()
        .zip(renumbered)
        .map(|(integral, integrand)| integral.with_integrand(arena, integrand))
        .collect::<Result<Vec<_>, _>>()?;
    integrals.sort_by_key(|integral| (integral.integral_type, integral.domain_id));

    let coefficients = original_coefficients
        .iter()
        .enumerate()
        .filter_map(|(count, &id)| renumbered_coefficient(arena, id, count as u32))
        .collect::<Vec<_>>();

    // integrals over the same sub-domain are summed, so their order does not matter
    let mut groups: Vec<((IntegralType, usize), Vec<ExprId>)> = Vec::new();
    for integral in &integrals {
        let key = (integral.integral_type, integral.domain_id);
        match groups.last_mut() {
            Some((last, integrands)) if *last == key => integrands.push(integral.integrand),
            _ => groups.push((key, vec![integral.integrand])),
        }
    }
    let metadata = groups
        .iter()
        .map(|((integral_type, domain_id), _)| format!("{}:{}", integral_type, domain_id))
        .collect::<Vec<_>>()
        .join(",");
    let integrands = groups.into_iter().map(|(_, integrands)| integrands).collect::<Vec<_>>();
    let form_signature = digest(&format!("{}|{}", metadata, grouped_signature(arena, &integrands)));
    log::debug!("form signature is {}", form_signature);

    Ok(PreprocessedForm {
        integrals,
        original_arguments: arguments.clone(),
        arguments,
        coefficients,
        original_coefficients,
        signature: form_signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Cell, Element};
    use crate::form::IntegralType;
    use pretty_assertions::assert_eq;
    use wform_error::Diagnostic;

    fn element() -> Element {
        Element::new("Lagrange", 1, Cell::new("triangle", 2, 2, 3))
    }

    fn cell_integral(arena: &Arena, integrand: ExprId) -> Form {
        Form::from(Integral::new(arena, integrand, IntegralType::Cell, 0).unwrap())
    }

    #[test]
    fn coefficients_are_renumbered() {
        let mut arena = Arena::new();
        let padding = (0..5).map(|_| arena.coefficient(element())).collect::<Vec<_>>();
        let w = arena.coefficient(element());
        let v = arena.argument(0, element());
        let vw = arena.product(v, w).unwrap();
        let f = arena.product(vw, padding[3]).unwrap();

        let integral = cell_integral(&arena, f);
        let form = preprocess(&mut arena, integral, &mut ()).unwrap();
        assert_eq!(form.original_coefficients(), &[padding[3], w]);
        assert_eq!(form.arguments(), &[v]);

        let renumbered = form.coefficients()
            .iter()
            .map(|&id| match &arena.get(id).payload {
                Payload::Coefficient { count, .. } => *count,
                _ => panic!("not a coefficient"),
            })
            .collect::<Vec<_>>();
        assert_eq!(renumbered, vec![0, 1]);
        assert_eq!(extract_coefficients(&arena, &[form.integrals()[0].integrand()]).unwrap(), form.coefficients());
    }

    #[test]
    fn indices_are_renumbered() {
        let mut arena = Arena::new();
        let cell = Cell::new("triangle", 2, 2, 3);
        let u = arena.coefficient(Element::vector("Lagrange", 1, cell));
        let _unused = (0..3).map(|_| arena.index(2)).collect::<Vec<_>>();
        let i = arena.index(2);
        let ui = arena.indexed(u, vec![i.into()]).unwrap();
        let f = arena.product(ui, ui).unwrap();

        let integral = cell_integral(&arena, f);
        let form = preprocess(&mut arena, integral, &mut ()).unwrap();
        let renamed = Index { count: 0, dim: 2 };
        let ui = arena.indexed(u, vec![renamed.into()]).unwrap();
        assert_eq!(form.integrals()[0].integrand(), arena.product(ui, ui).unwrap());
        assert!(arena.index(2).count >= 4);
    }

    #[test]
    fn zero_integrals_are_dropped() {
        let mut arena = Arena::new();
        let v = arena.argument(0, element());
        let w = arena.coefficient(element());
        let other = arena.coefficient(element());
        let request = arena.coefficient_derivative(v, w, other).unwrap();

        let form = cell_integral(&arena, v) + cell_integral(&arena, request);
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let form = preprocess(&mut arena, form, &mut diagnostics).unwrap();
        assert_eq!(form.integrals().len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Info);
    }

    #[test]
    fn argument_numbering() {
        let mut arena = Arena::new();
        let v = arena.argument(0, element());
        let u = arena.argument(2, element());
        let uv = arena.product(u, v).unwrap();
        let integral = cell_integral(&arena, uv);
        let err = preprocess(&mut arena, integral, &mut ()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<InvalidArgumentNumbering>().map(|kind| kind.numbers.clone()),
            Some(vec![0, 2]),
        );

        let cell = Cell::new("triangle", 2, 2, 3);
        let other = arena.argument(0, Element::new("DG", 0, cell));
        let f = arena.product(v, other).unwrap();
        let integral = cell_integral(&arena, f);
        let err = preprocess(&mut arena, integral, &mut ()).unwrap_err();
        assert!(err.is::<InvalidArgumentNumbering>());
    }

    #[test]
    fn signature_ignores_counts() {
        let build = |padding: usize| {
            let mut arena = Arena::new();
            for _ in 0..padding {
                arena.coefficient(element());
            }
            let w = arena.coefficient(element());
            let v = arena.argument(0, element());
            let f = arena.product(v, w).unwrap();
            let integral = cell_integral(&arena, f);
            preprocess(&mut arena, integral, &mut ()).unwrap().signature().to_string()
        };
        assert_eq!(build(0), build(7));
    }

    #[test]
    fn signature_depends_on_integral_type() {
        let mut arena = Arena::new();
        let v = arena.argument(0, element());
        let integral = cell_integral(&arena, v);
        let cell = preprocess(&mut arena, integral, &mut ()).unwrap();
        let facet = Form::from(Integral::new(&arena, v, IntegralType::ExteriorFacet, 0).unwrap());
        let facet = preprocess(&mut arena, facet, &mut ()).unwrap();
        assert_ne!(cell.signature(), facet.signature());
    }

    #[test]
    fn signature_ignores_integral_order() {
        let mut arena = Arena::new();
        let v = arena.argument(0, element());
        let (w0, w1) = (arena.coefficient(element()), arena.coefficient(element()));
        let (sin0, sin1) = (arena.sin(w0).unwrap(), arena.sin(w1).unwrap());
        let integrands = [
            arena.product(v, sin0).unwrap(),
            arena.product(v, sin1).unwrap(),
            arena.product(v, w0).unwrap(),
        ];

        let mut signatures = Vec::new();
        for order in [[0, 1, 2], [1, 0, 2], [2, 1, 0]] {
            let form = order
                .iter()
                .map(|&i| cell_integral(&arena, integrands[i]))
                .fold(Form::default(), |form, integral| form + integral);
            signatures.push(preprocess(&mut arena, form, &mut ()).unwrap().signature().to_string());
        }
        assert_eq!(signatures[0], signatures[1]);
        assert_eq!(signatures[0], signatures[2]);

        // integrals over different sub-domains are not interchangeable
        let mut split = |first: usize, second: usize| {
            let form = Form::new(vec![
                Integral::new(&arena, integrands[first], IntegralType::Cell, 0).unwrap(),
                Integral::new(&arena, integrands[second], IntegralType::Cell, 1).unwrap(),
            ]);
            preprocess(&mut arena, form, &mut ()).unwrap().signature().to_string()
        };
        assert_ne!(split(0, 2), split(2, 0));
    }
}
