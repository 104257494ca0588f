use super::{preprocess, Form, Integral, IntegralType, PreprocessedForm};
use crate::analysis::extract_cells;
use crate::element::{Cell, Element};
use crate::error::{EmptyForm, MissingDomain};
use crate::expr::{Arena, ExprId};
use std::collections::{BTreeMap, HashMap};
use wform_error::{report, DiagnosticCollector, Error, Severity};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Options for [`FormData::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDataOptions {
    /// The name of the form.
    pub name: String,

    /// Names of arguments and coefficients, keyed by the node as it appears in the form before
    /// preprocessing. Unnamed arguments are called `v0, v1, ...` and unnamed coefficients
    /// `w0, w1, ...`.
    pub object_names: HashMap<ExprId, String>,

    /// Fail with [`MissingDomain`] instead of warning when a form has no cell at all.
    pub strict_domain: bool,
}

impl Default for FormDataOptions {
    fn default() -> Self {
        Self {
            name: "a".to_string(),
            object_names: HashMap::new(),
            strict_domain: false,
        }
    }
}

/// The integrals of a form over one sub-domain of one integral type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegralData {
    pub integral_type: IntegralType,
    pub domain_id: usize,
    pub integrals: Vec<Integral>,
}

/// Data about a form, needed to generate code for it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FormData {
    pub name: String,

    /// The number of arguments.
    pub rank: usize,
    pub num_coefficients: usize,

    /// The arguments of the preprocessed form, sorted by number.
    pub arguments: Vec<ExprId>,

    /// The renumbered coefficients of the preprocessed form.
    pub coefficients: Vec<ExprId>,
    pub original_arguments: Vec<ExprId>,
    pub original_coefficients: Vec<ExprId>,
    pub argument_names: Vec<String>,
    pub coefficient_names: Vec<String>,
    pub signature: String,

    /// The elements of the arguments, then of the coefficients.
    pub elements: Vec<Element>,
    pub unique_elements: Vec<Element>,

    /// [`FormData::elements`], followed by every sub-element, recursively.
    pub sub_elements: Vec<Element>,
    pub unique_sub_elements: Vec<Element>,

    pub cell: Option<Cell>,
    pub geometric_dimension: Option<usize>,
    pub topological_dimension: Option<usize>,
    pub num_facets: Option<usize>,

    pub num_cell_domains: usize,
    pub num_exterior_facet_domains: usize,
    pub num_interior_facet_domains: usize,
    pub num_macro_cell_domains: usize,
    pub num_surface_domains: usize,

    /// The integrals grouped by integral type and sub-domain, in that order.
    pub integral_data: Vec<IntegralData>,
}

/// Returns the elements in order, skipping any element seen before.
fn unique(elements: &[Element]) -> Vec<Element> {
    let mut unique: Vec<Element> = Vec::with_capacity(elements.len());
    for element in elements {
        if !unique.contains(element) {
            unique.push(element.clone());
        }
    }
    unique
}

/// Appends the sub-elements of `element` to `out`, depth-first.
fn collect_sub_elements(element: &Element, out: &mut Vec<Element>) {
    for sub_element in &element.sub_elements {
        out.push(sub_element.clone());
        collect_sub_elements(sub_element, out);
    }
}

impl FormData {
    /// Extracts the data of a preprocessed form.
    ///
    /// The cell of the form is the cell of the first element that has one. A form whose elements
    /// have no cell fails with [`MissingDomain`]. A form without any element takes the cell of a
    /// geometric quantity instead. If there is none either, the dimensions are left undefined and
    /// a warning is reported, unless [`FormDataOptions::strict_domain`] is set.
    pub fn new(
        arena: &Arena,
        form: &PreprocessedForm,
        options: &FormDataOptions,
        diagnostics: &mut dyn DiagnosticCollector,
    ) -> Result<Self, Error> {
        if form.integrals().is_empty() {
            return Err(Error::new(EmptyForm));
        }

        let name_of = |id: ExprId, default: String| {
            options.object_names.get(&id).cloned().unwrap_or(default)
        };
        let argument_names = form.original_arguments()
            .iter()
            .enumerate()
            .map(|(i, &id)| name_of(id, format!("v{}", i)))
            .collect();
        let coefficient_names = form.original_coefficients()
            .iter()
            .enumerate()
            .map(|(i, &id)| name_of(id, format!("w{}", i)))
            .collect();

        let elements = form.arguments()
            .iter()
            .chain(form.coefficients())
            .filter_map(|&id| arena.get(id).payload.element().cloned())
            .collect::<Vec<_>>();
        let mut sub_elements = elements.clone();
        for element in &elements {
            collect_sub_elements(element, &mut sub_elements);
        }

        let integrands = form.integrals().iter().map(Integral::integrand).collect::<Vec<_>>();
        let cell = Self::resolve_cell(arena, &integrands, &elements, options, diagnostics)?;

        let num_domains = |integral_type: IntegralType| {
            form.integrals()
                .iter()
                .filter(|integral| integral.integral_type() == integral_type)
                .map(|integral| integral.domain_id() + 1)
                .max()
                .unwrap_or(0)
        };

        let mut groups: BTreeMap<(IntegralType, usize), Vec<Integral>> = BTreeMap::new();
        for integral in form.integrals() {
            groups
                .entry((integral.integral_type(), integral.domain_id()))
                .or_default()
                .push(*integral);
        }
        let integral_data = groups
            .into_iter()
            .map(|((integral_type, domain_id), integrals)| IntegralData { integral_type, domain_id, integrals })
            .collect();

        log::debug!("extracted data of form `{}` with signature {}", options.name, form.signature());
        Ok(Self {
            name: options.name.clone(),
            rank: form.arguments().len(),
            num_coefficients: form.coefficients().len(),
            arguments: form.arguments().to_vec(),
            coefficients: form.coefficients().to_vec(),
            original_arguments: form.original_arguments().to_vec(),
            original_coefficients: form.original_coefficients().to_vec(),
            argument_names,
            coefficient_names,
            signature: form.signature().to_string(),
            unique_elements: unique(&elements),
            elements,
            unique_sub_elements: unique(&sub_elements),
            sub_elements,
            geometric_dimension: cell.as_ref().map(|cell| cell.geometric_dimension),
            topological_dimension: cell.as_ref().map(|cell| cell.topological_dimension),
            num_facets: cell.as_ref().map(|cell| cell.num_facets),
            cell,
            num_cell_domains: num_domains(IntegralType::Cell),
            num_exterior_facet_domains: num_domains(IntegralType::ExteriorFacet),
            num_interior_facet_domains: num_domains(IntegralType::InteriorFacet),
            num_macro_cell_domains: num_domains(IntegralType::MacroCell),
            num_surface_domains: num_domains(IntegralType::Surface),
            integral_data,
        })
    }

    /// Preprocesses the form, then extracts its data.
    pub fn from_form(
        arena: &mut Arena,
        form: Form,
        options: &FormDataOptions,
        diagnostics: &mut dyn DiagnosticCollector,
    ) -> Result<Self, Error> {
        let preprocessed = preprocess(arena, form, diagnostics)?;
        Self::new(arena, &preprocessed, options, diagnostics)
    }

    fn resolve_cell(
        arena: &Arena,
        integrands: &[ExprId],
        elements: &[Element],
        options: &FormDataOptions,
        diagnostics: &mut dyn DiagnosticCollector,
    ) -> Result<Option<Cell>, Error> {
        if let Some(cell) = elements.iter().find_map(|element| element.cell.clone()) {
            return Ok(Some(cell));
        }
        if !elements.is_empty() {
            return Err(Error::new(MissingDomain {
                form: options.name.clone(),
                reason: "none of its elements is defined on a cell".to_string(),
            }));
        }
        if let Some(cell) = extract_cells(arena, integrands)?.into_iter().next() {
            return Ok(Some(cell));
        }
        if options.strict_domain {
            return Err(Error::new(MissingDomain {
                form: options.name.clone(),
                reason: "it has no elements and no geometric quantities".to_string(),
            }));
        }

        report(
            diagnostics,
            Severity::Warning,
            format!("no cell is defined in form `{}`; its dimensions are undefined", options.name),
        );
        Ok(None)
    }

    /// The number of integrals of the given type, over all sub-domains.
    pub fn num_integrals(&self, integral_type: IntegralType) -> usize {
        self.integral_data
            .iter()
            .filter(|data| data.integral_type == integral_type)
            .map(|data| data.integrals.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{IndexItem, Shape};
    use pretty_assertions::assert_eq;
    use wform_error::Diagnostic;

    fn triangle() -> Cell {
        Cell::new("triangle", 2, 2, 3)
    }

    fn element() -> Element {
        Element::new("Lagrange", 1, triangle())
    }

    /// `(v0 * v1 * w) dx + (v0 * v1 * w) ds(0)`, with the coefficient named `f`.
    fn bilinear(arena: &mut Arena) -> (Form, FormDataOptions) {
        let v0 = arena.argument(0, element());
        let v1 = arena.argument(1, element());
        let w = arena.coefficient(element());
        let v0v1 = arena.product(v0, v1).unwrap();
        let f = arena.product(v0v1, w).unwrap();

        let cell = Integral::new(arena, f, IntegralType::Cell, 0).unwrap();
        let facet = Integral::new(arena, f, IntegralType::ExteriorFacet, 0).unwrap();
        let options = FormDataOptions {
            object_names: HashMap::from([(w, "f".to_string())]),
            ..FormDataOptions::default()
        };
        (Form::from(cell) + Form::from(facet), options)
    }

    #[test]
    fn bilinear_form() {
        let mut arena = Arena::new();
        let (form, options) = bilinear(&mut arena);
        let data = FormData::from_form(&mut arena, form, &options, &mut ()).unwrap();

        assert_eq!(data.rank, 2);
        assert_eq!(data.num_coefficients, 1);
        assert_eq!(data.num_cell_domains, 1);
        assert_eq!(data.num_exterior_facet_domains, 1);
        assert_eq!(data.num_interior_facet_domains, 0);
        assert_eq!(data.argument_names, vec!["v0", "v1"]);
        assert_eq!(data.coefficient_names, vec!["f"]);
        assert_eq!(data.unique_elements, vec![element()]);
        assert_eq!(data.elements.len(), 3);
        assert_eq!(data.cell, Some(triangle()));
        assert_eq!((data.geometric_dimension, data.topological_dimension, data.num_facets), (Some(2), Some(2), Some(3)));
        assert_eq!(data.num_integrals(IntegralType::Cell), 1);
        assert_eq!(data.integral_data.len(), 2);
        assert_eq!(data.integral_data[1].integral_type, IntegralType::ExteriorFacet);
    }

    #[test]
    fn sub_elements() {
        let mut arena = Arena::new();
        let vector = Element::vector("Lagrange", 2, triangle());
        let mixed = Element::mixed(vec![vector.clone(), element()]);
        let u = arena.argument(0, mixed.clone());
        let i = arena.index(3);
        let ui = arena.indexed(u, vec![i.into()]).unwrap();
        let f = arena.product(ui, ui).unwrap();

        let form = Form::from(Integral::new(&arena, f, IntegralType::Cell, 0).unwrap());
        let data = FormData::from_form(&mut arena, form, &FormDataOptions::default(), &mut ()).unwrap();
        let scalar = Element::new("Lagrange", 2, triangle());
        assert_eq!(data.sub_elements, vec![mixed.clone(), vector.clone(), scalar.clone(), scalar.clone(), element()]);
        assert_eq!(data.unique_sub_elements, vec![mixed, vector, scalar, element()]);
    }

    #[test]
    fn empty_form() {
        let mut arena = Arena::new();
        let err = FormData::from_form(&mut arena, Form::default(), &FormDataOptions::default(), &mut ()).unwrap_err();
        assert!(err.is::<EmptyForm>());

        let v = arena.argument(0, element());
        let zero = arena.zero(Shape::scalar());
        let f = arena.product(zero, v).unwrap();
        let form = Form::from(Integral::new(&arena, f, IntegralType::Cell, 0).unwrap());
        let err = FormData::from_form(&mut arena, form, &FormDataOptions::default(), &mut ()).unwrap_err();
        assert!(err.is::<EmptyForm>());
    }

    #[test]
    fn elements_without_cell() {
        let mut arena = Arena::new();
        let w = arena.coefficient(Element::without_cell("Real", 0));
        let form = Form::from(Integral::new(&arena, w, IntegralType::Cell, 0).unwrap());
        let err = FormData::from_form(&mut arena, form, &FormDataOptions::default(), &mut ()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MissingDomain>().map(|kind| kind.form.as_str()),
            Some("a"),
        );
    }

    #[test]
    fn cell_of_geometric_quantity() {
        let mut arena = Arena::new();
        let x = arena.spatial_coordinate(triangle());
        let x0 = arena.indexed(x, vec![IndexItem::Fixed(0)]).unwrap();
        let form = Form::from(Integral::new(&arena, x0, IntegralType::Cell, 0).unwrap());
        let data = FormData::from_form(&mut arena, form, &FormDataOptions::default(), &mut ()).unwrap();
        assert_eq!(data.rank, 0);
        assert_eq!(data.cell, Some(triangle()));
    }

    #[test]
    fn constant_form_is_degraded() {
        let mut arena = Arena::new();
        let one = arena.float(1.0);
        let form = Form::from(Integral::new(&arena, one, IntegralType::Cell, 0).unwrap());

        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let data = FormData::from_form(&mut arena, form.clone(), &FormDataOptions::default(), &mut diagnostics).unwrap();
        assert_eq!(data.cell, None);
        assert_eq!(data.geometric_dimension, None);
        assert_eq!(diagnostics.iter().map(|diagnostic| diagnostic.severity).collect::<Vec<_>>(), vec![Severity::Warning]);

        let strict = FormDataOptions { strict_domain: true, ..FormDataOptions::default() };
        let err = FormData::from_form(&mut arena, form, &strict, &mut ()).unwrap_err();
        assert!(err.is::<MissingDomain>());
    }

    #[test]
    fn multiple_sub_domains() {
        let mut arena = Arena::new();
        let v = arena.argument(0, element());
        let mut form = Form::default();
        for (integral_type, domain_id) in [
            (IntegralType::InteriorFacet, 2),
            (IntegralType::Cell, 1),
            (IntegralType::Cell, 1),
            (IntegralType::Cell, 0),
        ] {
            form.push(Integral::new(&arena, v, integral_type, domain_id).unwrap());
        }

        let data = FormData::from_form(&mut arena, form, &FormDataOptions::default(), &mut ()).unwrap();
        assert_eq!(data.num_cell_domains, 2);
        assert_eq!(data.num_interior_facet_domains, 3);
        let groups = data.integral_data
            .iter()
            .map(|data| (data.integral_type, data.domain_id, data.integrals.len()))
            .collect::<Vec<_>>();
        assert_eq!(groups, vec![
            (IntegralType::Cell, 0, 1),
            (IntegralType::Cell, 1, 2),
            (IntegralType::InteriorFacet, 2, 1),
        ]);
        assert_eq!(data.num_integrals(IntegralType::Cell), 3);
    }

    #[test]
    fn signature_is_shared_across_arenas() {
        let mut first = Arena::new();
        let (form, options) = bilinear(&mut first);
        let first = FormData::from_form(&mut first, form, &options, &mut ()).unwrap();

        let mut second = Arena::new();
        for _ in 0..3 {
            second.coefficient(element());
        }
        let (form, options) = bilinear(&mut second);
        let second = FormData::from_form(&mut second, form, &options, &mut ()).unwrap();
        assert_eq!(first.signature, second.signature);
    }
}
