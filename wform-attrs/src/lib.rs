mod error_kind;

use error_kind::ErrorKindTarget;
use proc_macro::TokenStream;
use quote::quote;
use syn::parse_macro_input;

/// Derives the [`ErrorKind`] trait for the given struct.
///
/// This trait can be derived for any struct with named fields, or for unit structs.
///
/// The information of the error is customized with the `error` attribute:
/// ```
/// use wform_attrs::ErrorKind;
/// use wform_error::ErrorKind;
///
/// #[derive(Debug, ErrorKind)]
/// #[error(
///     message = format!("`{}` cannot be negative", name),
///     help = "use the absolute value",
/// )]
/// pub struct Negative {
///     name: String,
/// }
///
/// let kind = Negative { name: "degree".to_string() };
/// assert_eq!(kind.message(), "`degree` cannot be negative");
/// assert_eq!(kind.help().as_deref(), Some("use the absolute value"));
/// ```
///
/// The following tags are available:
///
/// | Tag         | Description                                                                  |
/// | ----------- | ---------------------------------------------------------------------------- |
/// | `message`   | The message describing what went wrong.                                      |
/// | `help`      | Optional help text for the error, describing what the user can do to fix it. |
///
/// Each tag accepts an expression that should evaluate to something implementing
/// [`ToString`]. The expression is evaluated with the fields of the struct in scope, so they can
/// be used in the expression (tuple structs are not supported).
#[proc_macro_derive(ErrorKind, attributes(error))]
pub fn error_kind(item: TokenStream) -> TokenStream {
    let target = parse_macro_input!(item as ErrorKindTarget);
    let name = &target.name;
    quote! {
        impl ErrorKind for #name {
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            #target
        }
    }.into()
}
