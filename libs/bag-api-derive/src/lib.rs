use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod bag_message;
mod config_params;

/// Derive macro for format plugin config parameter declarations.
///
/// Generates two methods on the annotated struct:
///
/// - `config_params() -> Vec<ConfigParam>`: parameter declarations for FFI export.
/// - `from_config(&ConfigValues) -> Result<Self, PluginError>`: reads typed values.
///
/// The struct must implement `Default` (defaults are used for non-required params).
///
/// # Example
///
/// ```ignore
/// #[derive(ConfigParams, Default)]
/// pub struct JsonConfig {
///     #[param(description = "Indent serialized output")]
///     pub pretty: bool,
/// }
/// ```
///
/// Supported field types: `bool`, `i64`, `u64`, `usize`, `f64`, `String`.
#[proc_macro_derive(ConfigParams, attributes(param))]
pub fn derive_config_params(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match config_params::derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derive macro binding a struct to a wire type name and schema.
///
/// Implements `bag_api::message::BagMessage`:
///
/// - `TYPE_NAME` from `#[bag(type_name = "package/Type")]`.
/// - `schema()`: one field per struct field, in declaration order.
/// - `collect_dependencies()`: registers nested message types.
///
/// Field types map as follows: `bool`, `i8`..`u64`, `f32`, `f64`, `String`
/// to the matching primitives; `Vec<T>` to a sequence; `[T; N]` to a fixed
/// array; any other type to a nested message (it must implement `BagMessage`).
/// `#[bag(wire = "byte")]` overrides the primitive of a field (e.g. `byte`
/// or `char` for a `u8`).
///
/// ```ignore
/// #[derive(BagMessage, Serialize, Deserialize)]
/// #[bag(type_name = "geometry/Polygon")]
/// pub struct Polygon {
///     pub points: Vec<Point>,
/// }
/// ```
#[proc_macro_derive(BagMessage, attributes(bag))]
pub fn derive_bag_message(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match bag_message::derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Named fields of a struct, or an error naming the derive.
fn named_fields<'a>(
    input: &'a DeriveInput,
    derive: &str,
) -> Result<&'a syn::punctuated::Punctuated<syn::Field, syn::token::Comma>, syn::Error> {
    match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                format!("{derive} only supports structs with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            format!("{derive} only supports structs"),
        )),
    }
}

/// Extract the last path segment of a type (e.g. `u64`, `String`, `Vec`).
fn last_segment(ty: &syn::Type) -> Option<&syn::PathSegment> {
    match ty {
        syn::Type::Path(type_path) => type_path.path.segments.last(),
        // `$ty:ty` fragments from macro_rules arrive wrapped in an invisible group.
        syn::Type::Group(group) => last_segment(&group.elem),
        _ => None,
    }
}
