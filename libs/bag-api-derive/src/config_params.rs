use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr};

use crate::{last_segment, named_fields};

pub(crate) fn derive_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;
    let fields = named_fields(input, "ConfigParams")?;

    let mut config_param_tokens = Vec::new();
    let mut from_config_tokens = Vec::new();

    for field in fields {
        let field_name = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let field_name_str = field_name.to_string();
        let field_ty = &field.ty;

        // Parse #[param(...)] attribute.
        let mut description_str: Option<String> = None;
        let mut required = false;

        for attr in &field.attrs {
            if !attr.path().is_ident("param") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("description") {
                    let value: LitStr = meta.value()?.parse()?;
                    description_str = Some(value.value());
                    Ok(())
                } else if meta.path.is_ident("required") {
                    required = true;
                    Ok(())
                } else {
                    Err(meta.error("unknown param attribute (expected description, required)"))
                }
            })?;
        }

        let description_str = description_str.ok_or_else(|| {
            syn::Error::new_spanned(field_name, "missing #[param(description = \"...\")]")
        })?;

        let ty_name = last_segment(field_ty)
            .map(|seg| seg.ident.to_string())
            .ok_or_else(|| syn::Error::new_spanned(field_ty, "unsupported type for ConfigParams"))?;

        // (ParamType variant, ParamValue built from the default, getter, conversion)
        let (param_type, default_value, getter, convert) = match ty_name.as_str() {
            "u64" => (
                quote! { U64 },
                quote! { bag_api::config::ParamValue::U64(__defaults.#field_name) },
                quote! { get_u64 },
                quote! { v },
            ),
            "usize" => (
                quote! { U64 },
                quote! { bag_api::config::ParamValue::U64(__defaults.#field_name as u64) },
                quote! { get_u64 },
                quote! { v as usize },
            ),
            "i64" => (
                quote! { I64 },
                quote! { bag_api::config::ParamValue::I64(__defaults.#field_name) },
                quote! { get_i64 },
                quote! { v },
            ),
            "f64" => (
                quote! { F64 },
                quote! { bag_api::config::ParamValue::F64(__defaults.#field_name) },
                quote! { get_f64 },
                quote! { v },
            ),
            "bool" => (
                quote! { Bool },
                quote! { bag_api::config::ParamValue::Bool(__defaults.#field_name) },
                quote! { get_bool },
                quote! { v },
            ),
            "String" => (
                quote! { Str },
                quote! { bag_api::config::ParamValue::Str(__defaults.#field_name.clone()) },
                quote! { get_str },
                quote! { v.to_string() },
            ),
            _ => {
                return Err(syn::Error::new_spanned(
                    field_ty,
                    format!(
                        "unsupported type '{ty_name}' (expected u64, i64, f64, bool, String, usize)"
                    ),
                ));
            }
        };

        let default_expr = if required {
            quote! { None }
        } else {
            quote! { Some(#default_value) }
        };

        config_param_tokens.push(quote! {
            bag_api::config::ConfigParam {
                name: #field_name_str.to_string(),
                param_type: bag_api::config::ParamType::#param_type,
                required: #required,
                default: #default_expr,
                description: #description_str.to_string(),
            }
        });

        from_config_tokens.push(if required {
            quote! {
                result.#field_name = match __config.#getter(#field_name_str) {
                    Some(v) => #convert,
                    None => {
                        return Err(bag_api::error::PluginError::config(format!(
                            "missing required parameter '{}'",
                            #field_name_str
                        )));
                    }
                };
            }
        } else {
            quote! {
                if let Some(v) = __config.#getter(#field_name_str) {
                    result.#field_name = #convert;
                }
            }
        });
    }

    Ok(quote! {
        impl #name {
            pub fn config_params() -> Vec<bag_api::config::ConfigParam> {
                let __defaults = Self::default();
                vec![
                    #(#config_param_tokens),*
                ]
            }

            pub fn from_config(
                __config: &bag_api::config::ConfigValues,
            ) -> Result<Self, bag_api::error::PluginError> {
                let mut result = Self::default();
                #(#from_config_tokens)*
                Ok(result)
            }
        }
    })
}
