use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, GenericArgument, LitStr, PathArguments, Type};

use crate::{last_segment, named_fields};

/// Wire element of a field: a primitive name or a nested message type.
enum Element<'a> {
    Primitive(String),
    Message(&'a Type),
}

pub(crate) fn derive_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;
    let fields = named_fields(input, "BagMessage")?;

    let mut type_name: Option<String> = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("bag") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("type_name") {
                let value: LitStr = meta.value()?.parse()?;
                type_name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unknown bag attribute (expected type_name)"))
            }
        })?;
    }
    let type_name = type_name.ok_or_else(|| {
        syn::Error::new_spanned(name, "missing #[bag(type_name = \"package/Type\")]")
    })?;
    if !type_name.contains('/') {
        return Err(syn::Error::new_spanned(
            name,
            format!("type_name '{type_name}' must have the form 'package/Type'"),
        ));
    }

    let mut field_tokens = Vec::new();
    let mut dependency_tokens = Vec::new();

    for field in fields {
        let field_name = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let field_name_str = field_name.to_string();

        let mut wire: Option<String> = None;
        for attr in &field.attrs {
            if !attr.path().is_ident("bag") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("wire") {
                    let value: LitStr = meta.value()?.parse()?;
                    wire = Some(value.value());
                    Ok(())
                } else {
                    Err(meta.error("unknown bag field attribute (expected wire)"))
                }
            })?;
        }

        let (element_ty, collection) = split_collection(&field.ty)?;
        let element = match wire {
            Some(w) => Element::Primitive(w),
            None => classify(element_ty)?,
        };

        let element_name = match &element {
            Element::Primitive(p) => quote! { #p },
            Element::Message(ty) => {
                dependency_tokens.push(quote! {
                    <#ty as bag_api::message::BagMessage>::collect_schemas(out);
                });
                quote! { <#ty as bag_api::message::BagMessage>::TYPE_NAME }
            }
        };

        let field_type = match collection {
            Collection::Single => quote! { bag_api::schema::FieldType::new(#element_name) },
            Collection::Sequence => {
                quote! { bag_api::schema::FieldType::sequence(#element_name) }
            }
            Collection::Array(len) => {
                quote! { bag_api::schema::FieldType::array(#element_name, (#len) as usize) }
            }
        };

        field_tokens.push(quote! {
            bag_api::schema::Field::new(#field_name_str, #field_type)
        });
    }

    Ok(quote! {
        impl bag_api::message::BagMessage for #name {
            const TYPE_NAME: &'static str = #type_name;

            fn schema() -> bag_api::schema::Schema {
                bag_api::schema::Schema::new(vec![
                    #(#field_tokens),*
                ])
            }

            fn collect_dependencies(
                out: &mut ::std::collections::BTreeMap<
                    ::std::string::String,
                    bag_api::schema::Schema,
                >,
            ) {
                let _ = &out;
                #(#dependency_tokens)*
            }
        }
    })
}

enum Collection<'a> {
    Single,
    Sequence,
    Array(&'a syn::Expr),
}

/// Peel one level of `Vec<T>` or `[T; N]`.
fn split_collection(ty: &Type) -> Result<(&Type, Collection<'_>), syn::Error> {
    if let Type::Array(arr) = ty {
        reject_nested(&arr.elem)?;
        return Ok((&arr.elem, Collection::Array(&arr.len)));
    }
    if let Some(seg) = last_segment(ty) {
        if seg.ident == "Vec" {
            let inner = match &seg.arguments {
                PathArguments::AngleBracketed(args) => args.args.iter().find_map(|a| match a {
                    GenericArgument::Type(t) => Some(t),
                    _ => None,
                }),
                _ => None,
            };
            let inner =
                inner.ok_or_else(|| syn::Error::new_spanned(ty, "Vec without element type"))?;
            reject_nested(inner)?;
            return Ok((inner, Collection::Sequence));
        }
    }
    Ok((ty, Collection::Single))
}

fn reject_nested(elem: &Type) -> Result<(), syn::Error> {
    let nested = matches!(elem, Type::Array(_))
        || last_segment(elem).is_some_and(|seg| seg.ident == "Vec");
    if nested {
        return Err(syn::Error::new_spanned(
            elem,
            "nested collections have no wire representation; wrap the inner one in a message",
        ));
    }
    Ok(())
}

fn classify(ty: &Type) -> Result<Element<'_>, syn::Error> {
    let seg = last_segment(ty)
        .ok_or_else(|| syn::Error::new_spanned(ty, "unsupported type for BagMessage"))?;
    let primitive = match seg.ident.to_string().as_str() {
        "bool" => "bool",
        "i8" => "int8",
        "u8" => "uint8",
        "i16" => "int16",
        "u16" => "uint16",
        "i32" => "int32",
        "u32" => "uint32",
        "i64" => "int64",
        "u64" => "uint64",
        "f32" => "float32",
        "f64" => "float64",
        "String" => "string",
        "Option" | "Box" | "HashMap" | "BTreeMap" | "char" | "usize" | "isize" => {
            return Err(syn::Error::new_spanned(
                ty,
                "type has no wire representation in a bag message",
            ));
        }
        _ => return Ok(Element::Message(ty)),
    };
    Ok(Element::Primitive(primitive.to_string()))
}
