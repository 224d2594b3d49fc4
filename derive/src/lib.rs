extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields};

/// Struct-level attributes parsed from `#[cbf(...)]` annotations.
#[derive(Debug, Default)]
struct StructAttributes {
    value_kind: bool,
    qualifier: Option<String>,
}

/// Field-level attributes parsed from `#[cbf(...)]` annotations.
///
/// * `skip` — the field is excluded from the serializable member list; on
///   decode it is restored with `Default::default()`.
/// * `rename` — wire member name used instead of the Rust field name.
#[derive(Debug, Default)]
struct FieldAttributes {
    skip: bool,
    rename: Option<String>,
}

fn parse_struct_attributes(attrs: &[Attribute]) -> syn::Result<StructAttributes> {
    let mut parsed = StructAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("cbf") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("value_kind") {
                parsed.value_kind = true;
                Ok(())
            } else if meta.path.is_ident("qualifier") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                parsed.qualifier = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unknown struct attribute (expected value_kind or qualifier)"))
            }
        })?;
    }
    Ok(parsed)
}

fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut parsed = FieldAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("cbf") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                parsed.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                parsed.rename = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unknown field attribute (expected skip or rename)"))
            }
        })?;
    }
    Ok(parsed)
}

/// Derives `Reflect`, `ToItem`, and `FromItem` for a named-field struct.
///
/// The type's wire identity is the struct name qualified by the defining
/// `module_path!()` (overridable with `#[cbf(qualifier = "ns")]`). The
/// member list is the non-skipped fields in declaration order, which is the
/// order the encoder and decoder align record values by.
#[proc_macro_derive(Reflect, attributes(cbf))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_reflect(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand_reflect(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Reflect supports structs with named fields only",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Reflect supports structs with named fields only",
            ))
        }
    };

    let struct_attrs = parse_struct_attributes(&input.attrs)?;
    let name = &input.ident;
    let name_str = name.to_string();
    let value_kind = struct_attrs.value_kind;
    let qualifier = match &struct_attrs.qualifier {
        Some(q) => quote! { #q },
        None => quote! { ::core::module_path!() },
    };

    let mut member_names = Vec::new();
    let mut member_idents = Vec::new();
    let mut skipped_idents = Vec::new();
    for field in fields {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        let attrs = parse_field_attributes(&field.attrs)?;
        if attrs.skip {
            skipped_idents.push(ident);
            continue;
        }
        member_names.push(attrs.rename.unwrap_or_else(|| ident.to_string()));
        member_idents.push(ident);
    }

    Ok(quote! {
        impl ::cbf_encoder::Reflect for #name {
            fn type_key() -> ::cbf_encoder::TypeKey {
                ::cbf_encoder::TypeKey::new(#name_str, #qualifier)
            }

            fn is_value_kind() -> bool {
                #value_kind
            }

            fn members() -> &'static [&'static str] {
                &[#(#member_names),*]
            }
        }

        impl ::cbf_encoder::ToItem for #name {
            fn to_item(&self) -> ::cbf_encoder::Result<::cbf_encoder::Item> {
                let mut record = ::cbf_encoder::RecordItem::new(
                    <Self as ::cbf_encoder::Reflect>::type_key(),
                );
                #(
                    record.set(
                        #member_names,
                        ::cbf_encoder::ToItem::to_item(&self.#member_idents)?,
                    );
                )*
                Ok(::cbf_encoder::Item::Record(record))
            }

            fn element_tag() -> ::cbf_encoder::TypeTag {
                ::cbf_encoder::TypeTag::Record
            }

            fn element_key() -> ::cbf_encoder::TypeKey {
                <Self as ::cbf_encoder::Reflect>::type_key()
            }
        }

        impl ::cbf_encoder::FromItem for #name {
            fn from_item(item: ::cbf_encoder::Item) -> ::cbf_encoder::Result<Self> {
                match item {
                    ::cbf_encoder::Item::Record(mut record) => Ok(Self {
                        #(
                            #member_idents: ::cbf_encoder::FromItem::from_item(
                                record.fields.shift_remove(#member_names).ok_or_else(|| {
                                    ::cbf_encoder::EncoderError::Decode(::std::format!(
                                        "member '{}' missing on {}",
                                        #member_names,
                                        #name_str,
                                    ))
                                })?,
                            )?,
                        )*
                        #(
                            #skipped_idents: ::core::default::Default::default(),
                        )*
                    }),
                    other => Err(::cbf_encoder::EncoderError::Decode(::std::format!(
                        "expected a {} record, got a {:?} value",
                        #name_str,
                        other.tag(),
                    ))),
                }
            }
        }
    })
}
