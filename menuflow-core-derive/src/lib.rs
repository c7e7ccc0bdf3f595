//! Derive macros for menuflow-core typed parameter sets.
//!
//! This crate provides the `#[derive(ParameterSet)]` macro for automatically
//! implementing the `ParameterSet` trait on node parameter structs.
//!
//! # Example
//!
//! ```ignore
//! use menuflow_core::ParameterSet;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, ParameterSet)]
//! #[parameters(kind = "Filter")]
//! struct FilterParams {
//!     step: usize,
//!
//!     #[param(name = "step_name")]
//!     label: String,
//!
//!     #[param(skip)]
//!     scratch: Vec<String>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Error, Fields, LitStr};

/// Derive macro for implementing the `ParameterSet` trait.
///
/// # Attributes
///
/// ## Struct-level
///
/// - `#[parameters(kind = "...")]` - Required. Names the node kind these
///   parameters configure.
///
/// ## Field-level
///
/// - `#[param(name = "...")]` - Report the field under a different name.
/// - `#[param(skip)]` - Leave the field out of the reported entries.
///
/// # Generated Code
///
/// The macro generates a `ParameterSet` implementation whose `entries()`
/// lists every non-skipped field, in declaration order, as a JSON value.
/// Every reported field type must implement `serde::Serialize`.
#[proc_macro_derive(ParameterSet, attributes(parameters, param))]
pub fn derive_parameter_set(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_parameter_set_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_parameter_set_impl(input: DeriveInput) -> Result<TokenStream2, Error> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let kind = parse_parameters_attrs(&input)?.kind.ok_or_else(|| {
        Error::new(
            input.ident.span(),
            "Missing #[parameters(kind = \"...\")] attribute",
        )
    })?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(Error::new(
                    input.ident.span(),
                    "ParameterSet can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new(
                input.ident.span(),
                "ParameterSet can only be derived for structs",
            ))
        }
    };

    let mut entries = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let attrs = parse_param_attrs(field)?;
        if attrs.skip {
            continue;
        }
        let reported = attrs.name.unwrap_or_else(|| field_name.to_string());
        entries.push(quote! {
            ::menuflow_core::params::ParamEntry::new(
                #reported,
                ::serde_json::to_value(&self.#field_name)
                    .unwrap_or(::serde_json::Value::Null),
            )
        });
    }

    if entries.is_empty() {
        return Err(Error::new(
            name.span(),
            "ParameterSet must report at least one field",
        ));
    }

    Ok(quote! {
        impl #impl_generics ::menuflow_core::params::ParameterSet for #name #ty_generics #where_clause {
            fn kind(&self) -> &'static str {
                #kind
            }

            fn entries(&self) -> Vec<::menuflow_core::params::ParamEntry> {
                vec![
                    #(#entries),*
                ]
            }
        }
    })
}

/// Parsed struct-level attributes.
#[derive(Default)]
struct ParametersAttrs {
    kind: Option<String>,
}

/// Parse #[parameters(...)] attributes.
fn parse_parameters_attrs(input: &DeriveInput) -> Result<ParametersAttrs, Error> {
    let mut result = ParametersAttrs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("parameters") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("kind") {
                let value: LitStr = meta.value()?.parse()?;
                result.kind = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unknown parameters attribute, expected 'kind'"))
            }
        })?;
    }

    Ok(result)
}

/// Parsed field attributes.
#[derive(Default)]
struct ParamAttrs {
    name: Option<String>,
    skip: bool,
}

/// Parse #[param(...)] attributes on a field.
fn parse_param_attrs(field: &syn::Field) -> Result<ParamAttrs, Error> {
    let mut result = ParamAttrs::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("param") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                result.name = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                result.skip = true;
                Ok(())
            } else {
                Err(meta.error("unknown param attribute, expected 'name' or 'skip'"))
            }
        })?;
    }

    Ok(result)
}
