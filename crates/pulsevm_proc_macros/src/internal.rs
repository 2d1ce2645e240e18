use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, GenericParam, Generics, Index, TypeParamBound};

pub fn struct_fields(input: &DeriveInput) -> syn::Result<&Fields> {
    match &input.data {
        Data::Struct(data) => Ok(&data.fields),
        Data::Enum(_) | Data::Union(_) => Err(Error::new(
            input.ident.span(),
            "serialization derives only support structs",
        )),
    }
}

/// Adds `bound` to every type parameter.
pub fn add_bound(mut generics: Generics, bound: TypeParamBound) -> Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(type_param) = param {
            type_param.bounds.push(bound.clone());
        }
    }
    generics
}

/// `self.field` or `self.0` for every field, in declaration order.
pub fn field_accessors(fields: &Fields) -> Vec<TokenStream> {
    match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .map(|f| {
                let ident = &f.ident;
                quote!(self.#ident)
            })
            .collect(),
        Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
            .map(|i| {
                let index = Index {
                    index: i as u32,
                    span: Span::call_site(),
                };
                quote!(self.#index)
            })
            .collect(),
        Fields::Unit => Vec::new(),
    }
}
