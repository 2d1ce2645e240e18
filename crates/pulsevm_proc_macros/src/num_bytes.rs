use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, parse_quote};

use crate::internal::{add_bound, field_accessors, struct_fields};

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let fields = struct_fields(&input)?;
    let name = &input.ident;
    let generics = add_bound(
        input.generics.clone(),
        parse_quote!(pulsevm_serialization::NumBytes),
    );
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let count = format_ident!("count");
    let sizes = field_accessors(fields).into_iter().map(|access| {
        quote! { #count += pulsevm_serialization::NumBytes::num_bytes(&#access); }
    });

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics pulsevm_serialization::NumBytes for #name #ty_generics #where_clause {
            #[inline]
            fn num_bytes(&self) -> usize {
                let mut #count = 0usize;
                #(#sizes)*
                #count
            }
        }
    })
}
