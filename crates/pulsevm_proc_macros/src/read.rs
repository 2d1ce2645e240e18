use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{DeriveInput, Fields, parse_quote, spanned::Spanned};

use crate::internal::{add_bound, struct_fields};

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let fields = struct_fields(&input)?;
    let name = &input.ident;
    let generics = add_bound(
        input.generics.clone(),
        parse_quote!(pulsevm_serialization::Read),
    );
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = match fields {
        Fields::Named(named) => {
            let reads = named.named.iter().map(|f| {
                let ident = &f.ident;
                let ty = &f.ty;
                quote_spanned! {f.span()=>
                    #ident: <#ty as pulsevm_serialization::Read>::read(bytes, pos)?,
                }
            });
            quote! { Ok(#name { #(#reads)* }) }
        }
        Fields::Unnamed(unnamed) => {
            let reads = unnamed.unnamed.iter().map(|f| {
                let ty = &f.ty;
                quote_spanned! {f.span()=>
                    <#ty as pulsevm_serialization::Read>::read(bytes, pos)?,
                }
            });
            quote! { Ok(#name(#(#reads)*)) }
        }
        Fields::Unit => quote! { Ok(#name) },
    };

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics pulsevm_serialization::Read for #name #ty_generics #where_clause {
            #[inline]
            fn read(
                bytes: &[u8],
                pos: &mut usize,
            ) -> Result<Self, pulsevm_serialization::ReadError> {
                #body
            }
        }
    })
}
