use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_quote};

use crate::internal::{add_bound, field_accessors, struct_fields};

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let fields = struct_fields(&input)?;
    let name = &input.ident;
    let generics = add_bound(
        input.generics.clone(),
        parse_quote!(pulsevm_serialization::Write),
    );
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let writes = field_accessors(fields).into_iter().map(|access| {
        quote! { pulsevm_serialization::Write::write(&#access, bytes, pos)?; }
    });

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics pulsevm_serialization::Write for #name #ty_generics #where_clause {
            #[inline]
            fn write(
                &self,
                bytes: &mut [u8],
                pos: &mut usize,
            ) -> Result<(), pulsevm_serialization::WriteError> {
                #(#writes)*
                Ok(())
            }
        }
    })
}
