use std::str::FromStr;

use proc_macro::TokenStream;
use proc_macro2::Literal;
use pulsevm_name::Name;
use quote::quote;
use syn::{LitStr, parse_macro_input};

/// Encodes a string literal as a name at compile time, yielding its `u64` value.
#[proc_macro]
pub fn name(input: TokenStream) -> TokenStream {
    let literal = parse_macro_input!(input as LitStr);
    match Name::from_str(&literal.value()) {
        Ok(name) => {
            let value = Literal::u64_suffixed(name.as_u64());
            quote!(#value).into()
        }
        Err(e) => syn::Error::new(literal.span(), e)
            .into_compile_error()
            .into(),
    }
}
