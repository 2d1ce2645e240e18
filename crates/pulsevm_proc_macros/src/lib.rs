use proc_macro::TokenStream;
use syn::{DeriveInput, Error, parse_macro_input};

mod internal;
mod num_bytes;
mod read;
mod write;

/// Derives `pulsevm_serialization::Read`, decoding fields in declaration order.
#[proc_macro_derive(Read)]
pub fn derive_read(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    read::expand(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// Derives `pulsevm_serialization::Write`, encoding fields in declaration order.
#[proc_macro_derive(Write)]
pub fn derive_write(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    write::expand(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// Derives `pulsevm_serialization::NumBytes` as the sum of the field sizes.
#[proc_macro_derive(NumBytes)]
pub fn derive_num_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    num_bytes::expand(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}
