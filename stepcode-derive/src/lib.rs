//! # Stepcode Derive Macros
//!
//! This crate provides `#[derive(BinaryCodec)]` for `stepcode`. It generates the
//! wire encoding of user types from their shape:
//!
//! - **Structs** (records) encode their fields in declaration order.
//! - **Enums with payloads** (unions) encode the 0-based variant index as a
//!   varint, then the variant's fields. Unit variants carry no payload.
//! - **Fieldless enums with `#[repr(int)]`** encode as the underlying integer.
//!   Fieldless enums without an integer `repr` encode as an `i32`, the
//!   default enum base type.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    Attribute, Data, DataEnum, DataStruct, DeriveInput, Fields, GenericParam, Generics, Ident,
    Type, parse_macro_input, parse_quote,
};

/// Derives `stepcode::codec::BinaryCodec`.
///
/// Supported attribute: `#[stepcode(trivially_serializable)]` on a struct whose
/// fields are all trivially serializable. The struct must also be `#[repr(C)]`,
/// `Copy`, and derive the `zerocopy` traits `IntoBytes`, `FromBytes`,
/// `Immutable` and `KnownLayout`. Slices of it are then copied in bulk.
#[proc_macro_derive(BinaryCodec, attributes(stepcode))]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let trivial = parse_attributes(&input.attrs)?;
    let name = &input.ident;

    match &input.data {
        Data::Struct(data) => expand_record(name, &input.generics, data, trivial),
        Data::Enum(data) => {
            if trivial {
                return Err(syn::Error::new(
                    name.span(),
                    "trivially_serializable is only supported on structs",
                ));
            }
            let all_unit = data.variants.iter().all(|v| matches!(v.fields, Fields::Unit));
            if data.variants.is_empty() {
                return Err(syn::Error::new(
                    name.span(),
                    "BinaryCodec cannot be derived for an enum without variants",
                ));
            }
            if !all_unit {
                return expand_union(name, &input.generics, data);
            }
            let repr = repr_type(&input.attrs)?
                .unwrap_or_else(|| Ident::new("i32", Span::call_site()));
            expand_enum(name, &input.generics, data, &repr)
        }
        Data::Union(_) => Err(syn::Error::new(
            name.span(),
            "BinaryCodec cannot be derived for Rust unions",
        )),
    }
}

// --- Attribute parsing ---

fn parse_attributes(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut trivial = false;
    for attr in attrs {
        if attr.path().is_ident("stepcode") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("trivially_serializable") {
                    trivial = true;
                    return Ok(());
                }
                Err(meta.error("Unknown stepcode attribute key. Supported: trivially_serializable"))
            })?;
        }
    }
    Ok(trivial)
}

fn repr_type(attrs: &[Attribute]) -> syn::Result<Option<Ident>> {
    const INTS: [&str; 10] = [
        "u8", "u16", "u32", "u64", "usize", "i8", "i16", "i32", "i64", "isize",
    ];
    let mut found = None;
    for attr in attrs {
        if attr.path().is_ident("repr") {
            attr.parse_nested_meta(|meta| {
                if meta.input.peek(syn::token::Paren) {
                    let _args;
                    syn::parenthesized!(_args in meta.input);
                } else if let Some(ident) = meta.path.get_ident()
                    && INTS.contains(&ident.to_string().as_str())
                {
                    found = Some(ident.clone());
                }
                Ok(())
            })?;
        }
    }
    Ok(found)
}

// --- Shared pieces ---

fn add_codec_bounds(generics: &Generics) -> Generics {
    let mut generics = generics.clone();
    for param in &mut generics.params {
        if let GenericParam::Type(ty) = param {
            ty.bounds.push(parse_quote!(::stepcode::codec::BinaryCodec));
        }
    }
    generics
}

fn codec_impl(
    name: &Ident,
    generics: &Generics,
    write_body: TokenStream2,
    read_body: TokenStream2,
    extra: TokenStream2,
) -> TokenStream2 {
    let generics = add_codec_bounds(generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    quote! {
        impl #impl_generics ::stepcode::codec::BinaryCodec for #name #ty_generics #where_clause {
            fn write<__W: ::std::io::Write>(
                &self,
                stream: &mut ::stepcode::io::CodedOutputStream<__W>,
            ) -> ::stepcode::Result<()> {
                #write_body
            }

            fn read<__R: ::std::io::Read>(
                stream: &mut ::stepcode::io::CodedInputStream<__R>,
            ) -> ::stepcode::Result<Self> {
                #read_body
            }

            #extra
        }
    }
}

/// Bindings for the fields of a struct or variant, plus the pattern that
/// destructures them and the expression that rebuilds them from the stream.
struct FieldCodec {
    bindings: Vec<Ident>,
    pattern: TokenStream2,
    construct: TokenStream2,
    types: Vec<Type>,
}

fn field_codec(fields: &Fields) -> FieldCodec {
    let types: Vec<Type> = fields.iter().map(|f| f.ty.clone()).collect();
    let bindings: Vec<Ident> = (0..fields.len())
        .map(|i| Ident::new(&format!("__field{i}"), Span::call_site()))
        .collect();
    let reads = types.iter().map(|ty| {
        quote! { <#ty as ::stepcode::codec::BinaryCodec>::read(stream)? }
    });

    let (pattern, construct) = match fields {
        Fields::Named(named) => {
            let idents: Vec<&Ident> = named.named.iter().filter_map(|f| f.ident.as_ref()).collect();
            (
                quote! { { #(#idents: #bindings),* } },
                quote! { { #(#idents: #reads),* } },
            )
        }
        Fields::Unnamed(_) => (quote! { ( #(#bindings),* ) }, quote! { ( #(#reads),* ) }),
        Fields::Unit => (TokenStream2::new(), TokenStream2::new()),
    };

    FieldCodec { bindings, pattern, construct, types }
}

fn write_bindings(bindings: &[Ident]) -> TokenStream2 {
    quote! {
        #( ::stepcode::codec::BinaryCodec::write(#bindings, stream)?; )*
    }
}

// --- Records ---

fn expand_record(
    name: &Ident,
    generics: &Generics,
    data: &DataStruct,
    trivial: bool,
) -> syn::Result<TokenStream2> {
    let fields = field_codec(&data.fields);
    let pattern = &fields.pattern;
    let construct = &fields.construct;
    let writes = write_bindings(&fields.bindings);

    let write_body = quote! {
        let Self #pattern = self;
        #writes
        Ok(())
    };
    let read_body = quote! { Ok(Self #construct) };

    if !trivial {
        return Ok(codec_impl(name, generics, write_body, read_body, TokenStream2::new()));
    }

    if !generics.params.is_empty() {
        return Err(syn::Error::new(
            name.span(),
            "trivially_serializable structs cannot be generic",
        ));
    }

    let bulk = quote! {
        fn write_slice<__W: ::std::io::Write>(
            items: &[Self],
            stream: &mut ::stepcode::io::CodedOutputStream<__W>,
        ) -> ::stepcode::Result<()> {
            ::stepcode::codec::write_trivial_slice(items, stream)
        }

        fn read_vec<__R: ::std::io::Read>(
            count: usize,
            stream: &mut ::stepcode::io::CodedInputStream<__R>,
        ) -> ::stepcode::Result<::std::vec::Vec<Self>> {
            ::stepcode::codec::read_trivial_vec(count, stream)
        }
    };
    let codec = codec_impl(name, generics, write_body, read_body, bulk);

    let types = &fields.types;
    Ok(quote! {
        #codec

        impl ::stepcode::codec::TriviallySerializable for #name {}

        const _: () = {
            fn field<T: ::stepcode::codec::TriviallySerializable>() {}
            #[allow(dead_code)]
            fn all_fields() {
                #( field::<#types>(); )*
            }
        };
    })
}

// --- Unions ---

fn expand_union(name: &Ident, generics: &Generics, data: &DataEnum) -> syn::Result<TokenStream2> {
    let count = data.variants.len();
    let mut write_arms = Vec::with_capacity(count);
    let mut read_arms = Vec::with_capacity(count);

    for (index, variant) in data.variants.iter().enumerate() {
        let ident = &variant.ident;
        let fields = field_codec(&variant.fields);
        let pattern = &fields.pattern;
        let construct = &fields.construct;
        let writes = write_bindings(&fields.bindings);

        write_arms.push(quote! {
            Self::#ident #pattern => {
                ::stepcode::codec::write_union_index(stream, #index)?;
                #writes
            }
        });
        read_arms.push(quote! {
            #index => Self::#ident #construct,
        });
    }

    let label = name.to_string();
    let write_body = quote! {
        match self {
            #(#write_arms)*
        }
        Ok(())
    };
    let read_body = quote! {
        Ok(match ::stepcode::codec::read_union_index(stream, #count)? {
            #(#read_arms)*
            other => {
                return Err(::stepcode::StepcodeError::Format(::std::format!(
                    "invalid {} alternative {}", #label, other
                )));
            }
        })
    };
    Ok(codec_impl(name, generics, write_body, read_body, TokenStream2::new()))
}

// --- Enums ---

fn expand_enum(
    name: &Ident,
    generics: &Generics,
    data: &DataEnum,
    repr: &Ident,
) -> syn::Result<TokenStream2> {
    let variants: Vec<&Ident> = data.variants.iter().map(|v| &v.ident).collect();
    let label = name.to_string();

    let write_body = quote! {
        let value: #repr = match self {
            #( Self::#variants => Self::#variants as #repr, )*
        };
        ::stepcode::codec::BinaryCodec::write(&value, stream)
    };
    let read_body = quote! {
        let value = <#repr as ::stepcode::codec::BinaryCodec>::read(stream)?;
        #(
            if value == Self::#variants as #repr {
                return Ok(Self::#variants);
            }
        )*
        Err(::stepcode::StepcodeError::Format(::std::format!(
            "invalid {} value {}", #label, value
        )))
    };
    Ok(codec_impl(name, generics, write_body, read_body, TokenStream2::new()))
}
