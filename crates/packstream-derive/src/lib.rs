//! `#[derive(Record)]` for packstream.
//!
//! Emits `Record`, `Encode` and `Decode` impls for a struct with named
//! fields. Public fields are described in declaration order; other fields
//! only mark the record as holding private state, unless they are
//! `#[msgpack(flatten)]`, in which case their fields are inlined.
//!
//! Attributes:
//! - `#[msgpack(tag = "name,omitempty,intern")]` on a field.
//! - `#[msgpack(flatten)]` on a field whose type is itself a record.
//! - `#[msgpack(tag = ",asArray")]` or `#[msgpack(tag = ",omitempty")]` on
//!   the struct.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DeriveInput, Error, Fields, LitStr,
    Visibility,
};

#[derive(Default)]
struct Options {
    tag: Option<String>,
    flatten: bool,
}

fn parse_options(attrs: &[Attribute]) -> Result<Options, Error> {
    let mut out = Options::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("msgpack")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") {
                let lit: LitStr = meta.value()?.parse()?;
                out.tag = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("flatten") {
                out.flatten = true;
                Ok(())
            } else {
                Err(meta.error("expected `tag = \"...\"` or `flatten`"))
            }
        })?;
    }
    Ok(out)
}

#[proc_macro_derive(Record, attributes(msgpack))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_record(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_record(input: DeriveInput) -> Result<TokenStream2, Error> {
    let root: syn::Path = parse_quote!(::packstream);
    let ident = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            other => {
                return Err(Error::new(
                    other.span(),
                    "Record needs a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new(
                input.span(),
                "Record can only be derived for structs",
            ))
        }
    };

    let record_opts = parse_options(&input.attrs)?;
    if record_opts.flatten {
        return Err(Error::new(input.span(), "`flatten` applies to fields only"));
    }

    let mut steps = Vec::new();
    if let Some(tag) = &record_opts.tag {
        steps.push(quote!(table.record_tag(#tag);));
    }
    let mut private = false;
    for field in fields {
        let opts = parse_options(&field.attrs)?;
        let Some(name) = &field.ident else {
            continue;
        };
        let declared = name.unraw().to_string();
        let ty = &field.ty;
        let tag = opts.tag.unwrap_or_default();
        if opts.flatten {
            steps.push(quote! {
                table.inline::<#ty>(#declared, #tag, |r: &Self| &r.#name, |r: &mut Self| &mut r.#name);
            });
        } else if matches!(field.vis, Visibility::Public(_)) {
            steps.push(quote! {
                table.field::<#ty>(#declared, #tag, |r: &Self| &r.#name, |r: &mut Self| &mut r.#name);
            });
        } else {
            private = true;
        }
    }
    if private {
        steps.push(quote!(table.private_state();));
    }

    let mut generics = input.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(parse_quote!(#root::Encode));
        param.bounds.push(parse_quote!(#root::Decode));
        param.bounds.push(parse_quote!('static));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let mut where_clause = where_clause.cloned().unwrap_or_else(|| parse_quote!(where));
    where_clause
        .predicates
        .push(parse_quote!(#ident #ty_generics: ::core::default::Default));

    Ok(quote! {
        impl #impl_generics #root::record::Record for #ident #ty_generics #where_clause {
            fn describe(table: &mut #root::record::RecordBuilder<Self>) {
                #(#steps)*
            }
        }

        impl #impl_generics #root::Encode for #ident #ty_generics #where_clause {
            fn encode(&self, enc: &mut #root::Encoder<'_>) -> #root::Result<()> {
                #root::record::encode_record(self, enc)
            }

            fn is_empty_value(&self) -> bool {
                #root::record::is_empty_record(self)
            }
        }

        impl #impl_generics #root::Decode for #ident #ty_generics #where_clause {
            fn decode(dec: &mut #root::Decoder<'_>) -> #root::Result<Self> {
                #root::record::decode_record(dec)
            }
        }
    })
}
