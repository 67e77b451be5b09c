// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

#![deny(
  missing_copy_implementations,
  missing_debug_implementations,
  trivial_casts,
  trivial_numeric_casts,
  unsafe_code,
  unstable_features,
  unused_import_braces,
  unused_qualifications,
  unused_results,
)]
#![warn(
  future_incompatible,
  rust_2018_compatibility,
  rust_2018_idioms,
)]

//! A crate providing custom derive functionality for the `evpump`
//! crate.

extern crate proc_macro;

use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as Tokens;
use quote::quote;
use syn::parse2;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::Attribute;
use syn::Data;
use syn::DeriveInput;
use syn::Fields;
use syn::Meta;
use syn::NestedMeta;


/// An enum to decide whether or not to create a default implementation of type::new().
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum New {
  Default,
  None,
}


/// The options that can be provided via `#[evpump(...)]`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Attrs {
  new: New,
  drag_excluded: bool,
}

impl Default for Attrs {
  fn default() -> Self {
    Self {
      new: New::None,
      drag_excluded: false,
    }
  }
}


/// The error type used internally by this module.
#[derive(Debug)]
struct Error(String);

impl Display for Error {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "{}", self.0)
  }
}

impl From<String> for Error {
  fn from(string: String) -> Error {
    Error(string)
  }
}

impl From<&'static str> for Error {
  fn from(string: &'static str) -> Error {
    Error(string.to_string())
  }
}

type Result<T> = std::result::Result<T, Error>;


/// Custom derive functionality for the `evpump::Source` trait.
///
/// Using this macro a default implementation of the `evpump::Source`
/// trait can be created. `evpump::Source` is a unification of the
/// `evpump::Object` and `evpump::Handleable` traits plus a set of
/// capabilities. Only the implementation of the former is generated,
/// because `evpump::Handleable` most likely needs customization.
///
/// The struct is required to have an `id: evpump::Id` field. The
/// `#[evpump(drag_excluded)]` attribute marks the source as exempt from
/// having its mouse events discarded during drag operations, while
/// `#[evpump(default_new)]` provides a `new` constructor taking the
/// `Id`.
///
/// This macro roughly expands to the following code:
///
/// ```rust
/// # #[derive(Debug)]
/// # struct TestSource {
/// #   id: evpump::Id,
/// # }
/// impl evpump::Object for TestSource {
///   fn id(&self) -> evpump::Id {
///     self.id
///   }
/// }
///
/// impl evpump::Source for TestSource {
///   fn is_drag_excluded(&self) -> bool {
///     false
///   }
/// }
/// # impl evpump::Handleable for TestSource {}
/// ```
#[proc_macro_derive(Source, attributes(evpump))]
pub fn source(input: TokenStream) -> TokenStream {
  match expand_source(input) {
    Ok(tokens) => tokens,
    Err(error) => panic!("{}", error),
  }
}

fn expand_source(input: TokenStream) -> Result<TokenStream> {
  let input = parse2::<DeriveInput>(input.into()).map_err(|_| "unable to parse input")?;
  let attrs = parse_source_attributes(&input.attrs)?;
  let tokens = expand_source_input(&attrs, &input)?;
  Ok(tokens.into())
}

/// Parse the macro's attributes.
fn parse_source_attributes(attributes: &[Attribute]) -> Result<Attrs> {
  attributes
    .iter()
    .try_fold(Attrs::default(), |attrs, attribute| parse_source_attribute(attribute, attrs))
}

/// Parse a single attribute, e.g., #[evpump(default_new)].
fn parse_source_attribute(attribute: &Attribute, attrs: Attrs) -> Result<Attrs> {
  // We don't care about the other meta data elements, inner/outer,
  // doc/non-doc, it's all fine by us.
  if !attribute.path.is_ident("evpump") {
    return Ok(attrs)
  }

  match attribute.parse_meta() {
    Ok(Meta::List(list)) => parse_evpump_attributes(&list.nested, attrs),
    Ok(_) => Err(Error::from("expected attribute list of the form #[evpump(...)]")),
    Err(_) => Err(Error::from("unable to parse #[evpump(...)] attribute")),
  }
}

/// Parse a #[evpump(list...)] attribute list.
fn parse_evpump_attributes(list: &Punctuated<NestedMeta, Comma>, attrs: Attrs) -> Result<Attrs> {
  // We do not simply want to silently ignore unknown attributes, so as
  // to inform the user about any errors early on.
  list
    .iter()
    .try_fold(attrs, |attrs, item| parse_evpump_attribute(item, attrs))
}

/// Parse a single item in a #[evpump(list...)] attribute list.
fn parse_evpump_attribute(item: &NestedMeta, mut attrs: Attrs) -> Result<Attrs> {
  match item {
    NestedMeta::Meta(Meta::Path(path)) if path.is_ident("default_new") => {
      attrs.new = New::Default;
      Ok(attrs)
    },
    NestedMeta::Meta(Meta::Path(path)) if path.is_ident("drag_excluded") => {
      attrs.drag_excluded = true;
      Ok(attrs)
    },
    NestedMeta::Meta(meta) => {
      let path = meta.path();
      Err(Error::from(format!("unsupported attribute: {}", quote! {#path})))
    },
    NestedMeta::Lit(_) => Err(Error::from("unsupported literal")),
  }
}

/// Expand the input with the implementation of the required traits.
fn expand_source_input(attrs: &Attrs, input: &DeriveInput) -> Result<Tokens> {
  match input.data {
    Data::Struct(ref data) => {
      check_struct_fields(&data.fields)?;
      Ok(expand_source_traits(attrs, input))
    },
    _ => Err(Error::from("#[derive(Source)] is only defined for structs")),
  }
}

/// Check the fields of the user's struct for required attributes.
// Note that we only check for the names of the required fields, not for
// the types. Checking types is cumbersome and best-effort anyway as we
// are working on tokens without context (a user could have a field of
// type Id but that could map to ::foo::Id and not ::evpump::Id).
fn check_struct_fields(fields: &Fields) -> Result<()> {
  let id = ("id", "::evpump::Id");

  for (req_field, req_type) in &[id] {
    let _ = fields
      .iter()
      .find(|field| {
        if let Some(ref ident) = field.ident {
          ident == req_field
        } else {
          false
        }
      })
      .ok_or_else(|| Error::from(format!("struct field {req_field}: {req_type} not found")))?;
  }
  Ok(())
}

/// Expand the struct input with the implementation of the required traits.
fn expand_source_traits(attrs: &Attrs, input: &DeriveInput) -> Tokens {
  let new_impl = expand_new_impl(attrs.new, input);
  let object = expand_object_trait(input);
  let source = expand_source_trait(attrs.drag_excluded, input);

  quote! {
    #new_impl
    #object
    #source
  }
}

/// Expand an implementation of Type::new() for the struct.
fn expand_new_impl(new: New, input: &DeriveInput) -> Tokens {
  let name = &input.ident;
  let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

  match new {
    New::Default => {
      quote! {
        #[allow(dead_code)]
        impl #impl_generics #name #ty_generics #where_clause {
          pub fn new(id: ::evpump::Id) -> Self {
            #name {
              id,
            }
          }
        }
      }
    },
    New::None => quote! {},
  }
}

/// Expand an implementation for the `evpump::Object` trait.
fn expand_object_trait(input: &DeriveInput) -> Tokens {
  let name = &input.ident;
  let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

  quote! {
    impl #impl_generics ::evpump::Object for #name #ty_generics #where_clause {
      fn id(&self) -> ::evpump::Id {
        self.id
      }
    }
  }
}

/// Expand an implementation for the `evpump::Source` trait.
fn expand_source_trait(drag_excluded: bool, input: &DeriveInput) -> Tokens {
  let name = &input.ident;
  let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

  quote! {
    impl #impl_generics ::evpump::Source for #name #ty_generics #where_clause {
      fn is_drag_excluded(&self) -> bool {
        #drag_excluded
      }
    }
  }
}

/// Custom derive functionality for the `evpump::Handleable` trait.
///
/// Using this macro a default implementation of the
/// `evpump::Handleable` trait can be created, which accepts and ignores
/// every event. This functionality is mostly used in quick
/// prototyping/testing scenarios, because most sources need a custom
/// event handler.
///
/// This macro roughly expands to the following code:
///
/// ```rust
/// # #[derive(Debug)]
/// # struct TestSource {
/// #   id: evpump::Id,
/// # }
/// impl evpump::Handleable for TestSource {}
/// # fn main() {}
/// ```
#[proc_macro_derive(Handleable)]
pub fn handleable(input: TokenStream) -> TokenStream {
  match expand_handleable(input) {
    Ok(tokens) => tokens,
    Err(error) => panic!("{}", error),
  }
}

fn expand_handleable(input: TokenStream) -> Result<TokenStream> {
  let input = parse2::<DeriveInput>(input.into()).map_err(|_| "unable to parse input")?;
  let tokens = expand_handleable_input(&input)?;
  Ok(tokens.into())
}

/// Expand the input with the implementation of the required traits.
fn expand_handleable_input(input: &DeriveInput) -> Result<Tokens> {
  match input.data {
    Data::Struct(_) => {
      let name = &input.ident;
      let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

      Ok(quote! {
        impl #impl_generics ::evpump::Handleable for #name #ty_generics #where_clause {}
      })
    },
    _ => Err(Error::from("#[derive(Handleable)] is only defined for structs")),
  }
}
