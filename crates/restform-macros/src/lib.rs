//! Proc macros for restform.
//!
//! Generated code refers to the `restform` facade crate, so depend on that
//! rather than on this crate directly.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod record;

/// Derive `restform::Record` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use restform::Record;
///
/// #[derive(serde::Serialize, Record)]
/// #[record(rename_all = "camelCase")]
/// struct Article {
///     id: u64,
///     published_at: String,
///     #[record(rename = "headline")]
///     title: String,
///     #[record(skip)]
///     draft_notes: String,
/// }
/// ```
///
/// Every field must implement `serde::Serialize`; its attribute value is the
/// field converted with `serde_json::to_value`.
///
/// # Attributes
///
/// - `#[record(rename_all = "...")]` on the struct - `camelCase`, `snake_case`,
///   `kebab-case`, `PascalCase` or `SCREAMING_SNAKE_CASE`
/// - `#[record(rename = "...")]` on a field - explicit attribute name
/// - `#[record(skip)]` on a field - not readable as an attribute
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match record::expand_record(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
