//! `Record` derive: attribute lookup by name for plain structs.
//!
//! ```ignore
//! #[derive(serde::Serialize, Record)]
//! #[record(rename_all = "camelCase")]
//! struct Article {
//!     id: u64,
//!     published_at: String,
//!     #[record(rename = "headline")]
//!     title: String,
//!     #[record(skip)]
//!     internal_notes: String,
//! }
//! ```
//!
//! Attributes are read by converting the field with `serde_json::to_value`;
//! a conversion failure is returned as an `AttributeError`.

use heck::{ToKebabCase, ToLowerCamelCase, ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr};

#[derive(Clone, Copy)]
enum RenameRule {
    Camel,
    Snake,
    Kebab,
    Pascal,
    ScreamingSnake,
}

impl RenameRule {
    fn parse(lit: &LitStr) -> syn::Result<Self> {
        match lit.value().as_str() {
            "camelCase" => Ok(RenameRule::Camel),
            "snake_case" => Ok(RenameRule::Snake),
            "kebab-case" => Ok(RenameRule::Kebab),
            "PascalCase" => Ok(RenameRule::Pascal),
            "SCREAMING_SNAKE_CASE" => Ok(RenameRule::ScreamingSnake),
            _ => Err(syn::Error::new_spanned(
                lit,
                "unknown rename rule\n\
                 \n\
                 Valid: camelCase, snake_case, kebab-case, PascalCase, SCREAMING_SNAKE_CASE",
            )),
        }
    }

    fn apply(self, name: &str) -> String {
        match self {
            RenameRule::Camel => name.to_lower_camel_case(),
            RenameRule::Snake => name.to_snake_case(),
            RenameRule::Kebab => name.to_kebab_case(),
            RenameRule::Pascal => name.to_upper_camel_case(),
            RenameRule::ScreamingSnake => name.to_shouty_snake_case(),
        }
    }
}

/// Arguments of `#[record(...)]` on a field
#[derive(Default)]
struct FieldArgs {
    rename: Option<String>,
    skip: bool,
}

fn container_rule(input: &DeriveInput) -> syn::Result<Option<RenameRule>> {
    let mut rule = None;
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                let lit: LitStr = meta.value()?.parse()?;
                rule = Some(RenameRule::parse(&lit)?);
                Ok(())
            } else {
                Err(meta.error("unknown container attribute. Valid: rename_all"))
            }
        })?;
    }
    Ok(rule)
}

fn field_args(field: &syn::Field) -> syn::Result<FieldArgs> {
    let mut args = FieldArgs::default();
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                args.rename = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                args.skip = true;
                Ok(())
            } else {
                Err(meta.error("unknown field attribute. Valid: rename, skip"))
            }
        })?;
    }
    Ok(args)
}

/// Expand the Record derive macro
pub(crate) fn expand_record(input: DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let name_str = name.to_string();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input,
            "Record can only be derived for structs with named fields",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &data.fields,
            "Record requires named fields\n\
             \n\
             Example:\n\
             #[derive(Serialize, Record)]\n\
             struct Article {\n\
                 id: u64,\n\
                 title: String,\n\
             }",
        ));
    };

    let rule = container_rule(&input)?;
    let mut arms = Vec::new();
    for field in &fields.named {
        let args = field_args(field)?;
        if args.skip {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        // Raw identifiers (`r#type`) are looked up without the prefix.
        let ident_str = ident.to_string();
        let ident_str = ident_str.trim_start_matches("r#");
        let key = match (args.rename, rule) {
            (Some(rename), _) => rename,
            (None, Some(rule)) => rule.apply(ident_str),
            (None, None) => ident_str.to_string(),
        };
        arms.push(quote! {
            #key => ::restform::serde_json::to_value(&self.#ident)
                .map(::std::option::Option::Some)
                .map_err(|err| ::restform::AttributeError::new(#key, err)),
        });
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::restform::Record for #name #ty_generics #where_clause {
            fn attribute(
                &self,
                name: &str,
            ) -> ::std::result::Result<
                ::std::option::Option<::restform::serde_json::Value>,
                ::restform::AttributeError,
            > {
                match name {
                    #(#arms)*
                    _ => ::std::result::Result::Ok(::std::option::Option::None),
                }
            }

            fn type_name(&self) -> &'static str {
                #name_str
            }
        }
    })
}
