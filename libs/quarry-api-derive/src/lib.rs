use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, Data, DeriveInput, Fields, GenericParam, LitStr};

/// Derive macro mapping a struct to a table row.
///
/// Generates implementations of:
///
/// - `TableRow`: the static field description used for schema inference,
///   plus conversion to and from named values;
/// - `FieldValue`: so the struct can be nested as a RECORD column;
/// - `RowLoader`: so result rows can be decoded straight into the struct.
///
/// Field attributes:
///
/// - `#[quarry(rename = "col")]` uses `col` as the column name;
/// - `#[quarry(skip)]` leaves the field out (it is filled with `Default`
///   when decoding);
/// - `#[quarry(nullable)]` makes the column NULLABLE. Required on `Box`ed
///   records.
///
/// # Example
///
/// ```ignore
/// #[derive(TableRow)]
/// pub struct Student {
///     pub name: String,
///     #[quarry(rename = "scores")]
///     pub grades: Vec<i64>,
///     #[quarry(skip)]
///     pub cached_rank: u32,
/// }
/// ```
#[proc_macro_derive(TableRow, attributes(quarry))]
pub fn derive_table_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens,
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
    nullable: bool,
}

fn parse_attrs(field: &syn::Field) -> Result<FieldAttrs, syn::Error> {
    let mut attrs = FieldAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("quarry") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("column name cannot be empty"));
                }
                attrs.rename = Some(value.value());
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
            } else if meta.path.is_ident("nullable") {
                attrs.nullable = true;
            } else {
                return Err(meta.error("unknown quarry attribute (expected rename, skip or nullable)"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;
    let name_str = name.to_string();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "TableRow only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "TableRow only supports structs")),
    };

    let mut descriptor_tokens = Vec::new();
    let mut to_map_tokens = Vec::new();
    let mut from_map_tokens = Vec::new();

    for field in fields {
        let field_name = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let field_name_str = field_name.to_string();
        let field_ty = &field.ty;
        let attrs = parse_attrs(field)?;

        if attrs.skip {
            descriptor_tokens.push(quote! {
                ::quarry_api::row::FieldDescriptor {
                    name: #field_name_str,
                    rename: None,
                    skip: true,
                    nullable: false,
                    ty: ::quarry_api::row::TypeDescriptor::Unsupported(stringify!(#field_ty)),
                }
            });
            from_map_tokens.push(quote! {
                #field_name: ::core::default::Default::default(),
            });
            continue;
        }

        let column = attrs.rename.clone().unwrap_or_else(|| field_name_str.clone());
        let rename = match &attrs.rename {
            Some(r) => quote! { Some(#r) },
            None => quote! { None },
        };
        let nullable = attrs.nullable;

        descriptor_tokens.push(quote! {
            ::quarry_api::row::FieldDescriptor {
                name: #field_name_str,
                rename: #rename,
                skip: false,
                nullable: #nullable,
                ty: <#field_ty as ::quarry_api::row::FieldValue>::describe(),
            }
        });
        to_map_tokens.push(quote! {
            __map.insert(
                ::std::string::String::from(#column),
                ::quarry_api::row::FieldValue::to_value(&self.#field_name)
                    .map_err(|e| e.in_field(#column))?,
            );
        });
        from_map_tokens.push(quote! {
            #field_name: <#field_ty as ::quarry_api::row::FieldValue>::from_value(__lookup.take(#column))
                .map_err(|e| e.in_field(#column))?,
        });
    }

    // Every type parameter must itself be a column type.
    let mut generics = input.generics.clone();
    for param in &mut generics.params {
        if let GenericParam::Type(ty) = param {
            ty.bounds.push(parse_quote!(::quarry_api::row::FieldValue));
        }
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::quarry_api::row::TableRow for #name #ty_generics #where_clause {
            fn descriptor() -> ::quarry_api::row::StructDescriptor {
                ::quarry_api::row::StructDescriptor {
                    type_name: ::core::any::type_name::<Self>(),
                    fields: vec![#(#descriptor_tokens),*],
                }
            }

            fn to_value_map(
                &self,
            ) -> ::core::result::Result<::quarry_api::value::ValueMap, ::quarry_api::error::EncodeError> {
                let mut __map = ::quarry_api::value::ValueMap::new();
                #(#to_map_tokens)*
                ::core::result::Result::Ok(__map)
            }

            fn from_value_map(
                __lookup: &mut ::quarry_api::row::FieldLookup,
            ) -> ::core::result::Result<Self, ::quarry_api::error::DecodeError> {
                ::core::result::Result::Ok(Self {
                    #(#from_map_tokens)*
                })
            }
        }

        impl #impl_generics ::quarry_api::row::FieldValue for #name #ty_generics #where_clause {
            fn describe() -> ::quarry_api::row::TypeDescriptor {
                ::quarry_api::row::TypeDescriptor::Struct(
                    <Self as ::quarry_api::row::TableRow>::descriptor,
                )
            }

            fn to_value(
                &self,
            ) -> ::core::result::Result<::quarry_api::value::Value, ::quarry_api::error::EncodeError> {
                <Self as ::quarry_api::row::TableRow>::to_value_map(self)
                    .map(::quarry_api::value::Value::Map)
            }

            fn from_value(
                value: ::quarry_api::value::Value,
            ) -> ::core::result::Result<Self, ::quarry_api::error::DecodeError> {
                match value {
                    ::quarry_api::value::Value::Map(__map) => {
                        let mut __lookup = ::quarry_api::row::FieldLookup::new(__map);
                        <Self as ::quarry_api::row::TableRow>::from_value_map(&mut __lookup)
                    }
                    ::quarry_api::value::Value::Null => ::core::result::Result::Err(
                        ::quarry_api::error::DecodeError::NullIntoNonNullable { target: #name_str },
                    ),
                    other => ::core::result::Result::Err(
                        ::quarry_api::error::DecodeError::mismatch(#name_str, &other),
                    ),
                }
            }
        }

        impl #impl_generics ::quarry_api::row::RowLoader for #name #ty_generics #where_clause {
            fn load(
                schema: &::quarry_api::schema::Schema,
                values: ::std::vec::Vec<::quarry_api::value::Value>,
            ) -> ::core::result::Result<Self, ::quarry_api::error::DecodeError> {
                let __map = ::quarry_api::codec::name_values(schema, values)?;
                let mut __lookup = ::quarry_api::row::FieldLookup::new(__map);
                <Self as ::quarry_api::row::TableRow>::from_value_map(&mut __lookup)
            }
        }
    };

    Ok(expanded.into())
}
