//! Schema inference from `#[derive(TableRow)]` types.

use std::collections::HashSet;

use crate::error::SchemaError;
use crate::row::{FieldDescriptor, StructDescriptor, TableRow, TypeDescriptor};
use crate::schema::{FieldMode, FieldSchema, FieldType, Schema};

/// Derive the wire schema of `T`.
///
/// Fields are taken in declaration order. Repeated calls yield identical
/// schemas.
pub fn infer_schema<T: TableRow>() -> Result<Schema, SchemaError> {
    infer_from_descriptor(&T::descriptor())
}

pub fn infer_from_descriptor(descriptor: &StructDescriptor) -> Result<Schema, SchemaError> {
    let mut stack = Vec::new();
    infer_struct(descriptor, &mut stack).map(Schema::new)
}

/// Resolved column shape before the field annotations are applied.
struct Column {
    field_type: FieldType,
    mode: FieldMode,
    fields: Vec<FieldSchema>,
}

impl Column {
    fn leaf(field_type: FieldType) -> Self {
        Self {
            field_type,
            mode: FieldMode::Required,
            fields: Vec::new(),
        }
    }
}

fn infer_struct(
    descriptor: &StructDescriptor,
    stack: &mut Vec<&'static str>,
) -> Result<Vec<FieldSchema>, SchemaError> {
    if stack.contains(&descriptor.type_name) {
        return Err(SchemaError::Cycle {
            type_name: descriptor.type_name.to_string(),
        });
    }
    stack.push(descriptor.type_name);

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(descriptor.fields.len());
    for field in descriptor.fields.iter().filter(|f| !f.skip) {
        let schema = infer_field(field, stack)?;
        if !seen.insert(schema.name.to_ascii_lowercase()) {
            return Err(SchemaError::DuplicateField { name: schema.name });
        }
        fields.push(schema);
    }

    stack.pop();
    Ok(fields)
}

fn infer_field(
    field: &FieldDescriptor,
    stack: &mut Vec<&'static str>,
) -> Result<FieldSchema, SchemaError> {
    let name = field.wire_name();
    if name.is_empty() {
        return Err(SchemaError::EmptyName);
    }

    let mut column = resolve(&field.ty, field, stack)?;
    if field.nullable {
        if column.mode == FieldMode::Repeated {
            return Err(SchemaError::NullableRepeated {
                field: name.to_string(),
            });
        }
        column.mode = FieldMode::Nullable;
    }

    if column.field_type == FieldType::Record && column.fields.is_empty() {
        return Err(SchemaError::EmptyRecord {
            field: name.to_string(),
        });
    }

    Ok(FieldSchema {
        name: name.to_string(),
        field_type: column.field_type,
        mode: column.mode,
        description: None,
        fields: column.fields,
    })
}

fn resolve(
    ty: &TypeDescriptor,
    field: &FieldDescriptor,
    stack: &mut Vec<&'static str>,
) -> Result<Column, SchemaError> {
    let name = field.wire_name();
    match ty {
        TypeDescriptor::Scalar(field_type) => Ok(Column::leaf(*field_type)),
        TypeDescriptor::Byte => Ok(Column::leaf(FieldType::Integer)),
        TypeDescriptor::Unsupported(type_name) => Err(SchemaError::UnsupportedType {
            field: name.to_string(),
            type_name: type_name.to_string(),
        }),
        TypeDescriptor::Struct(describe) => Ok(Column {
            fields: infer_struct(&describe(), stack)?,
            ..Column::leaf(FieldType::Record)
        }),

        // Vec<u8> is a byte string, nullable like the other slice types.
        TypeDescriptor::Repeated(inner) if matches!(**inner, TypeDescriptor::Byte) => Ok(Column {
            mode: FieldMode::Nullable,
            ..Column::leaf(FieldType::Bytes)
        }),
        TypeDescriptor::Repeated(inner) => {
            if matches!(**inner, TypeDescriptor::Nullable(_)) {
                return Err(SchemaError::NullableRepeated {
                    field: name.to_string(),
                });
            }
            let element = resolve(unbox(inner), field, stack)?;
            if element.mode == FieldMode::Repeated {
                return Err(SchemaError::NestedRepeated {
                    field: name.to_string(),
                });
            }
            Ok(Column {
                mode: FieldMode::Repeated,
                ..element
            })
        }

        TypeDescriptor::Nullable(inner) => {
            let inner = unbox(inner);
            match inner {
                TypeDescriptor::Repeated(element) if !matches!(**element, TypeDescriptor::Byte) => {
                    Err(SchemaError::NullableRepeated {
                        field: name.to_string(),
                    })
                }
                TypeDescriptor::Nullable(_) => Err(SchemaError::UnsupportedType {
                    field: name.to_string(),
                    type_name: "Option<Option<_>>".to_string(),
                }),
                _ => Ok(Column {
                    mode: FieldMode::Nullable,
                    ..resolve(inner, field, stack)?
                }),
            }
        }

        TypeDescriptor::Boxed(inner) => {
            let column = resolve(inner, field, stack)?;
            if column.field_type == FieldType::Record && !field.nullable {
                return Err(SchemaError::BoxedRecordNotNullable {
                    field: name.to_string(),
                });
            }
            Ok(column)
        }
    }
}

fn unbox(ty: &TypeDescriptor) -> &TypeDescriptor {
    match ty {
        TypeDescriptor::Boxed(inner) => unbox(inner),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableRow;
    use crate::value::Geography;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use pretty_assertions::assert_eq;

    #[derive(TableRow)]
    struct Student {
        name: String,
        grades: Vec<i64>,
    }

    #[derive(TableRow)]
    struct Address {
        city: String,
        zip: Option<String>,
    }

    #[derive(TableRow)]
    #[allow(dead_code)]
    struct Everything {
        small: i16,
        byte: u8,
        ratio: f32,
        flag: bool,
        blob: Vec<u8>,
        at: DateTime<Utc>,
        day: NaiveDate,
        clock: NaiveTime,
        civil: NaiveDateTime,
        amount: BigDecimal,
        area: Geography,
        doc: serde_json::Value,
        maybe: Option<i64>,
        #[quarry(rename = "home")]
        address: Address,
        previous: Option<Address>,
        #[quarry(nullable)]
        boxed: Box<Address>,
        history: Vec<Address>,
        #[quarry(skip)]
        cache: std::collections::HashMap<String, String>,
        #[quarry(nullable)]
        forced: i64,
    }

    #[test]
    fn infers_simple_struct() {
        let schema = infer_schema::<Student>().unwrap();
        assert_eq!(
            schema,
            Schema::new(vec![
                FieldSchema::new("name", FieldType::String),
                FieldSchema::new("grades", FieldType::Integer).repeated(),
            ])
        );
    }

    #[test]
    fn infers_every_supported_type() {
        let schema = infer_schema::<Everything>().unwrap();
        let address = vec![
            FieldSchema::new("city", FieldType::String),
            FieldSchema::new("zip", FieldType::String).nullable(),
        ];
        assert_eq!(
            schema,
            Schema::new(vec![
                FieldSchema::new("small", FieldType::Integer),
                FieldSchema::new("byte", FieldType::Integer),
                FieldSchema::new("ratio", FieldType::Float),
                FieldSchema::new("flag", FieldType::Boolean),
                FieldSchema::new("blob", FieldType::Bytes).nullable(),
                FieldSchema::new("at", FieldType::Timestamp),
                FieldSchema::new("day", FieldType::Date),
                FieldSchema::new("clock", FieldType::Time),
                FieldSchema::new("civil", FieldType::Datetime),
                FieldSchema::new("amount", FieldType::Numeric),
                FieldSchema::new("area", FieldType::Geography),
                FieldSchema::new("doc", FieldType::Json),
                FieldSchema::new("maybe", FieldType::Integer).nullable(),
                FieldSchema::record("home", address.clone()),
                FieldSchema::record("previous", address.clone()).nullable(),
                FieldSchema::record("boxed", address.clone()).nullable(),
                FieldSchema::record("history", address).repeated(),
                FieldSchema::new("forced", FieldType::Integer).nullable(),
            ])
        );
    }

    #[test]
    fn inference_is_deterministic() {
        assert_eq!(
            infer_schema::<Everything>().unwrap(),
            infer_schema::<Everything>().unwrap()
        );
    }

    #[derive(TableRow)]
    #[allow(dead_code)]
    struct Node {
        value: i64,
        next: Option<Box<Node>>,
    }

    #[test]
    fn rejects_recursive_types() {
        let err = infer_schema::<Node>().unwrap_err();
        assert!(matches!(err, SchemaError::Cycle { type_name } if type_name.ends_with("Node")));
    }

    #[derive(TableRow)]
    #[allow(dead_code)]
    struct Unsigned {
        big: u64,
    }

    #[derive(TableRow)]
    #[allow(dead_code)]
    struct Clash {
        name: String,
        #[quarry(rename = "NAME")]
        other: String,
    }

    #[derive(TableRow)]
    #[allow(dead_code)]
    struct BareBox {
        inner: Box<Address>,
    }

    #[derive(TableRow)]
    #[allow(dead_code)]
    struct OptionalList {
        items: Option<Vec<i64>>,
    }

    #[derive(TableRow)]
    #[allow(dead_code)]
    struct ListOfOptions {
        items: Vec<Option<i64>>,
    }

    #[derive(TableRow)]
    #[allow(dead_code)]
    struct ListOfLists {
        items: Vec<Vec<i64>>,
    }

    #[test]
    fn rejects_unmappable_fields() {
        assert!(matches!(
            infer_schema::<Unsigned>(),
            Err(SchemaError::UnsupportedType { field, type_name }) if field == "big" && type_name == "u64"
        ));
        assert!(matches!(
            infer_schema::<Clash>(),
            Err(SchemaError::DuplicateField { name }) if name == "NAME"
        ));
        assert!(matches!(
            infer_schema::<BareBox>(),
            Err(SchemaError::BoxedRecordNotNullable { .. })
        ));
        assert!(matches!(
            infer_schema::<OptionalList>(),
            Err(SchemaError::NullableRepeated { .. })
        ));
        assert!(matches!(
            infer_schema::<ListOfOptions>(),
            Err(SchemaError::NullableRepeated { .. })
        ));
        assert!(matches!(
            infer_schema::<ListOfLists>(),
            Err(SchemaError::NestedRepeated { .. })
        ));
    }

    #[test]
    fn repeated_byte_strings_are_allowed() {
        #[derive(TableRow)]
        #[allow(dead_code)]
        struct Blobs {
            chunks: Vec<Vec<u8>>,
            maybe: Option<Vec<u8>>,
        }

        let schema = infer_schema::<Blobs>().unwrap();
        assert_eq!(schema.fields[0], FieldSchema::new("chunks", FieldType::Bytes).repeated());
        assert_eq!(schema.fields[1], FieldSchema::new("maybe", FieldType::Bytes).nullable());
    }
}
