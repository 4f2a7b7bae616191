use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Wire type of a single column.
///
/// Serialized the way the service spells it. Legacy standard-SQL aliases
/// (`INT64`, `FLOAT64`, `BOOL`, `STRUCT`) are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    #[serde(alias = "INT64")]
    Integer,
    #[serde(alias = "FLOAT64")]
    Float,
    #[serde(alias = "BOOL")]
    Boolean,
    Timestamp,
    Date,
    Time,
    Datetime,
    Bytes,
    #[serde(alias = "DECIMAL")]
    Numeric,
    #[serde(alias = "BIGDECIMAL")]
    Bignumeric,
    Geography,
    Json,
    #[serde(alias = "STRUCT")]
    Record,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::Datetime => "DATETIME",
            FieldType::Bytes => "BYTES",
            FieldType::Numeric => "NUMERIC",
            FieldType::Bignumeric => "BIGNUMERIC",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Json => "JSON",
            FieldType::Record => "RECORD",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column mode. The service treats an absent mode as `NULLABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Required,
    #[default]
    Nullable,
    /// "No elements" is an empty list, never null.
    Repeated,
}

/// A single column. RECORD columns own their nested fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    /// A REQUIRED scalar column.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Required,
            description: None,
            fields: Vec::new(),
        }
    }

    /// A REQUIRED RECORD column with the given nested fields.
    pub fn record(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            fields,
            ..Self::new(name, FieldType::Record)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.mode = FieldMode::Nullable;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.mode = FieldMode::Repeated;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.mode == FieldMode::Repeated
    }

    pub fn is_required(&self) -> bool {
        self.mode == FieldMode::Required
    }

    /// Nested schema of a RECORD column (empty for scalars).
    pub fn nested(&self) -> Schema {
        Schema::new(self.fields.clone())
    }
}

/// Ordered column list. Field position is the index of the value in a
/// positional row.
///
/// Serializes as the service's table schema object: `{"fields": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldSchema> {
        self.fields.iter()
    }

    /// Position of a column. Exact match wins; otherwise case-insensitive.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|f| f.name.eq_ignore_ascii_case(name))
            })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Check structural invariants: non-empty unique names (case-insensitive)
    /// at every level, RECORD columns carry nested fields, scalars don't.
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_fields(&self.fields)
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a FieldSchema;
    type IntoIter = std::slice::Iter<'a, FieldSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl From<Vec<FieldSchema>> for Schema {
    fn from(fields: Vec<FieldSchema>) -> Self {
        Self::new(fields)
    }
}

fn validate_fields(fields: &[FieldSchema]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if !seen.insert(field.name.to_ascii_lowercase()) {
            return Err(SchemaError::DuplicateField {
                name: field.name.clone(),
            });
        }
        match field.field_type {
            FieldType::Record => {
                if field.fields.is_empty() {
                    return Err(SchemaError::EmptyRecord {
                        field: field.name.clone(),
                    });
                }
                validate_fields(&field.fields)?;
            }
            _ if !field.fields.is_empty() => {
                return Err(SchemaError::NestedFieldsOnScalar {
                    field: field.name.clone(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn schema_serializes_like_the_service() {
        let schema = Schema::new(vec![
            FieldSchema::new("name", FieldType::String),
            FieldSchema::new("grades", FieldType::Integer).repeated(),
            FieldSchema::record(
                "address",
                vec![FieldSchema::new("city", FieldType::String).nullable()],
            )
            .nullable(),
        ]);

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fields": [
                    {"name": "name", "type": "STRING", "mode": "REQUIRED"},
                    {"name": "grades", "type": "INTEGER", "mode": "REPEATED"},
                    {"name": "address", "type": "RECORD", "mode": "NULLABLE", "fields": [
                        {"name": "city", "type": "STRING", "mode": "NULLABLE"}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn missing_mode_and_aliases_parse() {
        let schema: Schema = serde_json::from_value(serde_json::json!({
            "fields": [
                {"name": "a", "type": "INT64"},
                {"name": "b", "type": "STRUCT", "fields": [{"name": "c", "type": "BOOL"}]}
            ]
        }))
        .unwrap();

        assert_eq!(schema.fields[0].field_type, FieldType::Integer);
        assert_eq!(schema.fields[0].mode, FieldMode::Nullable);
        assert_eq!(schema.fields[1].field_type, FieldType::Record);
        assert_eq!(schema.fields[1].fields[0].field_type, FieldType::Boolean);
    }

    #[test]
    fn lookup_prefers_exact_then_case_insensitive() {
        let schema = Schema::new(vec![
            FieldSchema::new("Name", FieldType::String),
            FieldSchema::new("name_2", FieldType::String),
        ]);
        assert_eq!(schema.index_of("Name"), Some(0));
        assert_eq!(schema.index_of("NAME"), Some(0));
        assert_eq!(schema.index_of("Name_2"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn validate_rejects_broken_schemas() {
        let dup = Schema::new(vec![
            FieldSchema::new("id", FieldType::Integer),
            FieldSchema::new("ID", FieldType::String),
        ]);
        assert!(matches!(
            dup.validate(),
            Err(SchemaError::DuplicateField { name }) if name == "ID"
        ));

        let empty_record = Schema::new(vec![FieldSchema::record("r", vec![])]);
        assert!(matches!(
            empty_record.validate(),
            Err(SchemaError::EmptyRecord { .. })
        ));

        let nested_dup = Schema::new(vec![FieldSchema::record(
            "r",
            vec![
                FieldSchema::new("x", FieldType::Integer),
                FieldSchema::new("x", FieldType::Integer),
            ],
        )]);
        assert!(nested_dup.validate().is_err());

        let ok = Schema::new(vec![
            FieldSchema::new("id", FieldType::Integer),
            FieldSchema::record("r", vec![FieldSchema::new("x", FieldType::Float)]),
        ]);
        assert!(ok.validate().is_ok());
    }
}
