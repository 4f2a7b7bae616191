//! Query parameter typing and encoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use quarry_api::Value;
use quarry_api::error::EncodeError;
use quarry_api::wire::{
    QueryParameterResource, QueryParameterType, QueryParameterValue, StructParameterType,
};

/// A query parameter. Named parameters are referenced as `@name`,
/// positional ones as `?`. A query uses one style or the other.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    pub name: Option<String>,
    pub value: ParameterValue,
}

/// Value bound to a parameter.
///
/// A `Value::Map` becomes a STRUCT whose fields are typed in name order.
/// Use `Struct` when the field order matters.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Value(Value),
    Array(Vec<ParameterValue>),
    /// STRUCT with fields in the given order.
    Struct(Vec<(String, ParameterValue)>),
}

impl From<Value> for ParameterValue {
    fn from(value: Value) -> Self {
        ParameterValue::Value(value)
    }
}

impl QueryParameter {
    pub fn new(name: Option<String>, value: ParameterValue) -> Self {
        Self { name, value }
    }

    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(Some(name.into()), ParameterValue::Value(value.into()))
    }

    pub fn positional(value: impl Into<Value>) -> Self {
        Self::new(None, ParameterValue::Value(value.into()))
    }

    fn label(&self, position: usize) -> String {
        match &self.name {
            Some(name) => format!("@{name}"),
            None => format!("#{position}"),
        }
    }
}

/// Parameter mode and wire form of a parameter list.
pub(crate) fn encode_parameters(
    params: &[QueryParameter],
) -> Result<(Option<String>, Vec<QueryParameterResource>), EncodeError> {
    if params.is_empty() {
        return Ok((None, Vec::new()));
    }
    let named = params.iter().filter(|p| p.name.is_some()).count();
    let mode = match named {
        0 => "POSITIONAL",
        n if n == params.len() => "NAMED",
        _ => {
            return Err(EncodeError::Parameter {
                parameter: "*".into(),
                reason: "named and positional parameters cannot be mixed".into(),
            });
        }
    };

    let resources = params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let label = p.label(i);
            Ok(QueryParameterResource {
                name: p.name.clone(),
                parameter_type: parameter_type(&p.value, &label)?,
                parameter_value: parameter_value(&p.value, &label)?,
            })
        })
        .collect::<Result<Vec<_>, EncodeError>>()?;
    Ok((Some(mode.to_string()), resources))
}

fn scalar(type_name: &str) -> QueryParameterType {
    QueryParameterType {
        type_name: type_name.to_string(),
        ..Default::default()
    }
}

fn invalid(label: &str, reason: impl Into<String>) -> EncodeError {
    EncodeError::Parameter {
        parameter: label.to_string(),
        reason: reason.into(),
    }
}

fn parameter_type(value: &ParameterValue, label: &str) -> Result<QueryParameterType, EncodeError> {
    match value {
        ParameterValue::Value(v) => value_type(v, label),
        ParameterValue::Array(items) => {
            let first = items
                .first()
                .ok_or_else(|| invalid(label, "cannot infer the element type of an empty array"))?;
            if matches!(
                first,
                ParameterValue::Array(_) | ParameterValue::Value(Value::Array(_))
            ) {
                return Err(invalid(label, "arrays of arrays are not supported"));
            }
            array_type(parameter_type(first, label)?, &items[1..], label, parameter_type)
        }
        ParameterValue::Struct(fields) => Ok(QueryParameterType {
            type_name: "STRUCT".into(),
            array_type: None,
            struct_types: fields
                .iter()
                .map(|(name, v)| {
                    Ok(StructParameterType {
                        name: Some(name.clone()),
                        field_type: parameter_type(v, &format!("{label}.{name}"))?,
                    })
                })
                .collect::<Result<_, EncodeError>>()?,
        }),
    }
}

/// ARRAY type from the first element's type; the rest must match it.
fn array_type<T>(
    element: QueryParameterType,
    rest: &[T],
    label: &str,
    type_of: fn(&T, &str) -> Result<QueryParameterType, EncodeError>,
) -> Result<QueryParameterType, EncodeError> {
    for item in rest {
        if type_of(item, label)? != element {
            return Err(invalid(label, "array elements have different types"));
        }
    }
    Ok(QueryParameterType {
        type_name: "ARRAY".into(),
        array_type: Some(Box::new(element)),
        struct_types: Vec::new(),
    })
}

fn value_type(value: &Value, label: &str) -> Result<QueryParameterType, EncodeError> {
    let ty = match value {
        Value::Bool(_) => scalar("BOOL"),
        Value::Int64(_) => scalar("INT64"),
        Value::Float64(_) => scalar("FLOAT64"),
        Value::Numeric(_) => scalar("NUMERIC"),
        Value::String(_) => scalar("STRING"),
        Value::Bytes(_) => scalar("BYTES"),
        Value::Timestamp(_) => scalar("TIMESTAMP"),
        Value::Date(_) => scalar("DATE"),
        Value::Time(_) => scalar("TIME"),
        Value::DateTime(_) => scalar("DATETIME"),
        Value::Geography(_) => scalar("GEOGRAPHY"),
        Value::Json(_) => scalar("JSON"),
        Value::Array(items) => {
            let first = items
                .first()
                .ok_or_else(|| invalid(label, "cannot infer the element type of an empty array"))?;
            if matches!(first, Value::Array(_)) {
                return Err(invalid(label, "arrays of arrays are not supported"));
            }
            array_type(value_type(first, label)?, &items[1..], label, value_type)?
        }
        Value::Map(fields) => QueryParameterType {
            type_name: "STRUCT".into(),
            array_type: None,
            struct_types: fields
                .iter()
                .map(|(name, v)| {
                    Ok(StructParameterType {
                        name: Some(name.clone()),
                        field_type: value_type(v, &format!("{label}.{name}"))?,
                    })
                })
                .collect::<Result<_, EncodeError>>()?,
        },
        Value::Null => return Err(invalid(label, "NULL has no type; wrap it in a typed value")),
        Value::Record(_) => return Err(invalid(label, "positional records need field names")),
    };
    Ok(ty)
}

fn parameter_value(value: &ParameterValue, label: &str) -> Result<QueryParameterValue, EncodeError> {
    let encoded = match value {
        ParameterValue::Value(v) => return value_text(v, label),
        ParameterValue::Array(items) => QueryParameterValue {
            array_values: items
                .iter()
                .map(|item| parameter_value(item, label))
                .collect::<Result<_, _>>()?,
            ..Default::default()
        },
        ParameterValue::Struct(fields) => QueryParameterValue {
            struct_values: fields
                .iter()
                .map(|(name, v)| Ok((name.clone(), parameter_value(v, label)?)))
                .collect::<Result<_, EncodeError>>()?,
            ..Default::default()
        },
    };
    Ok(encoded)
}

fn value_text(value: &Value, label: &str) -> Result<QueryParameterValue, EncodeError> {
    let text = |s: String| QueryParameterValue {
        value: Some(s),
        ..Default::default()
    };
    let encoded = match value {
        Value::Bool(v) => text(v.to_string()),
        Value::Int64(v) => text(v.to_string()),
        Value::Float64(v) if v.is_nan() => text("NaN".into()),
        Value::Float64(v) if v.is_infinite() => {
            text(if *v > 0.0 { "Infinity" } else { "-Infinity" }.into())
        }
        Value::Float64(v) => text(v.to_string()),
        Value::Numeric(v) => text(v.to_string()),
        Value::String(v) | Value::Geography(v) => text(v.clone()),
        Value::Bytes(v) => text(BASE64.encode(v)),
        Value::Timestamp(v) => text(v.format("%Y-%m-%d %H:%M:%S%.6f+00:00").to_string()),
        Value::Date(v) => text(v.format("%Y-%m-%d").to_string()),
        Value::Time(v) => text(v.format("%H:%M:%S%.6f").to_string()),
        Value::DateTime(v) => text(v.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        Value::Json(v) => text(v.to_string()),
        Value::Array(items) => QueryParameterValue {
            array_values: items
                .iter()
                .map(|item| value_text(item, label))
                .collect::<Result<_, _>>()?,
            ..Default::default()
        },
        Value::Map(fields) => QueryParameterValue {
            struct_values: fields
                .iter()
                .map(|(name, v)| Ok((name.clone(), value_text(v, label)?)))
                .collect::<Result<_, EncodeError>>()?,
            ..Default::default()
        },
        Value::Null | Value::Record(_) => return Err(invalid(label, "value cannot be sent as a parameter")),
    };
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use quarry_api::ValueMap;

    #[test]
    fn named_scalars() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (mode, params) = encode_parameters(&[
            QueryParameter::named("limit", 10i64),
            QueryParameter::named("since", ts),
        ])
        .unwrap();

        assert_eq!(mode.as_deref(), Some("NAMED"));
        assert_eq!(params[0].parameter_type.type_name, "INT64");
        assert_eq!(params[0].parameter_value.value.as_deref(), Some("10"));
        assert_eq!(params[1].parameter_type.type_name, "TIMESTAMP");
        assert_eq!(
            params[1].parameter_value.value.as_deref(),
            Some("2024-05-01 12:00:00.000000+00:00")
        );
    }

    #[test]
    fn arrays_and_structs() {
        let mut fields = ValueMap::new();
        fields.insert("a".into(), Value::Int64(1));
        fields.insert("b".into(), Value::from("x"));

        let (mode, params) = encode_parameters(&[
            QueryParameter::positional(Value::Array(vec![Value::from("p"), Value::from("q")])),
            QueryParameter::positional(Value::Map(fields)),
        ])
        .unwrap();

        assert_eq!(mode.as_deref(), Some("POSITIONAL"));
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {
                    "parameterType": {"type": "ARRAY", "arrayType": {"type": "STRING"}},
                    "parameterValue": {"arrayValues": [{"value": "p"}, {"value": "q"}]}
                },
                {
                    "parameterType": {"type": "STRUCT", "structTypes": [
                        {"name": "a", "type": {"type": "INT64"}},
                        {"name": "b", "type": {"type": "STRING"}}
                    ]},
                    "parameterValue": {"structValues": {"a": {"value": "1"}, "b": {"value": "x"}}}
                }
            ])
        );
    }

    #[test]
    fn ordered_structs_keep_field_order() {
        let point = ParameterValue::Struct(vec![
            ("z".into(), Value::Int64(3).into()),
            ("a".into(), Value::from("x").into()),
        ]);
        let (_, params) = encode_parameters(&[QueryParameter::new(
            Some("points".into()),
            ParameterValue::Array(vec![point.clone(), point]),
        )])
        .unwrap();

        let element = params[0].parameter_type.array_type.as_deref().unwrap();
        assert_eq!(element.type_name, "STRUCT");
        let names: Vec<_> = element
            .struct_types
            .iter()
            .map(|t| t.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["z", "a"]);
        assert_eq!(params[0].parameter_value.array_values.len(), 2);
        assert_eq!(
            params[0].parameter_value.array_values[0].struct_values["z"].value.as_deref(),
            Some("3")
        );
    }

    #[test]
    fn rejects_untypable_parameters() {
        assert!(encode_parameters(&[QueryParameter::new(None, ParameterValue::Array(vec![]))]).is_err());
        assert!(
            encode_parameters(&[QueryParameter::new(
                None,
                ParameterValue::Array(vec![Value::Int64(1).into(), ParameterValue::Struct(vec![])])
            )])
            .is_err()
        );
        assert!(encode_parameters(&[QueryParameter::named("x", Value::Null)]).is_err());
        assert!(encode_parameters(&[QueryParameter::named("x", Value::Array(vec![]))]).is_err());
        assert!(
            encode_parameters(&[QueryParameter::named(
                "x",
                Value::Array(vec![Value::Int64(1), Value::from("two")])
            )])
            .is_err()
        );
        assert!(matches!(
            encode_parameters(&[QueryParameter::named("a", 1i64), QueryParameter::positional(2i64)]),
            Err(EncodeError::Parameter { reason, .. }) if reason.contains("mixed")
        ));
    }
}
