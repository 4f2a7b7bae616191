//! Conversion between [`Value`]s and the service's JSON wire forms.
//!
//! Two wire forms exist:
//! - result pages, `{"f":[{"v":...}]}` with every scalar spelled as a string;
//! - insert payloads, a plain JSON object keyed by column name.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{Map, Value as Json};

use crate::error::{DecodeError, EncodeError};
use crate::schema::{FieldSchema, FieldType, Schema};
use crate::value::{Value, ValueMap};
use crate::wire::{WireCell, WireRow};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";

// ════════════════════════════════════════════════════════════════
//  Decode (result pages)
// ════════════════════════════════════════════════════════════════

/// Decode one result row into positional values, in schema order.
pub fn decode_row(schema: &Schema, row: &WireRow) -> Result<Vec<Value>, DecodeError> {
    decode_fields(&schema.fields, row.f.iter().map(|cell| &cell.v))
}

fn decode_fields<'a>(
    fields: &[FieldSchema],
    cells: impl ExactSizeIterator<Item = &'a Json>,
) -> Result<Vec<Value>, DecodeError> {
    if cells.len() != fields.len() {
        return Err(DecodeError::Arity {
            expected: fields.len(),
            found: cells.len(),
        });
    }
    fields
        .iter()
        .zip(cells)
        .map(|(field, raw)| decode_cell(field, raw).map_err(|e| e.in_field(&field.name)))
        .collect()
}

/// Decode the `v` member of one cell.
pub fn decode_cell(field: &FieldSchema, raw: &Json) -> Result<Value, DecodeError> {
    if !field.is_repeated() {
        return decode_single(field, raw);
    }
    match raw {
        Json::Null => Ok(Value::Array(Vec::new())),
        Json::Array(items) => items
            .iter()
            .map(|item| match cell_value(item) {
                Json::Null => Err(DecodeError::invalid(
                    field.field_type,
                    "null",
                    "repeated field element is null",
                )),
                v => decode_single(field, v),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Err(DecodeError::invalid(
            field.field_type,
            other.to_string(),
            "repeated field is not an array",
        )),
    }
}

fn decode_single(field: &FieldSchema, raw: &Json) -> Result<Value, DecodeError> {
    match (field.field_type, raw) {
        (_, Json::Null) => Ok(Value::Null),
        (FieldType::Record, Json::Object(record)) => {
            let cells = record.get("f").and_then(Json::as_array).ok_or_else(|| {
                DecodeError::invalid(FieldType::Record, raw.to_string(), "missing 'f' member")
            })?;
            decode_fields(&field.fields, cells.iter().map(cell_value)).map(Value::Record)
        }
        (field_type, Json::String(text)) => parse_scalar(field_type, text),
        (field_type, Json::Number(n)) => parse_scalar(field_type, &n.to_string()),
        (field_type, Json::Bool(b)) => parse_scalar(field_type, if *b { "true" } else { "false" }),
        (field_type, other) => Err(DecodeError::invalid(
            field_type,
            other.to_string(),
            "unexpected JSON shape",
        )),
    }
}

/// `{"v": x}` → `x`. Bare values are passed through.
fn cell_value(cell: &Json) -> &Json {
    match cell {
        Json::Object(obj) if obj.len() == 1 => obj.get("v").unwrap_or(cell),
        _ => cell,
    }
}

/// Parse the textual wire form of a scalar.
pub fn parse_scalar(field_type: FieldType, raw: &str) -> Result<Value, DecodeError> {
    let invalid = |reason: &dyn std::fmt::Display| DecodeError::invalid(field_type, raw, reason);

    match field_type {
        FieldType::String => Ok(Value::String(raw.to_string())),
        FieldType::Integer => raw.parse().map(Value::Int64).map_err(|e| invalid(&e)),
        FieldType::Float => parse_float(raw).map(Value::Float64).ok_or_else(|| invalid(&"not a float")),
        FieldType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid(&"not a boolean")),
        },
        FieldType::Timestamp => parse_timestamp(raw).map(Value::Timestamp).ok_or_else(|| invalid(&"not a timestamp")),
        FieldType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| invalid(&e)),
        FieldType::Time => NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
            .map(Value::Time)
            .map_err(|e| invalid(&e)),
        FieldType::Datetime => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .map(Value::DateTime)
            .map_err(|e| invalid(&e)),
        FieldType::Bytes => BASE64.decode(raw).map(Value::Bytes).map_err(|e| invalid(&e)),
        FieldType::Numeric | FieldType::Bignumeric => BigDecimal::from_str(raw)
            .map(Value::Numeric)
            .map_err(|e| invalid(&e)),
        FieldType::Geography => Ok(Value::Geography(raw.to_string())),
        FieldType::Json => serde_json::from_str(raw).map(Value::Json).map_err(|e| invalid(&e)),
        FieldType::Record => Err(invalid(&"record encoded as a scalar")),
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    match raw {
        "NaN" => Some(f64::NAN),
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => raw.parse().ok(),
    }
}

/// Integer microseconds, float seconds, or RFC 3339.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(micros) = raw.parse::<i64>() {
        return DateTime::from_timestamp_micros(micros);
    }
    if let Ok(seconds) = raw.parse::<f64>() {
        if !seconds.is_finite() {
            return None;
        }
        return DateTime::from_timestamp_micros((seconds * 1e6).round() as i64);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Attach column names to positional values. Nested records become maps.
pub fn name_values(schema: &Schema, values: Vec<Value>) -> Result<ValueMap, DecodeError> {
    name_fields(&schema.fields, values)
}

fn name_fields(fields: &[FieldSchema], values: Vec<Value>) -> Result<ValueMap, DecodeError> {
    if values.len() != fields.len() {
        return Err(DecodeError::Arity {
            expected: fields.len(),
            found: values.len(),
        });
    }
    fields
        .iter()
        .zip(values)
        .map(|(field, value)| {
            let value = name_nested(field, value).map_err(|e| e.in_field(&field.name))?;
            Ok((field.name.clone(), value))
        })
        .collect()
}

fn name_nested(field: &FieldSchema, value: Value) -> Result<Value, DecodeError> {
    if field.field_type != FieldType::Record {
        return Ok(value);
    }
    match value {
        Value::Record(values) => name_fields(&field.fields, values).map(Value::Map),
        Value::Array(items) => items
            .into_iter()
            .map(|item| name_nested(field, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

// ════════════════════════════════════════════════════════════════
//  Encode
// ════════════════════════════════════════════════════════════════

/// Encode a named row as an insert payload object.
///
/// Missing NULLABLE fields become null, missing REPEATED fields an empty
/// array. Entries with no matching column fail unless `ignore_unknown`.
pub fn encode_row(
    schema: &Schema,
    row: &ValueMap,
    ignore_unknown: bool,
) -> Result<Map<String, Json>, EncodeError> {
    encode_fields(&schema.fields, row, ignore_unknown)
}

fn encode_fields(
    fields: &[FieldSchema],
    row: &ValueMap,
    ignore_unknown: bool,
) -> Result<Map<String, Json>, EncodeError> {
    if !ignore_unknown {
        if let Some(unknown) = row.keys().find(|k| find_field(fields, k).is_none()) {
            return Err(EncodeError::UnknownField {
                field: unknown.clone(),
            });
        }
    }

    let mut out = Map::new();
    for field in fields {
        let value = lookup(row, &field.name).filter(|v| !v.is_null());
        let encoded = match value {
            Some(value) => encode_field(field, value, ignore_unknown)?,
            None if field.is_repeated() => Json::Array(Vec::new()),
            None if field.is_required() => {
                return Err(EncodeError::MissingRequired {
                    field: field.name.clone(),
                });
            }
            None => Json::Null,
        };
        out.insert(field.name.clone(), encoded);
    }
    Ok(out)
}

fn find_field<'a>(fields: &'a [FieldSchema], name: &str) -> Option<&'a FieldSchema> {
    fields
        .iter()
        .find(|f| f.name == name)
        .or_else(|| fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
}

fn lookup<'a>(row: &'a ValueMap, name: &str) -> Option<&'a Value> {
    row.get(name).or_else(|| {
        row.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

fn encode_field(field: &FieldSchema, value: &Value, ignore_unknown: bool) -> Result<Json, EncodeError> {
    if !field.is_repeated() {
        return encode_insert_scalar(field, value, ignore_unknown);
    }
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                if item.is_null() {
                    return Err(EncodeError::NullInRepeated {
                        field: field.name.clone(),
                    });
                }
                encode_insert_scalar(field, item, ignore_unknown)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        other => Err(mismatch(field, other)),
    }
}

fn encode_insert_scalar(field: &FieldSchema, value: &Value, ignore_unknown: bool) -> Result<Json, EncodeError> {
    match (field.field_type, value) {
        (FieldType::Record, Value::Map(map)) => {
            encode_fields(&field.fields, map, ignore_unknown).map(Json::Object)
        }
        (FieldType::Record, Value::Record(values)) => {
            if values.len() != field.fields.len() {
                return Err(mismatch(field, value));
            }
            let map = field
                .fields
                .iter()
                .zip(values)
                .map(|(f, v)| (f.name.clone(), v.clone()))
                .collect();
            encode_fields(&field.fields, &map, ignore_unknown).map(Json::Object)
        }
        (FieldType::Integer, Value::Int64(v)) => Ok(Json::from(*v)),
        (FieldType::Float, Value::Float64(v)) => Ok(float_json(*v)),
        (FieldType::Float, Value::Int64(v)) => Ok(float_json(*v as f64)),
        (FieldType::Boolean, Value::Bool(v)) => Ok(Json::Bool(*v)),
        (FieldType::Timestamp, Value::Timestamp(t)) => {
            Ok(Json::String(t.to_rfc3339_opts(SecondsFormat::Micros, true)))
        }
        _ => scalar_text(field, value).map(Json::String),
    }
}

fn float_json(v: f64) -> Json {
    serde_json::Number::from_f64(v)
        .map(Json::Number)
        .unwrap_or_else(|| Json::String(float_text(v)))
}

fn float_text(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "Infinity".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        v.to_string()
    }
}

/// Textual wire form of a scalar, as result pages carry it.
fn scalar_text(field: &FieldSchema, value: &Value) -> Result<String, EncodeError> {
    let text = match (field.field_type, value) {
        (FieldType::String, Value::String(s)) => s.clone(),
        (FieldType::Integer, Value::Int64(v)) => v.to_string(),
        (FieldType::Float, Value::Float64(v)) => float_text(*v),
        (FieldType::Float, Value::Int64(v)) => float_text(*v as f64),
        (FieldType::Boolean, Value::Bool(v)) => v.to_string(),
        (FieldType::Bytes, Value::Bytes(b)) => BASE64.encode(b),
        (FieldType::Timestamp, Value::Timestamp(t)) => t.timestamp_micros().to_string(),
        (FieldType::Date, Value::Date(d)) => d.format("%Y-%m-%d").to_string(),
        (FieldType::Time, Value::Time(t)) => t.format(TIME_FORMAT).to_string(),
        (FieldType::Datetime, Value::DateTime(dt)) => dt.format(DATETIME_FORMAT).to_string(),
        (FieldType::Numeric | FieldType::Bignumeric, Value::Numeric(n)) => n.to_string(),
        (FieldType::Numeric | FieldType::Bignumeric, Value::Int64(v)) => v.to_string(),
        (FieldType::Geography, Value::Geography(s) | Value::String(s)) => s.clone(),
        (FieldType::Json, Value::Json(j)) => j.to_string(),
        (FieldType::Json, Value::String(s)) => s.clone(),
        _ => return Err(mismatch(field, value)),
    };
    Ok(text)
}

fn mismatch(field: &FieldSchema, value: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        field: field.name.clone(),
        expected: field.field_type,
        found: value.kind(),
    }
}

/// Encode positional values in result page form.
///
/// The inverse of [`decode_row`]: timestamps are written as integer
/// microseconds, records as nested `{"f": [...]}`.
pub fn encode_result_row(schema: &Schema, values: &[Value]) -> Result<WireRow, EncodeError> {
    result_cells(&schema.fields, values).map(|f| WireRow { f })
}

fn result_cells(fields: &[FieldSchema], values: &[Value]) -> Result<Vec<WireCell>, EncodeError> {
    if let Some(extra) = values.get(fields.len()) {
        return Err(EncodeError::UnknownField {
            field: format!("#{} ({})", fields.len(), extra.kind()),
        });
    }
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let v = match values.get(i).unwrap_or(&Value::Null) {
                Value::Null if field.is_repeated() => Json::Array(Vec::new()),
                Value::Null if field.is_required() => {
                    return Err(EncodeError::MissingRequired {
                        field: field.name.clone(),
                    });
                }
                Value::Null => Json::Null,
                Value::Array(items) if field.is_repeated() => Json::Array(
                    items
                        .iter()
                        .map(|item| {
                            if item.is_null() {
                                return Err(EncodeError::NullInRepeated {
                                    field: field.name.clone(),
                                });
                            }
                            result_scalar(field, item).map(|v| serde_json::json!({ "v": v }))
                        })
                        .collect::<Result<_, _>>()?,
                ),
                other if field.is_repeated() => return Err(mismatch(field, other)),
                other => result_scalar(field, other)?,
            };
            Ok(WireCell { v })
        })
        .collect()
}

fn result_scalar(field: &FieldSchema, value: &Value) -> Result<Json, EncodeError> {
    match (field.field_type, value) {
        (FieldType::Record, Value::Record(values)) => {
            let cells = result_cells(&field.fields, values)?;
            Ok(serde_json::json!({ "f": cells }))
        }
        (FieldType::Record, Value::Map(map)) => {
            let values = field
                .fields
                .iter()
                .map(|f| lookup(map, &f.name).cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>();
            let cells = result_cells(&field.fields, &values)?;
            Ok(serde_json::json!({ "f": cells }))
        }
        _ => scalar_text(field, value).map(Json::String),
    }
}

/// Encode a named row without a schema, typing each entry by its variant.
///
/// Used for saver rows that carry no schema of their own.
pub fn encode_untyped(row: &ValueMap) -> Result<Map<String, Json>, EncodeError> {
    row.iter()
        .map(|(name, value)| Ok((name.clone(), untyped(name, value)?)))
        .collect()
}

fn untyped(name: &str, value: &Value) -> Result<Json, EncodeError> {
    let as_field = |field_type| FieldSchema::new(name, field_type);
    let json = match value {
        Value::Null => Json::Null,
        Value::Bool(v) => Json::Bool(*v),
        Value::Int64(v) => Json::from(*v),
        Value::Float64(v) => float_json(*v),
        Value::Timestamp(t) => Json::String(t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(|item| {
                    if item.is_null() {
                        return Err(EncodeError::NullInRepeated {
                            field: name.to_string(),
                        });
                    }
                    untyped(name, item)
                })
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(map) => Json::Object(encode_untyped(map)?),
        Value::Record(_) => {
            return Err(EncodeError::TypeMismatch {
                field: name.to_string(),
                expected: FieldType::Record,
                found: "positional record without schema",
            });
        }
        Value::Numeric(_) => Json::String(scalar_text(&as_field(FieldType::Numeric), value)?),
        Value::String(_) => Json::String(scalar_text(&as_field(FieldType::String), value)?),
        Value::Bytes(_) => Json::String(scalar_text(&as_field(FieldType::Bytes), value)?),
        Value::Date(_) => Json::String(scalar_text(&as_field(FieldType::Date), value)?),
        Value::Time(_) => Json::String(scalar_text(&as_field(FieldType::Time), value)?),
        Value::DateTime(_) => Json::String(scalar_text(&as_field(FieldType::Datetime), value)?),
        Value::Geography(_) => Json::String(scalar_text(&as_field(FieldType::Geography), value)?),
        Value::Json(_) => Json::String(scalar_text(&as_field(FieldType::Json), value)?),
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableRow;
    use crate::infer::infer_schema;
    use crate::row::RowLoader;
    use crate::value::Geography;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn student_schema() -> Schema {
        Schema::new(vec![
            FieldSchema::new("name", FieldType::String),
            FieldSchema::new("grades", FieldType::Integer).repeated(),
        ])
    }

    #[derive(TableRow, Debug, PartialEq)]
    struct Student {
        name: String,
        grades: Vec<i64>,
    }

    #[test]
    fn student_round_trip() {
        let schema = student_schema();
        let row: WireRow = serde_json::from_value(json!({
            "f": [{"v": "ada"}, {"v": [{"v": "1"}, {"v": "2"}]}]
        }))
        .unwrap();

        let values = decode_row(&schema, &row).unwrap();
        assert_eq!(
            values,
            vec![
                Value::from("ada"),
                Value::Array(vec![Value::Int64(1), Value::Int64(2)])
            ]
        );

        let student = Student::load(&schema, values.clone()).unwrap();
        assert_eq!(
            student,
            Student {
                name: "ada".into(),
                grades: vec![1, 2]
            }
        );

        let encoded = encode_row(&schema, &student.to_value_map().unwrap(), false).unwrap();
        assert_eq!(Json::Object(encoded), json!({"name": "ada", "grades": [1, 2]}));

        assert_eq!(encode_result_row(&schema, &values).unwrap(), row);
    }

    #[test]
    fn empty_and_null_repeated_decode_to_empty() {
        let schema = student_schema();
        for grades in [json!([]), Json::Null] {
            let row: WireRow =
                serde_json::from_value(json!({"f": [{"v": "bob"}, {"v": grades}]})).unwrap();
            let student: Student = Student::load(&schema, decode_row(&schema, &row).unwrap()).unwrap();
            assert!(student.grades.is_empty());
        }
    }

    #[derive(TableRow, Debug, PartialEq, Clone)]
    struct Inner {
        label: String,
        weight: Option<f64>,
    }

    #[derive(TableRow, Debug, PartialEq, Clone)]
    struct Wide {
        id: i64,
        ratio: f64,
        flag: bool,
        blob: Vec<u8>,
        at: DateTime<Utc>,
        day: NaiveDate,
        clock: NaiveTime,
        civil: NaiveDateTime,
        amount: BigDecimal,
        area: Geography,
        doc: Json,
        maybe: Option<String>,
        inner: Inner,
        others: Vec<Inner>,
        nothing: Option<Inner>,
    }

    fn wide() -> Wide {
        Wide {
            id: -42,
            ratio: 0.1,
            flag: true,
            blob: vec![0, 159, 255],
            at: Utc.timestamp_micros(1_700_000_000_123_456).unwrap(),
            day: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            clock: NaiveTime::from_hms_micro_opt(23, 59, 58, 7).unwrap(),
            civil: NaiveDate::from_ymd_opt(1999, 12, 31)
                .unwrap()
                .and_hms_micro_opt(1, 2, 3, 400_000)
                .unwrap(),
            amount: BigDecimal::from_str("12345678901234567890.123456789").unwrap(),
            area: Geography::new("POINT(1 2)"),
            doc: json!({"k": [1, 2, null]}),
            maybe: None,
            inner: Inner {
                label: "x".into(),
                weight: Some(1.5),
            },
            others: vec![Inner {
                label: "y".into(),
                weight: None,
            }],
            nothing: None,
        }
    }

    #[test]
    fn every_type_survives_the_result_form() {
        let schema = infer_schema::<Wide>().unwrap();
        let original = wide();

        let map = original.to_value_map().unwrap();
        let positional: Vec<Value> = schema
            .iter()
            .map(|f| map.get(&f.name).cloned().unwrap_or(Value::Null))
            .collect();
        let row = encode_result_row(&schema, &positional).unwrap();

        // Through JSON text, as it would arrive from the service.
        let text = serde_json::to_string(&row).unwrap();
        let row: WireRow = serde_json::from_str(&text).unwrap();

        let decoded = Wide::load(&schema, decode_row(&schema, &row).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn insert_payload_spells_types_like_the_service() {
        let schema = infer_schema::<Wide>().unwrap();
        let encoded = encode_row(&schema, &wide().to_value_map().unwrap(), false).unwrap();

        assert_eq!(encoded["id"], json!(-42));
        assert_eq!(encoded["ratio"], json!(0.1));
        assert_eq!(encoded["flag"], json!(true));
        assert_eq!(encoded["blob"], json!("AJ//"));
        assert_eq!(encoded["at"], json!("2023-11-14T22:13:20.123456Z"));
        assert_eq!(encoded["day"], json!("2024-02-29"));
        assert_eq!(encoded["clock"], json!("23:59:58.000007"));
        assert_eq!(encoded["civil"], json!("1999-12-31 01:02:03.400000"));
        assert_eq!(encoded["amount"], json!("12345678901234567890.123456789"));
        assert_eq!(encoded["area"], json!("POINT(1 2)"));
        assert_eq!(encoded["doc"], json!(r#"{"k":[1,2,null]}"#));
        assert_eq!(encoded["maybe"], Json::Null);
        assert_eq!(encoded["inner"], json!({"label": "x", "weight": 1.5}));
        assert_eq!(encoded["others"], json!([{"label": "y", "weight": null}]));
        assert_eq!(encoded["nothing"], Json::Null);
    }

    #[test]
    fn special_floats_are_strings() {
        let schema = Schema::new(vec![FieldSchema::new("f", FieldType::Float).repeated()]);
        let mut row = ValueMap::new();
        row.insert(
            "f".into(),
            Value::Array(vec![
                Value::Float64(f64::NAN),
                Value::Float64(f64::INFINITY),
                Value::Float64(f64::NEG_INFINITY),
            ]),
        );
        let encoded = encode_row(&schema, &row, false).unwrap();
        assert_eq!(encoded["f"], json!(["NaN", "Infinity", "-Infinity"]));

        let decoded = parse_scalar(FieldType::Float, "-Infinity").unwrap();
        assert_eq!(decoded, Value::Float64(f64::NEG_INFINITY));
        assert!(parse_scalar(FieldType::Float, "NaN").unwrap().as_f64().unwrap().is_nan());
    }

    #[test]
    fn timestamps_accept_every_wire_spelling() {
        let expected = Value::Timestamp(Utc.timestamp_micros(1_500_000_000_250_000).unwrap());
        assert_eq!(parse_scalar(FieldType::Timestamp, "1500000000250000").unwrap(), expected);
        assert_eq!(parse_scalar(FieldType::Timestamp, "1.50000000025E9").unwrap(), expected);
        assert_eq!(
            parse_scalar(FieldType::Timestamp, "2017-07-14T02:40:00.25Z").unwrap(),
            expected
        );
        assert!(parse_scalar(FieldType::Timestamp, "yesterday").is_err());
    }

    #[test]
    fn encode_checks_the_schema() {
        let schema = student_schema();

        let mut missing = ValueMap::new();
        missing.insert("grades".into(), Value::Array(vec![]));
        assert!(matches!(
            encode_row(&schema, &missing, false),
            Err(EncodeError::MissingRequired { field }) if field == "name"
        ));

        let mut unknown = ValueMap::new();
        unknown.insert("name".into(), Value::from("a"));
        unknown.insert("age".into(), Value::Int64(3));
        assert!(matches!(
            encode_row(&schema, &unknown, false),
            Err(EncodeError::UnknownField { field }) if field == "age"
        ));
        let encoded = encode_row(&schema, &unknown, true).unwrap();
        assert_eq!(Json::Object(encoded), json!({"name": "a", "grades": []}));

        let mut wrong = ValueMap::new();
        wrong.insert("NAME".into(), Value::Int64(1));
        assert!(matches!(
            encode_row(&schema, &wrong, false),
            Err(EncodeError::TypeMismatch { expected: FieldType::String, found: "int64", .. })
        ));

        let mut null_element = ValueMap::new();
        null_element.insert("name".into(), Value::from("a"));
        null_element.insert("grades".into(), Value::Array(vec![Value::Null]));
        assert!(matches!(
            encode_row(&schema, &null_element, false),
            Err(EncodeError::NullInRepeated { .. })
        ));
    }

    #[test]
    fn null_into_non_nullable_names_the_field() {
        let schema = student_schema();
        let err = Student::load(&schema, vec![Value::Null, Value::Array(vec![])]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::NullIntoNonNullable { target: "String" }.in_field("name")
        );
    }

    #[test]
    fn generic_targets_keep_nulls() {
        let schema = Schema::new(vec![
            FieldSchema::new("a", FieldType::Integer).nullable(),
            FieldSchema::record("r", vec![FieldSchema::new("b", FieldType::Boolean)]),
        ]);
        let row: WireRow = serde_json::from_value(json!({
            "f": [{"v": null}, {"v": {"f": [{"v": "true"}]}}]
        }))
        .unwrap();
        let values = decode_row(&schema, &row).unwrap();
        assert_eq!(values[0], Value::Null);
        assert_eq!(values[1], Value::Record(vec![Value::Bool(true)]));

        let named = ValueMap::load(&schema, values).unwrap();
        let mut inner = ValueMap::new();
        inner.insert("b".into(), Value::Bool(true));
        assert_eq!(named["a"], Value::Null);
        assert_eq!(named["r"], Value::Map(inner));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let row: WireRow = serde_json::from_value(json!({"f": [{"v": "x"}]})).unwrap();
        assert_eq!(
            decode_row(&student_schema(), &row),
            Err(DecodeError::Arity { expected: 2, found: 1 })
        );
    }

    #[test]
    fn untyped_rows_encode_by_variant() {
        let mut row = ValueMap::new();
        row.insert("n".into(), Value::Int64(1));
        row.insert("s".into(), Value::from("x"));
        row.insert("b".into(), Value::Bytes(b"hi".to_vec()));
        let encoded = encode_untyped(&row).unwrap();
        assert_eq!(Json::Object(encoded), json!({"n": 1, "s": "x", "b": "aGk="}));
    }
}
