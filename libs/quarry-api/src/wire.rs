//! REST payloads exchanged with the warehouse service.
//!
//! Field names follow the service's camelCase JSON. 64-bit integers travel
//! as decimal strings, see [`int64_string`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

// ════════════════════════════════════════════════════════════════
//  References
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference {
    pub project_id: String,
    pub dataset_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl std::fmt::Display for TableReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

// ════════════════════════════════════════════════════════════════
//  Errors
// ════════════════════════════════════════════════════════════════

/// Structured error entry as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message} ({reason})")]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ErrorProto {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Jobs
// ════════════════════════════════════════════════════════════════

/// Job state as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireJobState {
    Pending,
    Running,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResource {
    pub state: WireJobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_result: Option<ErrorProto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub total_bytes_processed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryStatistics>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_type: Option<String>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub total_bytes_billed: Option<i64>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub num_dml_affected_rows: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateDisposition {
    CreateIfNeeded,
    CreateNever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    WriteTruncate,
    WriteAppend,
    WriteEmpty,
}

/// File format of a load source or extract destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataFormat {
    Csv,
    NewlineDelimitedJson,
    Avro,
    Parquet,
    Orc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Compression {
    None,
    Gzip,
    Deflate,
    Snappy,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<JobConfigurationQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<JobConfigurationLoad>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<JobConfigurationTableCopy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<JobConfigurationExtract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<DatasetReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_legacy_sql: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameterResource>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationLoad {
    pub source_uris: Vec<String>,
    pub destination_table: TableReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<DataFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_jagged_rows: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_quoted_newlines: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_leading_rows: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bad_records: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autodetect: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_unknown_values: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationTableCopy {
    pub source_tables: Vec<TableReference>,
    pub destination_table: TableReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationExtract {
    pub source_table: TableReference,
    pub destination_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_format: Option<DataFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<String>,
}

/// The job resource: what jobs.insert takes and jobs.get returns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResource {
    pub job_reference: JobReference,
    #[serde(default)]
    pub configuration: JobConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatusResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JobStatistics>,
}

// ════════════════════════════════════════════════════════════════
//  Query parameters
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameterResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parameter_type: QueryParameterType,
    pub parameter_value: QueryParameterValue,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameterType {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_type: Option<Box<QueryParameterType>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub struct_types: Vec<StructParameterType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructParameterType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: QueryParameterType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameterValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_values: Vec<QueryParameterValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub struct_values: BTreeMap<String, QueryParameterValue>,
}

// ════════════════════════════════════════════════════════════════
//  Query execution and result pages
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFormatOptions {
    pub use_int64_timestamp: bool,
}

/// Body of the synchronous jobs.query call (the fast path).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<DatasetReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_legacy_sql: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameterResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_options: Option<DataFormatOptions>,
}

/// One cell of a result row: `{"v": ...}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

/// One result row: `{"f": [cell, ...]}` in schema order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireRow {
    #[serde(default)]
    pub f: Vec<WireCell>,
}

impl WireRow {
    pub fn new(cells: impl IntoIterator<Item = serde_json::Value>) -> Self {
        Self {
            f: cells.into_iter().map(|v| WireCell { v }).collect(),
        }
    }
}

/// Response of jobs.query and jobs.getQueryResults. When `job_complete` is
/// false, only `job_reference` is meaningful.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<WireRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorProto>,
}

/// Response of tabledata.list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDataList {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<WireRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<i64>,
}

/// Read-only subset of the table resource.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResource {
    pub table_reference: TableReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub num_rows: Option<i64>,
}

// ════════════════════════════════════════════════════════════════
//  Streaming inserts
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertAllRow {
    /// Absent means "do not deduplicate this row".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<String>,
    pub json: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertAllRequest {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_invalid_rows: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_unknown_values: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_suffix: Option<String>,
    pub rows: Vec<InsertAllRow>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertErrors {
    /// Position of the row in the request.
    pub index: u32,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertAllResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insert_errors: Vec<InsertErrors>,
}

/// Optional `i64` carried as a JSON string (the service's int64 encoding).
/// Plain JSON numbers are accepted on input.
pub mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(i64),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Num(n)) => Ok(Some(n)),
            Some(Raw::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn job_resource_parses_service_response() {
        let job: JobResource = serde_json::from_value(serde_json::json!({
            "jobReference": {"projectId": "p", "jobId": "j1", "location": "EU"},
            "configuration": {"query": {"query": "SELECT 1", "useLegacySql": false}},
            "status": {
                "state": "DONE",
                "errorResult": {"reason": "invalidQuery", "message": "Syntax error"}
            },
            "statistics": {"creationTime": "1700000000000", "totalBytesProcessed": "42"}
        }))
        .unwrap();

        assert_eq!(job.job_reference.location.as_deref(), Some("EU"));
        let status = job.status.unwrap();
        assert_eq!(status.state, WireJobState::Done);
        assert_eq!(status.error_result.unwrap().reason, "invalidQuery");
        let stats = job.statistics.unwrap();
        assert_eq!(stats.creation_time, Some(1_700_000_000_000));
        assert_eq!(stats.total_bytes_processed, Some(42));
    }

    #[test]
    fn insert_request_omits_absent_insert_ids() {
        let mut json = serde_json::Map::new();
        json.insert("a".into(), serde_json::json!(1));
        let request = InsertAllRequest {
            rows: vec![
                InsertAllRow {
                    insert_id: Some("id-1".into()),
                    json: json.clone(),
                },
                InsertAllRow {
                    insert_id: None,
                    json,
                },
            ],
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "rows": [
                    {"insertId": "id-1", "json": {"a": 1}},
                    {"json": {"a": 1}}
                ]
            })
        );
    }

    #[test]
    fn int64_strings_round_trip() {
        let results: QueryResults = serde_json::from_value(serde_json::json!({
            "jobComplete": true,
            "totalRows": "3"
        }))
        .unwrap();
        assert_eq!(results.total_rows, Some(3));
        assert_eq!(
            serde_json::to_value(&results).unwrap()["totalRows"],
            serde_json::json!("3")
        );
    }
}
