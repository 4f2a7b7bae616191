//! Streaming inserts with per-row error reporting.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use quarry_api::codec::{encode_row, encode_untyped};
use quarry_api::error::{EncodeError, SchemaError};
use quarry_api::transport::RpcRequest;
use quarry_api::wire::{ErrorProto, InsertAllRequest, InsertAllRow};
use quarry_api::{Error, InsertId, Schema, TableRow, ValueMap, ValueSaver, infer_schema};
use serde_json::{Map, Value as Json};
use tokio_util::sync::CancellationToken;

use crate::job::random_id;
use crate::table::Table;

/// One row handed to [`Inserter::put`].
pub enum InsertRow {
    /// Values and insert id come from the saver; encoded by value type.
    Saved(Box<dyn ValueSaver + Send + Sync>),
    /// Values checked against an explicit schema.
    Struct {
        schema: Schema,
        values: ValueMap,
        insert_id: InsertId,
    },
    /// A derived row type; its schema is inferred once per `put`. Values
    /// that have no column form are reported when the row is put.
    Inferred {
        type_name: &'static str,
        schema: fn() -> Result<Schema, SchemaError>,
        values: Result<ValueMap, EncodeError>,
        insert_id: InsertId,
    },
}

impl std::fmt::Debug for InsertRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertRow::Saved(_) => f.write_str("InsertRow::Saved(..)"),
            InsertRow::Struct {
                values, insert_id, ..
            } => f
                .debug_struct("InsertRow::Struct")
                .field("values", values)
                .field("insert_id", insert_id)
                .finish_non_exhaustive(),
            InsertRow::Inferred {
                type_name,
                values,
                insert_id,
                ..
            } => f
                .debug_struct("InsertRow::Inferred")
                .field("type_name", type_name)
                .field("values", values)
                .field("insert_id", insert_id)
                .finish_non_exhaustive(),
        }
    }
}

impl InsertRow {
    pub fn saved(saver: impl ValueSaver + Send + Sync + 'static) -> Self {
        InsertRow::Saved(Box::new(saver))
    }

    pub fn with_schema(schema: Schema, values: ValueMap) -> Self {
        InsertRow::Struct {
            schema,
            values,
            insert_id: InsertId::Auto,
        }
    }

    pub fn inferred<T: TableRow>(row: &T) -> Self {
        InsertRow::Inferred {
            type_name: std::any::type_name::<T>(),
            schema: infer_schema::<T>,
            values: row.to_value_map(),
            insert_id: InsertId::Auto,
        }
    }

    /// Override the insert id. Saver rows keep the id their saver returns.
    pub fn insert_id(mut self, id: impl Into<InsertId>) -> Self {
        match &mut self {
            InsertRow::Saved(_) => {}
            InsertRow::Struct { insert_id, .. } | InsertRow::Inferred { insert_id, .. } => {
                *insert_id = id.into();
            }
        }
        self
    }
}

/// Why a row was not inserted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    /// The row never left the client.
    #[error(transparent)]
    Encode(EncodeError),
    /// The service rejected the row.
    #[error("{0}")]
    Service(ErrorProto),
}

/// A row of a `put` call that was not inserted. `index` is the row's
/// position in the input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "row {index} not inserted: {}",
    .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
)]
pub struct RowInsertionError {
    pub index: usize,
    pub insert_id: Option<String>,
    pub errors: Vec<RowError>,
}

/// Streams rows into a table.
#[derive(Debug, Clone)]
pub struct Inserter {
    table: Table,
    skip_invalid_rows: bool,
    ignore_unknown_values: bool,
    template_suffix: Option<String>,
}

struct Prepared {
    index: usize,
    row: InsertAllRow,
}

impl Inserter {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            skip_invalid_rows: false,
            ignore_unknown_values: false,
            template_suffix: None,
        }
    }

    /// Insert the valid rows of a batch even if others are invalid.
    pub fn skip_invalid_rows(mut self, skip: bool) -> Self {
        self.skip_invalid_rows = skip;
        self
    }

    /// Drop values with no matching column instead of rejecting the row.
    pub fn ignore_unknown_values(mut self, ignore: bool) -> Self {
        self.ignore_unknown_values = ignore;
        self
    }

    /// Insert into `<table><suffix>`, created from this table as a template.
    pub fn template_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.template_suffix = Some(suffix.into());
        self
    }

    /// Insert derived rows.
    pub async fn put_rows<T: TableRow>(
        &self,
        rows: &[T],
        cancel: &CancellationToken,
    ) -> Result<Vec<RowInsertionError>, Error> {
        self.put(rows.iter().map(InsertRow::inferred).collect(), cancel)
            .await
    }

    /// Insert rows, reporting the ones that were not inserted.
    ///
    /// Rows that fail to encode are reported and not sent. The rest go out
    /// in batches; errors the service returns per row are mapped back to
    /// input positions. The result is sorted by index and empty when every
    /// row was accepted. Schema inference failures and transport failures
    /// fail the whole call; batches sent before the failure stay inserted.
    pub async fn put(
        &self,
        rows: Vec<InsertRow>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RowInsertionError>, Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let id_prefix = random_id(16);
        let mut schemas: HashMap<&'static str, Schema> = HashMap::new();
        let mut failures = Vec::new();
        let mut prepared = Vec::with_capacity(rows.len());

        for (index, row) in rows.into_iter().enumerate() {
            let (id, encoded) = self.encode(row, &mut schemas)?;
            let insert_id = id.and_then(|id| resolve_insert_id(id, &id_prefix, index));
            match encoded {
                Ok(json) => prepared.push(Prepared {
                    index,
                    row: InsertAllRow { insert_id, json },
                }),
                Err(e) => {
                    tracing::warn!(table = %self.table.reference(), index, error = %e, "row not encodable");
                    failures.push(RowInsertionError {
                        index,
                        insert_id,
                        errors: vec![RowError::Encode(e)],
                    });
                }
            }
        }

        let batch_size = self.table.client().options().max_rows_per_request.max(1);
        let mut pending = prepared.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<Prepared> = pending.by_ref().take(batch_size).collect();
            failures.extend(self.send_batch(batch, cancel).await?);
        }

        failures.sort_by_key(|f| f.index);
        if !failures.is_empty() {
            tracing::warn!(
                table = %self.table.reference(),
                failed = failures.len(),
                "some rows were not inserted"
            );
        }
        Ok(failures)
    }

    /// Outer error: fatal to the call. Inner error: fatal to the row. The
    /// insert id is known even when encoding fails, except for a saver that
    /// failed before returning one.
    fn encode(
        &self,
        row: InsertRow,
        schemas: &mut HashMap<&'static str, Schema>,
    ) -> Result<(Option<InsertId>, Result<Map<String, Json>, EncodeError>), Error> {
        let encoded = match row {
            InsertRow::Saved(saver) => match saver.save() {
                Ok((values, id)) => (Some(id), encode_untyped(&values)),
                Err(e) => (None, Err(e)),
            },
            InsertRow::Struct {
                schema,
                values,
                insert_id,
            } => (
                Some(insert_id),
                encode_row(&schema, &values, self.ignore_unknown_values),
            ),
            InsertRow::Inferred {
                type_name,
                schema,
                values,
                insert_id,
            } => {
                let schema = match schemas.entry(type_name) {
                    Entry::Occupied(cached) => cached.into_mut(),
                    Entry::Vacant(slot) => slot.insert(schema()?),
                };
                let json = values.and_then(|values| encode_row(schema, &values, self.ignore_unknown_values));
                (Some(insert_id), json)
            }
        };
        Ok(encoded)
    }

    async fn send_batch(
        &self,
        batch: Vec<Prepared>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RowInsertionError>, Error> {
        let (positions, rows): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .map(|p| ((p.index, p.row.insert_id.clone()), p.row))
            .unzip();
        tracing::debug!(table = %self.table.reference(), rows = rows.len(), "sending insert batch");

        let request = RpcRequest::InsertAll {
            table: self.table.reference().clone(),
            request: InsertAllRequest {
                skip_invalid_rows: self.skip_invalid_rows,
                ignore_unknown_values: self.ignore_unknown_values,
                template_suffix: self.template_suffix.clone(),
                rows,
            },
        };
        let response = self
            .table
            .client()
            .call(request, cancel)
            .await?
            .into_insert_all()?;

        response
            .insert_errors
            .into_iter()
            .map(|entry| {
                let (index, insert_id) = positions.get(entry.index as usize).cloned().ok_or_else(|| {
                    Error::Protocol(format!(
                        "insert error for row {} of a {}-row batch",
                        entry.index,
                        positions.len()
                    ))
                })?;
                Ok(RowInsertionError {
                    index,
                    insert_id,
                    errors: entry.errors.into_iter().map(RowError::Service).collect(),
                })
            })
            .collect()
    }
}

fn resolve_insert_id(id: InsertId, prefix: &str, index: usize) -> Option<String> {
    match id {
        InsertId::Auto => Some(format!("{prefix}-{index}")),
        InsertId::NoDedupe => None,
        InsertId::Explicit(id) => Some(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_ids() {
        assert_eq!(resolve_insert_id(InsertId::Auto, "abc", 4), Some("abc-4".into()));
        assert_eq!(resolve_insert_id(InsertId::NoDedupe, "abc", 4), None);
        assert_eq!(resolve_insert_id("mine".into(), "abc", 4), Some("mine".into()));
    }

    #[test]
    fn row_error_display() {
        let err = RowInsertionError {
            index: 2,
            insert_id: None,
            errors: vec![
                RowError::Encode(EncodeError::MissingRequired { field: "id".into() }),
                RowError::Service(ErrorProto::new("invalid", "bad row")),
            ],
        };
        assert_eq!(
            err.to_string(),
            "row 2 not inserted: missing required field 'id'; bad row (invalid)"
        );
    }
}
