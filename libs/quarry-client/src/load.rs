use quarry_api::Error;
use quarry_api::wire::{CreateDisposition, JobConfiguration, JobConfigurationLoad, WriteDisposition};
use tokio_util::sync::CancellationToken;

use crate::gcs::GcsReference;
use crate::job::{Job, JobOptions, job_options_builder};
use crate::table::Table;

/// Loads files from object storage into a table.
#[derive(Debug, Clone)]
pub struct Loader {
    destination: Table,
    source: GcsReference,
    create_disposition: Option<CreateDisposition>,
    write_disposition: Option<WriteDisposition>,
    job: JobOptions,
}

impl Loader {
    pub(crate) fn new(destination: Table, source: GcsReference) -> Self {
        Self {
            destination,
            source,
            create_disposition: None,
            write_disposition: None,
            job: JobOptions::default(),
        }
    }

    pub fn create_disposition(mut self, disposition: CreateDisposition) -> Self {
        self.create_disposition = Some(disposition);
        self
    }

    pub fn write_disposition(mut self, disposition: WriteDisposition) -> Self {
        self.write_disposition = Some(disposition);
        self
    }

    job_options_builder!();

    pub async fn run(&self, cancel: &CancellationToken) -> Result<Job, Error> {
        Job::submit(self.destination.client(), &self.job, self.job_configuration(), cancel).await
    }

    fn job_configuration(&self) -> JobConfiguration {
        let src = &self.source;
        JobConfiguration {
            load: Some(JobConfigurationLoad {
                source_uris: src.uris.clone(),
                destination_table: self.destination.reference().clone(),
                schema: src.schema.clone(),
                source_format: src.source_format,
                create_disposition: self.create_disposition,
                write_disposition: self.write_disposition,
                allow_jagged_rows: src.allow_jagged_rows.then_some(true),
                allow_quoted_newlines: src.allow_quoted_newlines.then_some(true),
                skip_leading_rows: src.skip_leading_rows,
                field_delimiter: src.field_delimiter.clone(),
                max_bad_records: src.max_bad_records,
                autodetect: src.autodetect.then_some(true),
                ignore_unknown_values: src.ignore_unknown_values.then_some(true),
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use quarry_api::transport::{BoxFuture, RpcRequest, RpcResponse, Transport};
    use quarry_api::wire::DataFormat;
    use quarry_api::{FieldSchema, FieldType, Schema};

    use crate::client::Client;

    use super::*;

    struct Unreachable;

    impl Transport for Unreachable {
        fn execute<'a>(
            &'a self,
            _request: RpcRequest,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<RpcResponse, Error>> {
            Box::pin(async { Err(Error::Protocol("unreachable".into())) })
        }
    }

    #[test]
    fn load_configuration_wire_form() {
        let client = Client::new("p", Arc::new(Unreachable));
        let source = GcsReference::new(["gs://bucket/data-*.csv"])
            .format(DataFormat::Csv)
            .skip_leading_rows(1)
            .allow_jagged_rows(true)
            .schema(Schema::new(vec![FieldSchema::new("id", FieldType::Integer)]));
        let loader = client
            .dataset("ds")
            .table("t")
            .loader_from(source)
            .write_disposition(WriteDisposition::WriteAppend);

        assert_eq!(
            serde_json::to_value(loader.job_configuration()).unwrap(),
            serde_json::json!({
                "load": {
                    "sourceUris": ["gs://bucket/data-*.csv"],
                    "destinationTable": {"projectId": "p", "datasetId": "ds", "tableId": "t"},
                    "schema": {"fields": [{"name": "id", "type": "INTEGER", "mode": "REQUIRED"}]},
                    "sourceFormat": "CSV",
                    "writeDisposition": "WRITE_APPEND",
                    "allowJaggedRows": true,
                    "skipLeadingRows": 1
                }
            })
        );
    }
}
