use quarry_api::wire::{
    CreateDisposition, DataFormatOptions, DatasetReference, JobConfiguration,
    JobConfigurationQuery, QueryRequest, TableReference, WriteDisposition,
};
use quarry_api::{Error, Value};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::job::{Job, JobOptions, job_options_builder, random_id};
use crate::params::{ParameterValue, QueryParameter, encode_parameters};
use crate::table::{Dataset, Table};

/// Everything that shapes a query besides job identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryConfig {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
    pub default_dataset: Option<DatasetReference>,
    /// Results are written here instead of an anonymous table.
    pub destination: Option<TableReference>,
    pub create_disposition: Option<CreateDisposition>,
    pub write_disposition: Option<WriteDisposition>,
    pub use_legacy_sql: bool,
    /// Validate and estimate only.
    pub dry_run: bool,
    pub max_bytes_billed: Option<i64>,
    /// Always create a job, even when the synchronous call would do.
    pub force_job: bool,
}

/// A query builder. Nothing is sent until [`run`](Self::run) or
/// [`read`](Self::read).
#[derive(Debug, Clone)]
pub struct Query {
    client: Client,
    config: QueryConfig,
    pub(crate) job: JobOptions,
}

impl Query {
    pub(crate) fn new(client: Client, sql: String) -> Self {
        Self {
            client,
            config: QueryConfig {
                sql,
                ..Default::default()
            },
            job: JobOptions::default(),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Bind `@name` in the query text.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config
            .parameters
            .push(QueryParameter::named(name, value));
        self
    }

    /// Bind `@name` to a STRUCT whose fields keep the given order.
    pub fn struct_parameter(
        mut self,
        name: impl Into<String>,
        fields: Vec<(String, ParameterValue)>,
    ) -> Self {
        self.config.parameters.push(QueryParameter::new(
            Some(name.into()),
            ParameterValue::Struct(fields),
        ));
        self
    }

    /// Bind the next `?` in the query text.
    pub fn positional_parameter(mut self, value: impl Into<Value>) -> Self {
        self.config.parameters.push(QueryParameter::positional(value));
        self
    }

    /// Dataset used to resolve unqualified table names.
    pub fn default_dataset(mut self, dataset: &Dataset) -> Self {
        self.config.default_dataset = Some(dataset.reference().clone());
        self
    }

    pub fn destination(mut self, table: &Table) -> Self {
        self.config.destination = Some(table.reference().clone());
        self
    }

    pub fn create_disposition(mut self, disposition: CreateDisposition) -> Self {
        self.config.create_disposition = Some(disposition);
        self
    }

    pub fn write_disposition(mut self, disposition: WriteDisposition) -> Self {
        self.config.write_disposition = Some(disposition);
        self
    }

    pub fn use_legacy_sql(mut self, legacy: bool) -> Self {
        self.config.use_legacy_sql = legacy;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn max_bytes_billed(mut self, bytes: i64) -> Self {
        self.config.max_bytes_billed = Some(bytes);
        self
    }

    pub fn force_job(mut self, force: bool) -> Self {
        self.config.force_job = force;
        self
    }

    job_options_builder!();

    /// Submit the query as a job.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<Job, Error> {
        let config = self.job_configuration()?;
        Job::submit(&self.client, &self.job, config, cancel).await
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn job_configuration(&self) -> Result<JobConfiguration, Error> {
        let (parameter_mode, query_parameters) = encode_parameters(&self.config.parameters)?;
        let query = JobConfigurationQuery {
            query: self.config.sql.clone(),
            destination_table: self.config.destination.clone(),
            default_dataset: self.config.default_dataset.clone(),
            create_disposition: self.config.create_disposition,
            write_disposition: self.config.write_disposition,
            use_legacy_sql: Some(self.config.use_legacy_sql),
            parameter_mode,
            query_parameters,
            maximum_bytes_billed: self.config.max_bytes_billed,
        };
        Ok(JobConfiguration {
            query: Some(query),
            dry_run: self.config.dry_run.then_some(true),
            ..Default::default()
        })
    }

    /// Body of the synchronous query call.
    pub(crate) fn query_request(&self) -> Result<QueryRequest, Error> {
        let (parameter_mode, query_parameters) = encode_parameters(&self.config.parameters)?;
        let options = self.client.options();
        Ok(QueryRequest {
            query: self.config.sql.clone(),
            default_dataset: self.config.default_dataset.clone(),
            use_legacy_sql: Some(self.config.use_legacy_sql),
            parameter_mode,
            query_parameters,
            timeout_ms: Some(options.fast_path_timeout.as_millis() as u64),
            max_results: options.page_size,
            location: self
                .job
                .location
                .clone()
                .or_else(|| self.client.location().map(str::to_string)),
            labels: self.job.labels.clone(),
            request_id: Some(random_id(32)),
            maximum_bytes_billed: self.config.max_bytes_billed,
            format_options: Some(DataFormatOptions {
                use_int64_timestamp: true,
            }),
        })
    }
}
