use quarry_api::Error;
use quarry_api::wire::{DataFormat, JobConfiguration, JobConfigurationExtract};
use tokio_util::sync::CancellationToken;

use crate::gcs::GcsReference;
use crate::job::{Job, JobOptions, job_options_builder};
use crate::table::Table;

/// Exports a table to object storage.
#[derive(Debug, Clone)]
pub struct Extractor {
    source: Table,
    destination: GcsReference,
    disable_header: bool,
    job: JobOptions,
}

impl Extractor {
    pub(crate) fn new(source: Table, destination: GcsReference) -> Self {
        Self {
            source,
            destination,
            disable_header: false,
            job: JobOptions::default(),
        }
    }

    /// Omit the header row from CSV output.
    pub fn disable_header(mut self, disable: bool) -> Self {
        self.disable_header = disable;
        self
    }

    pub fn destination_format(mut self, format: DataFormat) -> Self {
        self.destination.source_format = Some(format);
        self
    }

    job_options_builder!();

    pub async fn run(&self, cancel: &CancellationToken) -> Result<Job, Error> {
        Job::submit(self.source.client(), &self.job, self.job_configuration(), cancel).await
    }

    fn job_configuration(&self) -> JobConfiguration {
        let dst = &self.destination;
        JobConfiguration {
            extract: Some(JobConfigurationExtract {
                source_table: self.source.reference().clone(),
                destination_uris: dst.uris.clone(),
                print_header: self.disable_header.then_some(false),
                destination_format: dst.source_format,
                compression: dst.compression,
                field_delimiter: dst.field_delimiter.clone(),
            }),
            ..Default::default()
        }
    }
}
