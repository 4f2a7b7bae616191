use quarry_api::Error;
use quarry_api::wire::{
    CreateDisposition, JobConfiguration, JobConfigurationTableCopy, TableReference,
    WriteDisposition,
};
use tokio_util::sync::CancellationToken;

use crate::job::{Job, JobOptions, job_options_builder};
use crate::table::Table;

/// Copies one or more tables into a destination table.
#[derive(Debug, Clone)]
pub struct Copier {
    destination: Table,
    sources: Vec<TableReference>,
    create_disposition: Option<CreateDisposition>,
    write_disposition: Option<WriteDisposition>,
    job: JobOptions,
}

impl Copier {
    pub(crate) fn new(destination: Table, sources: Vec<TableReference>) -> Self {
        Self {
            destination,
            sources,
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
        JobConfiguration {
            copy: Some(JobConfigurationTableCopy {
                source_tables: self.sources.clone(),
                destination_table: self.destination.reference().clone(),
                create_disposition: self.create_disposition,
                write_disposition: self.write_disposition,
            }),
            ..Default::default()
        }
    }
}
