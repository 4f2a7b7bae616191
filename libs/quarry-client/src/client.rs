use std::sync::Arc;

use quarry_api::Error;
use quarry_api::transport::{RpcRequest, RpcResponse, Transport};
use quarry_api::wire::JobReference;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, ClientOptions};
use crate::http::HttpTransport;
use crate::job::Job;
use crate::query::Query;
use crate::table::Dataset;

/// Entry point: owns the transport and the project jobs are billed to.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    project_id: String,
    location: Option<String>,
    options: ClientOptions,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(project_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            project_id: project_id.into(),
            location: None,
            options: ClientOptions::default(),
        }
    }

    /// Build a client talking to the REST endpoint described by `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, Error> {
        let transport = HttpTransport::new(
            &config.endpoint,
            config.access_token.clone(),
            config.request_timeout(),
            config.accept_invalid_certs,
        )?;
        let mut client = Self::new(config.project_id.clone(), Arc::new(transport))
            .with_options(config.options());
        client.location = config.location.clone();
        Ok(client)
    }

    /// Default location for jobs created through this client.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn query(&self, sql: impl Into<String>) -> Query {
        Query::new(self.clone(), sql.into())
    }

    /// Reference to a dataset in the client's project. Nothing is fetched.
    pub fn dataset(&self, dataset_id: impl Into<String>) -> Dataset {
        Dataset::new(self.clone(), self.project_id.clone(), dataset_id.into())
    }

    pub fn dataset_in_project(
        &self,
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
    ) -> Dataset {
        Dataset::new(self.clone(), project_id.into(), dataset_id.into())
    }

    /// Look up an existing job in the client's default location.
    pub async fn job_from_id(&self, job_id: &str, cancel: &CancellationToken) -> Result<Job, Error> {
        let location = self.location.clone();
        self.job_from_id_location(job_id, location.as_deref(), cancel)
            .await
    }

    pub async fn job_from_id_location(
        &self,
        job_id: &str,
        location: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Job, Error> {
        let reference = JobReference {
            project_id: self.project_id.clone(),
            job_id: job_id.to_string(),
            location: location.map(str::to_string),
        };
        let resource = self.call(RpcRequest::GetJob(reference), cancel).await?.into_job()?;
        Ok(Job::from_resource(self.clone(), *resource))
    }

    pub(crate) async fn call(
        &self,
        request: RpcRequest,
        cancel: &CancellationToken,
    ) -> Result<RpcResponse, Error> {
        // Nothing is sent once the caller has given up.
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.transport.execute(request, cancel).await
    }
}
