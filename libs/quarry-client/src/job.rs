use std::collections::BTreeMap;
use std::time::Duration;

use quarry_api::Error;
use quarry_api::error::JobError;
use quarry_api::transport::RpcRequest;
use quarry_api::wire::{JobConfiguration, JobReference, JobResource, JobStatistics, WireJobState};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::iterator::RowIterator;

/// Lifecycle state of a job. Ordered: a job only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobState {
    /// Built locally, not yet accepted by the service.
    Created,
    Pending,
    Running,
    Done,
}

impl From<WireJobState> for JobState {
    fn from(state: WireJobState) -> Self {
        match state {
            WireJobState::Pending => JobState::Pending,
            WireJobState::Running => JobState::Running,
            WireJobState::Done => JobState::Done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Query,
    Load,
    Copy,
    Extract,
}

impl JobKind {
    pub fn of(config: &JobConfiguration) -> Option<Self> {
        if config.query.is_some() {
            Some(JobKind::Query)
        } else if config.load.is_some() {
            Some(JobKind::Load)
        } else if config.copy.is_some() {
            Some(JobKind::Copy)
        } else if config.extract.is_some() {
            Some(JobKind::Extract)
        } else {
            None
        }
    }
}

/// Last known status of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    /// Set once the job is done and failed.
    pub error: Option<JobError>,
    pub statistics: Option<JobStatistics>,
}

impl JobStatus {
    fn created() -> Self {
        Self {
            state: JobState::Created,
            error: None,
            statistics: None,
        }
    }

    pub fn done(&self) -> bool {
        self.state == JobState::Done
    }

    pub fn err(&self) -> Option<&JobError> {
        self.error.as_ref()
    }
}

/// Identity and labels of a job about to be created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOptions {
    /// Explicit job id. Takes precedence over `job_id_prefix`.
    pub job_id: Option<String>,
    /// Prefix of a generated job id.
    pub job_id_prefix: Option<String>,
    /// Overrides the client's default location.
    pub location: Option<String>,
    pub labels: BTreeMap<String, String>,
}

const JOB_ID_SUFFIX_LEN: usize = 27;

impl JobOptions {
    pub(crate) fn reference(&self, client: &Client) -> JobReference {
        let job_id = match (&self.job_id, &self.job_id_prefix) {
            (Some(id), _) => id.clone(),
            (None, prefix) => format!("{}{}", prefix.as_deref().unwrap_or(""), random_id(JOB_ID_SUFFIX_LEN)),
        };
        JobReference {
            project_id: client.project_id().to_string(),
            job_id,
            location: self
                .location
                .clone()
                .or_else(|| client.location().map(str::to_string)),
        }
    }
}

pub(crate) fn random_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Builder methods shared by every job-creating builder with a
/// `job: JobOptions` field.
macro_rules! job_options_builder {
    () => {
        /// Use an explicit job id instead of a generated one.
        pub fn job_id(mut self, job_id: impl Into<String>) -> Self {
            self.job.job_id = Some(job_id.into());
            self
        }

        /// Prefix for the generated job id.
        pub fn job_id_prefix(mut self, prefix: impl Into<String>) -> Self {
            self.job.job_id_prefix = Some(prefix.into());
            self
        }

        pub fn location(mut self, location: impl Into<String>) -> Self {
            self.job.location = Some(location.into());
            self
        }

        pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.job.labels.insert(key.into(), value.into());
            self
        }
    };
}

pub(crate) use job_options_builder;

/// A server-side asynchronous unit of work.
///
/// State changes only through answers from the service; once done, the
/// status is cached and never re-polled.
#[derive(Debug)]
pub struct Job {
    client: Client,
    reference: JobReference,
    config: JobConfiguration,
    status: JobStatus,
}

impl Job {
    /// Create and submit a job.
    pub(crate) async fn submit(
        client: &Client,
        options: &JobOptions,
        mut config: JobConfiguration,
        cancel: &CancellationToken,
    ) -> Result<Job, Error> {
        config.labels.extend(options.labels.clone());
        let mut job = Job {
            client: client.clone(),
            reference: options.reference(client),
            config,
            status: JobStatus::created(),
        };
        job.insert(cancel).await?;
        Ok(job)
    }

    async fn insert(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        let resource = JobResource {
            job_reference: self.reference.clone(),
            configuration: self.config.clone(),
            status: None,
            statistics: None,
        };
        let request = RpcRequest::InsertJob {
            project_id: self.reference.project_id.clone(),
            job: Box::new(resource),
        };
        let resource = self.client.call(request, cancel).await?.into_job()?;

        let location = self.reference.location.take();
        self.reference = resource.job_reference.clone();
        if self.reference.location.is_none() {
            self.reference.location = location;
        }
        self.status.state = JobState::Pending;
        self.apply(*resource);

        tracing::info!(
            job_id = %self.reference.job_id,
            kind = ?self.kind(),
            state = ?self.status.state,
            "submitted job"
        );
        Ok(())
    }

    /// A job the service already knows about, e.g. from jobs.get.
    pub(crate) fn from_resource(client: Client, resource: JobResource) -> Job {
        let mut job = Job {
            client,
            reference: resource.job_reference.clone(),
            config: resource.configuration.clone(),
            status: JobStatus::created(),
        };
        job.apply(resource);
        job
    }

    /// A query job the fast path handed back unfinished.
    pub(crate) fn running(client: Client, reference: JobReference, config: JobConfiguration) -> Job {
        Job {
            client,
            reference,
            config,
            status: JobStatus {
                state: JobState::Running,
                error: None,
                statistics: None,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.reference.job_id
    }

    pub fn location(&self) -> Option<&str> {
        self.reference.location.as_deref()
    }

    pub fn reference(&self) -> &JobReference {
        &self.reference
    }

    pub fn kind(&self) -> Option<JobKind> {
        JobKind::of(&self.config)
    }

    pub fn config(&self) -> &JobConfiguration {
        &self.config
    }

    /// Status as of the last answer from the service. No RPC.
    pub fn last_status(&self) -> &JobStatus {
        &self.status
    }

    /// Fetch the current status. Once the job is done this returns the
    /// cached terminal status without an RPC.
    pub async fn status(&mut self, cancel: &CancellationToken) -> Result<&JobStatus, Error> {
        if !self.status.done() {
            self.poll(cancel).await?;
        }
        Ok(&self.status)
    }

    /// Poll until the job is done.
    ///
    /// Polls are spaced by the client's backoff policy. Transient transport
    /// errors are retried on the same schedule; anything else is returned.
    /// Firing `cancel` stops waiting at once with `Error::Cancelled`; the job
    /// keeps running on the service.
    ///
    /// A job that finished with an error yields `Error::Job`; the status
    /// stays available through [`last_status`](Self::last_status).
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<&JobStatus, Error> {
        let backoff = self.client.options().backoff.clone();
        let mut attempt = 0u32;

        while !self.status.done() {
            match self.poll(cancel).await {
                Ok(()) => {}
                Err(Error::Transport(e)) if e.is_transient() => {
                    tracing::warn!(
                        job_id = %self.reference.job_id,
                        attempt,
                        error = %e,
                        "transient error while polling job, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
            if self.status.done() {
                break;
            }

            let delay = backoff.next_delay(attempt);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match &self.status.error {
            Some(err) => Err(Error::Job(err.clone())),
            None => Ok(&self.status),
        }
    }

    /// [`wait`](Self::wait) with a deadline. Running out of time is reported
    /// as `Error::Cancelled`.
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<&JobStatus, Error> {
        match tokio::time::timeout(timeout, self.wait(cancel)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Ask the service to cancel the job. Cancellation is asynchronous on
    /// the service side; [`wait`](Self::wait) to observe the outcome.
    pub async fn cancel(&mut self, token: &CancellationToken) -> Result<(), Error> {
        if self.status.done() {
            return Ok(());
        }
        let resource = self
            .client
            .call(RpcRequest::CancelJob(self.reference.clone()), token)
            .await?
            .into_job()?;
        tracing::info!(job_id = %self.reference.job_id, "requested job cancellation");
        self.apply(*resource);
        Ok(())
    }

    /// Wait for a query job and open a cursor over its results.
    pub async fn read(&mut self, cancel: &CancellationToken) -> Result<RowIterator, Error> {
        if self.kind() != Some(JobKind::Query) {
            return Err(Error::NotQueryJob(self.reference.job_id.clone()));
        }
        self.wait(cancel).await?;

        let mut rows = RowIterator::for_job(self.client.clone(), self.reference.clone());
        rows.fetch_page(cancel).await?;
        Ok(rows)
    }

    async fn poll(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        let resource = self
            .client
            .call(RpcRequest::GetJob(self.reference.clone()), cancel)
            .await?
            .into_job()?;
        self.apply(*resource);
        tracing::debug!(
            job_id = %self.reference.job_id,
            state = ?self.status.state,
            "polled job"
        );
        Ok(())
    }

    fn apply(&mut self, resource: JobResource) {
        if self.status.done() {
            return;
        }
        if let Some(location) = resource.job_reference.location {
            self.reference.location.get_or_insert(location);
        }
        if let Some(statistics) = resource.statistics {
            self.status.statistics = Some(statistics);
        }
        let Some(status) = resource.status else {
            return;
        };

        self.status.state = self.status.state.max(status.state.into());
        if self.status.done() {
            self.status.error = status.error_result.map(|error| JobError {
                job_id: self.reference.job_id.clone(),
                error,
                errors: status.errors,
            });
            match &self.status.error {
                Some(err) => tracing::info!(job_id = %self.reference.job_id, error = %err.error, "job failed"),
                None => tracing::info!(job_id = %self.reference.job_id, "job done"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        assert!(JobState::Created < JobState::Pending);
        assert!(JobState::Running < JobState::Done);
        assert_eq!(JobState::Done.max(JobState::Running), JobState::Done);
    }

    #[test]
    fn kind_follows_configuration() {
        let mut config = JobConfiguration::default();
        assert_eq!(JobKind::of(&config), None);
        config.copy = Some(Default::default());
        assert_eq!(JobKind::of(&config), Some(JobKind::Copy));
    }

    #[test]
    fn random_ids_are_alphanumeric() {
        let id = random_id(JOB_ID_SUFFIX_LEN);
        assert_eq!(id.len(), JOB_ID_SUFFIX_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, random_id(JOB_ID_SUFFIX_LEN));
    }
}
