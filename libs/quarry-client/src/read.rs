//! Reading query results: the synchronous fast path and its job fallback.

use quarry_api::Error;
use quarry_api::transport::RpcRequest;
use tokio_util::sync::CancellationToken;

use crate::iterator::RowIterator;
use crate::job::Job;
use crate::query::Query;

impl Query {
    /// Whether [`read`](Self::read) may use the synchronous query call.
    ///
    /// Anything that only a job configuration can express forces a job.
    pub fn uses_fast_path(&self) -> bool {
        let config = self.config();
        !config.force_job
            && !config.dry_run
            && config.destination.is_none()
            && config.create_disposition.is_none()
            && config.write_disposition.is_none()
            && self.job.job_id.is_none()
            && self.job.job_id_prefix.is_none()
    }

    /// Run the query and open a cursor over its results.
    ///
    /// Eligible queries go through the synchronous call first. If the
    /// service finishes within the fast path window the first page comes
    /// back directly; otherwise the job it created is awaited like any
    /// other. Rows are the same either way.
    pub async fn read(&self, cancel: &CancellationToken) -> Result<RowIterator, Error> {
        if !self.uses_fast_path() {
            let mut job = self.run(cancel).await?;
            return job.read(cancel).await;
        }

        let client = self.client();
        let request = RpcRequest::Query {
            project_id: client.project_id().to_string(),
            request: Box::new(self.query_request()?),
        };
        let results = client.call(request, cancel).await?.into_query_results()?;

        if results.job_complete {
            tracing::debug!(
                job_id = results.job_reference.as_ref().map(|j| j.job_id.as_str()),
                rows = results.rows.len(),
                "query answered synchronously"
            );
            return Ok(RowIterator::from_first_page(client.clone(), *results));
        }

        let reference = results.job_reference.ok_or_else(|| {
            Error::Protocol("unfinished query response carries no job reference".into())
        })?;
        tracing::info!(
            job_id = %reference.job_id,
            "query outlived the synchronous window, waiting for the job"
        );
        let mut job = Job::running(client.clone(), reference, self.job_configuration()?);
        job.read(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quarry_api::transport::{BoxFuture, RpcResponse, Transport};
    use quarry_api::wire::WriteDisposition;

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
    fn fast_path_eligibility() {
        let client = Client::new("proj", Arc::new(Unreachable));
        assert!(client.query("SELECT 1").uses_fast_path());
        assert!(client.query("SELECT 1").location("EU").uses_fast_path());
        assert!(!client.query("SELECT 1").force_job(true).uses_fast_path());
        assert!(!client.query("SELECT 1").dry_run(true).uses_fast_path());
        assert!(!client.query("SELECT 1").job_id("fixed").uses_fast_path());
        assert!(!client.query("SELECT 1").job_id_prefix("etl_").uses_fast_path());
        assert!(
            !client
                .query("SELECT 1")
                .write_disposition(WriteDisposition::WriteAppend)
                .uses_fast_path()
        );
        let table = client.dataset("ds").table("t");
        assert!(!client.query("SELECT 1").destination(&table).uses_fast_path());
    }
}
