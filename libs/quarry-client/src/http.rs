//! REST mapping of [`RpcRequest`]s over reqwest.

use std::time::Duration;

use quarry_api::Error;
use quarry_api::error::TransportError;
use quarry_api::transport::{BoxFuture, PageRequest, RpcRequest, RpcResponse, Transport};
use quarry_api::wire::{ErrorProto, JobReference, JobResource, QueryResults, TableReference};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// [`Transport`] speaking the service's JSON REST API.
///
/// Authentication is limited to an optional static bearer token.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

/// `{"error": {...}}` body of a failed call.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

/// Response of jobs.cancel.
#[derive(Debug, Deserialize)]
struct CancelResponse {
    job: JobResource,
}

impl HttpTransport {
    pub fn new(
        endpoint: &str,
        access_token: Option<String>,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    async fn exec<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, Error> {
        let builder = match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::connection(format!("request: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::connection(format!("read body: {e}")))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => TransportError::http(status.as_u16(), parsed.error.message, parsed.error.errors),
                Err(_) => TransportError::http(status.as_u16(), body, Vec::new()),
            }
            .into());
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Protocol(format!("{e} in response body")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn job_path(job: &JobReference) -> String {
        format!("projects/{}/jobs/{}", job.project_id, job.job_id)
    }

    fn table_path(table: &TableReference) -> String {
        format!(
            "projects/{}/datasets/{}/tables/{}",
            table.project_id, table.dataset_id, table.table_id
        )
    }

    async fn dispatch(&self, request: RpcRequest) -> Result<RpcResponse, Error> {
        match request {
            RpcRequest::InsertJob { project_id, job } => {
                let builder = self.http.post(self.url(&format!("projects/{project_id}/jobs"))).json(&job);
                self.exec::<JobResource>(builder)
                    .await
                    .map(|j| RpcResponse::Job(Box::new(j)))
            }
            RpcRequest::GetJob(job) => {
                let builder = self
                    .http
                    .get(self.url(&Self::job_path(&job)))
                    .query(&location_query(&job));
                self.exec::<JobResource>(builder)
                    .await
                    .map(|j| RpcResponse::Job(Box::new(j)))
            }
            RpcRequest::CancelJob(job) => {
                let builder = self
                    .http
                    .post(self.url(&format!("{}/cancel", Self::job_path(&job))))
                    .query(&location_query(&job));
                self.exec::<CancelResponse>(builder)
                    .await
                    .map(|r| RpcResponse::Job(Box::new(r.job)))
            }
            RpcRequest::Query { project_id, request } => {
                let builder = self
                    .http
                    .post(self.url(&format!("projects/{project_id}/queries")))
                    .json(&request);
                self.exec::<QueryResults>(builder)
                    .await
                    .map(|r| RpcResponse::QueryResults(Box::new(r)))
            }
            RpcRequest::GetQueryResults { job, page, timeout_ms } => {
                let mut query = location_query(&job);
                query.extend(page_query(&page));
                if let Some(ms) = timeout_ms {
                    query.push(("timeoutMs", ms.to_string()));
                }
                let builder = self
                    .http
                    .get(self.url(&format!("projects/{}/queries/{}", job.project_id, job.job_id)))
                    .query(&query);
                self.exec::<QueryResults>(builder)
                    .await
                    .map(|r| RpcResponse::QueryResults(Box::new(r)))
            }
            RpcRequest::ListTableData { table, page } => {
                let builder = self
                    .http
                    .get(self.url(&format!("{}/data", Self::table_path(&table))))
                    .query(&page_query(&page));
                self.exec(builder).await.map(RpcResponse::TableData)
            }
            RpcRequest::GetTable(table) => {
                let builder = self.http.get(self.url(&Self::table_path(&table)));
                self.exec(builder).await.map(RpcResponse::Table)
            }
            RpcRequest::InsertAll { table, request } => {
                let builder = self
                    .http
                    .post(self.url(&format!("{}/insertAll", Self::table_path(&table))))
                    .json(&request);
                self.exec(builder).await.map(RpcResponse::InsertAll)
            }
        }
    }
}

fn location_query(job: &JobReference) -> Vec<(&'static str, String)> {
    job.location
        .iter()
        .map(|l| ("location", l.clone()))
        .collect()
}

fn page_query(page: &PageRequest) -> Vec<(&'static str, String)> {
    // Timestamps come back as integer microseconds; the codec reads both.
    let mut query = vec![("formatOptions.useInt64Timestamp", "true".to_string())];
    if let Some(token) = &page.page_token {
        query.push(("pageToken", token.clone()));
    } else if let Some(start) = page.start_index {
        query.push(("startIndex", start.to_string()));
    }
    if let Some(max) = page.max_results {
        query.push(("maxResults", max.to_string()));
    }
    query
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: RpcRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RpcResponse, Error>> {
        Box::pin(async move {
            let method = request.method();
            tracing::debug!(method, "sending request");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.dispatch(request) => result,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_prefers_token_over_offset() {
        let query = page_query(&PageRequest {
            page_token: Some("abc".into()),
            max_results: Some(10),
            start_index: Some(5),
        });
        assert_eq!(
            query,
            vec![
                ("formatOptions.useInt64Timestamp", "true".to_string()),
                ("pageToken", "abc".to_string()),
                ("maxResults", "10".to_string()),
            ]
        );
    }

    #[test]
    fn error_body_parses() {
        let body = r#"{"error": {"code": 404, "message": "Not found: Job p:j",
            "errors": [{"reason": "notFound", "message": "Not found: Job p:j"}]}}"#;
        let parsed: ErrorBody = serde_json::from_str(body).unwrap();
        let err = TransportError::http(404, parsed.error.message, parsed.error.errors);
        assert_eq!(err.reason(), Some("notFound"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let transport =
            HttpTransport::new("http://127.0.0.1:9", None, Duration::from_secs(1), false).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = transport
            .execute(RpcRequest::GetJob(JobReference::default()), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
