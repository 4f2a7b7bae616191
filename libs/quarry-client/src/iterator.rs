use std::collections::VecDeque;

use quarry_api::codec::decode_row;
use quarry_api::transport::{PageRequest, RpcRequest};
use quarry_api::wire::{JobReference, QueryResults, TableReference, WireRow};
use quarry_api::{Error, RowLoader, Schema};
use tokio_util::sync::CancellationToken;

use crate::client::Client;

/// Where further pages come from.
#[derive(Debug, Clone)]
enum PageSource {
    Job(JobReference),
    Table(TableReference),
    /// Everything arrived with the first response.
    Exhausted,
}

/// Forward-only cursor over result rows.
///
/// Holds one page at a time and fetches the next one when it runs dry.
/// Once exhausted it stays exhausted. Rows are decoded with the schema
/// returned alongside the results.
#[derive(Debug)]
pub struct RowIterator {
    client: Client,
    source: PageSource,
    job: Option<JobReference>,
    schema: Schema,
    rows: VecDeque<WireRow>,
    page_token: Option<String>,
    total_rows: Option<u64>,
    started: bool,
}

impl RowIterator {
    pub(crate) fn for_job(client: Client, job: JobReference) -> Self {
        Self {
            client,
            source: PageSource::Job(job.clone()),
            job: Some(job),
            schema: Schema::default(),
            rows: VecDeque::new(),
            page_token: None,
            total_rows: None,
            started: false,
        }
    }

    pub(crate) fn for_table(client: Client, table: TableReference, schema: Schema) -> Self {
        Self {
            client,
            source: PageSource::Table(table),
            job: None,
            schema,
            rows: VecDeque::new(),
            page_token: None,
            total_rows: None,
            started: false,
        }
    }

    /// Seed the cursor with a complete first page from the fast path.
    pub(crate) fn from_first_page(client: Client, results: QueryResults) -> Self {
        let source = match &results.job_reference {
            Some(job) => PageSource::Job(job.clone()),
            None => PageSource::Exhausted,
        };
        let mut iter = Self {
            client,
            source,
            job: results.job_reference.clone(),
            schema: Schema::default(),
            rows: VecDeque::new(),
            page_token: None,
            total_rows: None,
            started: true,
        };
        iter.accept(results.schema, results.rows, results.page_token, results.total_rows);
        iter
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Total rows in the result set, as reported by the service.
    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    /// The query job behind the results, if any.
    pub fn job(&self) -> Option<&JobReference> {
        self.job.as_ref()
    }

    /// Next row decoded into `T`, or `None` past the last row.
    pub async fn next<T: RowLoader>(&mut self, cancel: &CancellationToken) -> Result<Option<T>, Error> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                let values = decode_row(&self.schema, &row)?;
                return Ok(Some(T::load(&self.schema, values)?));
            }
            if !self.fetch_page(cancel).await? {
                return Ok(None);
            }
        }
    }

    /// Drain the remaining rows.
    pub async fn collect<T: RowLoader>(mut self, cancel: &CancellationToken) -> Result<Vec<T>, Error> {
        let mut out = Vec::new();
        while let Some(row) = self.next(cancel).await? {
            out.push(row);
        }
        Ok(out)
    }

    /// Fetch the next page, replacing the buffered rows. Returns false when
    /// no page is left.
    pub(crate) async fn fetch_page(&mut self, cancel: &CancellationToken) -> Result<bool, Error> {
        if self.started && self.page_token.is_none() {
            return Ok(false);
        }
        let page = PageRequest {
            page_token: self.page_token.clone(),
            max_results: self.client.options().page_size,
            start_index: None,
        };

        match self.source.clone() {
            PageSource::Job(job) => {
                let request = RpcRequest::GetQueryResults {
                    job: job.clone(),
                    page,
                    timeout_ms: None,
                };
                let results = self.client.call(request, cancel).await?.into_query_results()?;
                if !results.job_complete {
                    return Err(Error::Protocol(format!(
                        "results of job {} requested before completion",
                        job.job_id
                    )));
                }
                let results = *results;
                self.accept(results.schema, results.rows, results.page_token, results.total_rows);
            }
            PageSource::Table(table) => {
                let request = RpcRequest::ListTableData { table, page };
                let data = self.client.call(request, cancel).await?.into_table_data()?;
                self.accept(None, data.rows, data.page_token, data.total_rows);
            }
            PageSource::Exhausted => {
                return Err(Error::Protocol(
                    "page token returned without a job to page through".into(),
                ));
            }
        }
        self.started = true;
        Ok(true)
    }

    fn accept(
        &mut self,
        schema: Option<Schema>,
        rows: Vec<WireRow>,
        page_token: Option<String>,
        total_rows: Option<i64>,
    ) {
        if let Some(schema) = schema {
            self.schema = schema;
        }
        if let Some(total) = total_rows.and_then(|t| u64::try_from(t).ok()) {
            self.total_rows = Some(total);
        }
        tracing::debug!(
            rows = rows.len(),
            more = page_token.is_some(),
            "fetched result page"
        );
        self.rows = rows.into();
        self.page_token = page_token.filter(|t| !t.is_empty());
    }
}
