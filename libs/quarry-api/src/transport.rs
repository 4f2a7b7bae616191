//! The RPC capability the client core is built on.
//!
//! Authentication, connection handling and the HTTP mapping live behind
//! [`Transport`]; the core only describes the call and interprets the
//! response.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::wire::{
    InsertAllRequest, InsertAllResponse, JobReference, JobResource, QueryRequest, QueryResults,
    TableDataList, TableReference, TableResource,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Paging arguments shared by the result-listing calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub page_token: Option<String>,
    pub max_results: Option<u32>,
    /// Row offset; only meaningful without a page token.
    pub start_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpcRequest {
    /// jobs.insert
    InsertJob { project_id: String, job: Box<JobResource> },
    /// jobs.get
    GetJob(JobReference),
    /// jobs.cancel
    CancelJob(JobReference),
    /// jobs.query
    Query { project_id: String, request: Box<QueryRequest> },
    /// jobs.getQueryResults
    GetQueryResults {
        job: JobReference,
        page: PageRequest,
        /// How long the service may hold the call waiting for completion.
        timeout_ms: Option<u64>,
    },
    /// tabledata.list
    ListTableData { table: TableReference, page: PageRequest },
    /// tables.get
    GetTable(TableReference),
    /// tabledata.insertAll
    InsertAll {
        table: TableReference,
        request: InsertAllRequest,
    },
}

impl RpcRequest {
    /// Method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::InsertJob { .. } => "jobs.insert",
            RpcRequest::GetJob(_) => "jobs.get",
            RpcRequest::CancelJob(_) => "jobs.cancel",
            RpcRequest::Query { .. } => "jobs.query",
            RpcRequest::GetQueryResults { .. } => "jobs.getQueryResults",
            RpcRequest::ListTableData { .. } => "tabledata.list",
            RpcRequest::GetTable(_) => "tables.get",
            RpcRequest::InsertAll { .. } => "tabledata.insertAll",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Job(Box<JobResource>),
    QueryResults(Box<QueryResults>),
    TableData(TableDataList),
    Table(TableResource),
    InsertAll(InsertAllResponse),
}

macro_rules! into_variant {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(self) -> Result<$ty, Error> {
            match self {
                RpcResponse::$variant(v) => Ok(v.into()),
                other => Err(Error::Protocol(format!(
                    concat!("expected ", stringify!($variant), " response, got {}"),
                    other.kind()
                ))),
            }
        }
    };
}

impl RpcResponse {
    fn kind(&self) -> &'static str {
        match self {
            RpcResponse::Job(_) => "Job",
            RpcResponse::QueryResults(_) => "QueryResults",
            RpcResponse::TableData(_) => "TableData",
            RpcResponse::Table(_) => "Table",
            RpcResponse::InsertAll(_) => "InsertAll",
        }
    }

    into_variant!(into_job, Job, Box<JobResource>);
    into_variant!(into_query_results, QueryResults, Box<QueryResults>);
    into_variant!(into_table_data, TableData, TableDataList);
    into_variant!(into_table, Table, TableResource);
    into_variant!(into_insert_all, InsertAll, InsertAllResponse);
}

/// Executes one RPC.
///
/// Implementations must return `Error::Transport` for failures of the call
/// itself (with the service's error payload when one was returned) and
/// `Error::Cancelled` once `cancel` fires, without waiting for the call to
/// finish.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: RpcRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RpcResponse, Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_response_kind_is_a_protocol_error() {
        let response = RpcResponse::InsertAll(InsertAllResponse::default());
        let err = response.into_job().unwrap_err();
        assert!(matches!(err, Error::Protocol(msg) if msg.contains("got InsertAll")));
    }

    #[test]
    fn method_names_follow_the_rest_api() {
        let job = JobReference::default();
        assert_eq!(RpcRequest::GetJob(job.clone()).method(), "jobs.get");
        assert_eq!(RpcRequest::CancelJob(job).method(), "jobs.cancel");
    }
}
