#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use quarry_client::quarry_api::error::TransportError;
use quarry_client::quarry_api::transport::{BoxFuture, RpcRequest, RpcResponse, Transport};
use quarry_client::quarry_api::wire::{InsertAllResponse, JobResource, QueryResults, TableDataList, TableResource};
use quarry_client::{CancellationToken, Client, ClientOptions, Error};

/// Transport answering from a script, one entry per call, and recording
/// every request it sees.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<RpcResponse, Error>>>,
    requests: Mutex<Vec<RpcRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: RpcResponse) -> &Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(&self, error: Error) -> &Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<RpcRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.requests().iter().map(RpcRequest::method).collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn execute<'a>(
        &'a self,
        request: RpcRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RpcResponse, Error>> {
        Box::pin(async move {
            let method = request.method();
            self.requests.lock().unwrap().push(request);
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Protocol(format!("unscripted call to {method}"))))
        })
    }
}

pub fn client(transport: &Arc<MockTransport>) -> Client {
    Client::new("proj", transport.clone())
}

pub fn client_with(transport: &Arc<MockTransport>, options: ClientOptions) -> Client {
    client(transport).with_options(options)
}

pub fn job_response(json: serde_json::Value) -> RpcResponse {
    let job: JobResource = serde_json::from_value(json).unwrap();
    RpcResponse::Job(Box::new(job))
}

/// A query job in `state`, no error.
pub fn query_job(job_id: &str, state: &str) -> RpcResponse {
    job_response(serde_json::json!({
        "jobReference": {"projectId": "proj", "jobId": job_id, "location": "US"},
        "configuration": {"query": {"query": "SELECT 1"}},
        "status": {"state": state}
    }))
}

pub fn query_results(json: serde_json::Value) -> RpcResponse {
    let results: QueryResults = serde_json::from_value(json).unwrap();
    RpcResponse::QueryResults(Box::new(results))
}

pub fn table_data(json: serde_json::Value) -> RpcResponse {
    let data: TableDataList = serde_json::from_value(json).unwrap();
    RpcResponse::TableData(data)
}

pub fn table(json: serde_json::Value) -> RpcResponse {
    let table: TableResource = serde_json::from_value(json).unwrap();
    RpcResponse::Table(table)
}

pub fn insert_all(json: serde_json::Value) -> RpcResponse {
    let response: InsertAllResponse = serde_json::from_value(json).unwrap();
    RpcResponse::InsertAll(response)
}

pub fn unavailable() -> Error {
    TransportError::http(503, "backend error", vec![]).into()
}

pub fn student_schema() -> serde_json::Value {
    serde_json::json!({"fields": [
        {"name": "name", "type": "STRING", "mode": "REQUIRED"},
        {"name": "grade", "type": "INTEGER", "mode": "REQUIRED"},
        {"name": "age", "type": "INTEGER", "mode": "NULLABLE"}
    ]})
}
