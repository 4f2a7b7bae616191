use quarry_api::transport::RpcRequest;
use quarry_api::wire::{DatasetReference, TableReference};
use quarry_api::{Error, Schema};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::copy::Copier;
use crate::extract::Extractor;
use crate::gcs::GcsReference;
use crate::insert::Inserter;
use crate::iterator::RowIterator;
use crate::load::Loader;

/// Reference to a dataset. Creating one performs no RPC.
#[derive(Debug, Clone)]
pub struct Dataset {
    client: Client,
    reference: DatasetReference,
}

impl Dataset {
    pub(crate) fn new(client: Client, project_id: String, dataset_id: String) -> Self {
        Self {
            client,
            reference: DatasetReference {
                project_id,
                dataset_id,
            },
        }
    }

    pub fn reference(&self) -> &DatasetReference {
        &self.reference
    }

    pub fn table(&self, table_id: impl Into<String>) -> Table {
        Table {
            client: self.client.clone(),
            reference: TableReference::new(
                self.reference.project_id.clone(),
                self.reference.dataset_id.clone(),
                table_id,
            ),
        }
    }
}

/// Reference to a table. Creating one performs no RPC.
#[derive(Debug, Clone)]
pub struct Table {
    client: Client,
    reference: TableReference,
}

impl Table {
    pub fn reference(&self) -> &TableReference {
        &self.reference
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Streaming inserts into this table.
    pub fn inserter(&self) -> Inserter {
        Inserter::new(self.clone())
    }

    /// Current schema of the table.
    pub async fn schema(&self, cancel: &CancellationToken) -> Result<Schema, Error> {
        let table = self
            .client
            .call(RpcRequest::GetTable(self.reference.clone()), cancel)
            .await?
            .into_table()?;
        table
            .schema
            .ok_or_else(|| Error::Protocol(format!("table {} has no schema", self.reference)))
    }

    /// Cursor over the table's rows, without running a query.
    pub async fn read(&self, cancel: &CancellationToken) -> Result<RowIterator, Error> {
        let schema = self.schema(cancel).await?;
        Ok(RowIterator::for_table(
            self.client.clone(),
            self.reference.clone(),
            schema,
        ))
    }

    /// Copy `sources` into this table.
    pub fn copier_from(&self, sources: &[&Table]) -> Copier {
        Copier::new(
            self.clone(),
            sources.iter().map(|t| t.reference.clone()).collect(),
        )
    }

    /// Load files from object storage into this table.
    pub fn loader_from(&self, source: GcsReference) -> Loader {
        Loader::new(self.clone(), source)
    }

    /// Export this table to object storage.
    pub fn extractor_to(&self, destination: GcsReference) -> Extractor {
        Extractor::new(self.clone(), destination)
    }
}
