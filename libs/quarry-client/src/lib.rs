pub mod backoff;
pub mod client;
pub mod config;
mod copy;
mod extract;
mod gcs;
pub mod http;
mod insert;
mod iterator;
pub mod job;
mod load;
mod params;
mod query;
mod read;
mod table;

pub use backoff::Backoff;
pub use client::Client;
pub use config::{ClientConfig, ClientOptions, PollConfig};
pub use copy::Copier;
pub use extract::Extractor;
pub use gcs::GcsReference;
pub use http::HttpTransport;
pub use insert::{InsertRow, Inserter, RowError, RowInsertionError};
pub use iterator::RowIterator;
pub use job::{Job, JobKind, JobOptions, JobState, JobStatus};
pub use load::Loader;
pub use params::{ParameterValue, QueryParameter};
pub use query::{Query, QueryConfig};
pub use table::{Dataset, Table};

pub use quarry_api;
pub use quarry_api::{Error, TableRow};
pub use tokio_util::sync::CancellationToken;
