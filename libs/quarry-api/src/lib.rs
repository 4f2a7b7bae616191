extern crate self as quarry_api;

pub mod codec;
pub mod error;
pub mod infer;
pub mod row;
pub mod schema;
pub mod transport;
pub mod value;
pub mod wire;

pub use error::Error;
pub use infer::infer_schema;
pub use quarry_api_derive::TableRow;
pub use row::{FieldValue, InsertId, RowLoader, TableRow, ValueSaver};
pub use schema::{FieldMode, FieldSchema, FieldType, Schema};
pub use value::{Geography, Value, ValueMap};
