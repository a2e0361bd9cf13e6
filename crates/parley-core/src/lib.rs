pub mod config;
pub mod error;
pub mod schema;
pub mod types;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use schema::{schema_text, Column, SchemaDocument, StructuredTable, TableDescription};
pub use types::*;
