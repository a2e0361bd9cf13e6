//! parley storage crate - SQLite persistence for the query pipeline.
//!
//! Provides a WAL-mode SQLite database with migrations, the tenant registry
//! (tenants, logical databases, users), the schema store, and the
//! append-only conversation log.

pub mod conversation;
pub mod db;
pub mod migrations;
pub mod repository;

pub use conversation::TurnRepository;
pub use db::Database;
pub use repository::{generate_token, SchemaRepository, TenantRepository};
