//! Database initialization and schema maintenance

pub mod init;
pub mod schema_sync;

pub use init::{init_database, init_memory_database, init_schema};
pub use schema_sync::{sync_entity_table, TableDefinition};
