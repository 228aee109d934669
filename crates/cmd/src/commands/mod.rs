pub mod catalog;
pub mod derive;
pub mod ingest;
pub mod init;
pub mod lineage;
pub mod query;
pub mod register;

pub use catalog::{CatalogChoice, catalog_command};
pub use derive::derive_command;
pub use ingest::{IngestOptions, ingest_command, parse_value_mapping};
pub use init::init_command;
pub use lineage::lineage_command;
pub use query::{OutputFormat, query_command};
pub use register::{RegisterEntry, register_command};
