//! ODM - an environmental observations store
//!
//! Sampling features, controlled catalogs (units, variables, methods,
//! processing levels), provenance actions and numeric results, kept in one
//! DuckDB database. Raw values can be combined into derived variables whose
//! lineage leads back to the stored sources.
//!
//! Every mutating operation on [`Store`] is one transaction; a failed call
//! leaves the store unchanged.

mod action;
mod catalog;
mod config;
mod derive;
mod error;
mod ingest;
mod model;
mod query;
mod registry;
mod schema;
mod store;
mod tabular;
mod vocabulary;

pub use action::ActionRecord;
pub use catalog::{
    CatalogEntry, MethodDefinition, ProcessingLevelDefinition, UnitDefinition, VariableDefinition,
};
pub use config::{RetryConfig, StoreConfig, load_config, parse_config};
pub use derive::{DerivationInput, DerivationSpec, InputSource, Transform};
pub use error::{CatalogKind, Error, Result};
pub use ingest::{DEFAULT_SAMPLED_MEDIUM, InsertRequest, Record, ValueSeries, group_records};
pub use model::{ActionId, FeatureActionId, Observation, ResultId, ResultKind, SamplingFeatureId};
pub use query::{Filter, ResultRow};
pub use registry::{DEFAULT_FEATURE_TYPE, SamplingFeature};
pub use store::{Store, TransactionGuard};
pub use tabular::{
    ForArrow, TableMapping, ValueMapping, result_row_schema, rows_to_record_batch, to_record_batch,
};
pub use vocabulary::{Field as VocabularyField, Vocabulary, VocabularyConfig, VocabularyPolicy};
