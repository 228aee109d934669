//! Sampling feature registry: sites and wells, created on first reference.

use crate::catalog::lookup;
use crate::error::{CatalogKind, Error, Result};
use crate::model::SamplingFeatureId;
use crate::schema::SamplingFeatures;
use crate::store::Store;
use crate::tabular::ForArrow;
use arrow::datatypes::{DataType, Field, FieldRef};
use diagnostics::*;
use duckdb::Connection;
use sea_query::{OnConflict, Order, Query, SqliteQueryBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Feature type recorded when ingestion does not name one.
pub const DEFAULT_FEATURE_TYPE: &str = "site";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingFeature {
    pub id: SamplingFeatureId,
    pub code: String,
    #[serde(rename = "type")]
    pub feature_type: String,
}

impl ForArrow for SamplingFeature {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("id", DataType::Int64, false)),
            Arc::new(Field::new("code", DataType::Utf8, false)),
            Arc::new(Field::new("type", DataType::Utf8, false)),
        ]
    }
}

/// Look up `code`, inserting it if absent.
///
/// The insert is guarded by the unique index on `code`: a row created by a
/// concurrent writer turns into a no-op here or a conflict at commit, and
/// either way the enclosing transaction converges on the single stored row
/// (directly, or on retry).
pub(crate) fn ensure(
    conn: &Connection,
    code: &str,
    feature_type: &str,
) -> Result<SamplingFeatureId> {
    if code.trim().is_empty() {
        return Err(Error::InvalidInput("site code cannot be empty".to_string()));
    }
    if let Some(id) = lookup(conn, CatalogKind::SamplingFeature, code)? {
        return Ok(SamplingFeatureId(id));
    }

    let sql = Query::insert()
        .into_table(SamplingFeatures::Table)
        .columns([SamplingFeatures::Code, SamplingFeatures::Type])
        .values([code.into(), feature_type.into()])?
        .on_conflict(
            OnConflict::column(SamplingFeatures::Code)
                .do_nothing()
                .to_owned(),
        )
        .to_string(SqliteQueryBuilder);
    let inserted = conn.execute(&sql, [])?;

    match lookup(conn, CatalogKind::SamplingFeature, code)? {
        Some(id) => {
            if inserted > 0 {
                info!(
                    "Created sampling feature {code} ({feature_type}) as {id}",
                    code,
                    feature_type,
                    id
                );
            }
            Ok(SamplingFeatureId(id))
        }
        None => Err(Error::Conflict(format!(
            "sampling feature {code} is being created by another transaction"
        ))),
    }
}

impl Store {
    /// Id of the sampling feature `code`, creating it if needed.
    pub fn ensure(&self, code: &str) -> Result<SamplingFeatureId> {
        self.ensure_with_type(code, DEFAULT_FEATURE_TYPE)
    }

    /// Like [`Store::ensure`], with the type used if the feature is created.
    /// An existing feature keeps its original type.
    pub fn ensure_with_type(&self, code: &str, feature_type: &str) -> Result<SamplingFeatureId> {
        self.transact("ensure sampling feature", |tx| {
            ensure(tx, code, feature_type)
        })
    }

    /// Every registered sampling feature, ordered by code.
    pub fn sampling_features(&self) -> Result<Vec<SamplingFeature>> {
        self.read(|conn| {
            let sql = Query::select()
                .columns([
                    SamplingFeatures::Id,
                    SamplingFeatures::Code,
                    SamplingFeatures::Type,
                ])
                .from(SamplingFeatures::Table)
                .order_by(SamplingFeatures::Code, Order::Asc)
                .to_string(SqliteQueryBuilder);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok(SamplingFeature {
                    id: SamplingFeatureId(row.get(0)?),
                    code: row.get(1)?,
                    feature_type: row.get(2)?,
                })
            })?;
            Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
        })
    }
}
