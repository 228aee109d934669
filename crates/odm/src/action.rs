//! Action recorder: one provenance action per site per ingestion or
//! derivation event, linked to its sampling feature.

use crate::error::{Error, Result};
use crate::model::{ActionId, FeatureActionId, SamplingFeatureId, to_nanos};
use crate::schema::{Actions, FeatureActions};
use crate::store::TransactionGuard;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use sea_query::{Alias, Query, SqliteQueryBuilder};
use serde::{Deserialize, Serialize};

/// A stored action with its method resolved to a code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ActionId,
    pub method_code: String,
    pub event_id: String,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
}

/// Record an action spanning `begin..=end` performed with `method_id`.
pub(crate) fn record(
    tx: &TransactionGuard<'_>,
    method_id: i64,
    begin: &DateTime<Utc>,
    end: &DateTime<Utc>,
    description: Option<&str>,
) -> Result<ActionId> {
    if end < begin {
        return Err(Error::InvalidInput(format!(
            "action ends ({end}) before it begins ({begin})"
        )));
    }
    let sql = Query::insert()
        .into_table(Actions::Table)
        .columns([
            Actions::MethodId,
            Actions::EventId,
            Actions::BeginDateTime,
            Actions::EndDateTime,
            Actions::Description,
        ])
        .values([
            method_id.into(),
            tx.event_id().into(),
            to_nanos(begin)?.into(),
            to_nanos(end)?.into(),
            description.map(str::to_string).into(),
        ])?
        .returning_col(Alias::new("id"))
        .to_string(SqliteQueryBuilder);
    let id = tx.query_row(&sql, [], |row| row.get::<_, i64>(0))?;
    Ok(ActionId(id))
}

/// Link an action to the sampling feature it touched.
pub(crate) fn link(
    conn: &Connection,
    action: ActionId,
    feature: SamplingFeatureId,
) -> Result<FeatureActionId> {
    let sql = Query::insert()
        .into_table(FeatureActions::Table)
        .columns([FeatureActions::ActionId, FeatureActions::SamplingFeatureId])
        .values([action.0.into(), feature.0.into()])?
        .returning_col(Alias::new("id"))
        .to_string(SqliteQueryBuilder);
    let id = conn.query_row(&sql, [], |row| row.get::<_, i64>(0))?;
    Ok(FeatureActionId(id))
}
