//! Query facade: denormalized value rows rebuilt from the entity graph.
//!
//! The read path is the inverse of ingestion. Every data value is joined
//! back through its result to the variable, unit and processing level, and
//! through the feature action to both the sampling feature and the action's
//! method.

use crate::action::ActionRecord;
use crate::error::{Error, Result};
use crate::model::{ActionId, ResultId, ResultKind, from_nanos};
use crate::schema::{
    Actions, DataValues, FeatureActions, Methods, ProcessingLevels, ResultDerivations, Results,
    SamplingFeatures, Units, Variables,
};
use crate::store::Store;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use sea_query::{Cond, Expr, Order, Query, SelectStatement, SqliteQueryBuilder};
use serde::{Deserialize, Serialize};

/// Optional constraints on the rows returned by [`Store::fetch`]. Every
/// field that is set must match; an empty filter returns every value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Controlled-vocabulary variable name (shared across codes).
    pub variable_name: Option<String>,
    pub variable_code: Option<String>,
    pub site_code: Option<String>,
    pub method_code: Option<String>,
    pub processing_level: Option<String>,
    pub kind: Option<ResultKind>,
    pub result_id: Option<ResultId>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn variable_name<S: Into<String>>(mut self, name: S) -> Self {
        self.variable_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn variable_code<S: Into<String>>(mut self, code: S) -> Self {
        self.variable_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn site_code<S: Into<String>>(mut self, code: S) -> Self {
        self.site_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn method_code<S: Into<String>>(mut self, code: S) -> Self {
        self.method_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn processing_level<S: Into<String>>(mut self, label: S) -> Self {
        self.processing_level = Some(label.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: ResultKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn result_id(mut self, id: ResultId) -> Self {
        self.result_id = Some(id);
        self
    }

    fn condition(&self) -> Cond {
        let mut cond = Cond::all();
        if let Some(name) = &self.variable_name {
            cond = cond.add(Expr::col((Variables::Table, Variables::Name)).eq(name.as_str()));
        }
        if let Some(code) = &self.variable_code {
            cond = cond.add(Expr::col((Variables::Table, Variables::Code)).eq(code.as_str()));
        }
        if let Some(code) = &self.site_code {
            cond = cond.add(
                Expr::col((SamplingFeatures::Table, SamplingFeatures::Code)).eq(code.as_str()),
            );
        }
        if let Some(code) = &self.method_code {
            cond = cond.add(Expr::col((Methods::Table, Methods::Code)).eq(code.as_str()));
        }
        if let Some(label) = &self.processing_level {
            cond = cond.add(
                Expr::col((ProcessingLevels::Table, ProcessingLevels::Label)).eq(label.as_str()),
            );
        }
        if let Some(kind) = self.kind {
            cond = cond.add(Expr::col((Results::Table, Results::Kind)).eq(kind.as_str()));
        }
        if let Some(id) = self.result_id {
            cond = cond.add(Expr::col((Results::Table, Results::Id)).eq(id.0));
        }
        cond
    }
}

/// One stored value with everything needed to interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub site_code: String,
    pub variable_name: String,
    pub variable_code: String,
    pub unit_name: String,
    pub method_code: String,
    pub processing_level: String,
    pub kind: ResultKind,
    pub result_id: ResultId,
}

/// The join chain shared by every value query, columns in `ResultRow` order.
fn value_rows() -> SelectStatement {
    Query::select()
        .column((DataValues::Table, DataValues::Value))
        .column((DataValues::Table, DataValues::ValueDateTime))
        .column((SamplingFeatures::Table, SamplingFeatures::Code))
        .column((Variables::Table, Variables::Name))
        .column((Variables::Table, Variables::Code))
        .column((Units::Table, Units::Name))
        .column((Methods::Table, Methods::Code))
        .column((ProcessingLevels::Table, ProcessingLevels::Label))
        .column((Results::Table, Results::Kind))
        .column((Results::Table, Results::Id))
        .from(DataValues::Table)
        .inner_join(
            Results::Table,
            Expr::col((DataValues::Table, DataValues::ResultId))
                .equals((Results::Table, Results::Id)),
        )
        .inner_join(
            Variables::Table,
            Expr::col((Results::Table, Results::VariableId))
                .equals((Variables::Table, Variables::Id)),
        )
        .inner_join(
            Units::Table,
            Expr::col((Results::Table, Results::UnitId)).equals((Units::Table, Units::Id)),
        )
        .inner_join(
            ProcessingLevels::Table,
            Expr::col((Results::Table, Results::ProcessingLevelId))
                .equals((ProcessingLevels::Table, ProcessingLevels::Id)),
        )
        .inner_join(
            FeatureActions::Table,
            Expr::col((Results::Table, Results::FeatureActionId))
                .equals((FeatureActions::Table, FeatureActions::Id)),
        )
        .inner_join(
            SamplingFeatures::Table,
            Expr::col((FeatureActions::Table, FeatureActions::SamplingFeatureId))
                .equals((SamplingFeatures::Table, SamplingFeatures::Id)),
        )
        .inner_join(
            Actions::Table,
            Expr::col((FeatureActions::Table, FeatureActions::ActionId))
                .equals((Actions::Table, Actions::Id)),
        )
        .inner_join(
            Methods::Table,
            Expr::col((Actions::Table, Actions::MethodId)).equals((Methods::Table, Methods::Id)),
        )
        .to_owned()
}

pub(crate) fn fetch_in(conn: &Connection, filter: &Filter) -> Result<Vec<ResultRow>> {
    let sql = value_rows()
        .cond_where(filter.condition())
        .order_by((SamplingFeatures::Table, SamplingFeatures::Code), Order::Asc)
        .order_by((DataValues::Table, DataValues::ValueDateTime), Order::Asc)
        .order_by((DataValues::Table, DataValues::Id), Order::Asc)
        .to_string(SqliteQueryBuilder);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(ResultRow {
            value: row.get(0)?,
            timestamp: from_nanos(row.get(1)?),
            site_code: row.get(2)?,
            variable_name: row.get(3)?,
            variable_code: row.get(4)?,
            unit_name: row.get(5)?,
            method_code: row.get(6)?,
            processing_level: row.get(7)?,
            kind: row.get(8)?,
            result_id: ResultId(row.get(9)?),
        })
    })?;
    Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
}

fn action_in(conn: &Connection, result: ResultId) -> Result<ActionRecord> {
    let sql = Query::select()
        .column((Actions::Table, Actions::Id))
        .column((Methods::Table, Methods::Code))
        .column((Actions::Table, Actions::EventId))
        .column((Actions::Table, Actions::BeginDateTime))
        .column((Actions::Table, Actions::EndDateTime))
        .column((Actions::Table, Actions::Description))
        .from(Results::Table)
        .inner_join(
            FeatureActions::Table,
            Expr::col((Results::Table, Results::FeatureActionId))
                .equals((FeatureActions::Table, FeatureActions::Id)),
        )
        .inner_join(
            Actions::Table,
            Expr::col((FeatureActions::Table, FeatureActions::ActionId))
                .equals((Actions::Table, Actions::Id)),
        )
        .inner_join(
            Methods::Table,
            Expr::col((Actions::Table, Actions::MethodId)).equals((Methods::Table, Methods::Id)),
        )
        .and_where(Expr::col((Results::Table, Results::Id)).eq(result.0))
        .to_string(SqliteQueryBuilder);

    let mut stmt = conn.prepare(&sql)?;
    let mut raw = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;
    let (id, method_code, event_id, begin, end, description) = raw
        .next()
        .transpose()?
        .ok_or_else(|| Error::InvalidInput(format!("no result with id {result}")))?;

    Ok(ActionRecord {
        id: ActionId(id),
        method_code,
        event_id,
        begin: from_nanos(begin),
        end: from_nanos(end),
        description,
    })
}

fn lineage_in(conn: &Connection, result: ResultId) -> Result<Vec<ResultId>> {
    let sql = Query::select()
        .column(ResultDerivations::SourceResultId)
        .from(ResultDerivations::Table)
        .and_where(Expr::col(ResultDerivations::ResultId).eq(result.0))
        .order_by(ResultDerivations::SourceResultId, Order::Asc)
        .to_string(SqliteQueryBuilder);
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    Ok(ids
        .map(|id| id.map(ResultId))
        .collect::<duckdb::Result<Vec<_>>>()?)
}

impl Store {
    /// Every stored value matching `filter`, ordered by site code and then
    /// by timestamp. No match is an empty vector, not an error.
    pub fn fetch(&self, filter: &Filter) -> Result<Vec<ResultRow>> {
        self.read(|conn| fetch_in(conn, filter))
    }

    /// The action that produced `result`.
    pub fn action_of(&self, result: ResultId) -> Result<ActionRecord> {
        self.read(|conn| action_in(conn, result))
    }

    /// The stored results `result` was derived from; empty for raw results.
    pub fn lineage(&self, result: ResultId) -> Result<Vec<ResultId>> {
        self.read(|conn| lineage_in(conn, result))
    }
}
