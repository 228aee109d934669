//! Result store: the insertion protocol.
//!
//! One call is one transaction. Every referenced catalog entry is resolved
//! before anything is written; input rows are then grouped by site, and each
//! site gets one sampling feature (created if needed), one action spanning
//! its rows, one feature action, and one result per mapped variable.

use crate::action;
use crate::catalog::require;
use crate::error::{CatalogKind, Error, Result};
use crate::model::{Observation, ResultId, ResultKind, to_nanos};
use crate::registry::{self, DEFAULT_FEATURE_TYPE};
use crate::schema::Results;
use crate::store::{Store, TransactionGuard};
use diagnostics::*;
use duckdb::params;
use sea_query::{Alias, Query, SqliteQueryBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sampled medium recorded when the caller does not name one.
pub const DEFAULT_SAMPLED_MEDIUM: &str = "notApplicable";

/// Values of one variable, in one unit, across any number of sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSeries {
    /// Variable code.
    pub variable: String,
    /// Unit name.
    pub unit: String,
    pub observations: Vec<Observation>,
}

impl ValueSeries {
    pub fn new<S: Into<String>>(variable: S, unit: S, observations: Vec<Observation>) -> Self {
        Self {
            variable: variable.into(),
            unit: unit.into(),
            observations,
        }
    }
}

/// A long-format input row naming its own variable and unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub site_code: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub value: f64,
    pub variable: String,
    pub unit: String,
}

/// Group long-format records into one series per (variable, unit), in
/// order of first appearance.
#[must_use]
pub fn group_records(records: Vec<Record>) -> Vec<ValueSeries> {
    let mut series: Vec<ValueSeries> = Vec::new();
    for rec in records {
        let obs = Observation::new(rec.site_code, rec.timestamp, rec.value);
        match series
            .iter_mut()
            .find(|s| s.variable == rec.variable && s.unit == rec.unit)
        {
            Some(s) => s.observations.push(obs),
            None => series.push(ValueSeries::new(rec.variable, rec.unit, vec![obs])),
        }
    }
    series
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub series: Vec<ValueSeries>,
    /// Method code.
    pub method: String,
    /// Processing level label.
    pub processing_level: String,
    pub kind: ResultKind,
    pub sampled_medium: String,
    /// Type given to sampling features created by this call.
    pub feature_type: String,
    /// Free text recorded on every action.
    pub description: Option<String>,
}

impl InsertRequest {
    pub fn new<S: Into<String>>(kind: ResultKind, method: S, processing_level: S) -> Self {
        Self {
            series: Vec::new(),
            method: method.into(),
            processing_level: processing_level.into(),
            kind,
            sampled_medium: DEFAULT_SAMPLED_MEDIUM.to_string(),
            feature_type: DEFAULT_FEATURE_TYPE.to_string(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_series(mut self, series: ValueSeries) -> Self {
        self.series.push(series);
        self
    }

    #[must_use]
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.series.extend(group_records(records));
        self
    }

    #[must_use]
    pub fn sampled_medium<S: Into<String>>(mut self, medium: S) -> Self {
        self.sampled_medium = medium.into();
        self
    }

    #[must_use]
    pub fn feature_type<S: Into<String>>(mut self, feature_type: S) -> Self {
        self.feature_type = feature_type.into();
        self
    }

    #[must_use]
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Catalog ids every row of a request refers to.
struct Resolved {
    method: i64,
    processing_level: i64,
    /// (variable id, unit id) per series, in request order.
    series: Vec<(i64, i64)>,
}

fn resolve(tx: &TransactionGuard<'_>, req: &InsertRequest) -> Result<Resolved> {
    let method = require(tx, CatalogKind::Method, &req.method)?;
    let processing_level = require(tx, CatalogKind::ProcessingLevel, &req.processing_level)?;
    let series = req
        .series
        .iter()
        .map(|s| {
            Ok((
                require(tx, CatalogKind::Variable, &s.variable)?,
                require(tx, CatalogKind::Unit, &s.unit)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Resolved {
        method,
        processing_level,
        series,
    })
}

fn check_rows(req: &InsertRequest) -> Result<()> {
    if req.series.is_empty() {
        return Err(Error::InvalidInput("no value series to insert".to_string()));
    }
    for s in &req.series {
        for obs in &s.observations {
            if obs.site_code.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "{} value at {} has no site code",
                    s.variable, obs.timestamp
                )));
            }
            _ = to_nanos(&obs.timestamp)?;
            if !obs.value.is_finite() {
                return Err(Error::InvalidInput(format!(
                    "{} at site {} has non-numeric value {}",
                    s.variable, obs.site_code, obs.value
                )));
            }
        }
    }
    Ok(())
}

/// The insertion protocol inside an open transaction. Results come back
/// ordered by site code, then by series.
pub(crate) fn insert_in(tx: &TransactionGuard<'_>, req: &InsertRequest) -> Result<Vec<ResultId>> {
    check_rows(req)?;
    let ids = resolve(tx, req)?;

    // site -> series index -> rows
    let mut by_site: BTreeMap<&str, Vec<Vec<&Observation>>> = BTreeMap::new();
    for (idx, s) in req.series.iter().enumerate() {
        for obs in &s.observations {
            let slots = by_site
                .entry(obs.site_code.as_str())
                .or_insert_with(|| vec![Vec::new(); req.series.len()]);
            slots[idx].push(obs);
        }
    }
    if by_site.is_empty() {
        return Err(Error::InvalidInput("no rows to insert".to_string()));
    }

    let mut value_stmt = tx.prepare(
        "INSERT INTO datavalues (resultid, \"value\", valuedatetime) VALUES (?, ?, ?)",
    )?;

    let sites = by_site.len();
    let mut created = Vec::new();
    let mut value_count = 0usize;
    for (site, mut slots) in by_site {
        let feature = registry::ensure(tx, site, &req.feature_type)?;

        let (begin, end) = slots
            .iter()
            .flatten()
            .fold(None, |span: Option<(_, _)>, obs| match span {
                None => Some((obs.timestamp, obs.timestamp)),
                Some((lo, hi)) => Some((lo.min(obs.timestamp), hi.max(obs.timestamp))),
            })
            .ok_or_else(|| Error::InvalidInput(format!("site {site} has no rows")))?;
        let action = action::record(tx, ids.method, &begin, &end, req.description.as_deref())?;
        let feature_action = action::link(tx, action, feature)?;

        for (idx, rows) in slots.iter_mut().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let series = &req.series[idx];
            if req.kind == ResultKind::Measurement && rows.len() > 1 {
                return Err(Error::CardinalityError {
                    site_code: site.to_string(),
                    variable_code: series.variable.clone(),
                    rows: rows.len(),
                });
            }

            let (variable_id, unit_id) = ids.series[idx];
            let sql = Query::insert()
                .into_table(Results::Table)
                .columns([
                    Results::VariableId,
                    Results::UnitId,
                    Results::ProcessingLevelId,
                    Results::FeatureActionId,
                    Results::Kind,
                    Results::SampledMedium,
                ])
                .values([
                    variable_id.into(),
                    unit_id.into(),
                    ids.processing_level.into(),
                    feature_action.0.into(),
                    req.kind.as_str().into(),
                    req.sampled_medium.as_str().into(),
                ])?
                .returning_col(Alias::new("id"))
                .to_string(SqliteQueryBuilder);
            let result = ResultId(tx.query_row(&sql, [], |row| row.get::<_, i64>(0))?);

            rows.sort_by_key(|obs| obs.timestamp);
            for obs in rows.iter() {
                _ = value_stmt.execute(params![result.0, obs.value, to_nanos(&obs.timestamp)?])?;
            }
            value_count += rows.len();
            created.push(result);
        }
    }

    let kind = req.kind.as_str();
    let method = &req.method;
    info!(
        "Inserted {value_count} {kind} values at {sites} sites with method {method}",
        value_count,
        kind,
        sites,
        method
    );
    Ok(created)
}

impl Store {
    /// Insert a batch of values as one transaction, returning the created
    /// results ordered by site code, then by series.
    pub fn insert(&self, req: &InsertRequest) -> Result<Vec<ResultId>> {
        self.transact("insert", |tx| insert_in(tx, req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 1, hour, 0, 0).unwrap()
    }

    fn record(site: &str, hour: u32, value: f64, variable: &str) -> Record {
        Record {
            site_code: site.to_string(),
            timestamp: ts(hour),
            value,
            variable: variable.to_string(),
            unit: "mm".to_string(),
        }
    }

    #[test]
    fn test_group_records_keeps_first_seen_order() {
        let series = group_records(vec![
            record("A", 1, 1.0, "waterLevel"),
            record("A", 1, 2.0, "temperature"),
            record("B", 2, 3.0, "waterLevel"),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].variable, "waterLevel");
        assert_eq!(series[0].observations.len(), 2);
        assert_eq!(series[1].variable, "temperature");
    }

    #[test]
    fn test_check_rows_rejects_blank_sites_and_nan() {
        let req = InsertRequest::new(ResultKind::TimeSeries, "m", "Raw data")
            .with_records(vec![record(" ", 1, 1.0, "waterLevel")]);
        assert!(matches!(check_rows(&req), Err(Error::InvalidInput(_))));

        let req = InsertRequest::new(ResultKind::TimeSeries, "m", "Raw data")
            .with_records(vec![record("A", 1, f64::NAN, "waterLevel")]);
        assert!(matches!(check_rows(&req), Err(Error::InvalidInput(_))));

        let req = InsertRequest::new(ResultKind::TimeSeries, "m", "Raw data");
        assert!(matches!(check_rows(&req), Err(Error::InvalidInput(_))));
    }
}
