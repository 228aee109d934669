//! Derivation engine.
//!
//! Inputs (stored results selected by a [`Filter`], or rows held in memory)
//! are inner-joined on timestamp at one site. A declared [`Transform`] is
//! applied to every joined instant and the output re-enters the store
//! through the insertion protocol, in the same transaction, with lineage
//! rows pointing back at every stored result that contributed.
//!
//! The join never guesses. Two rows of one input at the same instant, or a
//! broadcast measurement with more than one row, is an `AmbiguousJoin`.

use crate::catalog::require;
use crate::error::{CatalogKind, Error, Result};
use crate::ingest::{self, DEFAULT_SAMPLED_MEDIUM, InsertRequest, ValueSeries};
use crate::model::{Observation, ResultId, ResultKind};
use crate::query::{Filter, fetch_in};
use crate::schema::ResultDerivations;
use crate::store::{Store, TransactionGuard};
use chrono::{DateTime, Utc};
use diagnostics::*;
use sea_query::{Query, SqliteQueryBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A closed arithmetic expression over named inputs.
///
/// In YAML: `{subtract: [{input: gage}, {input: offset}]}`. Variants are
/// written as single-key maps, so read YAML through [`Transform::from_yaml`]
/// or a [`DerivationSpec`] rather than plain `serde_yaml_ng::from_str`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Input(String),
    Const(f64),
    Add(Vec<Transform>),
    Subtract(Box<Transform>, Box<Transform>),
    Multiply(Vec<Transform>),
    Divide(Box<Transform>, Box<Transform>),
    Negate(Box<Transform>),
}

impl Transform {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let de = serde_yaml_ng::Deserializer::from_str(content);
        serde_yaml_ng::with::singleton_map_recursive::deserialize(de)
            .map_err(|e| Error::InvalidTransform(format!("invalid transform: {e}")))
    }

    pub fn input<S: Into<String>>(name: S) -> Self {
        Transform::Input(name.into())
    }

    #[must_use]
    pub fn add(lhs: Transform, rhs: Transform) -> Self {
        Transform::Add(vec![lhs, rhs])
    }

    #[must_use]
    pub fn subtract(lhs: Transform, rhs: Transform) -> Self {
        Transform::Subtract(Box::new(lhs), Box::new(rhs))
    }

    /// Names of every input the expression reads.
    #[must_use]
    pub fn inputs(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_inputs(&mut names);
        names
    }

    fn collect_inputs<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Transform::Input(name) => {
                _ = names.insert(name.as_str());
            }
            Transform::Const(_) => {}
            Transform::Add(terms) | Transform::Multiply(terms) => {
                terms.iter().for_each(|t| t.collect_inputs(names));
            }
            Transform::Subtract(a, b) | Transform::Divide(a, b) => {
                a.collect_inputs(names);
                b.collect_inputs(names);
            }
            Transform::Negate(a) => a.collect_inputs(names),
        }
    }

    /// Reject empty n-ary terms and non-finite constants.
    pub fn validate(&self) -> Result<()> {
        match self {
            Transform::Input(name) if name.trim().is_empty() => {
                Err(Error::InvalidTransform("input name cannot be empty".to_string()))
            }
            Transform::Input(_) => Ok(()),
            Transform::Const(v) if !v.is_finite() => {
                Err(Error::InvalidTransform(format!("constant {v} is not finite")))
            }
            Transform::Const(_) => Ok(()),
            Transform::Add(terms) | Transform::Multiply(terms) => {
                if terms.is_empty() {
                    return Err(Error::InvalidTransform(format!("{self} has no terms")));
                }
                terms.iter().try_for_each(Transform::validate)
            }
            Transform::Subtract(a, b) | Transform::Divide(a, b) => {
                a.validate()?;
                b.validate()
            }
            Transform::Negate(a) => a.validate(),
        }
    }

    /// Evaluate at one joined instant.
    pub fn evaluate(&self, values: &BTreeMap<&str, f64>) -> Result<f64> {
        Ok(match self {
            Transform::Input(name) => *values
                .get(name.as_str())
                .ok_or_else(|| Error::InvalidTransform(format!("undefined input {name}")))?,
            Transform::Const(v) => *v,
            Transform::Add(terms) => terms.iter().map(|t| t.evaluate(values)).sum::<Result<f64>>()?,
            Transform::Subtract(a, b) => a.evaluate(values)? - b.evaluate(values)?,
            Transform::Multiply(terms) => terms
                .iter()
                .map(|t| t.evaluate(values))
                .product::<Result<f64>>()?,
            Transform::Divide(a, b) => a.evaluate(values)? / b.evaluate(values)?,
            Transform::Negate(a) => -a.evaluate(values)?,
        })
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, terms: &[Transform], op: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, t) in terms.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{t}")?;
            }
            f.write_str(")")
        }
        match self {
            Transform::Input(name) => f.write_str(name),
            Transform::Const(v) => write!(f, "{v}"),
            Transform::Add(terms) => join(f, terms, "+"),
            Transform::Subtract(a, b) => write!(f, "({a} - {b})"),
            Transform::Multiply(terms) => join(f, terms, "*"),
            Transform::Divide(a, b) => write!(f, "({a} / {b})"),
            Transform::Negate(a) => write!(f, "-{a}"),
        }
    }
}

/// Where a named input's rows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// Stored values matching the filter at the derivation's site.
    Stored(Filter),
    /// Rows not (yet) in the store. Only rows at the derivation's site
    /// take part.
    Rows {
        kind: ResultKind,
        observations: Vec<Observation>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationInput {
    pub name: String,
    #[serde(flatten)]
    pub source: InputSource,
}

impl DerivationInput {
    pub fn stored<S: Into<String>>(name: S, filter: Filter) -> Self {
        Self {
            name: name.into(),
            source: InputSource::Stored(filter),
        }
    }

    pub fn rows<S: Into<String>>(name: S, kind: ResultKind, observations: Vec<Observation>) -> Self {
        Self {
            name: name.into(),
            source: InputSource::Rows { kind, observations },
        }
    }
}

fn default_sampled_medium() -> String {
    DEFAULT_SAMPLED_MEDIUM.to_string()
}

/// A declared derivation, loadable from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationSpec {
    pub site_code: String,
    pub inputs: Vec<DerivationInput>,
    #[serde(with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub transform: Transform,
    /// Variable code of the output; registered beforehand and distinct
    /// from every stored input's variable.
    pub output_variable: String,
    pub output_unit: String,
    pub output_method: String,
    pub processing_level: String,
    #[serde(default = "default_sampled_medium")]
    pub sampled_medium: String,
}

impl DerivationSpec {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content)
            .map_err(|e| Error::InvalidInput(format!("invalid derivation: {e}")))
    }

    fn validate(&self) -> Result<()> {
        if self.site_code.trim().is_empty() {
            return Err(Error::InvalidInput("derivation site code cannot be empty".to_string()));
        }
        if self.inputs.is_empty() {
            return Err(Error::InvalidTransform("derivation has no inputs".to_string()));
        }
        self.transform.validate()?;

        let mut names = BTreeSet::new();
        for input in &self.inputs {
            if !names.insert(input.name.as_str()) {
                return Err(Error::InvalidTransform(format!(
                    "input {} is declared twice",
                    input.name
                )));
            }
        }
        let used = self.transform.inputs();
        if let Some(missing) = used.difference(&names).next() {
            return Err(Error::InvalidTransform(format!(
                "transform reads undeclared input {missing}"
            )));
        }
        if let Some(unused) = names.difference(&used).next() {
            return Err(Error::InvalidTransform(format!(
                "input {unused} is not used by the transform"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Point {
    timestamp: DateTime<Utc>,
    value: f64,
    source: Option<ResultId>,
}

#[derive(Debug)]
struct Loaded<'a> {
    name: &'a str,
    kind: ResultKind,
    points: Vec<Point>,
}

#[derive(Debug)]
struct Joined<'a> {
    kind: ResultKind,
    rows: Vec<(DateTime<Utc>, BTreeMap<&'a str, f64>)>,
    sources: BTreeSet<ResultId>,
}

/// Load every input at the derivation's site. Returns the inputs and the
/// variable codes of the stored rows they read.
fn load<'a>(
    tx: &TransactionGuard<'_>,
    spec: &'a DerivationSpec,
) -> Result<(Vec<Loaded<'a>>, BTreeSet<String>)> {
    let site = spec.site_code.as_str();
    let mut loaded = Vec::with_capacity(spec.inputs.len());
    let mut variables = BTreeSet::new();
    for input in &spec.inputs {
        let (kind, points) = match &input.source {
            InputSource::Stored(filter) => {
                if filter.site_code.as_deref().is_some_and(|s| s != site) {
                    return Err(Error::InvalidInput(format!(
                        "input {} selects a site other than {site}",
                        input.name
                    )));
                }
                let filter = filter.clone().site_code(site);
                let rows = fetch_in(tx, &filter)?;
                let measurement =
                    !rows.is_empty() && rows.iter().all(|r| r.kind == ResultKind::Measurement);
                let points = rows
                    .iter()
                    .map(|r| {
                        _ = variables.insert(r.variable_code.clone());
                        Point {
                            timestamp: r.timestamp,
                            value: r.value,
                            source: Some(r.result_id),
                        }
                    })
                    .collect();
                let kind = if measurement {
                    ResultKind::Measurement
                } else {
                    ResultKind::TimeSeries
                };
                (kind, points)
            }
            InputSource::Rows { kind, observations } => {
                let points = observations
                    .iter()
                    .filter(|o| o.site_code == site)
                    .map(|o| Point {
                        timestamp: o.timestamp,
                        value: o.value,
                        source: None,
                    })
                    .collect();
                (*kind, points)
            }
        };
        loaded.push(Loaded {
            name: &input.name,
            kind,
            points,
        });
    }
    Ok((loaded, variables))
}

fn ambiguous(input: &str, site: &str, timestamp: &DateTime<Utc>) -> Error {
    Error::AmbiguousJoin {
        input: input.to_string(),
        site_code: site.to_string(),
        timestamp: timestamp.to_rfc3339(),
    }
}

/// Inner join on timestamp. When any input is a time series, measurement
/// inputs are broadcast across its instants and must hold exactly one row.
fn join<'a>(site: &str, inputs: &[Loaded<'a>]) -> Result<Joined<'a>> {
    let any_series = inputs.iter().any(|i| i.kind == ResultKind::TimeSeries);
    let (keyed, broadcast): (Vec<&Loaded<'a>>, Vec<&Loaded<'a>>) = if any_series {
        inputs
            .iter()
            .partition(|i| i.kind == ResultKind::TimeSeries)
    } else {
        (inputs.iter().collect(), Vec::new())
    };

    let mut constants = Vec::with_capacity(broadcast.len());
    for input in broadcast {
        match input.points.as_slice() {
            [only] => constants.push((input.name, *only)),
            [] => {
                return Err(Error::EmptyJoin {
                    site_code: site.to_string(),
                });
            }
            [_, second, ..] => return Err(ambiguous(input.name, site, &second.timestamp)),
        }
    }

    let mut indexed = Vec::with_capacity(keyed.len());
    for input in keyed {
        let mut by_time = BTreeMap::new();
        for point in &input.points {
            if by_time.insert(point.timestamp, *point).is_some() {
                return Err(ambiguous(input.name, site, &point.timestamp));
            }
        }
        indexed.push((input.name, by_time));
    }

    let Some(((first_name, first), rest)) = indexed.split_first() else {
        return Err(Error::InvalidTransform("derivation has no inputs".to_string()));
    };

    let mut joined = Joined {
        kind: if any_series {
            ResultKind::TimeSeries
        } else {
            ResultKind::Measurement
        },
        rows: Vec::new(),
        sources: BTreeSet::new(),
    };
    for (timestamp, point) in first {
        let matches: Option<Vec<(&str, &Point)>> = rest
            .iter()
            .map(|(name, by_time)| by_time.get(timestamp).map(|p| (*name, p)))
            .collect();
        let Some(matches) = matches else {
            continue;
        };

        let mut values = BTreeMap::new();
        let used = std::iter::once((*first_name, point))
            .chain(matches)
            .chain(constants.iter().map(|(name, p)| (*name, p)));
        for (name, p) in used {
            _ = values.insert(name, p.value);
            if let Some(source) = p.source {
                _ = joined.sources.insert(source);
            }
        }
        joined.rows.push((*timestamp, values));
    }

    if joined.rows.is_empty() {
        return Err(Error::EmptyJoin {
            site_code: site.to_string(),
        });
    }
    Ok(joined)
}

pub(crate) fn derive_in(tx: &TransactionGuard<'_>, spec: &DerivationSpec) -> Result<ResultId> {
    spec.validate()?;
    let site = spec.site_code.as_str();
    _ = require(tx, CatalogKind::Variable, &spec.output_variable)?;

    let (inputs, input_variables) = load(tx, spec)?;
    if input_variables.contains(&spec.output_variable) {
        return Err(Error::InvalidTransform(format!(
            "output variable {} is also an input",
            spec.output_variable
        )));
    }

    let joined = join(site, &inputs)?;
    let observations = joined
        .rows
        .iter()
        .map(|(timestamp, values)| {
            let value = spec.transform.evaluate(values)?;
            if !value.is_finite() {
                return Err(Error::InvalidTransform(format!(
                    "{} is {value} at {site}, {}",
                    spec.transform,
                    timestamp.to_rfc3339()
                )));
            }
            Ok(Observation::new(site, *timestamp, value))
        })
        .collect::<Result<Vec<_>>>()?;

    let description = serde_json::json!({
        "transform": &spec.transform,
        "inputs": spec.inputs.iter().map(|i| &i.name).collect::<Vec<_>>(),
    });
    let count = observations.len();
    let req = InsertRequest::new(joined.kind, spec.output_method.as_str(), spec.processing_level.as_str())
        .with_series(ValueSeries::new(
            spec.output_variable.as_str(),
            spec.output_unit.as_str(),
            observations,
        ))
        .sampled_medium(spec.sampled_medium.as_str())
        .description(serde_json::to_string(&description)?);

    let result = ingest::insert_in(tx, &req)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::EmptyJoin {
            site_code: site.to_string(),
        })?;

    if !joined.sources.is_empty() {
        let mut insert = Query::insert();
        _ = insert
            .into_table(ResultDerivations::Table)
            .columns([ResultDerivations::ResultId, ResultDerivations::SourceResultId]);
        for source in &joined.sources {
            _ = insert.values([result.0.into(), source.0.into()])?;
        }
        _ = tx.execute(&insert.to_string(SqliteQueryBuilder), [])?;
    }

    let output = &spec.output_variable;
    let transform = spec.transform.to_string();
    let sources = joined.sources.len();
    info!(
        "Derived {output} = {transform} at {site}: {count} values from {sources} stored results",
        output,
        transform,
        site,
        count,
        sources
    );
    Ok(result)
}

impl Store {
    /// Run a derivation as one transaction, returning the new result.
    pub fn derive(&self, spec: &DerivationSpec) -> Result<ResultId> {
        self.transact("derive", |tx| derive_in(tx, spec))
    }
}
