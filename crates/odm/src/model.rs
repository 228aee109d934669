// Shared value types for the provenance chain
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use duckdb::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Row id of a stored result.
    ResultId
);
id_type!(
    /// Row id of a sampling feature (site, well).
    SamplingFeatureId
);
id_type!(ActionId);
id_type!(FeatureActionId);

/// Whether a result holds one value or an ordered series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Measurement,
    TimeSeries,
}

impl ResultKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::Measurement => "measurement",
            ResultKind::TimeSeries => "timeseries",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "measurement" => Ok(ResultKind::Measurement),
            "timeseries" | "time-series" => Ok(ResultKind::TimeSeries),
            other => Err(Error::InvalidInput(format!("unknown result kind '{other}'"))),
        }
    }
}

impl FromSql for ResultKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value)?
            .parse()
            .map_err(|e: Error| FromSqlError::Other(e.to_string().into()))
    }
}

/// One value at one site and instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub site_code: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new<S: Into<String>>(site_code: S, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            site_code: site_code.into(),
            timestamp,
            value,
        }
    }
}

/// Stored form of an instant: nanoseconds since the Unix epoch, which
/// keeps every instant a logger can report (years 1677 to 2262).
pub(crate) fn to_nanos(ts: &DateTime<Utc>) -> Result<i64> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| Error::InvalidInput(format!("timestamp {ts} is out of range")))
}

pub(crate) fn from_nanos(ns: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_nanos(ns)
}
