//! Arrow at the boundaries: wide input tables in, value rows and catalog
//! listings out.

use crate::error::{Error, Result};
use crate::ingest::ValueSeries;
use crate::model::{Observation, from_nanos, to_nanos};
use crate::query::ResultRow;
use arrow::datatypes::{DataType, Field, FieldRef, Schema, TimeUnit};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, TimestampNanosecondType};
use arrow_array::{
    Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, TimestampNanosecondArray,
};
use arrow_cast::{CastOptions, cast_with_options};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Types with a fixed Arrow schema, rendered with `serde_arrow`.
pub trait ForArrow {
    fn for_arrow() -> Vec<FieldRef>;
}

pub fn to_record_batch<T: ForArrow + Serialize>(records: &[T]) -> Result<RecordBatch> {
    Ok(serde_arrow::to_record_batch(&T::for_arrow(), &records)?)
}

/// Maps one value column of a wide table to its variable and unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMapping {
    pub column: String,
    /// Variable code.
    pub variable: String,
    /// Unit name.
    pub unit: String,
}

/// Named columns of a wide input table: one timestamp column, one site
/// column, one or more value columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub timestamp_column: String,
    pub site_column: String,
    pub values: Vec<ValueMapping>,
}

impl TableMapping {
    pub fn new<S: Into<String>>(timestamp_column: S, site_column: S) -> Self {
        Self {
            timestamp_column: timestamp_column.into(),
            site_column: site_column.into(),
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn value<S: Into<String>>(mut self, column: S, variable: S, unit: S) -> Self {
        self.values.push(ValueMapping {
            column: column.into(),
            variable: variable.into(),
            unit: unit.into(),
        });
        self
    }

    /// Split `batch` into one series per mapped value column.
    ///
    /// Timestamps may be any Arrow timestamp unit or ISO-8601 text, values
    /// any numeric type or numeric text, site codes text or integers. A
    /// null value is skipped; a null site or timestamp is an error.
    pub fn extract(&self, batch: &RecordBatch) -> Result<Vec<ValueSeries>> {
        if self.values.is_empty() {
            return Err(Error::InvalidInput(
                "table mapping names no value columns".to_string(),
            ));
        }
        let strict = CastOptions {
            safe: false,
            ..Default::default()
        };

        let ts_col = column(batch, &self.timestamp_column)?;
        let ts_target = match ts_col.data_type() {
            DataType::Timestamp(_, tz) => DataType::Timestamp(TimeUnit::Nanosecond, tz.clone()),
            _ => DataType::Timestamp(TimeUnit::Nanosecond, None),
        };
        let ts_cast = cast_with_options(ts_col, &ts_target, &strict)
            .map_err(|e| bad_column(&self.timestamp_column, e))?;
        let timestamps = ts_cast
            .as_primitive_opt::<TimestampNanosecondType>()
            .ok_or_else(|| {
                Error::InvalidInput(format!("{} is not a timestamp column", self.timestamp_column))
            })?;

        let site_cast = cast_with_options(column(batch, &self.site_column)?, &DataType::Utf8, &strict)
            .map_err(|e| bad_column(&self.site_column, e))?;
        let sites = site_cast.as_string_opt::<i32>().ok_or_else(|| {
            Error::InvalidInput(format!("{} is not a text column", self.site_column))
        })?;

        let mut rows: Vec<(String, DateTime<Utc>)> = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            if sites.is_null(i) {
                return Err(Error::InvalidInput(format!(
                    "row {i} has no value in site column {}",
                    self.site_column
                )));
            }
            if timestamps.is_null(i) {
                return Err(Error::InvalidInput(format!(
                    "row {i} has no value in timestamp column {}",
                    self.timestamp_column
                )));
            }
            let ts = from_nanos(timestamps.value(i));
            rows.push((sites.value(i).to_string(), ts));
        }

        let mut series = Vec::with_capacity(self.values.len());
        for mapping in &self.values {
            let cast = cast_with_options(column(batch, &mapping.column)?, &DataType::Float64, &strict)
                .map_err(|e| bad_column(&mapping.column, e))?;
            let values = cast
                .as_primitive_opt::<Float64Type>()
                .ok_or_else(|| {
                    Error::InvalidInput(format!("{} is not a numeric column", mapping.column))
                })?;

            let observations = rows
                .iter()
                .enumerate()
                .filter(|(i, _)| values.is_valid(*i))
                .map(|(i, (site, ts))| Observation::new(site.clone(), *ts, values.value(i)))
                .collect();
            series.push(ValueSeries::new(
                mapping.variable.clone(),
                mapping.unit.clone(),
                observations,
            ));
        }
        Ok(series)
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::InvalidInput(format!("input has no column named {name}")))
}

fn bad_column(name: &str, err: arrow_schema::ArrowError) -> Error {
    Error::InvalidInput(format!("column {name}: {err}"))
}

/// Fixed-offset form of UTC; named zones need chrono-tz.
const UTC_OFFSET: &str = "+00:00";

/// Schema of [`rows_to_record_batch`] output.
#[must_use]
pub fn result_row_schema() -> Schema {
    Schema::new(vec![
        Field::new("site_code", DataType::Utf8, false),
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Nanosecond, Some(UTC_OFFSET.into())),
            false,
        ),
        Field::new("value", DataType::Float64, false),
        Field::new("variable_name", DataType::Utf8, false),
        Field::new("variable_code", DataType::Utf8, false),
        Field::new("unit_name", DataType::Utf8, false),
        Field::new("method_code", DataType::Utf8, false),
        Field::new("processing_level", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("result_id", DataType::Int64, false),
    ])
}

/// Render query rows as one Arrow batch, in the order given.
pub fn rows_to_record_batch(rows: &[ResultRow]) -> Result<RecordBatch> {
    fn text<F: Fn(&ResultRow) -> &str>(rows: &[ResultRow], f: F) -> ArrayRef {
        Arc::new(rows.iter().map(|r| Some(f(r))).collect::<StringArray>())
    }

    let timestamps = rows
        .iter()
        .map(|r| to_nanos(&r.timestamp))
        .collect::<Result<Vec<_>>>()?;
    let columns: Vec<ArrayRef> = vec![
        text(rows, |r| r.site_code.as_str()),
        Arc::new(TimestampNanosecondArray::from(timestamps).with_timezone(UTC_OFFSET)),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.value).collect::<Vec<_>>(),
        )),
        text(rows, |r| r.variable_name.as_str()),
        text(rows, |r| r.variable_code.as_str()),
        text(rows, |r| r.unit_name.as_str()),
        text(rows, |r| r.method_code.as_str()),
        text(rows, |r| r.processing_level.as_str()),
        text(rows, |r| r.kind.as_str()),
        Arc::new(Int64Array::from(
            rows.iter().map(|r| r.result_id.0).collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(result_row_schema()),
        columns,
    )?)
}
