use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow_csv::reader::{Format, ReaderBuilder};
use diagnostics::*;
use odm::{InsertRequest, ResultKind, TableMapping, ValueMapping, ValueSeries};

use crate::common::StoreContext;

/// Everything about an ingestion besides the file and column mapping.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub kind: ResultKind,
    pub method: String,
    pub processing_level: String,
    pub sampled_medium: Option<String>,
    pub feature_type: Option<String>,
    pub description: Option<String>,
}

/// Parse `COLUMN=VARIABLE:UNIT`.
pub fn parse_value_mapping(arg: &str) -> Result<ValueMapping> {
    let (column, target) = arg
        .rsplit_once('=')
        .ok_or_else(|| anyhow!("Expected COLUMN=VARIABLE:UNIT, got '{arg}'"))?;
    let (variable, unit) = target
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected VARIABLE:UNIT after '=', got '{target}'"))?;
    if column.is_empty() || variable.is_empty() || unit.is_empty() {
        return Err(anyhow!("Empty column, variable or unit in '{arg}'"));
    }
    Ok(ValueMapping {
        column: column.to_string(),
        variable: variable.to_string(),
        unit: unit.to_string(),
    })
}

/// Read a CSV file with a header row. The site and timestamp columns are
/// kept as text: codes like `007` are identities, not numbers.
fn read_csv(path: &Path, mapping: &TableMapping) -> Result<Vec<RecordBatch>> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let format = Format::default().with_header(true);
    let (inferred, _) = format
        .infer_schema(&mut file, None)
        .with_context(|| format!("Failed to infer schema of {}", path.display()))?;
    file.rewind()?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|field| {
            let name = field.name();
            if *name == mapping.site_column || *name == mapping.timestamp_column {
                Field::new(name, DataType::Utf8, true)
            } else {
                field.as_ref().clone()
            }
        })
        .collect();

    let reader = ReaderBuilder::new(Arc::new(Schema::new(fields)))
        .with_format(format)
        .build(file)?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(batches)
}

/// Load a wide CSV table and insert its mapped columns as one transaction.
pub fn ingest_command<F>(
    ctx: &StoreContext,
    csv_path: &Path,
    mapping: &TableMapping,
    options: &IngestOptions,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let batches = read_csv(csv_path, mapping)?;
    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    let file = csv_path.display().to_string();
    debug!("Read {rows} rows from {file}", rows, file);

    let mut series: Vec<ValueSeries> = Vec::new();
    for batch in &batches {
        for (idx, part) in mapping.extract(batch)?.into_iter().enumerate() {
            match series.get_mut(idx) {
                Some(existing) => existing.observations.extend(part.observations),
                None => series.push(part),
            }
        }
    }
    if series.is_empty() {
        return Err(anyhow!("{file} has no rows"));
    }

    let mut req = InsertRequest::new(
        options.kind,
        options.method.as_str(),
        options.processing_level.as_str(),
    );
    for s in series {
        req = req.with_series(s);
    }
    if let Some(medium) = &options.sampled_medium {
        req = req.sampled_medium(medium.as_str());
    }
    if let Some(feature_type) = &options.feature_type {
        req = req.feature_type(feature_type.as_str());
    }
    if let Some(description) = &options.description {
        req = req.description(description.as_str());
    }

    let store = ctx.open_store()?;
    let results = store.insert(&req)?;
    let values: usize = req.series.iter().map(|s| s.observations.len()).sum();
    handler(&format!(
        "Ingested {values} values from {file} into {} results",
        results.len()
    ));
    Ok(())
}
