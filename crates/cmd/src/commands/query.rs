use anyhow::{Result, anyhow};
use arrow_csv::WriterBuilder;
use diagnostics::*;
use odm::Filter;

use crate::common::StoreContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Count,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "count" => Ok(OutputFormat::Count),
            other => Err(anyhow!(
                "Unsupported output format: {other}. Use 'table', 'csv' or 'count'."
            )),
        }
    }
}

/// Fetch value rows matching `filter` and render them.
pub fn query_command<F>(
    ctx: &StoreContext,
    filter: &Filter,
    format: OutputFormat,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let store = ctx.open_store()?;
    let rows = store.fetch(filter)?;
    let count = rows.len();
    debug!("Query matched {count} rows", count);

    match format {
        OutputFormat::Count => handler(&count.to_string()),
        OutputFormat::Table => {
            if rows.is_empty() {
                handler("No results found.");
                return Ok(());
            }
            let batch = odm::rows_to_record_batch(&rows)?;
            let formatted = arrow_cast::pretty::pretty_format_batches(&[batch])
                .map_err(|e| anyhow!("Failed to format results as table: {e}"))?;
            handler(&formatted.to_string());
        }
        OutputFormat::Csv => {
            let batch = odm::rows_to_record_batch(&rows)?;
            let mut buf = Vec::new();
            {
                let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
                writer
                    .write(&batch)
                    .map_err(|e| anyhow!("Failed to write CSV: {e}"))?;
            }
            handler(String::from_utf8_lossy(&buf).trim_end());
        }
    }
    Ok(())
}
