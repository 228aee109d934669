use anyhow::{Result, anyhow};
use arrow::record_batch::RecordBatch;
use odm::{MethodDefinition, ProcessingLevelDefinition, UnitDefinition, VariableDefinition};

use crate::common::StoreContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogChoice {
    Units,
    Variables,
    Methods,
    Levels,
    Sites,
}

/// List one catalog as a table.
pub fn catalog_command<F>(ctx: &StoreContext, choice: CatalogChoice, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let store = ctx.open_store()?;
    let batch: RecordBatch = match choice {
        CatalogChoice::Units => odm::to_record_batch(&store.list::<UnitDefinition>()?)?,
        CatalogChoice::Variables => odm::to_record_batch(&store.list::<VariableDefinition>()?)?,
        CatalogChoice::Methods => odm::to_record_batch(&store.list::<MethodDefinition>()?)?,
        CatalogChoice::Levels => {
            odm::to_record_batch(&store.list::<ProcessingLevelDefinition>()?)?
        }
        CatalogChoice::Sites => odm::to_record_batch(&store.sampling_features()?)?,
    };
    if batch.num_rows() == 0 {
        handler("No entries.");
        return Ok(());
    }
    let formatted = arrow_cast::pretty::pretty_format_batches(&[batch])
        .map_err(|e| anyhow!("Failed to format catalog: {e}"))?;
    handler(&formatted.to_string());
    Ok(())
}
