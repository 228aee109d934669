use anyhow::Result;
use odm::{Filter, ResultId};

use crate::common::StoreContext;

/// Show the action behind a result and the stored results it came from.
pub fn lineage_command<F>(ctx: &StoreContext, result: ResultId, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let store = ctx.open_store()?;
    let action = store.action_of(result)?;
    handler(&format!(
        "Result {result}: action {} by method {} ({} .. {}), event {}",
        action.id,
        action.method_code,
        action.begin.to_rfc3339(),
        action.end.to_rfc3339(),
        action.event_id
    ));
    if let Some(description) = &action.description {
        handler(&format!("  {description}"));
    }

    let sources = store.lineage(result)?;
    if sources.is_empty() {
        handler("  no stored sources");
    }
    for source in sources {
        let rows = store.fetch(&Filter::new().result_id(source))?;
        match rows.first() {
            Some(row) => handler(&format!(
                "  <- result {source}: {} ({}) at {}, {} values in {}",
                row.variable_code,
                row.kind,
                row.site_code,
                rows.len(),
                row.unit_name
            )),
            None => handler(&format!("  <- result {source}")),
        }
    }
    Ok(())
}
