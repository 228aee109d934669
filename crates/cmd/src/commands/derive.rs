use std::path::Path;

use anyhow::{Context, Result};
use odm::DerivationSpec;

use crate::common::StoreContext;

/// Run the derivation declared in a YAML file.
pub fn derive_command<F>(ctx: &StoreContext, spec_path: &Path, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let content = std::fs::read_to_string(spec_path)
        .with_context(|| format!("Failed to read {}", spec_path.display()))?;
    let spec = DerivationSpec::from_yaml(&content)
        .with_context(|| format!("Failed to parse {}", spec_path.display()))?;

    let store = ctx.open_store()?;
    let result = store.derive(&spec)?;
    handler(&format!(
        "Derived {} = {} at {} as result {result}",
        spec.output_variable, spec.transform, spec.site_code
    ));
    Ok(())
}
