use anyhow::{Result, anyhow};

use crate::common::StoreContext;

pub fn init_command<F>(ctx: &StoreContext, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let path = ctx.store_path()?;
    if path.exists() {
        return Err(anyhow!("Store already exists at {}", path.display()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let store = ctx.open_at(&path)?;
    handler(&format!("Initialized observations store at {}", store.location()));
    Ok(())
}
