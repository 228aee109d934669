use anyhow::Result;
use odm::{
    CatalogEntry, MethodDefinition, ProcessingLevelDefinition, Store, UnitDefinition,
    VariableDefinition,
};

use crate::common::StoreContext;

/// One catalog definition to register.
#[derive(Debug, Clone)]
pub enum RegisterEntry {
    Unit(UnitDefinition),
    Variable(VariableDefinition),
    Method(MethodDefinition),
    Level(ProcessingLevelDefinition),
}

fn register<E: CatalogEntry>(store: &Store, entry: &E) -> Result<String> {
    let id = store.register(entry)?;
    Ok(format!("Registered {} {} as {id}", E::KIND, entry.key()))
}

pub fn register_command<F>(ctx: &StoreContext, entry: &RegisterEntry, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    let store = ctx.open_store()?;
    let message = match entry {
        RegisterEntry::Unit(def) => register(&store, def)?,
        RegisterEntry::Variable(def) => register(&store, def)?,
        RegisterEntry::Method(def) => register(&store, def)?,
        RegisterEntry::Level(def) => register(&store, def)?,
    };
    handler(&message);
    Ok(())
}
