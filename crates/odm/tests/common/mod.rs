#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use odm::{
    MethodDefinition, Observation, ProcessingLevelDefinition, Store, UnitDefinition,
    VariableDefinition,
};

pub const RAW: &str = "Raw data";
pub const DERIVED: &str = "Derived product";

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 5, day, hour, 0, 0)
        .single()
        .expect("valid test timestamp")
}

pub fn obs(site: &str, day: u32, hour: u32, value: f64) -> Observation {
    Observation::new(site, at(day, hour), value)
}

/// An in-memory store with the catalog entries the well and gage examples
/// need.
pub fn seeded_store() -> Result<Store> {
    let store = Store::open_in_memory()?;
    seed(&store)?;
    Ok(store)
}

pub fn seed(store: &Store) -> Result<()> {
    for unit in ["mm", "m"] {
        _ = store.register(&UnitDefinition::new(unit))?;
    }
    for (code, name, def) in [
        ("gageHeight", "gageHeight", "Staff gage reading"),
        ("offset", "offset", "Gage zero offset"),
        ("bodyLength_509R2", "bodyLength", "Gage height minus offset"),
        ("waterLevel", "waterLevel", "Depth to water below top of casing"),
        ("wellDepth", "wellDepth", "Depth of well below top of casing"),
        ("groundwaterDepth_W1", "groundwaterDepth", "Well depth minus water level"),
    ] {
        _ = store.register(&VariableDefinition::new(code, name, "Hydrology", def))?;
    }
    for (code, kind, desc) in [
        ("staffGage", "observation", "Manual staff gage reading"),
        ("transducer", "instrumentDeployment", "Pressure transducer logger"),
        ("calc", "calculation", "Arithmetic over stored results"),
    ] {
        _ = store.register(&MethodDefinition::new(code, kind, desc))?;
    }
    _ = store.register(&ProcessingLevelDefinition::new(RAW, "Values as recorded"))?;
    _ = store.register(&ProcessingLevelDefinition::new(DERIVED, "Computed from other results"))?;
    Ok(())
}
