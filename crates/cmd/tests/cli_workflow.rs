use std::path::Path;

use anyhow::Result;
use cmd::StoreContext;
use cmd::commands::{
    CatalogChoice, IngestOptions, OutputFormat, RegisterEntry, catalog_command, derive_command,
    ingest_command, init_command, lineage_command, parse_value_mapping, query_command,
    register_command,
};
use odm::{
    Filter, MethodDefinition, ProcessingLevelDefinition, ResultKind, TableMapping,
    UnitDefinition, VariableDefinition,
};
use tempfile::tempdir;

const GAGE_CSV: &str = "\
Date,Site,Gage,Offset
2023-05-01T10:00:00Z,509R2,1000,200
2023-05-01T10:00:00Z,510R1,950,
";

const BODY_LENGTH: &str = r#"
site_code: "509R2"
inputs:
  - name: gage
    stored: { variable_code: gageHeight }
  - name: offset
    stored: { variable_code: offset }
transform: { subtract: [{ input: gage }, { input: offset }] }
output_variable: bodyLength_509R2
output_unit: mm
output_method: calc
processing_level: Derived product
"#;

fn run<F>(f: F) -> Result<Vec<String>>
where
    F: FnOnce(&mut dyn FnMut(&str)) -> Result<()>,
{
    let mut lines = Vec::new();
    f(&mut |line: &str| lines.push(line.to_string()))?;
    Ok(lines)
}

fn register_all(ctx: &StoreContext) -> Result<()> {
    let entries = [
        RegisterEntry::Unit(UnitDefinition::new("mm")),
        RegisterEntry::Variable(VariableDefinition::new(
            "gageHeight",
            "gageHeight",
            "Hydrology",
            "Staff gage reading",
        )),
        RegisterEntry::Variable(VariableDefinition::new(
            "offset",
            "offset",
            "Hydrology",
            "Gage zero offset",
        )),
        RegisterEntry::Variable(VariableDefinition::new(
            "bodyLength_509R2",
            "bodyLength",
            "Hydrology",
            "Gage height minus offset",
        )),
        RegisterEntry::Method(MethodDefinition::new(
            "staffGage",
            "observation",
            "Manual staff gage reading",
        )),
        RegisterEntry::Method(MethodDefinition::new("calc", "calculation", "Arithmetic")),
        RegisterEntry::Level(ProcessingLevelDefinition::new("Raw data", "As recorded")),
        RegisterEntry::Level(ProcessingLevelDefinition::new("Derived product", "Computed")),
    ];
    for entry in &entries {
        let out = run(|h| register_command(ctx, entry, h))?;
        assert!(out[0].starts_with("Registered "));
    }
    Ok(())
}

fn ingest_gage(ctx: &StoreContext, dir: &Path) -> Result<()> {
    let csv = dir.join("gage.csv");
    std::fs::write(&csv, GAGE_CSV)?;
    let mut mapping = TableMapping::new("Date", "Site");
    mapping.values.push(parse_value_mapping("Gage=gageHeight:mm")?);
    mapping.values.push(parse_value_mapping("Offset=offset:mm")?);
    let options = IngestOptions {
        kind: ResultKind::Measurement,
        method: "staffGage".to_string(),
        processing_level: "Raw data".to_string(),
        sampled_medium: Some("surfaceWater".to_string()),
        feature_type: None,
        description: Some("gage.csv".to_string()),
    };
    let out = run(|h| ingest_command(ctx, &csv, &mapping, &options, h))?;
    assert_eq!(out, vec![format!(
        "Ingested 3 values from {} into 3 results",
        csv.display()
    )]);
    Ok(())
}

#[test]
fn test_init_refuses_existing_store() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = StoreContext::new(Some(tmp.path().join("obs.duckdb")), None);

    let out = run(|h| init_command(&ctx, h))?;
    assert!(out[0].starts_with("Initialized observations store"));
    assert!(run(|h| init_command(&ctx, h)).is_err());
    Ok(())
}

#[test]
fn test_commands_require_an_initialized_store() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = StoreContext::new(Some(tmp.path().join("missing.duckdb")), None);
    let err = run(|h| catalog_command(&ctx, CatalogChoice::Units, h))
        .expect_err("store does not exist");
    assert!(err.to_string().contains("odm init"));
    Ok(())
}

#[test]
fn test_ingest_derive_query_lineage() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = StoreContext::new(Some(tmp.path().join("obs.duckdb")), None);
    _ = run(|h| init_command(&ctx, h))?;
    register_all(&ctx)?;
    ingest_gage(&ctx, tmp.path())?;

    let count = run(|h| query_command(&ctx, &Filter::new(), OutputFormat::Count, h))?;
    assert_eq!(count, vec!["3".to_string()]);

    let spec = tmp.path().join("body_length.yaml");
    std::fs::write(&spec, BODY_LENGTH)?;
    let out = run(|h| derive_command(&ctx, &spec, h))?;
    assert!(out[0].starts_with("Derived bodyLength_509R2 = (gage - offset) at 509R2"));

    let filter = Filter::new().variable_name("bodyLength");
    let csv = run(|h| query_command(&ctx, &filter, OutputFormat::Csv, h))?;
    let text = csv.join("\n");
    let mut lines = text.lines();
    assert!(lines.next().unwrap_or_default().starts_with("site_code,timestamp,value"));
    let row = lines.next().unwrap_or_default();
    assert!(row.starts_with("509R2,"));
    assert!(row.contains(",800"));
    assert!(row.contains("bodyLength_509R2"));
    assert_eq!(lines.next(), None);

    let result_id: i64 = row
        .rsplit(',')
        .next()
        .unwrap_or_default()
        .parse()?;
    let lineage = run(|h| lineage_command(&ctx, odm::ResultId(result_id), h))?;
    assert!(lineage[0].contains("method calc"));
    let sources: Vec<_> = lineage.iter().filter(|l| l.contains("<- result")).collect();
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().any(|l| l.contains("gageHeight")));
    assert!(sources.iter().any(|l| l.contains("offset")));
    Ok(())
}

#[test]
fn test_catalog_listing() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = StoreContext::new(Some(tmp.path().join("obs.duckdb")), None);
    _ = run(|h| init_command(&ctx, h))?;

    let empty = run(|h| catalog_command(&ctx, CatalogChoice::Sites, h))?;
    assert_eq!(empty, vec!["No entries.".to_string()]);

    register_all(&ctx)?;
    ingest_gage(&ctx, tmp.path())?;

    let methods = run(|h| catalog_command(&ctx, CatalogChoice::Methods, h))?.join("\n");
    assert!(methods.contains("staffGage"));
    assert!(methods.contains("calculation"));

    let sites = run(|h| catalog_command(&ctx, CatalogChoice::Sites, h))?.join("\n");
    assert!(sites.contains("509R2"));
    assert!(sites.contains("510R1"));
    Ok(())
}

#[test]
fn test_duplicate_registration_fails() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = StoreContext::new(Some(tmp.path().join("obs.duckdb")), None);
    _ = run(|h| init_command(&ctx, h))?;

    let unit = RegisterEntry::Unit(UnitDefinition::new("mm"));
    _ = run(|h| register_command(&ctx, &unit, h))?;
    let err = run(|h| register_command(&ctx, &unit, h)).expect_err("duplicate unit");
    assert!(err.to_string().contains("Duplicate unit code: mm"));
    Ok(())
}

#[test]
fn test_zero_padded_site_codes_are_kept() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = StoreContext::new(Some(tmp.path().join("obs.duckdb")), None);
    _ = run(|h| init_command(&ctx, h))?;
    register_all(&ctx)?;

    let csv = tmp.path().join("padded.csv");
    std::fs::write(
        &csv,
        "Date,Site,Gage\n2023-05-01T10:00:00Z,007,1000\n2023-05-01T11:00:00Z,007,1010\n",
    )?;
    let mapping = TableMapping::new("Date", "Site").value("Gage", "gageHeight", "mm");
    let options = IngestOptions {
        kind: ResultKind::TimeSeries,
        method: "staffGage".to_string(),
        processing_level: "Raw data".to_string(),
        sampled_medium: None,
        feature_type: None,
        description: None,
    };
    _ = run(|h| ingest_command(&ctx, &csv, &mapping, &options, h))?;

    let sites = run(|h| catalog_command(&ctx, CatalogChoice::Sites, h))?.join("\n");
    assert!(sites.contains("007"));

    let filter = Filter::new().site_code("007");
    let count = run(|h| query_command(&ctx, &filter, OutputFormat::Count, h))?;
    assert_eq!(count, vec!["2".to_string()]);
    Ok(())
}
