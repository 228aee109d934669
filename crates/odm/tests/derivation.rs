mod common;

use anyhow::Result;
use common::*;
use odm::{
    CatalogKind, DerivationInput, DerivationSpec, Error, Filter, InsertRequest, ResultKind,
    Store, Transform, ValueSeries,
};

fn body_length_spec() -> DerivationSpec {
    DerivationSpec {
        site_code: "509R2".to_string(),
        inputs: vec![
            DerivationInput::stored("gage", Filter::new().variable_code("gageHeight")),
            DerivationInput::stored("offset", Filter::new().variable_code("offset")),
        ],
        transform: Transform::subtract(Transform::input("gage"), Transform::input("offset")),
        output_variable: "bodyLength_509R2".to_string(),
        output_unit: "mm".to_string(),
        output_method: "calc".to_string(),
        processing_level: DERIVED.to_string(),
        sampled_medium: "surfaceWater".to_string(),
    }
}

fn insert_gage_readings(store: &Store) -> Result<()> {
    let req = InsertRequest::new(ResultKind::Measurement, "staffGage", RAW)
        .with_series(ValueSeries::new("gageHeight", "mm", vec![obs("509R2", 1, 10, 1000.0)]))
        .with_series(ValueSeries::new("offset", "mm", vec![obs("509R2", 1, 10, 200.0)]));
    _ = store.insert(&req)?;
    Ok(())
}

fn groundwater_spec() -> DerivationSpec {
    DerivationSpec {
        site_code: "W1".to_string(),
        inputs: vec![
            DerivationInput::stored("depth", Filter::new().variable_code("wellDepth")),
            DerivationInput::stored("level", Filter::new().variable_code("waterLevel")),
        ],
        transform: Transform::subtract(Transform::input("depth"), Transform::input("level")),
        output_variable: "groundwaterDepth_W1".to_string(),
        output_unit: "m".to_string(),
        output_method: "calc".to_string(),
        processing_level: DERIVED.to_string(),
        sampled_medium: "groundwater".to_string(),
    }
}

fn insert_well(store: &Store, levels: Vec<odm::Observation>) -> Result<()> {
    let depth = InsertRequest::new(ResultKind::Measurement, "staffGage", RAW)
        .with_series(ValueSeries::new("wellDepth", "m", vec![obs("W1", 1, 0, 12.0)]));
    _ = store.insert(&depth)?;
    let level = InsertRequest::new(ResultKind::TimeSeries, "transducer", RAW)
        .with_series(ValueSeries::new("waterLevel", "m", levels));
    _ = store.insert(&level)?;
    Ok(())
}

#[test]
fn test_body_length_is_gage_minus_offset() -> Result<()> {
    let store = seeded_store()?;
    insert_gage_readings(&store)?;

    let derived = store.derive(&body_length_spec())?;

    let rows = store.fetch(&Filter::new().variable_name("bodyLength"))?;
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.value, 800.0);
    assert_eq!(row.timestamp, at(1, 10));
    assert_eq!(row.site_code, "509R2");
    assert_eq!(row.unit_name, "mm");
    assert_eq!(row.variable_code, "bodyLength_509R2");
    assert_eq!(row.method_code, "calc");
    assert_eq!(row.processing_level, DERIVED);
    assert_eq!(row.kind, ResultKind::Measurement);
    assert_eq!(row.result_id, derived);

    let sources = store.lineage(derived)?;
    assert_eq!(sources.len(), 2);
    let source_vars: Vec<_> = store
        .fetch(&Filter::new().site_code("509R2").processing_level(RAW))?
        .into_iter()
        .filter(|r| sources.contains(&r.result_id))
        .map(|r| r.variable_code)
        .collect();
    assert_eq!(source_vars.len(), 2);
    assert!(source_vars.contains(&"gageHeight".to_string()));
    assert!(source_vars.contains(&"offset".to_string()));

    let action = store.action_of(derived)?;
    assert_eq!(action.method_code, "calc");
    let description = action.description.expect("derivations describe their transform");
    assert!(description.contains("subtract"));
    assert!(description.contains("gage"));
    Ok(())
}

#[test]
fn test_groundwater_depth_broadcasts_well_depth() -> Result<()> {
    let store = seeded_store()?;
    insert_well(
        &store,
        vec![obs("W1", 2, 3, 4.5), obs("W1", 2, 1, 4.0), obs("W1", 2, 2, 4.25)],
    )?;

    let derived = store.derive(&groundwater_spec())?;
    let rows = store.fetch(&Filter::new().variable_code("groundwaterDepth_W1"))?;
    let got: Vec<_> = rows.iter().map(|r| (r.timestamp, r.value)).collect();
    assert_eq!(
        got,
        vec![(at(2, 1), 8.0), (at(2, 2), 7.75), (at(2, 3), 7.5)]
    );
    assert!(rows.iter().all(|r| r.kind == ResultKind::TimeSeries));
    assert_eq!(store.lineage(derived)?.len(), 2);
    Ok(())
}

#[test]
fn test_duplicate_timestamps_are_ambiguous() -> Result<()> {
    let store = seeded_store()?;
    insert_well(
        &store,
        vec![obs("W1", 2, 1, 4.0), obs("W1", 2, 1, 4.1), obs("W1", 2, 2, 4.2)],
    )?;

    match store.derive(&groundwater_spec()) {
        Err(Error::AmbiguousJoin {
            input, site_code, ..
        }) => {
            assert_eq!(input, "level");
            assert_eq!(site_code, "W1");
        }
        other => panic!("expected ambiguous join, got {other:?}"),
    }
    assert!(
        store
            .fetch(&Filter::new().variable_code("groundwaterDepth_W1"))?
            .is_empty()
    );
    Ok(())
}

#[test]
fn test_second_well_depth_is_ambiguous() -> Result<()> {
    let store = seeded_store()?;
    insert_well(&store, vec![obs("W1", 2, 1, 4.0)])?;
    // A resurvey adds another single-valued depth
    let resurvey = InsertRequest::new(ResultKind::Measurement, "staffGage", RAW)
        .with_series(ValueSeries::new("wellDepth", "m", vec![obs("W1", 3, 0, 12.1)]));
    _ = store.insert(&resurvey)?;

    assert!(matches!(
        store.derive(&groundwater_spec()),
        Err(Error::AmbiguousJoin { input, .. }) if input == "depth"
    ));
    Ok(())
}

#[test]
fn test_in_memory_inputs_join_with_stored() -> Result<()> {
    let store = seeded_store()?;
    let gage = InsertRequest::new(ResultKind::Measurement, "staffGage", RAW)
        .with_series(ValueSeries::new("gageHeight", "mm", vec![obs("509R2", 1, 10, 1000.0)]));
    let stored = store.insert(&gage)?;

    let mut spec = body_length_spec();
    spec.inputs[1] = DerivationInput::rows(
        "offset",
        ResultKind::Measurement,
        vec![obs("509R2", 1, 10, 150.0), obs("510R1", 1, 10, 90.0)],
    );
    let derived = store.derive(&spec)?;

    let rows = store.fetch(&Filter::new().variable_code("bodyLength_509R2"))?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, 850.0);
    assert_eq!(store.lineage(derived)?, stored);
    Ok(())
}

#[test]
fn test_output_variable_must_be_new_and_registered() -> Result<()> {
    let store = seeded_store()?;
    insert_gage_readings(&store)?;

    let mut unregistered = body_length_spec();
    unregistered.output_variable = "bodyLength_999".to_string();
    assert!(matches!(
        store.derive(&unregistered),
        Err(Error::UnknownReference { kind: CatalogKind::Variable, code }) if code == "bodyLength_999"
    ));

    let mut overwrite = body_length_spec();
    overwrite.output_variable = "gageHeight".to_string();
    assert!(matches!(
        store.derive(&overwrite),
        Err(Error::InvalidTransform(_))
    ));
    assert!(
        store
            .fetch(&Filter::new().processing_level(DERIVED))?
            .is_empty()
    );
    Ok(())
}

#[test]
fn test_no_overlap_is_an_empty_join() -> Result<()> {
    let store = seeded_store()?;
    let req = InsertRequest::new(ResultKind::Measurement, "staffGage", RAW)
        .with_series(ValueSeries::new("gageHeight", "mm", vec![obs("509R2", 1, 10, 1000.0)]))
        .with_series(ValueSeries::new("offset", "mm", vec![obs("509R2", 1, 11, 200.0)]));
    _ = store.insert(&req)?;

    assert!(matches!(
        store.derive(&body_length_spec()),
        Err(Error::EmptyJoin { site_code }) if site_code == "509R2"
    ));
    Ok(())
}

#[test]
fn test_derivation_from_yaml() -> Result<()> {
    let store = seeded_store()?;
    insert_gage_readings(&store)?;

    let spec = DerivationSpec::from_yaml(
        r#"
site_code: "509R2"
inputs:
  - name: gage
    stored:
      variable_code: gageHeight
  - name: offset
    stored:
      variable_code: offset
transform:
  subtract:
    - input: gage
    - input: offset
output_variable: bodyLength_509R2
output_unit: mm
output_method: calc
processing_level: Derived product
"#,
    )?;
    let derived = store.derive(&spec)?;
    let rows = store.fetch(&Filter::new().result_id(derived))?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, 800.0);
    Ok(())
}

#[test]
fn test_close_logger_instants_are_not_ambiguous() -> Result<()> {
    let store = seeded_store()?;
    let t1 = at(1, 10) + chrono::Duration::microseconds(100);
    let t2 = at(1, 10) + chrono::Duration::microseconds(200);
    insert_well(
        &store,
        vec![
            odm::Observation::new("W1", t1, 3.0),
            odm::Observation::new("W1", t2, 4.0),
        ],
    )?;

    let derived = store.derive(&groundwater_spec())?;
    let rows = store.fetch(&Filter::new().result_id(derived))?;
    let got: Vec<_> = rows.iter().map(|r| (r.timestamp, r.value)).collect();
    assert_eq!(got, vec![(t1, 9.0), (t2, 8.0)]);
    Ok(())
}
