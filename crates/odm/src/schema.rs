//! Relational schema for the observations store.
//!
//! Catalog tables (units, variables, methods, processing levels, sampling
//! features) carry a unique natural key. Actions, feature actions, results and
//! data values form the append-only provenance chain written by ingestion and
//! derivation. Timestamps are stored as epoch nanoseconds (UTC).

use sea_query::Iden;

/// DDL applied when a store is opened. Every statement is idempotent.
pub(crate) const CREATE_SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_units;
CREATE SEQUENCE IF NOT EXISTS seq_variables;
CREATE SEQUENCE IF NOT EXISTS seq_methods;
CREATE SEQUENCE IF NOT EXISTS seq_processinglevels;
CREATE SEQUENCE IF NOT EXISTS seq_samplingfeatures;
CREATE SEQUENCE IF NOT EXISTS seq_actions;
CREATE SEQUENCE IF NOT EXISTS seq_featureactions;
CREATE SEQUENCE IF NOT EXISTS seq_results;
CREATE SEQUENCE IF NOT EXISTS seq_datavalues;

CREATE TABLE IF NOT EXISTS units (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_units'),
    name VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS variables (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_variables'),
    code VARCHAR NOT NULL UNIQUE,
    name VARCHAR NOT NULL,
    "type" VARCHAR NOT NULL,
    definition VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS methods (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_methods'),
    code VARCHAR NOT NULL UNIQUE,
    "type" VARCHAR NOT NULL,
    description VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS processinglevels (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_processinglevels'),
    label VARCHAR NOT NULL UNIQUE,
    definition VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS samplingfeatures (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_samplingfeatures'),
    code VARCHAR NOT NULL UNIQUE,
    "type" VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS actions (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_actions'),
    methodid BIGINT NOT NULL REFERENCES methods(id),
    eventid VARCHAR NOT NULL,
    begindatetime BIGINT NOT NULL,
    enddatetime BIGINT NOT NULL,
    description VARCHAR
);

CREATE TABLE IF NOT EXISTS featureactions (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_featureactions'),
    actionid BIGINT NOT NULL REFERENCES actions(id),
    samplingfeatureid BIGINT NOT NULL REFERENCES samplingfeatures(id)
);

CREATE TABLE IF NOT EXISTS results (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_results'),
    variableid BIGINT NOT NULL REFERENCES variables(id),
    unitid BIGINT NOT NULL REFERENCES units(id),
    processinglevelid BIGINT NOT NULL REFERENCES processinglevels(id),
    featureactionid BIGINT NOT NULL REFERENCES featureactions(id),
    kind VARCHAR NOT NULL,
    sampledmedium VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS datavalues (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_datavalues'),
    resultid BIGINT NOT NULL REFERENCES results(id),
    "value" DOUBLE NOT NULL,
    valuedatetime BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS resultderivations (
    resultid BIGINT NOT NULL REFERENCES results(id),
    sourceresultid BIGINT NOT NULL REFERENCES results(id)
);
"#;

#[derive(Iden, Clone, Copy)]
pub(crate) enum Units {
    Table,
    Id,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub(crate) enum Variables {
    Table,
    Id,
    Code,
    Name,
    Type,
    Definition,
}

#[derive(Iden, Clone, Copy)]
pub(crate) enum Methods {
    Table,
    Id,
    Code,
    Type,
    Description,
}

#[derive(Iden, Clone, Copy)]
#[iden = "processinglevels"]
pub(crate) enum ProcessingLevels {
    Table,
    Id,
    Label,
    Definition,
}

#[derive(Iden, Clone, Copy)]
#[iden = "samplingfeatures"]
pub(crate) enum SamplingFeatures {
    Table,
    Id,
    Code,
    Type,
}

#[derive(Iden, Clone, Copy)]
pub(crate) enum Actions {
    Table,
    Id,
    #[iden = "methodid"]
    MethodId,
    #[iden = "eventid"]
    EventId,
    #[iden = "begindatetime"]
    BeginDateTime,
    #[iden = "enddatetime"]
    EndDateTime,
    Description,
}

#[derive(Iden, Clone, Copy)]
#[iden = "featureactions"]
pub(crate) enum FeatureActions {
    Table,
    Id,
    #[iden = "actionid"]
    ActionId,
    #[iden = "samplingfeatureid"]
    SamplingFeatureId,
}

#[derive(Iden, Clone, Copy)]
pub(crate) enum Results {
    Table,
    Id,
    #[iden = "variableid"]
    VariableId,
    #[iden = "unitid"]
    UnitId,
    #[iden = "processinglevelid"]
    ProcessingLevelId,
    #[iden = "featureactionid"]
    FeatureActionId,
    Kind,
    #[iden = "sampledmedium"]
    SampledMedium,
}

#[derive(Iden, Clone, Copy)]
#[iden = "datavalues"]
pub(crate) enum DataValues {
    Table,
    Id,
    #[iden = "resultid"]
    ResultId,
    Value,
    #[iden = "valuedatetime"]
    ValueDateTime,
}

#[derive(Iden, Clone, Copy)]
#[iden = "resultderivations"]
pub(crate) enum ResultDerivations {
    Table,
    #[iden = "resultid"]
    ResultId,
    #[iden = "sourceresultid"]
    SourceResultId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{Query, SqliteQueryBuilder};

    #[test]
    fn test_iden_names_match_ddl() {
        let sql = Query::select()
            .columns([DataValues::Value, DataValues::ValueDateTime])
            .from(DataValues::Table)
            .to_string(SqliteQueryBuilder);
        assert_eq!(
            sql,
            r#"SELECT "value", "valuedatetime" FROM "datavalues""#
        );

        let sql = Query::select()
            .column(FeatureActions::SamplingFeatureId)
            .from(FeatureActions::Table)
            .to_string(SqliteQueryBuilder);
        assert!(CREATE_SCHEMA.contains("samplingfeatureid BIGINT"));
        assert_eq!(
            sql,
            r#"SELECT "samplingfeatureid" FROM "featureactions""#
        );
    }
}
