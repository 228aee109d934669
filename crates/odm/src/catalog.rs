//! Controlled catalogs: units, variables, methods and processing levels.
//!
//! Entries are resolved by their natural key and never updated. Registering
//! a key that already exists is a `DuplicateCode` error that leaves the
//! original definition untouched.

use crate::error::{CatalogKind, Error, Result, is_unique_violation};
use crate::schema::{Methods, ProcessingLevels, SamplingFeatures, Units, Variables};
use crate::store::{Store, TransactionGuard};
use crate::tabular::ForArrow;
use crate::vocabulary::{Field as VocabField, Vocabulary};
use arrow::datatypes::{DataType, Field, FieldRef};
use diagnostics::*;
use duckdb::{Connection, Row};
use sea_query::{
    Alias, DynIden, Expr, InsertStatement, IntoIden, Order, Query, SelectStatement,
    SqliteQueryBuilder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A definition that can be registered in one of the catalogs.
pub trait CatalogEntry: Sized {
    const KIND: CatalogKind;

    /// The unique natural key (unit name, variable code, ...).
    fn key(&self) -> &str;

    /// Vocabulary checks applied before registration.
    fn check(&self, _vocabulary: &Vocabulary) -> Result<()> {
        Ok(())
    }

    fn insert_statement(&self) -> Result<InsertStatement>;

    /// Select of every column `from_row` reads, in order.
    fn select_statement() -> SelectStatement;

    fn from_row(row: &Row<'_>) -> duckdb::Result<Self>;
}

fn key_of(kind: CatalogKind) -> (DynIden, DynIden) {
    match kind {
        CatalogKind::Unit => (Units::Table.into_iden(), Units::Name.into_iden()),
        CatalogKind::Variable => (Variables::Table.into_iden(), Variables::Code.into_iden()),
        CatalogKind::Method => (Methods::Table.into_iden(), Methods::Code.into_iden()),
        CatalogKind::ProcessingLevel => (
            ProcessingLevels::Table.into_iden(),
            ProcessingLevels::Label.into_iden(),
        ),
        CatalogKind::SamplingFeature => (
            SamplingFeatures::Table.into_iden(),
            SamplingFeatures::Code.into_iden(),
        ),
    }
}

/// Id of the entry with `key`, if any.
pub(crate) fn lookup(conn: &Connection, kind: CatalogKind, key: &str) -> Result<Option<i64>> {
    let (table, column) = key_of(kind);
    let sql = Query::select()
        .column(Alias::new("id"))
        .from(table)
        .and_where(Expr::col(column).eq(key))
        .to_string(SqliteQueryBuilder);

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    Ok(rows.next().transpose()?)
}

/// Id of the entry with `key`, or `UnknownReference`.
pub(crate) fn require(conn: &Connection, kind: CatalogKind, key: &str) -> Result<i64> {
    lookup(conn, kind, key)?.ok_or_else(|| Error::unknown(kind, key))
}

pub(crate) fn register<E: CatalogEntry>(tx: &TransactionGuard<'_>, entry: &E) -> Result<i64> {
    let kind = E::KIND;
    let key = entry.key();
    if key.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{kind} key cannot be empty")));
    }
    entry.check(tx.vocabulary())?;

    if lookup(tx, kind, key)?.is_some() {
        return Err(Error::duplicate(kind, key));
    }

    let sql = entry
        .insert_statement()?
        .returning_col(Alias::new("id"))
        .to_string(SqliteQueryBuilder);
    match tx.query_row(&sql, [], |row| row.get::<_, i64>(0)) {
        Ok(id) => {
            let kind = kind.to_string();
            info!("Registered {kind} {key} as {id}", kind, key, id);
            Ok(id)
        }
        Err(e) if is_unique_violation(&e) => Err(Error::duplicate(kind, key)),
        Err(e) => Err(e.into()),
    }
}

fn select_one<E: CatalogEntry>(conn: &Connection, key: &str) -> Result<Option<E>> {
    let (_, column) = key_of(E::KIND);
    let sql = E::select_statement()
        .and_where(Expr::col(column).eq(key))
        .to_string(SqliteQueryBuilder);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map([], |row| E::from_row(row))?;
    Ok(rows.next().transpose()?)
}

fn select_all<E: CatalogEntry>(conn: &Connection) -> Result<Vec<E>> {
    let (_, column) = key_of(E::KIND);
    let sql = E::select_statement()
        .order_by(column, Order::Asc)
        .to_string(SqliteQueryBuilder);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| E::from_row(row))?;
    Ok(rows.collect::<duckdb::Result<Vec<E>>>()?)
}

impl Store {
    /// Register a catalog entry in its own transaction.
    pub fn register<E: CatalogEntry>(&self, entry: &E) -> Result<i64> {
        let label = format!("register {}", E::KIND);
        self.transact(&label, |tx| register(tx, entry))
    }

    /// Resolve a catalog key to its id.
    pub fn resolve(&self, kind: CatalogKind, key: &str) -> Result<i64> {
        self.read(|conn| require(conn, kind, key))
    }

    /// The stored definition for `key`.
    pub fn describe<E: CatalogEntry>(&self, key: &str) -> Result<Option<E>> {
        self.read(|conn| select_one(conn, key))
    }

    /// Every entry of a catalog, ordered by key.
    pub fn list<E: CatalogEntry>(&self) -> Result<Vec<E>> {
        self.read(|conn| select_all(conn))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDefinition {
    pub name: String,
}

impl UnitDefinition {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

impl CatalogEntry for UnitDefinition {
    const KIND: CatalogKind = CatalogKind::Unit;

    fn key(&self) -> &str {
        &self.name
    }

    fn insert_statement(&self) -> Result<InsertStatement> {
        Ok(Query::insert()
            .into_table(Units::Table)
            .columns([Units::Name])
            .values([self.name.as_str().into()])?
            .to_owned())
    }

    fn select_statement() -> SelectStatement {
        Query::select()
            .column(Units::Name)
            .from(Units::Table)
            .to_owned()
    }

    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self { name: row.get(0)? })
    }
}

impl ForArrow for UnitDefinition {
    fn for_arrow() -> Vec<FieldRef> {
        vec![Arc::new(Field::new("name", DataType::Utf8, false))]
    }
}

/// A variable: what was measured or derived.
///
/// `code` is the unique identity. `name` is a controlled-vocabulary term
/// that several variables may share (e.g. two derivations both named
/// `depth`), which is why derivations need distinct codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub variable_type: String,
    pub definition: String,
}

impl VariableDefinition {
    pub fn new<S: Into<String>>(code: S, name: S, variable_type: S, definition: S) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            variable_type: variable_type.into(),
            definition: definition.into(),
        }
    }
}

impl CatalogEntry for VariableDefinition {
    const KIND: CatalogKind = CatalogKind::Variable;

    fn key(&self) -> &str {
        &self.code
    }

    fn check(&self, vocabulary: &Vocabulary) -> Result<()> {
        vocabulary.check(VocabField::VariableName, &self.name)?;
        vocabulary.check(VocabField::VariableType, &self.variable_type)
    }

    fn insert_statement(&self) -> Result<InsertStatement> {
        Ok(Query::insert()
            .into_table(Variables::Table)
            .columns([
                Variables::Code,
                Variables::Name,
                Variables::Type,
                Variables::Definition,
            ])
            .values([
                self.code.as_str().into(),
                self.name.as_str().into(),
                self.variable_type.as_str().into(),
                self.definition.as_str().into(),
            ])?
            .to_owned())
    }

    fn select_statement() -> SelectStatement {
        Query::select()
            .columns([
                Variables::Code,
                Variables::Name,
                Variables::Type,
                Variables::Definition,
            ])
            .from(Variables::Table)
            .to_owned()
    }

    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            name: row.get(1)?,
            variable_type: row.get(2)?,
            definition: row.get(3)?,
        })
    }
}

impl ForArrow for VariableDefinition {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("code", DataType::Utf8, false)),
            Arc::new(Field::new("name", DataType::Utf8, false)),
            Arc::new(Field::new("type", DataType::Utf8, false)),
            Arc::new(Field::new("definition", DataType::Utf8, false)),
        ]
    }
}

/// A procedure that produced values: an instrument, a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDefinition {
    pub code: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub description: String,
}

impl MethodDefinition {
    pub fn new<S: Into<String>>(code: S, method_type: S, description: S) -> Self {
        Self {
            code: code.into(),
            method_type: method_type.into(),
            description: description.into(),
        }
    }
}

impl CatalogEntry for MethodDefinition {
    const KIND: CatalogKind = CatalogKind::Method;

    fn key(&self) -> &str {
        &self.code
    }

    fn check(&self, vocabulary: &Vocabulary) -> Result<()> {
        vocabulary.check(VocabField::MethodType, &self.method_type)
    }

    fn insert_statement(&self) -> Result<InsertStatement> {
        Ok(Query::insert()
            .into_table(Methods::Table)
            .columns([Methods::Code, Methods::Type, Methods::Description])
            .values([
                self.code.as_str().into(),
                self.method_type.as_str().into(),
                self.description.as_str().into(),
            ])?
            .to_owned())
    }

    fn select_statement() -> SelectStatement {
        Query::select()
            .columns([Methods::Code, Methods::Type, Methods::Description])
            .from(Methods::Table)
            .to_owned()
    }

    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            method_type: row.get(1)?,
            description: row.get(2)?,
        })
    }
}

impl ForArrow for MethodDefinition {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("code", DataType::Utf8, false)),
            Arc::new(Field::new("type", DataType::Utf8, false)),
            Arc::new(Field::new("description", DataType::Utf8, false)),
        ]
    }
}

/// Pipeline stage of a result, e.g. "Raw data" or "Derived product".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLevelDefinition {
    pub label: String,
    pub definition: String,
}

impl ProcessingLevelDefinition {
    pub fn new<S: Into<String>>(label: S, definition: S) -> Self {
        Self {
            label: label.into(),
            definition: definition.into(),
        }
    }
}

impl CatalogEntry for ProcessingLevelDefinition {
    const KIND: CatalogKind = CatalogKind::ProcessingLevel;

    fn key(&self) -> &str {
        &self.label
    }

    fn insert_statement(&self) -> Result<InsertStatement> {
        Ok(Query::insert()
            .into_table(ProcessingLevels::Table)
            .columns([ProcessingLevels::Label, ProcessingLevels::Definition])
            .values([self.label.as_str().into(), self.definition.as_str().into()])?
            .to_owned())
    }

    fn select_statement() -> SelectStatement {
        Query::select()
            .columns([ProcessingLevels::Label, ProcessingLevels::Definition])
            .from(ProcessingLevels::Table)
            .to_owned()
    }

    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            label: row.get(0)?,
            definition: row.get(1)?,
        })
    }
}

impl ForArrow for ProcessingLevelDefinition {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("label", DataType::Utf8, false)),
            Arc::new(Field::new("definition", DataType::Utf8, false)),
        ]
    }
}
