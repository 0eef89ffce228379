//! SQLite-backed record store.
//!
//! Runs the statements produced by [`crate::sql`] against a `rusqlite`
//! connection and materializes the rows for display. The store never builds
//! SQL itself; it binds values to the placeholders a [`Statement`] declares
//! and nothing else.
//!
//! Execution failures are logged and returned to the caller. None of them
//! poison the connection, so a session can carry on after a failed save.

use std::path::Path;

use chrono::NaiveDate;
use indexmap::IndexMap;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::error::{CompileError, ModelReferenceError, StatementBuildError, StatementKind};
use crate::model::resolve::resolve_field;
use crate::model::{Argument, Entity, FieldType, ModelRegistry, SortOrder};
use crate::sql::row::{list_slots, object_slots};
use crate::sql::{
    value_to_string, Archive, CellValue, CreateTable, Insert, ListContext, LookupFilter,
    Statement, StatementAssembler, Update,
};

/// Errors that can occur while reading or writing records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Statement(#[from] StatementBuildError),

    #[error(transparent)]
    Reference(#[from] ModelReferenceError),

    #[error("field '{field}': '{value}' is not a YYYY-MM-DD date")]
    MalformedDate { field: String, value: String },

    #[error("field '{field}': '{value}' is not a record key")]
    InvalidKey { field: String, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Requests and results
// ============================================================================

/// What a list screen asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    /// Free-text search; matched as `%search%` against every listed field.
    pub search: String,
    /// Restrict to the children of one parent row.
    pub context: Option<ListContext>,
    /// Restrict the candidates of a filtered Reference field.
    pub lookup: Option<Lookup>,
    pub order: Option<SortOrder>,
}

impl ListRequest {
    pub fn search(search: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            ..Self::default()
        }
    }
}

/// A lookup restriction together with the value it compares against.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub filter: LookupFilter,
    pub value: CellValue,
}

/// One row of a list: the record id and the listed fields as display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: i64,
    pub values: Vec<String>,
}

/// One fully loaded record, computed fields included.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    pub fields: IndexMap<String, FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    /// The display column as read.
    pub raw: CellValue,
    pub display: String,
    /// Foreign key of a Reference field.
    pub key: Option<i64>,
    /// Whether the row a Reference field points at is archived.
    pub archived: bool,
}

// ============================================================================
// Store
// ============================================================================

/// A record database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened database");
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        info!("opened in-memory database");
        Ok(Self { conn })
    }

    /// Create one table per entity.
    ///
    /// A failing entity (typically because its table already exists) is
    /// logged and skipped. Returns the entities whose table was created.
    pub fn create_tables(&self, registry: &ModelRegistry) -> Vec<String> {
        let mut created = Vec::new();
        for entity in registry.entities() {
            let sql = CreateTable::for_entity(entity).to_sql();
            match self.conn.execute_batch(&sql) {
                Ok(()) => {
                    info!(entity = %entity.name, "created table");
                    created.push(entity.name.clone());
                }
                Err(e) => {
                    error!(entity = %entity.name, sql = %sql, error = %e, "failed to create table");
                }
            }
        }
        created
    }

    /// Non-archived rows of `entity` matching `request`.
    pub fn list(
        &self,
        registry: &ModelRegistry,
        entity: &str,
        request: &ListRequest,
    ) -> StoreResult<Vec<ListRow>> {
        let entity = registry.entity(entity)?;
        let statement = StatementAssembler::new(registry).build_list_query(
            entity,
            request.context.as_ref(),
            request.lookup.as_ref().map(|l| &l.filter),
            request.order.as_ref(),
        )?;

        let mut values = vec![(
            "@name".to_string(),
            CellValue::Text(format!("%{}%", request.search)),
        )];
        if let Some(lookup) = &request.lookup {
            values.push(("@lookup".to_string(), lookup.value.clone()));
        }

        let slots = list_slots(entity);
        self.query(entity, &statement, &values)?
            .into_iter()
            .map(|row| -> StoreResult<ListRow> {
                let id = row.first().map(CellValue::as_i64).unwrap_or_default();
                let values = slots
                    .iter()
                    .map(|slot| value_to_string(registry, entity, slot.field, &row, slot.display))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ListRow { id, values })
            })
            .collect()
    }

    /// Every field of record `id`, or `None` when there is no such row.
    pub fn load(
        &self,
        registry: &ModelRegistry,
        entity: &str,
        id: i64,
    ) -> StoreResult<Option<Record>> {
        if id <= 0 {
            return Ok(None);
        }
        let entity = registry.entity(entity)?;
        let statement = StatementAssembler::new(registry).build_object_query(entity)?;
        let values = [("@id".to_string(), CellValue::Integer(id))];

        let Some(row) = self.query(entity, &statement, &values)?.into_iter().next() else {
            return Ok(None);
        };

        let mut fields = IndexMap::new();
        for slot in object_slots(entity) {
            let display = value_to_string(registry, entity, slot.field, &row, slot.display)?;
            let cell = |index: Option<usize>| {
                index
                    .and_then(|i| row.get(i))
                    .cloned()
                    .unwrap_or(CellValue::Null)
            };
            fields.insert(
                slot.field.name.clone(),
                FieldValue {
                    raw: cell(Some(slot.display)),
                    display,
                    key: slot.key.map(|i| cell(Some(i)).as_i64()),
                    archived: !cell(slot.archived).is_null(),
                },
            );
        }
        Ok(Some(Record { id, fields }))
    }

    /// Insert a new record (`id` is `None`) or update an existing one.
    /// Returns the record id.
    pub fn save(
        &self,
        registry: &ModelRegistry,
        entity: &str,
        id: Option<i64>,
        inputs: &IndexMap<String, String>,
    ) -> StoreResult<i64> {
        let entity = registry.entity(entity)?;
        let mut values = bind_values(entity, inputs)?;
        let statement = match id {
            Some(id) => {
                values.push(("@id".to_string(), CellValue::Integer(id)));
                Update::for_entity(entity).to_statement()
            }
            None => Insert::for_entity(entity).to_statement(),
        };
        self.execute(entity, &statement, &values)?;
        Ok(id.unwrap_or_else(|| self.conn.last_insert_rowid()))
    }

    /// Soft-delete record `id`.
    pub fn archive(&self, registry: &ModelRegistry, entity: &str, id: i64) -> StoreResult<()> {
        let entity = registry.entity(entity)?;
        let statement = Archive::for_entity(entity).to_statement();
        self.execute(entity, &statement, &[("@id".to_string(), CellValue::Integer(id))])?;
        Ok(())
    }

    /// Display text of `entity.field` on row `key`, following Reference
    /// fields to their terminal value.
    pub fn ref_value(
        &self,
        registry: &ModelRegistry,
        entity: &str,
        field: &str,
        key: i64,
    ) -> StoreResult<Option<String>> {
        let entity = registry.entity(entity)?;
        let field = resolve_field(entity, field)?;
        let statement = StatementAssembler::new(registry).build_ref_value_query(entity, field)?;
        let values = [("@id".to_string(), CellValue::Integer(key))];
        let Some(row) = self.query(entity, &statement, &values)?.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(value_to_string(registry, entity, field, &row, 0)?))
    }

    /// Evaluate the `RefEq(local, refField.remote)` filter of `entity.field`
    /// against the Reference keys currently chosen in a form.
    ///
    /// Returns `None` when the field has no filter or the form has not chosen
    /// the row the filter depends on yet.
    pub fn lookup_filter(
        &self,
        registry: &ModelRegistry,
        entity: &str,
        field: &str,
        form_keys: &IndexMap<String, i64>,
    ) -> StoreResult<Option<Lookup>> {
        let owner = registry.entity(entity)?;
        let field = resolve_field(owner, field)?;
        let Some(filter) = &field.filter else {
            return Ok(None);
        };
        let listed = field
            .reference
            .as_ref()
            .map(|path| path.entity.as_str())
            .unwrap_or(&owner.name);
        let invalid = |position: usize, reason: &str| {
            StatementBuildError::new(
                StatementKind::ListQuery,
                listed,
                CompileError::InvalidArgument {
                    function: filter.name.clone(),
                    position,
                    reason: reason.to_string(),
                },
            )
        };

        let Some(Argument::FieldRef(local)) = filter.arg(0) else {
            return Err(invalid(0, "must name a field of the listed entity").into());
        };
        let Some(Argument::CrossRef { via, remote }) = filter.arg(1) else {
            return Err(invalid(1, "must be refField.remoteField").into());
        };
        let Some(target) = &resolve_field(owner, via)?.reference else {
            return Err(invalid(1, "must go through a Reference field").into());
        };
        let Some(&key) = form_keys.get(via) else {
            return Ok(None);
        };
        let Some(record) = self.load(registry, &target.entity, key)? else {
            return Ok(None);
        };
        let value = record
            .fields
            .get(remote)
            .ok_or_else(|| ModelReferenceError::UnknownField {
                entity: target.entity.clone(),
                field: remote.clone(),
            })?;

        debug!(entity = %owner.name, field = %field.name, local = %local, "evaluated lookup filter");
        Ok(Some(Lookup {
            filter: LookupFilter::new(local.clone()),
            value: value
                .key
                .map(CellValue::Integer)
                .unwrap_or_else(|| value.raw.clone()),
        }))
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn query(
        &self,
        entity: &Entity,
        statement: &Statement,
        values: &[(String, CellValue)],
    ) -> StoreResult<Vec<Vec<CellValue>>> {
        self.run_query(statement, values).map_err(|e| {
            error!(entity = %entity.name, sql = %statement.sql, error = %e, "query failed");
            StoreError::from(e)
        })
    }

    fn run_query(
        &self,
        statement: &Statement,
        values: &[(String, CellValue)],
    ) -> rusqlite::Result<Vec<Vec<CellValue>>> {
        let mut stmt = self.conn.prepare(&statement.sql)?;
        let column_count = stmt.column_count();
        let params = named_params(statement, values);
        let mut rows = stmt.query(params.as_slice())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                cells.push(CellValue::from(row.get_ref(i)?));
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn execute(
        &self,
        entity: &Entity,
        statement: &Statement,
        values: &[(String, CellValue)],
    ) -> StoreResult<usize> {
        let result = self
            .conn
            .prepare(&statement.sql)
            .and_then(|mut stmt| stmt.execute(named_params(statement, values).as_slice()));
        match result {
            Ok(changed) => {
                debug!(entity = %entity.name, sql = %statement.sql, changed, "executed statement");
                Ok(changed)
            }
            Err(e) => {
                error!(entity = %entity.name, sql = %statement.sql, error = %e, "statement failed");
                Err(e.into())
            }
        }
    }
}

/// Pair each placeholder the statement declares with its value. Placeholders
/// without a value stay unbound, which SQLite treats as NULL.
fn named_params<'a>(
    statement: &'a Statement,
    values: &'a [(String, CellValue)],
) -> Vec<(&'a str, &'a dyn ToSql)> {
    statement
        .params
        .iter()
        .filter_map(|name| {
            values
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| (name.as_str(), v as &dyn ToSql))
        })
        .collect()
}

/// Convert form inputs to the values bound for an INSERT or UPDATE.
///
/// Every persisted field gets a `@field` entry; fields missing from
/// `inputs`, or given as empty text for a non-text type, are bound as NULL.
pub fn bind_values(
    entity: &Entity,
    inputs: &IndexMap<String, String>,
) -> StoreResult<Vec<(String, CellValue)>> {
    entity
        .persisted_fields()
        .map(|field| -> StoreResult<(String, CellValue)> {
            let input = inputs.get(&field.name).map(|s| s.trim());
            let value = match (field.field_type, input) {
                (_, None) => CellValue::Null,
                (FieldType::Text, Some(text)) => CellValue::Text(text.to_string()),
                (_, Some("")) => CellValue::Null,
                (FieldType::Reference, Some(text)) => {
                    CellValue::Integer(text.parse().map_err(|_| StoreError::InvalidKey {
                        field: field.name.clone(),
                        value: text.to_string(),
                    })?)
                }
                (FieldType::Boolean, Some(text)) => {
                    CellValue::Integer(i64::from(text.eq_ignore_ascii_case("x")))
                }
                (FieldType::Date, Some(text)) => CellValue::Integer(parse_date(&field.name, text)?),
                (_, Some(text)) => CellValue::Text(text.to_string()),
            };
            Ok((format!("@{}", field.name), value))
        })
        .collect()
}

/// `YYYY-MM-DD` to epoch seconds at UTC midnight.
fn parse_date(field: &str, text: &str) -> StoreResult<i64> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
        .ok_or_else(|| StoreError::MalformedDate {
            field: field.to_string(),
            value: text.to_string(),
        })
}

impl From<ValueRef<'_>> for CellValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Integer(i),
            ValueRef::Real(r) => CellValue::Real(r),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                CellValue::Text(String::from_utf8_lossy(t).into_owned())
            }
        }
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Null => ToSqlOutput::Owned(Value::Null),
            CellValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            CellValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            CellValue::Text(t) => ToSqlOutput::Borrowed(ValueRef::Text(t.as_bytes())),
        })
    }
}
