//! The record cursor.
//!
//! A [`Table`] is both the declaration of one entity type (fields, primary key,
//! indexes) and a live cursor over a buffered window of its rows. The cursor is
//! positioned before the first row after every fetch; [`Table::read`] advances,
//! loads the row into the fields and marks every field clean.
//!
//! Two fetch modes exist:
//!
//! - streaming ([`Table::find_set`]): reading past the window transparently
//!   fetches the next page with a keyset continuation
//! - selection ([`Table::find_page`], [`Table::get`], [`Table::find_first`],
//!   [`Table::find_last`]): reading past the window ends the cursor
//!
//! Writes act on the loaded row. `modify` and `delete` are guarded by the row's
//! version token; an affected-row count other than one is a concurrency conflict.

use serde_json::{Map, Value as JsonValue};
use tabula_core::{
    DbTable, Error, Field, FieldId, FieldSchema, FieldSet, Result, ValidationError,
    ValidationErrorKind, Value,
};
use tabula_query::expression;
use tabula_query::{
    DeleteBuilder, FieldFilter, FilterKind, FilterLevel, FilterSet, IdentityRetrieval,
    InsertBuilder, SelectBuilder, SqlDialect, UpdateBuilder, VersionGuard, VersionUpdate,
};
use tabula_schema::{DeclaredIndex, TableDef};

use crate::catalog::Catalog;
use crate::database::{Database, ReaderId};

/// Hook run before a write when the caller asks for triggers.
pub type Trigger = fn(&mut Table, &mut Database) -> Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorMode {
    Idle,
    Streaming,
    Selection,
}

/// A declared table and its cursor.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    sql_name: String,
    fields: Vec<Field>,
    primary_key: Vec<FieldId>,
    indexes: Vec<DeclaredIndex>,

    sort: Vec<FieldId>,
    ascending: bool,
    filters: FilterSet,
    filter_level: FilterLevel,
    lock: bool,

    version: i64,
    dataset: DbTable,
    position: Option<usize>,
    loaded: Option<Vec<Value>>,
    mode: CursorMode,
    page_size: usize,
    page_full: bool,
    exhausted: bool,
    reader: Option<ReaderId>,

    on_insert: Option<Trigger>,
    on_modify: Option<Trigger>,
    on_delete: Option<Trigger>,
}

impl Table {
    /// Declare an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sql_name: name.clone(),
            name,
            fields: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            sort: Vec::new(),
            ascending: true,
            filters: FilterSet::new(),
            filter_level: FilterLevel::Public,
            lock: false,
            version: 0,
            dataset: DbTable::default(),
            position: None,
            loaded: None,
            mode: CursorMode::Idle,
            page_size: 0,
            page_full: false,
            exhausted: false,
            reader: None,
            on_insert: None,
            on_modify: None,
            on_delete: None,
        }
    }

    // ========================================================================
    // Declaration
    // ========================================================================

    /// Register a field and return its handle.
    pub fn field(&mut self, mut field: Field) -> FieldId {
        field.set_table(&self.name);
        self.fields.push(field);
        FieldId(self.fields.len() - 1)
    }

    /// Declare the primary key, in order.
    pub fn set_primary_key(&mut self, fields: &[FieldId]) {
        self.primary_key = fields.to_vec();
    }

    /// Declare a secondary index.
    pub fn add_index(&mut self, name: impl Into<String>, fields: &[FieldId], unique: bool) {
        self.indexes.push(DeclaredIndex {
            name: name.into(),
            fields: fields.to_vec(),
            unique,
        });
    }

    /// Hook run by `insert(db, true)`.
    pub fn on_insert(&mut self, trigger: Trigger) {
        self.on_insert = Some(trigger);
    }

    /// Hook run by `modify(db, true)`.
    pub fn on_modify(&mut self, trigger: Trigger) {
        self.on_modify = Some(trigger);
    }

    /// Hook run by `delete(db, true)`.
    pub fn on_delete(&mut self, trigger: Trigger) {
        self.on_delete = Some(trigger);
    }

    /// Check the declaration: a primary key, unique field names, and identity
    /// fields only as the sole key field.
    pub fn check_definition(&self) -> Result<()> {
        if self.primary_key.is_empty() {
            return Err(Error::NoPrimaryKey {
                table: self.name.clone(),
            });
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i]
                .iter()
                .any(|f| f.name().eq_ignore_ascii_case(field.name()))
            {
                return Err(Error::State(format!(
                    "table '{}' declares field '{}' twice",
                    self.name,
                    field.name()
                )));
            }
            if field.is_identity() && self.primary_key != [FieldId(i)] {
                return Err(Error::State(format!(
                    "identity field '{}' of '{}' must be the only primary key field",
                    field.name(),
                    self.name
                )));
            }
        }
        for id in self.primary_key.iter().chain(self.indexes.iter().flat_map(|i| &i.fields)) {
            self.get_field(*id)?;
        }
        Ok(())
    }

    /// The physical definition for the schema compiler.
    pub fn table_def(&self, dialect: &dyn SqlDialect) -> Result<TableDef> {
        TableDef::from_fields(
            &self.sql_name,
            &self.fields,
            &self.primary_key,
            &self.indexes,
            dialect,
        )
    }

    /// Logical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the table the cursor reads and writes.
    pub fn physical_name(&self) -> &str {
        &self.sql_name
    }

    pub(crate) fn set_physical_name(&mut self, name: String) {
        self.sql_name = name;
    }

    /// Registered fields, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Primary key fields.
    pub fn primary_key(&self) -> &[FieldId] {
        &self.primary_key
    }

    /// Version token of the loaded row; 0 if no row is loaded.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Look up a field handle by name (case-insensitive).
    pub fn field_id(&self, name: &str) -> Result<FieldId> {
        self.fields
            .iter()
            .position(|f| f.name().eq_ignore_ascii_case(name))
            .map(FieldId)
            .ok_or_else(|| Error::State(format!("table '{}' has no field '{name}'", self.name)))
    }

    /// A field by handle.
    pub fn get_field(&self, id: FieldId) -> Result<&Field> {
        self.fields
            .get(id.index())
            .ok_or_else(|| Error::State(format!("table '{}' has no field #{}", self.name, id.0)))
    }

    /// A field by handle, mutably.
    pub fn field_mut(&mut self, id: FieldId) -> Result<&mut Field> {
        let table = &self.name;
        self.fields
            .get_mut(id.index())
            .ok_or_else(|| Error::State(format!("table '{table}' has no field #{}", id.0)))
    }

    /// Current value of a field.
    pub fn value(&self, id: FieldId) -> Result<&Value> {
        self.get_field(id).map(Field::value)
    }

    /// Coerce and set the current value of a field.
    pub fn set_value(&mut self, id: FieldId, value: impl Into<Value>) -> Result<()> {
        self.field_mut(id)?.set_value(value)
    }

    /// Fields whose current value differs from the persisted one.
    pub fn dirty_fields(&self) -> FieldSet {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_dirty())
            .map(|(i, _)| FieldId(i))
            .collect()
    }

    /// Reset every field to its default and forget the loaded row.
    pub fn init(&mut self) {
        for field in &mut self.fields {
            field.init();
        }
        self.version = 0;
        self.loaded = None;
    }

    /// Copy current values from another instance, matching fields by name.
    pub fn transfer_fields(&mut self, other: &Table) -> Result<()> {
        for source in &other.fields {
            if let Some(target) = self
                .fields
                .iter_mut()
                .find(|f| f.name().eq_ignore_ascii_case(source.name()))
            {
                target.set_value(source.value().clone())?;
            }
        }
        Ok(())
    }

    /// Rendering metadata of every field.
    pub fn get_schema(&self) -> Vec<FieldSchema> {
        self.fields.iter().map(Field::schema).collect()
    }

    /// The current values as a JSON object keyed by field name.
    pub fn to_json(&self) -> Result<JsonValue> {
        let mut object = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            object.insert(field.name().to_string(), field.serialize(field.value())?);
        }
        Ok(JsonValue::Object(object))
    }

    /// Set current values from a JSON object. Absent fields keep their value.
    pub fn set_from_json(&mut self, json: &JsonValue) -> Result<()> {
        let object = json.as_object().ok_or_else(|| {
            Error::Serialization(format!("record of '{}' must be a JSON object", self.name))
        })?;
        for field in &mut self.fields {
            if let Some(wire) = object.get(field.name()) {
                let value = field.deserialize(wire)?;
                field.set_value(value)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Filters and sorting
    // ========================================================================

    /// Level that subsequent filter calls write to.
    pub fn set_filter_level(&mut self, level: FilterLevel) {
        self.filter_level = level;
    }

    /// The current filter level.
    pub fn filter_level(&self) -> FilterLevel {
        self.filter_level
    }

    /// Active filters.
    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Filter a field to one value, replacing the current level's filter on it.
    pub fn set_range_value(&mut self, id: FieldId, value: impl Into<Value>) -> Result<()> {
        let value = self.get_field(id)?.check_value(value.into())?;
        self.filters
            .set(FieldFilter::new(id, self.filter_level, FilterKind::Equal(value)));
        Ok(())
    }

    /// Filter a field to an inclusive range, replacing the current level's filter on it.
    pub fn set_range(
        &mut self,
        id: FieldId,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Result<()> {
        let field = self.get_field(id)?;
        let min = field.check_value(min.into())?;
        let max = field.check_value(max.into())?;
        self.filters.set(FieldFilter::new(
            id,
            self.filter_level,
            FilterKind::Range { min, max },
        ));
        Ok(())
    }

    /// Filter a field with an expression such as `">=10&<=20"` or `"A*|%1"`.
    ///
    /// A malformed expression fails and leaves the existing filters untouched.
    pub fn set_filter(&mut self, id: FieldId, text: &str, args: &[Value]) -> Result<()> {
        let expr = expression::parse(self.get_field(id)?, text, args)?;
        self.filters.set(FieldFilter::new(
            id,
            self.filter_level,
            FilterKind::Expression {
                text: text.to_string(),
                expr,
            },
        ));
        Ok(())
    }

    /// Remove a field's filter at the current level.
    pub fn reset_field(&mut self, id: FieldId) {
        self.filters.reset_field(id, self.filter_level);
    }

    /// Remove every filter of one level.
    pub fn reset(&mut self, level: FilterLevel) {
        self.filters.reset(level);
    }

    /// Remove every filter, all levels.
    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// Human-readable description of the active filters.
    pub fn filter_description(&self) -> String {
        self.filters.describe(&self.fields)
    }

    /// Sort by these fields; the primary key is appended as tie-breaker.
    pub fn set_current_key(&mut self, fields: &[FieldId]) {
        self.sort = fields.to_vec();
    }

    /// Sort direction.
    pub fn set_ascending(&mut self, ascending: bool) {
        self.ascending = ascending;
    }

    /// Lock read rows until the transaction ends.
    pub fn lock_table(&mut self, lock: bool) {
        self.lock = lock;
    }

    /// Declared sort followed by the primary key fields not already in it.
    pub fn sort_key(&self) -> Vec<FieldId> {
        let mut key = self.sort.clone();
        for id in &self.primary_key {
            if !key.contains(id) {
                key.push(*id);
            }
        }
        key
    }

    // ========================================================================
    // Reading
    // ========================================================================

    fn fetch(
        &mut self,
        db: &mut Database,
        seek: Option<Vec<Value>>,
        limit: usize,
        ascending: bool,
    ) -> Result<()> {
        let sort = self.sort_key();
        let mut select = SelectBuilder::new(&self.sql_name, &self.fields)
            .filters(&self.filters)
            .order_by(sort, ascending)
            .limit(limit)
            .lock(self.lock);
        if let Some(last) = seek {
            select = select.seek_after(last);
        }
        let (sql, params) = select.build(db.dialect())?;
        self.dataset = db.query_cursor(&mut self.reader, self.lock, &sql, &params)?;
        // A selection window is fully buffered; only streaming fetches again.
        if self.mode != CursorMode::Streaming {
            self.release_reader(db);
        }
        self.position = None;
        self.page_full = self.dataset.len() >= limit;
        self.exhausted = false;
        Ok(())
    }

    fn load_row(&mut self, dialect: &dyn SqlDialect, index: usize) -> Result<()> {
        let row = self
            .dataset
            .row(index)
            .ok_or_else(|| Error::State(format!("row {index} of '{}' is not buffered", self.name)))?;
        let values = row.values();
        if values.len() <= self.fields.len() {
            return Err(Error::State(format!(
                "row of '{}' has {} columns, expected {}",
                self.name,
                values.len(),
                self.fields.len() + 1
            )));
        }
        for (field, native) in self.fields.iter_mut().zip(values) {
            let logical = dialect.from_sql_value(field.field_type(), native.clone())?;
            field.load(logical)?;
        }
        self.version = values[self.fields.len()].as_i64().unwrap_or(0);
        self.loaded = Some(self.fields.iter().map(|f| f.xvalue().clone()).collect());
        self.position = Some(index);
        Ok(())
    }

    fn release_reader(&mut self, db: &mut Database) {
        if let Some(id) = self.reader.take() {
            db.close_reader(id);
        }
    }

    fn finish(&mut self, db: &mut Database) {
        self.exhausted = true;
        self.release_reader(db);
    }

    /// Values of the sort key to continue after: the last loaded row, or the
    /// persisted field values when nothing was loaded.
    fn seek_values(&self) -> Vec<Value> {
        self.sort_key()
            .into_iter()
            .map(|id| match &self.loaded {
                Some(row) => row[id.index()].clone(),
                None => self.fields[id.index()].xvalue().clone(),
            })
            .collect()
    }

    /// Open a streaming cursor over the filtered rows in sort order.
    ///
    /// Returns true if at least one row matched.
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = %self.name))]
    pub fn find_set(&mut self, db: &mut Database) -> Result<bool> {
        self.release_reader(db);
        self.mode = CursorMode::Streaming;
        self.page_size = db.page_size();
        self.loaded = None;
        self.fetch(db, None, self.page_size, self.ascending)?;
        Ok(!self.dataset.is_empty())
    }

    /// Fetch one window of at most `limit` rows; reading past it ends the cursor.
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = %self.name))]
    pub fn find_page(&mut self, db: &mut Database, limit: usize) -> Result<bool> {
        self.release_reader(db);
        self.mode = CursorMode::Selection;
        self.page_size = limit.max(1);
        self.loaded = None;
        self.fetch(db, None, self.page_size, self.ascending)?;
        Ok(!self.dataset.is_empty())
    }

    /// Replace the window with the rows after the loaded row's sort key.
    ///
    /// Before any row was loaded, continues after the fields' persisted values.
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = %self.name))]
    pub fn next_set(&mut self, db: &mut Database) -> Result<bool> {
        if self.mode == CursorMode::Idle {
            self.mode = CursorMode::Streaming;
        }
        if self.page_size == 0 {
            self.page_size = db.page_size();
        }
        let seek = self.seek_values();
        self.fetch(db, Some(seek), self.page_size, self.ascending)?;
        if self.dataset.is_empty() {
            self.finish(db);
            return Ok(false);
        }
        Ok(true)
    }

    /// Advance to the next row and load it.
    ///
    /// Returns false when the cursor is exhausted; its reader connection is
    /// released at that point.
    pub fn read(&mut self, db: &mut Database) -> Result<bool> {
        if self.exhausted || self.mode == CursorMode::Idle {
            return Ok(false);
        }
        let mut next = self.position.map_or(0, |p| p + 1);
        if next >= self.dataset.len() {
            if self.mode != CursorMode::Streaming || !self.page_full {
                self.finish(db);
                return Ok(false);
            }
            tracing::debug!(table = %self.name, "Fetching next page");
            let seek = self.seek_values();
            self.fetch(db, Some(seek), self.page_size, self.ascending)?;
            if self.dataset.is_empty() {
                self.finish(db);
                return Ok(false);
            }
            next = 0;
        }
        self.load_row(db.dialect(), next)?;
        Ok(true)
    }

    fn find_edge(&mut self, db: &mut Database, ascending: bool) -> Result<bool> {
        self.release_reader(db);
        self.mode = CursorMode::Selection;
        self.page_size = 1;
        self.loaded = None;
        self.fetch(db, None, 1, ascending)?;
        if self.dataset.is_empty() {
            self.finish(db);
            return Ok(false);
        }
        self.load_row(db.dialect(), 0)?;
        Ok(true)
    }

    /// Load the first row in sort order.
    pub fn find_first(&mut self, db: &mut Database) -> Result<bool> {
        self.find_edge(db, self.ascending)
    }

    /// Load the last row in sort order.
    pub fn find_last(&mut self, db: &mut Database) -> Result<bool> {
        self.find_edge(db, !self.ascending)
    }

    /// Load the row with these primary key values. Filters do not apply.
    #[tracing::instrument(level = "debug", skip(self, db, key), fields(table = %self.name))]
    pub fn get(&mut self, db: &mut Database, key: &[Value]) -> Result<bool> {
        if key.len() != self.primary_key.len() {
            return Err(Error::State(format!(
                "'{}' has {} primary key fields, got {} values",
                self.name,
                self.primary_key.len(),
                key.len()
            )));
        }
        let mut lookup = Vec::with_capacity(key.len());
        for (id, value) in self.primary_key.iter().zip(key) {
            lookup.push((*id, self.get_field(*id)?.check_value(value.clone())?));
        }
        let (sql, params) = SelectBuilder::new(&self.sql_name, &self.fields)
            .key(lookup)
            .limit(1)
            .lock(self.lock)
            .build(db.dialect())?;

        self.release_reader(db);
        self.mode = CursorMode::Selection;
        self.dataset = db.query(&sql, &params)?;
        self.position = None;
        self.page_full = false;
        if self.dataset.is_empty() {
            self.exhausted = true;
            return Ok(false);
        }
        self.exhausted = false;
        self.load_row(db.dialect(), 0)?;
        Ok(true)
    }

    /// [`Table::get`], failing with [`Error::RecordNotFound`] when no row matches.
    pub fn get_or_fail(&mut self, db: &mut Database, key: &[Value]) -> Result<()> {
        if self.get(db, key)? {
            return Ok(());
        }
        let filters = self
            .primary_key
            .iter()
            .zip(key)
            .filter_map(|(id, value)| {
                self.fields
                    .get(id.index())
                    .map(|f| format!("{}: {}", f.name(), f.format(value)))
            })
            .collect::<Vec<_>>()
            .join(", ");
        Err(Error::RecordNotFound {
            table: self.name.clone(),
            filters,
        })
    }

    /// Like [`Table::find_first`], failing with [`Error::RecordNotFound`].
    pub fn find_first_or_fail(&mut self, db: &mut Database) -> Result<()> {
        if self.find_first(db)? {
            return Ok(());
        }
        Err(Error::RecordNotFound {
            table: self.name.clone(),
            filters: self.filter_description(),
        })
    }

    /// Number of rows matching the filters.
    pub fn count(&self, db: &mut Database) -> Result<u64> {
        let (sql, params) = SelectBuilder::new(&self.sql_name, &self.fields)
            .filters(&self.filters)
            .build_count(db.dialect())?;
        let result = db.query(&sql, &params)?;
        let count = result.scalar().and_then(Value::as_i64).unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// True if no row matches the filters.
    pub fn is_empty(&self, db: &mut Database) -> Result<bool> {
        Ok(self.count(db)? == 0)
    }

    // ========================================================================
    // Writing
    // ========================================================================

    fn persisted_key(&self) -> Vec<(FieldId, Value)> {
        self.primary_key
            .iter()
            .filter_map(|id| {
                self.fields
                    .get(id.index())
                    .map(|f| (*id, f.xvalue().clone()))
            })
            .collect()
    }

    fn key_text(&self) -> String {
        self.persisted_key()
            .iter()
            .filter_map(|(id, value)| self.fields.get(id.index()).map(|f| f.format(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn conflict(&self, affected: u64) -> Error {
        Error::Concurrency {
            table: self.name.clone(),
            key: self.key_text(),
            affected,
        }
    }

    /// Insert the current values as a new row.
    ///
    /// An identity key holding 0 is generated by the database and read back.
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = %self.name))]
    pub fn insert(&mut self, db: &mut Database, run_trigger: bool) -> Result<()> {
        if run_trigger {
            if let Some(trigger) = self.on_insert {
                trigger(self, db)?;
            }
        }
        let stmt = InsertBuilder::new(&self.sql_name, &self.fields).build(db.dialect());
        if let Some(before) = &stmt.before {
            db.execute(before, &[])?;
        }
        let generated = match stmt.retrieval {
            IdentityRetrieval::None => db.execute(&stmt.sql, &stmt.params).map(|_| None),
            IdentityRetrieval::LastInsertId => db
                .execute(&stmt.sql, &stmt.params)
                .and_then(|_| db.last_insert_id())
                .map(|id| Some(Value::BigInt(id))),
            IdentityRetrieval::OutputRow => db
                .execute_returning(&stmt.sql, &stmt.params)
                .map(|rows| rows.scalar().cloned()),
        };
        if let Some(after) = &stmt.after {
            if let Err(e) = db.execute(after, &[]) {
                if generated.is_ok() {
                    return Err(e);
                }
                tracing::warn!(table = %self.name, error = %e, "Failed to restore identity insert");
            }
        }
        let generated = generated?;

        if let (Some(id), Some(native)) = (stmt.identity, generated) {
            let field = self.field_mut(id)?;
            let logical = db.dialect().from_sql_value(field.field_type(), native)?;
            field.load(logical)?;
        }
        for field in &mut self.fields {
            field.accept();
        }
        self.version = 1;
        self.loaded = Some(self.fields.iter().map(|f| f.value().clone()).collect());
        tracing::debug!(table = %self.name, key = %self.key_text(), "Inserted record");
        Ok(())
    }

    /// Write the changed fields of the loaded row.
    ///
    /// Returns false without touching the database when nothing changed. Key
    /// fields cannot change here; see [`Table::rename`].
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = %self.name))]
    pub fn modify(&mut self, db: &mut Database, run_trigger: bool) -> Result<bool> {
        if run_trigger {
            if let Some(trigger) = self.on_modify {
                trigger(self, db)?;
            }
        }
        if let Some(field) = self
            .primary_key
            .iter()
            .filter_map(|id| self.fields.get(id.index()))
            .find(|f| f.is_dirty())
        {
            return Err(Error::PrimaryKeyImmutable {
                table: self.name.clone(),
                field: field.name().to_string(),
            });
        }
        self.write_changes(db)
    }

    fn write_changes(&mut self, db: &mut Database) -> Result<bool> {
        let dirty = self.dirty_fields();
        if dirty.is_empty() {
            tracing::debug!(table = %self.name, "Nothing to modify");
            return Ok(false);
        }
        let mut update = UpdateBuilder::new(&self.sql_name, &self.fields);
        for id in dirty.iter() {
            update = update.set(id, self.fields[id.index()].value().clone());
        }
        let (sql, params) = update
            .version(VersionUpdate::Set(self.version + 1))
            .key(self.persisted_key())
            .guard(VersionGuard::AtMost(self.version))
            .build(db.dialect())?;
        let affected = db.execute(&sql, &params)?;
        if affected != 1 {
            return Err(self.conflict(affected));
        }
        for id in dirty.iter() {
            self.fields[id.index()].accept();
        }
        self.version += 1;
        Ok(true)
    }

    /// Write the loaded row including primary key changes, then propagate the
    /// new key values to every dependent table whose relation cascades renames.
    #[tracing::instrument(level = "debug", skip(self, db, catalog), fields(table = %self.name))]
    pub fn rename(&mut self, db: &mut Database, catalog: &Catalog) -> Result<bool> {
        let renamed: Vec<(String, Value, Value)> = self
            .primary_key
            .iter()
            .filter_map(|id| self.fields.get(id.index()))
            .filter(|f| f.is_dirty())
            .map(|f| (f.name().to_string(), f.xvalue().clone(), f.value().clone()))
            .collect();
        if !self.write_changes(db)? {
            return Ok(false);
        }

        for (field, old, new) in &renamed {
            for relation in catalog.inbound(&self.name) {
                if !relation.cascade_rename || !relation.target_field.eq_ignore_ascii_case(field) {
                    continue;
                }
                let mut dependent = catalog.table(&relation.source_table)?;
                let source = dependent.field_id(&relation.source_field)?;
                dependent.set_filter_level(FilterLevel::Relations);
                dependent.set_range_value(source, old.clone())?;
                for condition in &relation.conditions {
                    let id = dependent.field_id(&condition.field)?;
                    dependent.set_range_value(id, condition.value.clone())?;
                }
                let updated = dependent.modify_all(db, source, new.clone(), false)?;
                tracing::info!(
                    table = %relation.source_table,
                    field = %relation.source_field,
                    rows = updated,
                    "Cascaded key rename"
                );
            }
        }
        Ok(true)
    }

    /// Delete the loaded row.
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = %self.name))]
    pub fn delete(&mut self, db: &mut Database, run_trigger: bool) -> Result<()> {
        if run_trigger {
            if let Some(trigger) = self.on_delete {
                trigger(self, db)?;
            }
        }
        let (sql, params) = DeleteBuilder::new(&self.sql_name, &self.fields)
            .key(self.persisted_key())
            .guard(VersionGuard::Exact(self.version))
            .build(db.dialect())?;
        let affected = db.execute(&sql, &params)?;
        if affected != 1 {
            return Err(self.conflict(affected));
        }
        self.version = 0;
        Ok(())
    }

    /// Set one field on every row matching the filters.
    ///
    /// Without `run_per_row` this is a single UPDATE that bumps each row's
    /// version; with it, every row is read and modified with its trigger.
    #[tracing::instrument(level = "debug", skip(self, db, value), fields(table = %self.name))]
    pub fn modify_all(
        &mut self,
        db: &mut Database,
        id: FieldId,
        value: impl Into<Value>,
        run_per_row: bool,
    ) -> Result<u64> {
        let value = self.get_field(id)?.check_value(value.into())?;
        if run_per_row {
            let mut count = 0;
            if self.find_set(db)? {
                while self.read(db)? {
                    self.set_value(id, value.clone())?;
                    if self.modify(db, true)? {
                        count += 1;
                    }
                }
            }
            return Ok(count);
        }
        let (sql, params) = UpdateBuilder::new(&self.sql_name, &self.fields)
            .set(id, value)
            .version(VersionUpdate::Increment)
            .filters(&self.filters)
            .build(db.dialect())?;
        db.execute(&sql, &params)
    }

    /// Delete every row matching the filters.
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = %self.name))]
    pub fn delete_all(&mut self, db: &mut Database, run_per_row: bool) -> Result<u64> {
        if run_per_row {
            let mut count = 0;
            if self.find_set(db)? {
                while self.read(db)? {
                    self.delete(db, true)?;
                    count += 1;
                }
            }
            return Ok(count);
        }
        let (sql, params) = DeleteBuilder::new(&self.sql_name, &self.fields)
            .filters(&self.filters)
            .build(db.dialect())?;
        db.execute(&sql, &params)
    }

    /// Check that every non-empty related field points at an existing row.
    pub fn validate_relations(&self, db: &mut Database, catalog: &Catalog) -> Result<()> {
        for field in &self.fields {
            if field.is_empty() {
                continue;
            }
            for relation in field.relations() {
                let applies = relation.conditions.iter().all(|c| {
                    self.field_id(&c.field)
                        .ok()
                        .and_then(|id| self.fields.get(id.index()))
                        .is_some_and(|f| f.value() == &c.value)
                });
                if !applies {
                    continue;
                }
                let mut related = catalog.table(&relation.table)?;
                let target = match &relation.field {
                    Some(name) => related.field_id(name)?,
                    None => *related.primary_key().first().ok_or_else(|| Error::NoPrimaryKey {
                        table: relation.table.clone(),
                    })?,
                };
                related.set_filter_level(FilterLevel::Relations);
                related.set_range_value(target, field.value().clone())?;
                if related.is_empty(db)? {
                    return Err(ValidationError::new(
                        field.name(),
                        ValidationErrorKind::RelationMissing,
                        format!("{} '{}' does not exist", relation.table, field.format_value()),
                    )
                    .in_table(&self.name)
                    .into());
                }
            }
        }
        Ok(())
    }
}
