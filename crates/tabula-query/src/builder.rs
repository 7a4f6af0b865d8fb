//! Statement builders for SELECT, INSERT, UPDATE and DELETE.
//!
//! Builders work on a table name plus its field list and return SQL text with
//! native parameters, `(String, Vec<Value>)`, numbered with the dialect's
//! placeholder syntax. They support:
//! - filter-driven WHERE clauses
//! - primary-key lookups and keyset ("seek") continuation
//! - row limits and opt-in row locks
//! - optimistic version guards on writes

use tabula_core::{Error, Field, FieldId, Result, Value};

use crate::dialect::{DialectKind, SqlDialect};
use crate::expression::CompareOp;
use crate::filter::FilterSet;
use crate::where_clause::{bind, build_where, render_assignment, render_condition};

/// Name of the concurrency-token column every managed table carries.
pub const VERSION_COLUMN: &str = "_version";

fn field_at(fields: &[Field], id: FieldId) -> Result<&Field> {
    fields
        .get(id.index())
        .ok_or_else(|| Error::State(format!("unknown field #{}", id.index())))
}

fn key_conditions(
    dialect: &dyn SqlDialect,
    fields: &[Field],
    key: &[(FieldId, Value)],
    params: &mut Vec<Value>,
) -> Result<Vec<String>> {
    key.iter()
        .map(|(id, value)| {
            let field = field_at(fields, *id)?;
            Ok(render_condition(dialect, field, CompareOp::Eq, value, params))
        })
        .collect()
}

/// The keyset continuation predicate for a sort key `k1..kn` and the values of
/// the last row read.
///
/// Branch `i` holds equality on `k1..k(i-1)` and a strict comparison on `ki`;
/// the branches are OR-joined.
pub fn seek_predicate(
    dialect: &dyn SqlDialect,
    fields: &[Field],
    sort: &[FieldId],
    last: &[Value],
    ascending: bool,
    params: &mut Vec<Value>,
) -> Result<String> {
    if sort.len() != last.len() || sort.is_empty() {
        return Err(Error::State(format!(
            "seek needs one value per sort field ({} fields, {} values)",
            sort.len(),
            last.len()
        )));
    }
    let strict = if ascending {
        CompareOp::Gt
    } else {
        CompareOp::Lt
    };
    let mut branches = Vec::with_capacity(sort.len());
    for i in 0..sort.len() {
        let mut parts = Vec::with_capacity(i + 1);
        for j in 0..i {
            let field = field_at(fields, sort[j])?;
            parts.push(render_condition(dialect, field, CompareOp::Eq, &last[j], params));
        }
        let field = field_at(fields, sort[i])?;
        parts.push(render_condition(dialect, field, strict, &last[i], params));
        branches.push(format!("({})", parts.join(" AND ")));
    }
    Ok(format!("({})", branches.join(" OR ")))
}

/// SELECT query builder.
///
/// # Example
///
/// ```
/// use tabula_core::{Field, FieldId, FieldType, Value};
/// use tabula_query::{SelectBuilder, SqliteDialect};
///
/// let fields = vec![
///     Field::new("Code", FieldType::Code(20)),
///     Field::new("Qty", FieldType::Integer),
/// ];
/// let (sql, params) = SelectBuilder::new("Item", &fields)
///     .key(vec![(FieldId(0), Value::from("A001"))])
///     .limit(1)
///     .build(&SqliteDialect)
///     .unwrap();
/// assert_eq!(
///     sql,
///     "SELECT \"Code\", \"Qty\", \"_version\" FROM \"Item\" WHERE \"Code\" = ?1 LIMIT 1"
/// );
/// assert_eq!(params, vec![Value::from("A001")]);
/// ```
#[derive(Debug, Clone)]
pub struct SelectBuilder<'a> {
    table: &'a str,
    fields: &'a [Field],
    filters: Option<&'a FilterSet>,
    key: Vec<(FieldId, Value)>,
    sort: Vec<FieldId>,
    ascending: bool,
    seek: Option<Vec<Value>>,
    limit: Option<usize>,
    lock: bool,
}

impl<'a> SelectBuilder<'a> {
    /// Select every field of `table`.
    pub fn new(table: &'a str, fields: &'a [Field]) -> Self {
        Self {
            table,
            fields,
            filters: None,
            key: Vec::new(),
            sort: Vec::new(),
            ascending: true,
            seek: None,
            limit: None,
            lock: false,
        }
    }

    /// Restrict rows by the active filters.
    pub fn filters(mut self, filters: &'a FilterSet) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Restrict rows by equality on key fields.
    pub fn key(mut self, key: Vec<(FieldId, Value)>) -> Self {
        self.key = key;
        self
    }

    /// Sort by fields in one direction.
    pub fn order_by(mut self, sort: Vec<FieldId>, ascending: bool) -> Self {
        self.sort = sort;
        self.ascending = ascending;
        self
    }

    /// Continue after the row whose sort-key values are `last`.
    pub fn seek_after(mut self, last: Vec<Value>) -> Self {
        self.seek = Some(last);
        self
    }

    /// Return at most `n` rows.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Lock the selected rows until the transaction ends.
    pub fn lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    fn from_and_where(
        &self,
        dialect: &dyn SqlDialect,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        let mut sql = format!(" FROM {}", dialect.quote_ident(self.table));
        if self.lock {
            if let Some(hint) = dialect.lock_table_hint() {
                sql.push_str(hint);
            }
        }

        let mut conditions = Vec::new();
        if let Some(filters) = self.filters {
            if let Some(clause) = build_where(dialect, self.fields, filters, params)? {
                conditions.push(clause);
            }
        }
        conditions.extend(key_conditions(dialect, self.fields, &self.key, params)?);
        if let Some(last) = &self.seek {
            conditions.push(seek_predicate(
                dialect,
                self.fields,
                &self.sort,
                last,
                self.ascending,
                params,
            )?);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        Ok(sql)
    }

    /// Build the SELECT SQL and parameters.
    pub fn build(&self, dialect: &dyn SqlDialect) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let mut columns: Vec<String> = self
            .fields
            .iter()
            .map(|f| dialect.quote_ident(f.column()))
            .collect();
        columns.push(dialect.quote_ident(VERSION_COLUMN));

        let mut sql = String::from("SELECT ");
        if let Some(n) = self.limit {
            if let Some(top) = dialect.top_clause(n) {
                sql.push_str(&top);
            }
        }
        sql.push_str(&columns.join(", "));
        sql.push_str(&self.from_and_where(dialect, &mut params)?);

        if !self.sort.is_empty() {
            let dir = if self.ascending { "ASC" } else { "DESC" };
            let order: Vec<String> = self
                .sort
                .iter()
                .map(|id| {
                    field_at(self.fields, *id)
                        .map(|f| {
                            let column = dialect.quote_ident(f.column());
                            format!("{} {dir}", dialect.comparable(f.field_type(), column))
                        })
                })
                .collect::<Result<_>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(n) = self.limit {
            if let Some(limit) = dialect.limit_clause(n) {
                sql.push_str(&limit);
            }
        }
        if self.lock {
            if let Some(suffix) = dialect.lock_suffix() {
                sql.push_str(suffix);
            }
        }
        Ok((sql, params))
    }

    /// Build `SELECT COUNT(*)` over the same rows.
    pub fn build_count(&self, dialect: &dyn SqlDialect) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = format!(
            "SELECT COUNT(*){}",
            self.from_and_where(dialect, &mut params)?
        );
        Ok((sql, params))
    }
}

/// How the generated identity value of an insert is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRetrieval {
    /// The table has no identity field, or the caller supplied the value.
    None,
    /// Ask the connection for the last generated id.
    LastInsertId,
    /// The INSERT returns the value as a one-row result (`OUTPUT INSERTED`).
    OutputRow,
}

/// A built INSERT with the statements that must surround it.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// The INSERT itself.
    pub sql: String,
    /// Native parameters.
    pub params: Vec<Value>,
    /// The identity field, if the table has one.
    pub identity: Option<FieldId>,
    /// How to obtain the generated identity value.
    pub retrieval: IdentityRetrieval,
    /// Statement to run before the INSERT.
    pub before: Option<String>,
    /// Statement to run after the INSERT, even if it failed.
    pub after: Option<String>,
}

/// INSERT query builder.
///
/// Every field is written except an identity field holding 0, which the database
/// generates. The version column starts at 1.
#[derive(Debug, Clone)]
pub struct InsertBuilder<'a> {
    table: &'a str,
    fields: &'a [Field],
}

impl<'a> InsertBuilder<'a> {
    /// Insert the current values of `fields` into `table`.
    pub fn new(table: &'a str, fields: &'a [Field]) -> Self {
        Self { table, fields }
    }

    /// Build the INSERT.
    pub fn build(&self, dialect: &dyn SqlDialect) -> InsertStatement {
        let table = dialect.quote_ident(self.table);
        let identity = self.fields.iter().position(Field::is_identity).map(FieldId);
        let generated = identity
            .and_then(|id| self.fields.get(id.index()))
            .is_some_and(Field::is_empty);

        let mut params = Vec::new();
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        for field in self.fields {
            if field.is_identity() && generated {
                continue;
            }
            columns.push(dialect.quote_ident(field.column()));
            let native = dialect.to_sql_value(field.field_type(), field.value());
            placeholders.push(bind(dialect, &mut params, native));
        }
        columns.push(dialect.quote_ident(VERSION_COLUMN));
        placeholders.push(bind(dialect, &mut params, Value::BigInt(1)));

        let identity_column = identity
            .and_then(|id| self.fields.get(id.index()))
            .map(|f| dialect.quote_ident(f.column()));

        let mut output = String::new();
        let mut before = None;
        let mut after = None;
        let retrieval = match (identity_column, generated, dialect.kind()) {
            (None, _, _) => IdentityRetrieval::None,
            (Some(col), true, DialectKind::SqlServer) => {
                output = format!(" OUTPUT INSERTED.{col}");
                IdentityRetrieval::OutputRow
            }
            (Some(_), true, _) => IdentityRetrieval::LastInsertId,
            (Some(_), false, DialectKind::SqlServer) => {
                before = Some(format!("SET IDENTITY_INSERT {table} ON"));
                after = Some(format!("SET IDENTITY_INSERT {table} OFF"));
                IdentityRetrieval::None
            }
            (Some(_), false, _) => IdentityRetrieval::None,
        };

        let sql = format!(
            "INSERT INTO {table} ({}){output} VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        InsertStatement {
            sql,
            params,
            identity,
            retrieval,
            before,
            after,
        }
    }
}

/// Optimistic concurrency guard on the version column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGuard {
    /// `_version <= loaded`: the row was not written since it was read.
    AtMost(i64),
    /// `_version = loaded`.
    Exact(i64),
}

/// New value of the version column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionUpdate {
    /// Set to a known value.
    Set(i64),
    /// Increment in place (bulk updates).
    Increment,
}

/// UPDATE query builder.
///
/// # Example
///
/// ```
/// use tabula_core::{Field, FieldId, FieldType, Value};
/// use tabula_query::{SqlServerDialect, UpdateBuilder, VersionGuard, VersionUpdate};
///
/// let fields = vec![
///     Field::new("Code", FieldType::Code(20)),
///     Field::new("Qty", FieldType::Integer),
/// ];
/// let (sql, params) = UpdateBuilder::new("Item", &fields)
///     .set(FieldId(1), Value::Int(7))
///     .version(VersionUpdate::Set(2))
///     .key(vec![(FieldId(0), Value::from("A001"))])
///     .guard(VersionGuard::AtMost(1))
///     .build(&SqlServerDialect)
///     .unwrap();
/// assert_eq!(
///     sql,
///     "UPDATE [Item] SET [Qty] = @p1, [_version] = @p2 WHERE [Code] = @p3 AND [_version] <= @p4"
/// );
/// assert_eq!(params.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct UpdateBuilder<'a> {
    table: &'a str,
    fields: &'a [Field],
    sets: Vec<(FieldId, Value)>,
    version: Option<VersionUpdate>,
    key: Vec<(FieldId, Value)>,
    guard: Option<VersionGuard>,
    filters: Option<&'a FilterSet>,
}

impl<'a> UpdateBuilder<'a> {
    /// Update rows of `table`.
    pub fn new(table: &'a str, fields: &'a [Field]) -> Self {
        Self {
            table,
            fields,
            sets: Vec::new(),
            version: None,
            key: Vec::new(),
            guard: None,
            filters: None,
        }
    }

    /// Assign a logical value to a field.
    pub fn set(mut self, field: FieldId, value: Value) -> Self {
        self.sets.push((field, value));
        self
    }

    /// Write the version column.
    pub fn version(mut self, update: VersionUpdate) -> Self {
        self.version = Some(update);
        self
    }

    /// Target one row by its key values.
    pub fn key(mut self, key: Vec<(FieldId, Value)>) -> Self {
        self.key = key;
        self
    }

    /// Require the version column to match.
    pub fn guard(mut self, guard: VersionGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Target the rows matching the filters.
    pub fn filters(mut self, filters: &'a FilterSet) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Build the UPDATE SQL and parameters.
    pub fn build(&self, dialect: &dyn SqlDialect) -> Result<(String, Vec<Value>)> {
        if self.sets.is_empty() && self.version.is_none() {
            return Err(Error::State("UPDATE without assignments".to_string()));
        }
        let mut params = Vec::new();
        let mut assignments = Vec::with_capacity(self.sets.len() + 1);
        for (id, value) in &self.sets {
            let field = field_at(self.fields, *id)?;
            assignments.push(render_assignment(dialect, field, value, &mut params));
        }
        let version_col = dialect.quote_ident(VERSION_COLUMN);
        match self.version {
            Some(VersionUpdate::Set(v)) => {
                let ph = bind(dialect, &mut params, Value::BigInt(v));
                assignments.push(format!("{version_col} = {ph}"));
            }
            Some(VersionUpdate::Increment) => {
                assignments.push(format!("{version_col} = {version_col} + 1"));
            }
            None => {}
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_ident(self.table),
            assignments.join(", ")
        );
        let conditions = write_conditions(
            dialect,
            self.fields,
            self.filters,
            &self.key,
            self.guard,
            &mut params,
        )?;
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        Ok((sql, params))
    }
}

fn write_conditions(
    dialect: &dyn SqlDialect,
    fields: &[Field],
    filters: Option<&FilterSet>,
    key: &[(FieldId, Value)],
    guard: Option<VersionGuard>,
    params: &mut Vec<Value>,
) -> Result<Vec<String>> {
    let mut conditions = Vec::new();
    if let Some(filters) = filters {
        if let Some(clause) = build_where(dialect, fields, filters, params)? {
            conditions.push(clause);
        }
    }
    conditions.extend(key_conditions(dialect, fields, key, params)?);
    if let Some(guard) = guard {
        let (op, v) = match guard {
            VersionGuard::AtMost(v) => ("<=", v),
            VersionGuard::Exact(v) => ("=", v),
        };
        let ph = bind(dialect, params, Value::BigInt(v));
        conditions.push(format!("{} {op} {ph}", dialect.quote_ident(VERSION_COLUMN)));
    }
    Ok(conditions)
}

/// DELETE query builder.
#[derive(Debug, Clone)]
pub struct DeleteBuilder<'a> {
    table: &'a str,
    fields: &'a [Field],
    key: Vec<(FieldId, Value)>,
    guard: Option<VersionGuard>,
    filters: Option<&'a FilterSet>,
}

impl<'a> DeleteBuilder<'a> {
    /// Delete rows of `table`.
    pub fn new(table: &'a str, fields: &'a [Field]) -> Self {
        Self {
            table,
            fields,
            key: Vec::new(),
            guard: None,
            filters: None,
        }
    }

    /// Target one row by its key values.
    pub fn key(mut self, key: Vec<(FieldId, Value)>) -> Self {
        self.key = key;
        self
    }

    /// Require the version column to match.
    pub fn guard(mut self, guard: VersionGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Target the rows matching the filters.
    pub fn filters(mut self, filters: &'a FilterSet) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Build the DELETE SQL and parameters.
    pub fn build(&self, dialect: &dyn SqlDialect) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", dialect.quote_ident(self.table));
        let conditions = write_conditions(
            dialect,
            self.fields,
            self.filters,
            &self.key,
            self.guard,
            &mut params,
        )?;
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        Ok((sql, params))
    }
}
