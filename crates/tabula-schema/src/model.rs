//! Table, column and index definitions.
//!
//! The same types describe the declared model (built from a table's fields) and the
//! live schema (read back by introspection), so the diff compares like with like.

use tabula_core::{Error, Field, FieldId, Result};
use tabula_query::{DialectKind, SqlDialect, VERSION_COLUMN};

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Dialect column type, e.g. `VARCHAR(20)`.
    pub sql_type: String,
    /// Database-generated values.
    pub identity: bool,
    /// SQL literal used to fill existing rows when the column is added.
    pub default: String,
    /// The live column accepts NULL. Declared columns never do.
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a column.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            identity: false,
            default: "0".to_string(),
            nullable: false,
        }
    }

    /// Mark as accepting NULL.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as identity.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Set the fill literal.
    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default = literal.into();
        self
    }
}

/// A secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Physical index name.
    pub name: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// Unique index.
    pub unique: bool,
}

impl IndexDef {
    /// Create an index.
    pub fn new(name: impl Into<String>, columns: Vec<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            unique,
        }
    }

    /// Same columns (case-insensitive) and uniqueness.
    pub fn same_shape(&self, other: &IndexDef) -> bool {
        self.unique == other.unique && same_names(&self.columns, &other.columns)
    }
}

/// A declared secondary index on a table, by field handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredIndex {
    /// Logical index name; the physical name is `<table>$<name>`.
    pub name: String,
    /// Indexed fields in order.
    pub fields: Vec<FieldId>,
    /// Unique index.
    pub unique: bool,
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns in order.
    pub columns: Vec<ColumnDef>,
    /// Primary key columns in order.
    pub primary_key: Vec<String>,
    /// Name of the primary key constraint or index, when the dialect has one.
    pub primary_key_name: Option<String>,
    /// Secondary indexes.
    pub indexes: Vec<IndexDef>,
}

/// Physical name of the primary key constraint or unique index of a table.
pub fn primary_key_name(table: &str) -> String {
    format!("{table}$PK")
}

/// Physical name of a declared index.
pub fn index_name(table: &str, index: &str) -> String {
    format!("{table}${index}")
}

pub(crate) fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

impl TableDef {
    /// An empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            primary_key_name: None,
            indexes: Vec::new(),
        }
    }

    /// Build the declared definition of a table from its fields.
    ///
    /// Adds the version column. Fails with [`Error::NoPrimaryKey`] when the key is
    /// empty.
    pub fn from_fields(
        name: &str,
        fields: &[Field],
        primary_key: &[FieldId],
        indexes: &[DeclaredIndex],
        dialect: &dyn SqlDialect,
    ) -> Result<Self> {
        if primary_key.is_empty() {
            return Err(Error::NoPrimaryKey {
                table: name.to_string(),
            });
        }
        let column_of = |id: &FieldId| -> Result<String> {
            fields
                .get(id.index())
                .map(|f| f.column().to_string())
                .ok_or_else(|| Error::State(format!("{name}: unknown field #{}", id.index())))
        };

        let mut columns = Vec::with_capacity(fields.len() + 1);
        for field in fields {
            let mut column = ColumnDef::new(field.column(), dialect.column_type(field.field_type())?)
                .with_default(crate::ddl::default_literal(dialect, field));
            column.identity = field.is_identity();
            columns.push(column);
        }
        columns.push(
            ColumnDef::new(VERSION_COLUMN, dialect.version_column_type()).with_default("0"),
        );

        let primary_key = primary_key.iter().map(column_of).collect::<Result<Vec<_>>>()?;

        // Identity is honored only on a sole key column; SQLite further requires the
        // exact INTEGER type for AUTOINCREMENT.
        let sole_key = match primary_key.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };
        for column in columns.iter_mut().filter(|c| c.identity) {
            if sole_key.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(&column.name)) {
                if dialect.kind() == DialectKind::Sqlite {
                    column.sql_type = "INTEGER".to_string();
                }
            } else {
                column.identity = false;
            }
        }

        let indexes = indexes
            .iter()
            .map(|idx| {
                Ok(IndexDef::new(
                    index_name(name, &idx.name),
                    idx.fields.iter().map(column_of).collect::<Result<Vec<_>>>()?,
                    idx.unique,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            columns,
            primary_key,
            primary_key_name: Some(primary_key_name(name)),
            indexes,
        })
    }

    /// Look up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Look up an index by name (case-insensitive).
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// The identity column, if any.
    pub fn identity_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.identity)
    }

    /// True if the key is exactly one identity column.
    pub fn has_identity_key(&self) -> bool {
        match (self.primary_key.as_slice(), self.identity_column()) {
            ([only], Some(id)) => only.eq_ignore_ascii_case(&id.name),
            _ => false,
        }
    }
}
