//! DDL generation.
//!
//! One [`DdlGenerator`] per dialect turns [`SchemaOperation`]s into SQL
//! statements. Shared pieces (column lists, index statements, literals) live here.

mod mssql;
mod mysql;
mod sqlite;

pub use mssql::SqlServerDdlGenerator;
pub use mysql::MySqlDdlGenerator;
pub use sqlite::SqliteDdlGenerator;

use std::fmt::Write as _;

use tabula_core::{Field, Value};
use tabula_query::{DialectKind, SqlDialect};

use crate::diff::SchemaOperation;
use crate::model::{ColumnDef, IndexDef, TableDef};

/// Generates DDL statements for one dialect.
pub trait DdlGenerator: Send + Sync {
    /// The dialect this generator targets.
    fn dialect(&self) -> DialectKind;

    /// Statements for one operation.
    fn generate(&self, op: &SchemaOperation) -> Vec<String>;

    /// Statements for a sequence of operations, in order.
    fn generate_all(&self, ops: &[SchemaOperation]) -> Vec<String> {
        ops.iter().flat_map(|op| self.generate(op)).collect()
    }

    /// Session-scoped name for the `seq`th temporary copy of `table`.
    fn temporary_name(&self, table: &str, seq: usize) -> String {
        format!("{table}$tmp{seq}")
    }

    /// Statements creating a temporary table. `def.name` is already the temporary name.
    fn create_temporary(&self, def: &TableDef) -> Vec<String>;

    /// Statement dropping a temporary table.
    fn drop_temporary(&self, name: &str) -> String;
}

/// The DDL generator for a dialect.
pub fn generator_for(kind: DialectKind) -> Box<dyn DdlGenerator> {
    match kind {
        DialectKind::Sqlite => Box::new(SqliteDdlGenerator),
        DialectKind::MySql => Box::new(MySqlDdlGenerator),
        DialectKind::SqlServer => Box::new(SqlServerDdlGenerator),
    }
}

/// Render a native value as a SQL literal.
pub fn sql_literal(kind: DialectKind, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Text(s) => {
            let quoted = format!("'{}'", s.replace('\'', "''"));
            if kind == DialectKind::SqlServer {
                format!("N{quoted}")
            } else {
                quoted
            }
        }
        Value::Bytes(bytes) => {
            let hex = bytes.iter().fold(String::new(), |mut out, b| {
                let _ = write!(out, "{b:02X}");
                out
            });
            if kind == DialectKind::SqlServer {
                format!("0x{hex}")
            } else {
                format!("X'{hex}'")
            }
        }
        Value::Date(d) => format!("'{d}'"),
        Value::Time(t) => format!("'{}'", t.format("%H:%M:%S")),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
        Value::Guid(g) => format!("'{}'", g.hyphenated()),
    }
}

/// Literal used to fill existing rows when a field's column is added.
pub fn default_literal(dialect: &dyn SqlDialect, field: &Field) -> String {
    let blank = field.field_type().blank_value();
    let native = dialect.to_sql_value(field.field_type(), &blank);
    sql_literal(dialect.kind(), &native)
}

pub(crate) fn quoted_list(dialect: &dyn SqlDialect, names: &[String]) -> String {
    names
        .iter()
        .map(|n| dialect.quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replace NULLs with the column default ahead of a NOT NULL alteration.
pub(crate) fn fill_nulls(dialect: &dyn SqlDialect, table: &str, column: &ColumnDef) -> String {
    let column_q = dialect.quote_ident(&column.name);
    format!(
        "UPDATE {} SET {column_q} = {} WHERE {column_q} IS NULL",
        dialect.quote_ident(table),
        column.default
    )
}

pub(crate) fn create_index(dialect: &dyn SqlDialect, table: &str, index: &IndexDef) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        dialect.quote_ident(&index.name),
        dialect.quote_ident(table),
        quoted_list(dialect, &index.columns)
    )
}
