//! Schema compiler for Tabula.
//!
//! `tabula-schema` keeps the physical schema in line with the declared model.
//!
//! # Role In The Architecture
//!
//! - **Model**: [`TableDef`] built from a table's fields, primary key and indexes.
//! - **Introspection**: reads the live definition back per dialect.
//! - **Diff**: orders the [`SchemaOperation`]s that reconcile the two.
//! - **DDL**: one [`DdlGenerator`] per dialect renders the operations.
//! - **Compiler**: [`SchemaCompiler`] gates disruptive changes by [`CompileMode`].
//!
//! There is no migration manifest: the declared model is the source of truth and
//! is reconciled at startup, one table per unit of work.

pub mod compiler;
pub mod ddl;
pub mod diff;
pub mod introspect;
pub mod model;

#[cfg(test)]
mod testing;

pub use compiler::{CompileMode, CompilePlan, CompileReport, SchemaCompiler, database_check};
pub use ddl::{
    DdlGenerator, MySqlDdlGenerator, SqlServerDdlGenerator, SqliteDdlGenerator, default_literal,
    generator_for, sql_literal,
};
pub use diff::{ColumnChange, SchemaOperation, classify_column, diff_table};
pub use introspect::{inspect_table, list_tables, normalize_type, table_exists};
pub use model::{ColumnDef, DeclaredIndex, IndexDef, TableDef, index_name, primary_key_name};
