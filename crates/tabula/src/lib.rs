//! Tabula: typed tables, composable filters and schema reconciliation across
//! SQLite, MySQL and SQL Server.
//!
//! This facade re-exports the workspace crates and adds configuration-driven
//! connection setup.
//!
//! # Quick Start
//!
//! ```
//! use tabula::prelude::*;
//!
//! fn item() -> Result<Table> {
//!     let mut table = Table::new("Item");
//!     let code = table.field(Field::new("Code", FieldType::Code(20)));
//!     table.field(Field::new("Qty", FieldType::Integer));
//!     table.set_primary_key(&[code]);
//!     Ok(table)
//! }
//!
//! # fn main() -> Result<()> {
//! let mut db = tabula::connect(&TabulaConfig::default())?;
//! let mut catalog = Catalog::new();
//! catalog.register(item)?;
//! catalog.compile_all(&mut db)?;
//!
//! let mut item = catalog.table("Item")?;
//! let (code, qty) = (item.field_id("Code")?, item.field_id("Qty")?);
//! item.set_value(code, "A001")?;
//! item.set_value(qty, 5)?;
//! item.insert(&mut db, true)?;
//! db.commit()?;
//!
//! item.get_or_fail(&mut db, &["A001".into()])?;
//! assert_eq!(item.value(qty)?, &Value::Int(5));
//! db.disconnect()?;
//! # Ok(())
//! # }
//! ```
//!
//! MySQL and SQL Server transports are supplied by the host: implement
//! [`Connection`] over the driver of choice and pass it to [`connect_with`].

pub mod config;

pub use config::TabulaConfig;
pub use tabula_core::{
    BLANK_DATE, BLANK_DATETIME, Connection, DbRow, DbTable, Error, Field, FieldId, FieldSchema,
    FieldSet, FieldType, Locale, OptionEntry, OptionEnum, OptionSet, RelationCondition, Result,
    SQL_MIN_DATE, TableRelation, ValidationError, ValidationErrorKind, Value,
};
pub use tabula_query::{
    DialectKind, FieldFilter, FilterExpr, FilterKind, FilterLevel, FilterSet, MySqlDialect,
    SqlDialect, SqlServerDialect, SqliteDialect, VERSION_COLUMN,
};
pub use tabula_schema::{CompileMode, CompileReport, SchemaCompiler, SchemaOperation, TableDef};
pub use tabula_session::{
    Catalog, DEFAULT_PAGE_SIZE, Database, InboundRelation, ReaderId, Table, TableFactory, Trigger,
};
pub use tabula_sqlite::SqliteConnection;

/// Open the configured database.
///
/// Only SQLite is opened directly; other dialects need a host connection passed
/// to [`connect_with`].
#[tracing::instrument(level = "debug", skip(config), fields(dialect = %config.dialect))]
pub fn connect(config: &TabulaConfig) -> Result<Database> {
    config.validate()?;
    match config.dialect {
        DialectKind::Sqlite => {
            let conn = SqliteConnection::open_url(&config.connection_string)?;
            connect_with(config, Box::new(conn))
        }
        other => Err(Error::Config(format!(
            "dialect '{other}' has no built-in driver; open a connection and use connect_with"
        ))),
    }
}

/// Wrap a host-supplied connection with the configured dialect and settings.
pub fn connect_with(config: &TabulaConfig, conn: Box<dyn Connection>) -> Result<Database> {
    config.validate()?;
    tracing::info!(
        dialect = %config.dialect,
        page_size = config.page_size,
        compile_mode = %config.compile_mode,
        "Connected"
    );
    Ok(Database::new(config.dialect.dialect(), conn)
        .with_page_size(config.page_size)
        .with_compile_mode(config.compile_mode))
}

/// Everything needed to declare and use tables.
pub mod prelude {
    pub use crate::config::TabulaConfig;
    pub use crate::{connect, connect_with};
    pub use tabula_core::{
        Connection, Error, Field, FieldId, FieldType, OptionEnum, OptionSet, Result,
        TableRelation, Value,
    };
    pub use tabula_query::{DialectKind, FilterLevel};
    pub use tabula_schema::{CompileMode, CompileReport};
    pub use tabula_session::{Catalog, Database, Table};
}
