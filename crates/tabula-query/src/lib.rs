//! Filter engine and SQL generation for Tabula.
//!
//! `tabula-query` turns a table's field list and filter state into parameterized
//! SQL for one of three dialects.
//!
//! - [`filter`]: level-scoped field filters.
//! - [`expression`]: the per-field filter expression language.
//! - [`dialect`]: quoting, placeholders, limits, locks, type mapping and value marshaling.
//! - [`where_clause`]: grouping filters by level into a WHERE condition.
//! - [`builder`]: SELECT/INSERT/UPDATE/DELETE builders, including keyset continuation.

pub mod builder;
pub mod dialect;
pub mod expression;
pub mod filter;
pub mod where_clause;

pub use builder::{
    DeleteBuilder, IdentityRetrieval, InsertBuilder, InsertStatement, SelectBuilder,
    UpdateBuilder, VERSION_COLUMN, VersionGuard, VersionUpdate, seek_predicate,
};
pub use dialect::{
    DialectKind, MySqlDialect, SqlDialect, SqlServerDialect, SqliteDialect, decode_native,
};
pub use expression::{CompareOp, FilterExpr};
pub use filter::{FieldFilter, FilterKind, FilterLevel, FilterSet};
pub use where_clause::build_where;
