//! Unit of work and record cursors for Tabula.
//!
//! `tabula-session` is where declared tables meet a live connection.
//!
//! # Role In The Architecture
//!
//! - **Database**: one connection, at most one write transaction, reader
//!   connections for cursors opened inside it, and session-scoped temporary tables.
//! - **Table**: the declaration of one entity type plus a cursor over its rows,
//!   with keyset paging and version-guarded writes.
//! - **Catalog**: the registered table types, their relations, and the loader
//!   entry points (`compile_all`, `database_check`).
//!
//! # Example
//!
//! ```ignore
//! let mut db = Database::new(DialectKind::Sqlite.dialect(), Box::new(conn));
//! let mut item = item_table()?;
//! let qty = item.field_id("Qty")?;
//!
//! item.get_or_fail(&mut db, &["A001".into()])?;
//! item.set_value(qty, 7)?;
//! item.modify(&mut db, true)?;
//! db.commit()?;
//! ```

pub mod catalog;
pub mod database;
pub mod table;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, InboundRelation, TableFactory};
pub use database::{DEFAULT_PAGE_SIZE, Database, ReaderId};
pub use table::{Table, Trigger};
