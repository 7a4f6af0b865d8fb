//! Core types and traits for Tabula.
//!
//! `tabula-core` is the foundation layer of the workspace. It defines the typed
//! [`Field`] with its value tracking, the dynamic [`Value`], the buffered result
//! types, and the [`Connection`] contract that drivers implement.
//!
//! # Role In The Architecture
//!
//! - `tabula-query` turns field filters into dialect-specific SQL.
//! - `tabula-schema` maps [`FieldType`] to column types and reconciles live schema.
//! - `tabula-session` owns tables and the unit of work on top of a [`Connection`].
//! - Driver crates (`tabula-sqlite`) implement [`Connection`].

pub mod connection;
pub mod error;
pub mod field;
pub mod fields_set;
pub mod options;
pub mod relation;
pub mod row;
pub mod text;
pub mod types;
pub mod value;

pub use connection::Connection;
pub use error::{Error, Result, ValidationError, ValidationErrorKind};
pub use field::{Field, FieldId, FieldSchema};
pub use fields_set::FieldSet;
pub use options::{OptionEntry, OptionEnum, OptionSet};
pub use relation::{RelationCondition, TableRelation};
pub use row::{DbRow, DbTable};
pub use text::{DateOrder, Locale};
pub use types::{BLANK_DATE, BLANK_DATETIME, FieldType, SQL_MAX_DATE, SQL_MIN_DATE};
pub use value::Value;
