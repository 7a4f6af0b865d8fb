//! Schema diffing.
//!
//! Compares the live definition of a table with its declared definition and
//! produces the ordered list of [`SchemaOperation`]s that reconciles them:
//! index drops, primary key drop, column changes, primary key add, index creates.
//!
//! SQLite cannot alter or drop columns in place, so any such change there becomes
//! one [`SchemaOperation::RebuildTable`].

use std::collections::HashSet;

use tabula_query::DialectKind;

use crate::introspect::normalize_type;
use crate::model::{ColumnDef, IndexDef, TableDef, same_names};

/// How a column differs between the live and declared definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChange {
    /// Same type and identity.
    None,
    /// The type can be widened in place without losing data.
    Widen,
    /// Same type, but the live column accepts NULL. Existing NULLs are filled
    /// with the column default before the constraint is added.
    Tighten,
    /// The column must be dropped and re-added, losing its data.
    Incompatible,
}

fn split_length(sql_type: &str) -> (&str, Option<&str>) {
    match sql_type.find('(') {
        Some(open) if sql_type.ends_with(')') => {
            (&sql_type[..open], Some(&sql_type[open + 1..sql_type.len() - 1]))
        }
        _ => (sql_type, None),
    }
}

/// Classify the change from a live column to a declared one.
pub fn classify_column(live: &ColumnDef, declared: &ColumnDef) -> ColumnChange {
    if live.identity != declared.identity {
        return ColumnChange::Incompatible;
    }
    let from = normalize_type(&live.sql_type);
    let to = normalize_type(&declared.sql_type);
    if from == to {
        return if live.nullable && !declared.nullable {
            ColumnChange::Tighten
        } else {
            ColumnChange::None
        };
    }

    let (from_base, from_len) = split_length(&from);
    let (to_base, to_len) = split_length(&to);
    let from_len = from_len.and_then(|l| l.parse::<u64>().ok());
    let to_len_num = to_len.and_then(|l| l.parse::<u64>().ok());

    let widened = match (from_base, to_base) {
        ("INT" | "INTEGER", "BIGINT") => true,
        ("VARCHAR", "VARCHAR") | ("NVARCHAR", "NVARCHAR") => match (from_len, to_len_num) {
            (Some(a), Some(b)) => b > a,
            (Some(_), None) => to_len == Some("MAX"),
            _ => false,
        },
        ("VARCHAR", "TEXT" | "LONGTEXT") => true,
        _ => false,
    };
    if widened {
        ColumnChange::Widen
    } else {
        ColumnChange::Incompatible
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOperation {
    /// Create a table with its primary key and indexes.
    CreateTable(TableDef),
    /// Add a column, filling existing rows with the column default.
    AddColumn {
        /// Table name.
        table: String,
        /// The new column.
        column: ColumnDef,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Widen a column or make it NOT NULL in place.
    AlterColumn {
        /// Table name.
        table: String,
        /// Live column.
        from: ColumnDef,
        /// Declared column.
        to: ColumnDef,
    },
    /// Drop the primary key constraint.
    DropPrimaryKey {
        /// Table name.
        table: String,
        /// Live constraint name.
        name: Option<String>,
        /// Live identity column inside the key.
        identity: Option<ColumnDef>,
    },
    /// Add the primary key constraint.
    AddPrimaryKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
        /// Key columns.
        columns: Vec<String>,
    },
    /// Create a secondary index.
    CreateIndex {
        /// Table name.
        table: String,
        /// The index.
        index: IndexDef,
    },
    /// Drop a secondary index.
    DropIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// Recreate a table and copy its rows (SQLite).
    RebuildTable {
        /// Live definition.
        live: TableDef,
        /// Declared definition.
        declared: TableDef,
        /// Declared columns whose data is not carried over.
        discarded: Vec<String>,
    },
}

impl SchemaOperation {
    /// True if the operation can lose data.
    pub fn is_disruptive(&self) -> bool {
        match self {
            SchemaOperation::DropColumn { .. } => true,
            SchemaOperation::RebuildTable {
                live,
                declared,
                discarded,
            } => {
                !discarded.is_empty()
                    || live
                        .columns
                        .iter()
                        .any(|c| declared.column(&c.name).is_none())
            }
            _ => false,
        }
    }

    /// Table the operation applies to.
    pub fn table(&self) -> &str {
        match self {
            SchemaOperation::CreateTable(def) => &def.name,
            SchemaOperation::RebuildTable { declared, .. } => &declared.name,
            SchemaOperation::AddColumn { table, .. }
            | SchemaOperation::DropColumn { table, .. }
            | SchemaOperation::AlterColumn { table, .. }
            | SchemaOperation::DropPrimaryKey { table, .. }
            | SchemaOperation::AddPrimaryKey { table, .. }
            | SchemaOperation::CreateIndex { table, .. }
            | SchemaOperation::DropIndex { table, .. } => table,
        }
    }

    /// Short operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaOperation::CreateTable(_) => "create_table",
            SchemaOperation::AddColumn { .. } => "add_column",
            SchemaOperation::DropColumn { .. } => "drop_column",
            SchemaOperation::AlterColumn { .. } => "alter_column",
            SchemaOperation::DropPrimaryKey { .. } => "drop_primary_key",
            SchemaOperation::AddPrimaryKey { .. } => "add_primary_key",
            SchemaOperation::CreateIndex { .. } => "create_index",
            SchemaOperation::DropIndex { .. } => "drop_index",
            SchemaOperation::RebuildTable { .. } => "rebuild_table",
        }
    }
}

fn touches(columns: &[String], names: &HashSet<String>) -> bool {
    columns.iter().any(|c| names.contains(&c.to_ascii_lowercase()))
}

/// Compute the operations that bring `live` in line with `declared`.
///
/// Live indexes that do not carry the table's `<table>$` prefix are not managed
/// and never dropped.
pub fn diff_table(
    live: Option<&TableDef>,
    declared: &TableDef,
    kind: DialectKind,
) -> Vec<SchemaOperation> {
    let Some(live) = live else {
        return vec![SchemaOperation::CreateTable(declared.clone())];
    };
    let table = declared.name.clone();

    let mut added = Vec::new();
    let mut widened = Vec::new();
    let mut incompatible = Vec::new();
    for column in &declared.columns {
        match live.column(&column.name) {
            None => added.push(column.clone()),
            Some(existing) => match classify_column(existing, column) {
                ColumnChange::None => {}
                ColumnChange::Widen | ColumnChange::Tighten => {
                    widened.push((existing.clone(), column.clone()))
                }
                ColumnChange::Incompatible => incompatible.push(column.clone()),
            },
        }
    }
    let dropped: Vec<String> = live
        .columns
        .iter()
        .filter(|c| declared.column(&c.name).is_none())
        .map(|c| c.name.clone())
        .collect();

    let mut touched: HashSet<String> = dropped
        .iter()
        .chain(incompatible.iter().map(|c| &c.name))
        .map(|n| n.to_ascii_lowercase())
        .collect();
    if kind == DialectKind::SqlServer {
        // ALTER COLUMN fails on a column that a constraint or index depends on.
        touched.extend(widened.iter().map(|(_, to)| to.name.to_ascii_lowercase()));
    }

    let pk_changed = !same_names(&live.primary_key, &declared.primary_key)
        || touches(&live.primary_key, &touched)
        || live.has_identity_key() != declared.has_identity_key();

    if kind == DialectKind::Sqlite
        && (pk_changed || !widened.is_empty() || !incompatible.is_empty() || !dropped.is_empty())
    {
        return vec![SchemaOperation::RebuildTable {
            live: live.clone(),
            declared: declared.clone(),
            discarded: incompatible.into_iter().map(|c| c.name).collect(),
        }];
    }

    let prefix = format!("{}$", declared.name).to_ascii_lowercase();
    let mut ops = Vec::new();

    let mut keep_live: HashSet<String> = HashSet::new();
    for index in &live.indexes {
        if !index.name.to_ascii_lowercase().starts_with(&prefix) {
            continue;
        }
        let unchanged = declared
            .index(&index.name)
            .is_some_and(|d| d.same_shape(index))
            && !touches(&index.columns, &touched);
        if unchanged {
            keep_live.insert(index.name.to_ascii_lowercase());
        } else {
            ops.push(SchemaOperation::DropIndex {
                table: table.clone(),
                name: index.name.clone(),
            });
        }
    }

    if pk_changed && !live.primary_key.is_empty() {
        let identity = live
            .identity_column()
            .filter(|c| live.primary_key.iter().any(|k| k.eq_ignore_ascii_case(&c.name)))
            .cloned();
        ops.push(SchemaOperation::DropPrimaryKey {
            table: table.clone(),
            name: live.primary_key_name.clone(),
            identity,
        });
    }

    for column in incompatible {
        ops.push(SchemaOperation::DropColumn {
            table: table.clone(),
            column: column.name.clone(),
        });
        ops.push(SchemaOperation::AddColumn {
            table: table.clone(),
            column,
        });
    }
    for (from, to) in widened {
        ops.push(SchemaOperation::AlterColumn {
            table: table.clone(),
            from,
            to,
        });
    }
    for column in added {
        ops.push(SchemaOperation::AddColumn {
            table: table.clone(),
            column,
        });
    }
    for column in dropped {
        ops.push(SchemaOperation::DropColumn {
            table: table.clone(),
            column,
        });
    }

    // MySQL declares the key together with a new AUTO_INCREMENT column.
    let key_added_inline = kind == DialectKind::MySql
        && declared.has_identity_key()
        && ops
            .iter()
            .any(|op| matches!(op, SchemaOperation::AddColumn { column, .. } if column.identity));
    if pk_changed && !key_added_inline {
        ops.push(SchemaOperation::AddPrimaryKey {
            table: table.clone(),
            name: declared
                .primary_key_name
                .clone()
                .unwrap_or_else(|| crate::model::primary_key_name(&table)),
            columns: declared.primary_key.clone(),
        });
    }

    for index in &declared.indexes {
        if !keep_live.contains(&index.name.to_ascii_lowercase()) {
            ops.push(SchemaOperation::CreateIndex {
                table: table.clone(),
                index: index.clone(),
            });
        }
    }
    ops
}
