//! SQLite DDL generator.
//!
//! SQLite has limited ALTER TABLE support, so altered or dropped columns and key
//! changes go through table recreation. The primary key of a table without an
//! identity column is a named unique index (`<table>$PK`) so it can be dropped and
//! recreated like any other index.

use tabula_query::{DialectKind, SqlDialect, SqliteDialect};

use super::{DdlGenerator, create_index, quoted_list};
use crate::diff::SchemaOperation;
use crate::model::{ColumnDef, TableDef, primary_key_name};

/// DDL generator for SQLite.
pub struct SqliteDdlGenerator;

const D: SqliteDialect = SqliteDialect;

fn column_definition(def: &TableDef, column: &ColumnDef) -> String {
    let mut sql = format!("{} {} NOT NULL", D.quote_ident(&column.name), column.sql_type);
    if column.identity && def.has_identity_key() {
        sql.push_str(" PRIMARY KEY AUTOINCREMENT");
    }
    sql
}

fn create_table_statement(def: &TableDef, temporary: bool) -> String {
    let columns: Vec<String> = def
        .columns
        .iter()
        .map(|c| column_definition(def, c))
        .collect();
    format!(
        "CREATE {}TABLE {} ({})",
        if temporary { "TEMP " } else { "" },
        D.quote_ident(&def.name),
        columns.join(", ")
    )
}

/// Key index and secondary indexes of a table.
fn index_statements(def: &TableDef) -> Vec<String> {
    let mut stmts = Vec::with_capacity(def.indexes.len() + 1);
    if !def.has_identity_key() && !def.primary_key.is_empty() {
        let name = def
            .primary_key_name
            .clone()
            .unwrap_or_else(|| primary_key_name(&def.name));
        stmts.push(format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            D.quote_ident(&name),
            D.quote_ident(&def.name),
            quoted_list(&D, &def.primary_key)
        ));
    }
    for index in &def.indexes {
        stmts.push(create_index(&D, &def.name, index));
    }
    stmts
}

/// Recreate `declared` from `live`, carrying over every shared column that is not
/// discarded. Missing and discarded columns are filled with their defaults, and
/// so are NULLs in columns the live table left nullable.
fn sqlite_recreate_table(live: &TableDef, declared: &TableDef, discarded: &[String]) -> Vec<String> {
    let table_name = declared.name.as_str();
    let tmp_old = format!("{table_name}$old");

    let mut insert_cols = Vec::with_capacity(declared.columns.len());
    let mut select_exprs = Vec::with_capacity(declared.columns.len());
    for column in &declared.columns {
        let existing = live
            .column(&column.name)
            .filter(|_| !discarded.iter().any(|d| d.eq_ignore_ascii_case(&column.name)));
        if let Some(existing) = existing {
            insert_cols.push(D.quote_ident(&column.name));
            if existing.nullable {
                select_exprs.push(format!(
                    "COALESCE({}, {})",
                    D.quote_ident(&column.name),
                    column.default
                ));
            } else {
                select_exprs.push(D.quote_ident(&column.name));
            }
        } else if !column.identity {
            insert_cols.push(D.quote_ident(&column.name));
            select_exprs.push(column.default.clone());
        }
    }

    let mut stmts = vec![
        format!(
            "ALTER TABLE {} RENAME TO {}",
            D.quote_ident(table_name),
            D.quote_ident(&tmp_old)
        ),
        create_table_statement(declared, false),
    ];
    if !insert_cols.is_empty() {
        stmts.push(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            D.quote_ident(table_name),
            insert_cols.join(", "),
            select_exprs.join(", "),
            D.quote_ident(&tmp_old)
        ));
    }
    stmts.push(format!("DROP TABLE {}", D.quote_ident(&tmp_old)));
    stmts.extend(index_statements(declared));
    stmts
}

impl DdlGenerator for SqliteDdlGenerator {
    fn dialect(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn generate(&self, op: &SchemaOperation) -> Vec<String> {
        tracing::debug!(dialect = "sqlite", op = ?op, "Generating DDL");

        match op {
            SchemaOperation::CreateTable(def) => {
                let mut stmts = vec![create_table_statement(def, false)];
                stmts.extend(index_statements(def));
                stmts
            }
            SchemaOperation::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {} {} NOT NULL DEFAULT {}",
                D.quote_ident(table),
                D.quote_ident(&column.name),
                column.sql_type,
                column.default
            )],
            // Requires SQLite >= 3.35.0.
            SchemaOperation::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                D.quote_ident(table),
                D.quote_ident(column)
            )],
            SchemaOperation::AlterColumn { table, to, .. } => {
                tracing::warn!(
                    table = %table,
                    column = %to.name,
                    "SQLite cannot alter a column in place; a table rebuild is required"
                );
                Vec::new()
            }
            SchemaOperation::DropPrimaryKey { table, name, .. } => {
                let name = name.clone().unwrap_or_else(|| primary_key_name(table));
                vec![format!("DROP INDEX IF EXISTS {}", D.quote_ident(&name))]
            }
            SchemaOperation::AddPrimaryKey {
                table,
                name,
                columns,
            } => vec![format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                D.quote_ident(name),
                D.quote_ident(table),
                quoted_list(&D, columns)
            )],
            SchemaOperation::CreateIndex { table, index } => vec![create_index(&D, table, index)],
            SchemaOperation::DropIndex { name, .. } => {
                vec![format!("DROP INDEX IF EXISTS {}", D.quote_ident(name))]
            }
            SchemaOperation::RebuildTable {
                live,
                declared,
                discarded,
            } => sqlite_recreate_table(live, declared, discarded),
        }
    }

    fn create_temporary(&self, def: &TableDef) -> Vec<String> {
        let mut stmts = vec![create_table_statement(def, true)];
        if !def.has_identity_key() && !def.primary_key.is_empty() {
            stmts.push(format!(
                "CREATE UNIQUE INDEX temp.{} ON {} ({})",
                D.quote_ident(&primary_key_name(&def.name)),
                D.quote_ident(&def.name),
                quoted_list(&D, &def.primary_key)
            ));
        }
        stmts
    }

    fn drop_temporary(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS temp.{}", D.quote_ident(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IndexDef;

    fn make_table(name: &str, columns: Vec<ColumnDef>, pk: Vec<&str>) -> TableDef {
        let mut def = TableDef::new(name);
        def.columns = columns;
        def.primary_key = pk.into_iter().map(String::from).collect();
        def.primary_key_name = Some(primary_key_name(name));
        def
    }

    #[test]
    fn test_create_table() {
        let ddl = SqliteDdlGenerator;
        let mut table = make_table(
            "Item",
            vec![
                ColumnDef::new("Code", "VARCHAR(20)"),
                ColumnDef::new("Qty", "INTEGER"),
            ],
            vec!["Code"],
        );
        table
            .indexes
            .push(IndexDef::new("Item$Qty", vec!["Qty".to_string()], false));
        let stmts = ddl.generate(&SchemaOperation::CreateTable(table));

        assert_eq!(stmts.len(), 3);
        assert_eq!(
            stmts[0],
            "CREATE TABLE \"Item\" (\"Code\" VARCHAR(20) NOT NULL, \"Qty\" INTEGER NOT NULL)"
        );
        assert_eq!(
            stmts[1],
            "CREATE UNIQUE INDEX \"Item$PK\" ON \"Item\" (\"Code\")"
        );
        assert!(stmts[2].contains("CREATE INDEX \"Item$Qty\""));
    }

    #[test]
    fn test_create_table_with_identity() {
        let ddl = SqliteDdlGenerator;
        let table = make_table(
            "Doc",
            vec![
                ColumnDef::new("Id", "INTEGER").identity(),
                ColumnDef::new("Name", "TEXT"),
            ],
            vec!["Id"],
        );
        let stmts = ddl.generate(&SchemaOperation::CreateTable(table));

        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("\"Id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT"));
    }

    #[test]
    fn test_add_column() {
        let ddl = SqliteDdlGenerator;
        let op = SchemaOperation::AddColumn {
            table: "Item".to_string(),
            column: ColumnDef::new("Name", "VARCHAR(50)").with_default("''"),
        };
        let stmts = ddl.generate(&op);

        assert_eq!(
            stmts,
            vec!["ALTER TABLE \"Item\" ADD COLUMN \"Name\" VARCHAR(50) NOT NULL DEFAULT ''"]
        );
    }

    #[test]
    fn test_rebuild_table() {
        let ddl = SqliteDdlGenerator;
        let mut live = make_table(
            "Item",
            vec![
                ColumnDef::new("Code", "VARCHAR(10)"),
                ColumnDef::new("Qty", "VARCHAR(5)"),
                ColumnDef::new("Old", "INTEGER"),
            ],
            vec!["Code"],
        );
        live.indexes
            .push(IndexDef::new("Item$Old", vec!["Old".to_string()], false));
        let mut declared = make_table(
            "Item",
            vec![
                ColumnDef::new("Code", "VARCHAR(20)"),
                ColumnDef::new("Qty", "INTEGER"),
                ColumnDef::new("Name", "TEXT").with_default("''"),
            ],
            vec!["Code"],
        );
        declared
            .indexes
            .push(IndexDef::new("Item$Name", vec!["Name".to_string()], false));
        let op = SchemaOperation::RebuildTable {
            live,
            declared,
            discarded: vec!["Qty".to_string()],
        };
        let stmts = ddl.generate(&op);

        assert_eq!(stmts[0], "ALTER TABLE \"Item\" RENAME TO \"Item$old\"");
        assert!(stmts[1].starts_with("CREATE TABLE \"Item\""));
        assert_eq!(
            stmts[2],
            "INSERT INTO \"Item\" (\"Code\", \"Qty\", \"Name\") SELECT \"Code\", 0, '' FROM \"Item$old\""
        );
        assert_eq!(stmts[3], "DROP TABLE \"Item$old\"");
        assert!(stmts.iter().any(|s| s.contains("\"Item$PK\"")));
        assert!(stmts.iter().any(|s| s.contains("\"Item$Name\"")));
        assert!(!stmts.iter().any(|s| s.contains("\"Item$Old\"")));
    }

    #[test]
    fn test_temporary_table() {
        let ddl = SqliteDdlGenerator;
        let table = make_table("Item$tmp1", vec![ColumnDef::new("Code", "TEXT")], vec!["Code"]);
        let stmts = ddl.create_temporary(&table);
        assert!(stmts[0].starts_with("CREATE TEMP TABLE \"Item$tmp1\""));
        assert_eq!(
            ddl.drop_temporary("Item$tmp1"),
            "DROP TABLE IF EXISTS temp.\"Item$tmp1\""
        );
    }

    #[test]
    fn test_rebuild_fills_nulls_of_nullable_columns() {
        let live = make_table(
            "Item",
            vec![
                ColumnDef::new("Code", "TEXT"),
                ColumnDef::new("Qty", "INTEGER").nullable(),
            ],
            vec!["Code"],
        );
        let declared = make_table(
            "Item",
            vec![ColumnDef::new("Code", "TEXT"), ColumnDef::new("Qty", "INTEGER")],
            vec!["Code"],
        );
        let stmts = SqliteDdlGenerator.generate(&SchemaOperation::RebuildTable {
            live,
            declared,
            discarded: Vec::new(),
        });
        assert_eq!(
            stmts[2],
            "INSERT INTO \"Item\" (\"Code\", \"Qty\") SELECT \"Code\", COALESCE(\"Qty\", 0) FROM \"Item$old\""
        );
        assert!(stmts[1].contains("\"Qty\" INTEGER NOT NULL"));
    }
}
