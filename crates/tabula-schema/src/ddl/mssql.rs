//! SQL Server DDL generator.
//!
//! Columns added to populated tables get a named default constraint that is
//! dropped right after, so later inserts must supply every value.

use tabula_query::{DialectKind, SqlDialect, SqlServerDialect};

use super::{DdlGenerator, create_index, fill_nulls, quoted_list};
use crate::diff::SchemaOperation;
use crate::model::{ColumnDef, TableDef, primary_key_name};

/// DDL generator for SQL Server.
pub struct SqlServerDdlGenerator;

const D: SqlServerDialect = SqlServerDialect;

fn column_definition(column: &ColumnDef) -> String {
    let identity = if column.identity { " IDENTITY(1,1)" } else { "" };
    format!(
        "{} {}{identity} NOT NULL",
        D.quote_ident(&column.name),
        column.sql_type
    )
}

fn default_constraint_name(table: &str, column: &str) -> String {
    format!("DF_{table}_{column}")
}

fn create_table_statement(def: &TableDef, constraint_name: Option<&str>) -> String {
    let mut parts: Vec<String> = def.columns.iter().map(column_definition).collect();
    if !def.primary_key.is_empty() {
        let constraint = constraint_name
            .map(|n| format!("CONSTRAINT {} ", D.quote_ident(n)))
            .unwrap_or_default();
        parts.push(format!(
            "{constraint}PRIMARY KEY CLUSTERED ({})",
            quoted_list(&D, &def.primary_key)
        ));
    }
    format!("CREATE TABLE {} ({})", D.quote_ident(&def.name), parts.join(", "))
}

impl DdlGenerator for SqlServerDdlGenerator {
    fn dialect(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn generate(&self, op: &SchemaOperation) -> Vec<String> {
        tracing::debug!(dialect = "sqlserver", op = ?op, "Generating DDL");

        match op {
            SchemaOperation::CreateTable(def) => {
                let name = def
                    .primary_key_name
                    .clone()
                    .unwrap_or_else(|| primary_key_name(&def.name));
                let mut stmts = vec![create_table_statement(def, Some(&name))];
                for index in &def.indexes {
                    stmts.push(create_index(&D, &def.name, index));
                }
                stmts
            }
            SchemaOperation::AddColumn { table, column } => {
                let table_q = D.quote_ident(table);
                if column.identity {
                    return vec![format!("ALTER TABLE {table_q} ADD {}", column_definition(column))];
                }
                let constraint = D.quote_ident(&default_constraint_name(table, &column.name));
                vec![
                    format!(
                        "ALTER TABLE {table_q} ADD {} {} NOT NULL CONSTRAINT {constraint} DEFAULT {}",
                        D.quote_ident(&column.name),
                        column.sql_type,
                        column.default
                    ),
                    format!("ALTER TABLE {table_q} DROP CONSTRAINT {constraint}"),
                ]
            }
            SchemaOperation::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                D.quote_ident(table),
                D.quote_ident(column)
            )],
            SchemaOperation::AlterColumn { table, from, to } => {
                let mut stmts = Vec::with_capacity(2);
                if from.nullable {
                    stmts.push(fill_nulls(&D, table, to));
                }
                stmts.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
                    D.quote_ident(table),
                    D.quote_ident(&to.name),
                    to.sql_type
                ));
                stmts
            }
            SchemaOperation::DropPrimaryKey { table, name, .. } => {
                let name = name.clone().unwrap_or_else(|| primary_key_name(table));
                vec![format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    D.quote_ident(table),
                    D.quote_ident(&name)
                )]
            }
            SchemaOperation::AddPrimaryKey {
                table,
                name,
                columns,
            } => vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY CLUSTERED ({})",
                D.quote_ident(table),
                D.quote_ident(name),
                quoted_list(&D, columns)
            )],
            SchemaOperation::CreateIndex { table, index } => vec![create_index(&D, table, index)],
            SchemaOperation::DropIndex { table, name } => vec![format!(
                "DROP INDEX {} ON {}",
                D.quote_ident(name),
                D.quote_ident(table)
            )],
            SchemaOperation::RebuildTable { declared, .. } => {
                tracing::warn!(
                    table = %declared.name,
                    "Table rebuild is not used for SQL Server; columns are altered in place"
                );
                Vec::new()
            }
        }
    }

    fn temporary_name(&self, table: &str, seq: usize) -> String {
        format!("#{table}_tmp{seq}")
    }

    /// Temporary tables get an unnamed key; constraint names are global in tempdb.
    fn create_temporary(&self, def: &TableDef) -> Vec<String> {
        vec![create_table_statement(def, None)]
    }

    fn drop_temporary(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", D.quote_ident(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> TableDef {
        let mut def = TableDef::new("Item");
        def.columns = vec![
            ColumnDef::new("Code", "NVARCHAR(20)"),
            ColumnDef::new("Qty", "INT"),
        ];
        def.primary_key = vec!["Code".to_string()];
        def.primary_key_name = Some("Item$PK".to_string());
        def
    }

    #[test]
    fn test_create_table() {
        let stmts = SqlServerDdlGenerator.generate(&SchemaOperation::CreateTable(item()));
        assert_eq!(
            stmts,
            vec![
                "CREATE TABLE [Item] ([Code] NVARCHAR(20) NOT NULL, [Qty] INT NOT NULL, CONSTRAINT [Item$PK] PRIMARY KEY CLUSTERED ([Code]))"
            ]
        );
    }

    #[test]
    fn test_identity_column() {
        let column = ColumnDef::new("Id", "INT").identity();
        assert_eq!(column_definition(&column), "[Id] INT IDENTITY(1,1) NOT NULL");
    }

    #[test]
    fn test_add_column_with_transient_default() {
        let op = SchemaOperation::AddColumn {
            table: "Item".to_string(),
            column: ColumnDef::new("Name", "NVARCHAR(50)").with_default("N''"),
        };
        let stmts = SqlServerDdlGenerator.generate(&op);
        assert_eq!(
            stmts,
            vec![
                "ALTER TABLE [Item] ADD [Name] NVARCHAR(50) NOT NULL CONSTRAINT [DF_Item_Name] DEFAULT N''",
                "ALTER TABLE [Item] DROP CONSTRAINT [DF_Item_Name]",
            ]
        );
    }

    #[test]
    fn test_primary_key_changes() {
        let drop = SchemaOperation::DropPrimaryKey {
            table: "Item".to_string(),
            name: Some("PK_Item_old".to_string()),
            identity: None,
        };
        assert_eq!(
            SqlServerDdlGenerator.generate(&drop),
            vec!["ALTER TABLE [Item] DROP CONSTRAINT [PK_Item_old]"]
        );
        let add = SchemaOperation::AddPrimaryKey {
            table: "Item".to_string(),
            name: "Item$PK".to_string(),
            columns: vec!["Code".to_string(), "Qty".to_string()],
        };
        assert_eq!(
            SqlServerDdlGenerator.generate(&add),
            vec!["ALTER TABLE [Item] ADD CONSTRAINT [Item$PK] PRIMARY KEY CLUSTERED ([Code], [Qty])"]
        );
    }

    #[test]
    fn test_temporary_table_has_unnamed_key() {
        let ddl = SqlServerDdlGenerator;
        let mut def = item();
        def.name = ddl.temporary_name("Item", 1);
        let stmts = ddl.create_temporary(&def);
        assert!(stmts[0].starts_with("CREATE TABLE [#Item_tmp1]"));
        assert!(stmts[0].contains(", PRIMARY KEY CLUSTERED ([Code])"));
        assert!(!stmts[0].contains("CONSTRAINT"));
    }

    #[test]
    fn test_not_null_alter_fills_existing_nulls() {
        let alter = SchemaOperation::AlterColumn {
            table: "Item".to_string(),
            from: ColumnDef::new("Name", "NVARCHAR(50)").nullable(),
            to: ColumnDef::new("Name", "NVARCHAR(50)").with_default("N''"),
        };
        assert_eq!(
            SqlServerDdlGenerator.generate(&alter),
            vec![
                "UPDATE [Item] SET [Name] = N'' WHERE [Name] IS NULL",
                "ALTER TABLE [Item] ALTER COLUMN [Name] NVARCHAR(50) NOT NULL",
            ]
        );
    }
}
