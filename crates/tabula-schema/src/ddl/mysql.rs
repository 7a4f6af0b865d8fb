//! MySQL DDL generator.

use tabula_query::{DialectKind, MySqlDialect, SqlDialect};

use super::{DdlGenerator, create_index, fill_nulls, quoted_list};
use crate::diff::SchemaOperation;
use crate::model::{ColumnDef, TableDef};

/// DDL generator for MySQL.
pub struct MySqlDdlGenerator;

const D: MySqlDialect = MySqlDialect;

fn column_definition(column: &ColumnDef) -> String {
    let mut sql = format!("{} {} NOT NULL", D.quote_ident(&column.name), column.sql_type);
    if column.identity {
        sql.push_str(" AUTO_INCREMENT");
    }
    sql
}

/// BLOB and TEXT columns cannot carry a literal default.
fn accepts_default(sql_type: &str) -> bool {
    let upper = sql_type.to_ascii_uppercase();
    !(upper.ends_with("TEXT") || upper.ends_with("BLOB"))
}

fn create_table_statement(def: &TableDef, temporary: bool) -> String {
    let mut parts: Vec<String> = def.columns.iter().map(column_definition).collect();
    if !def.primary_key.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", quoted_list(&D, &def.primary_key)));
    }
    format!(
        "CREATE {}TABLE {} ({})",
        if temporary { "TEMPORARY " } else { "" },
        D.quote_ident(&def.name),
        parts.join(", ")
    )
}

impl DdlGenerator for MySqlDdlGenerator {
    fn dialect(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn generate(&self, op: &SchemaOperation) -> Vec<String> {
        tracing::debug!(dialect = "mysql", op = ?op, "Generating DDL");

        match op {
            SchemaOperation::CreateTable(def) => {
                let mut stmts = vec![create_table_statement(def, false)];
                for index in &def.indexes {
                    stmts.push(create_index(&D, &def.name, index));
                }
                stmts
            }
            SchemaOperation::AddColumn { table, column } => {
                let table_q = D.quote_ident(table);
                let column_q = D.quote_ident(&column.name);
                if column.identity {
                    vec![format!(
                        "ALTER TABLE {table_q} ADD COLUMN {} PRIMARY KEY",
                        column_definition(column)
                    )]
                } else if accepts_default(&column.sql_type) {
                    vec![
                        format!(
                            "ALTER TABLE {table_q} ADD COLUMN {column_q} {} NOT NULL DEFAULT {}",
                            column.sql_type, column.default
                        ),
                        format!("ALTER TABLE {table_q} ALTER COLUMN {column_q} DROP DEFAULT"),
                    ]
                } else {
                    vec![format!(
                        "ALTER TABLE {table_q} ADD COLUMN {}",
                        column_definition(column)
                    )]
                }
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
                    "ALTER TABLE {} MODIFY COLUMN {}",
                    D.quote_ident(table),
                    column_definition(to)
                ));
                stmts
            }
            SchemaOperation::DropPrimaryKey {
                table, identity, ..
            } => {
                let table_q = D.quote_ident(table);
                let mut stmts = Vec::with_capacity(2);
                // AUTO_INCREMENT must stay keyed; strip it before the key goes.
                if let Some(column) = identity {
                    stmts.push(format!(
                        "ALTER TABLE {table_q} MODIFY COLUMN {} {} NOT NULL",
                        D.quote_ident(&column.name),
                        column.sql_type
                    ));
                }
                stmts.push(format!("ALTER TABLE {table_q} DROP PRIMARY KEY"));
                stmts
            }
            SchemaOperation::AddPrimaryKey { table, columns, .. } => vec![format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                D.quote_ident(table),
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
                    "Table rebuild is not used for MySQL; columns are altered in place"
                );
                Vec::new()
            }
        }
    }

    fn create_temporary(&self, def: &TableDef) -> Vec<String> {
        vec![create_table_statement(def, true)]
    }

    fn drop_temporary(&self, name: &str) -> String {
        format!("DROP TEMPORARY TABLE IF EXISTS {}", D.quote_ident(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IndexDef;

    #[test]
    fn test_create_table() {
        let mut def = TableDef::new("Doc");
        def.columns = vec![
            ColumnDef::new("Id", "INT").identity(),
            ColumnDef::new("Name", "VARCHAR(50)"),
        ];
        def.primary_key = vec!["Id".to_string()];
        def.indexes
            .push(IndexDef::new("Doc$Name", vec!["Name".to_string()], true));
        let stmts = MySqlDdlGenerator.generate(&SchemaOperation::CreateTable(def));

        assert_eq!(
            stmts[0],
            "CREATE TABLE `Doc` (`Id` INT NOT NULL AUTO_INCREMENT, `Name` VARCHAR(50) NOT NULL, PRIMARY KEY (`Id`))"
        );
        assert_eq!(stmts[1], "CREATE UNIQUE INDEX `Doc$Name` ON `Doc` (`Name`)");
    }

    #[test]
    fn test_add_column_drops_default() {
        let op = SchemaOperation::AddColumn {
            table: "Item".to_string(),
            column: ColumnDef::new("Qty", "INT"),
        };
        let stmts = MySqlDdlGenerator.generate(&op);
        assert_eq!(
            stmts,
            vec![
                "ALTER TABLE `Item` ADD COLUMN `Qty` INT NOT NULL DEFAULT 0",
                "ALTER TABLE `Item` ALTER COLUMN `Qty` DROP DEFAULT",
            ]
        );
    }

    #[test]
    fn test_add_text_column_without_default() {
        let op = SchemaOperation::AddColumn {
            table: "Item".to_string(),
            column: ColumnDef::new("Note", "LONGTEXT").with_default("''"),
        };
        let stmts = MySqlDdlGenerator.generate(&op);
        assert_eq!(stmts, vec!["ALTER TABLE `Item` ADD COLUMN `Note` LONGTEXT NOT NULL"]);
    }

    #[test]
    fn test_drop_identity_primary_key() {
        let op = SchemaOperation::DropPrimaryKey {
            table: "Doc".to_string(),
            name: Some("PRIMARY".to_string()),
            identity: Some(ColumnDef::new("Id", "INT").identity()),
        };
        let stmts = MySqlDdlGenerator.generate(&op);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "ALTER TABLE `Doc` MODIFY COLUMN `Id` INT NOT NULL");
        assert_eq!(stmts[1], "ALTER TABLE `Doc` DROP PRIMARY KEY");
    }

    #[test]
    fn test_alter_and_drop_index() {
        let alter = SchemaOperation::AlterColumn {
            table: "Item".to_string(),
            from: ColumnDef::new("Code", "VARCHAR(10)"),
            to: ColumnDef::new("Code", "VARCHAR(20)"),
        };
        assert_eq!(
            MySqlDdlGenerator.generate(&alter),
            vec!["ALTER TABLE `Item` MODIFY COLUMN `Code` VARCHAR(20) NOT NULL"]
        );
        let drop = SchemaOperation::DropIndex {
            table: "Item".to_string(),
            name: "Item$Qty".to_string(),
        };
        assert_eq!(
            MySqlDdlGenerator.generate(&drop),
            vec!["DROP INDEX `Item$Qty` ON `Item`"]
        );
    }

    #[test]
    fn test_not_null_alter_fills_existing_nulls() {
        let alter = SchemaOperation::AlterColumn {
            table: "Item".to_string(),
            from: ColumnDef::new("Qty", "INT").nullable(),
            to: ColumnDef::new("Qty", "INT"),
        };
        assert_eq!(
            MySqlDdlGenerator.generate(&alter),
            vec![
                "UPDATE `Item` SET `Qty` = 0 WHERE `Qty` IS NULL",
                "ALTER TABLE `Item` MODIFY COLUMN `Qty` INT NOT NULL",
            ]
        );
    }
}
