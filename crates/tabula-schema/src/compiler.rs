//! Schema compiler.
//!
//! Reconciles the live structure of one table with its declared definition:
//! inspect, then either create the table or alter columns, primary key and
//! indexes. Statements run on the caller's connection; the caller owns the
//! transaction and commits after each table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tabula_core::{Connection, Error, Result};
use tabula_query::SqlDialect;

use crate::ddl::generator_for;
use crate::diff::{SchemaOperation, diff_table};
use crate::introspect::{inspect_table, list_tables};
use crate::model::TableDef;

/// How the compiler treats disruptive (data-losing) changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileMode {
    /// Apply non-disruptive changes; refuse a table with any disruptive change.
    #[default]
    Normal,
    /// Apply everything, disruptive changes included.
    Force,
    /// Apply nothing; report what would run.
    CheckOnly,
}

impl CompileMode {
    /// Stable snake-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            CompileMode::Normal => "normal",
            CompileMode::Force => "force",
            CompileMode::CheckOnly => "check_only",
        }
    }
}

impl fmt::Display for CompileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompileMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "normal" => Ok(CompileMode::Normal),
            "force" => Ok(CompileMode::Force),
            "check_only" | "checkonly" | "check" => Ok(CompileMode::CheckOnly),
            other => Err(Error::Config(format!("unknown compile mode '{other}'"))),
        }
    }
}

/// Outcome of compiling one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileReport {
    /// Table name.
    pub table: String,
    /// The table did not exist and was (or would be) created.
    pub created: bool,
    /// Statements executed, in order.
    pub executed: Vec<String>,
    /// Statements that lose data.
    pub disruptive: Vec<String>,
    /// Statements that would have run but were not executed (`CheckOnly`).
    pub pending: Vec<String>,
}

impl CompileReport {
    /// True if the live table already matched the declaration.
    pub fn is_unchanged(&self) -> bool {
        !self.created && self.executed.is_empty() && self.pending.is_empty()
    }
}

/// Compiles declared tables against a live database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaCompiler {
    mode: CompileMode,
}

impl SchemaCompiler {
    /// Create a compiler running in `mode`.
    pub fn new(mode: CompileMode) -> Self {
        Self { mode }
    }

    /// The compile mode.
    pub fn mode(&self) -> CompileMode {
        self.mode
    }

    /// The operations needed to bring the live table in line with `declared`.
    pub fn plan(
        &self,
        conn: &mut dyn Connection,
        dialect: &dyn SqlDialect,
        declared: &TableDef,
    ) -> Result<Vec<SchemaOperation>> {
        let live = inspect_table(conn, dialect, &declared.name)?;
        Ok(diff_table(live.as_ref(), declared, dialect.kind()))
    }

    /// Plan one table and check the plan against the compile mode.
    ///
    /// In [`CompileMode::Normal`] a table with any disruptive change fails with
    /// [`Error::DisruptiveMigrationBlocked`]. In [`CompileMode::CheckOnly`] the
    /// statements land in [`CompileReport::pending`] and the plan runs nothing.
    #[tracing::instrument(level = "info", skip(self, conn, dialect, declared), fields(table = %declared.name, mode = %self.mode))]
    pub fn prepare(
        &self,
        conn: &mut dyn Connection,
        dialect: &dyn SqlDialect,
        declared: &TableDef,
    ) -> Result<CompilePlan> {
        if declared.primary_key.is_empty() {
            return Err(Error::NoPrimaryKey {
                table: declared.name.clone(),
            });
        }

        let ops = self.plan(conn, dialect, declared)?;
        let ddl = generator_for(dialect.kind());
        let mut report = CompileReport {
            table: declared.name.clone(),
            created: matches!(ops.first(), Some(SchemaOperation::CreateTable(_))),
            ..CompileReport::default()
        };
        if ops.is_empty() {
            tracing::debug!(table = %declared.name, "Schema up to date");
            return Ok(CompilePlan {
                report,
                steps: Vec::new(),
            });
        }

        let mut steps = Vec::with_capacity(ops.len());
        for op in ops {
            let statements = ddl.generate(&op);
            if op.is_disruptive() {
                report.disruptive.extend(statements.iter().cloned());
            }
            steps.push((op, statements));
        }

        match self.mode {
            CompileMode::CheckOnly => {
                report.pending = steps.into_iter().flat_map(|(_, s)| s).collect();
                tracing::info!(
                    table = %declared.name,
                    pending = report.pending.len(),
                    disruptive = report.disruptive.len(),
                    "Schema check complete"
                );
                Ok(CompilePlan {
                    report,
                    steps: Vec::new(),
                })
            }
            CompileMode::Normal if !report.disruptive.is_empty() => {
                tracing::warn!(
                    table = %declared.name,
                    statements = ?report.disruptive,
                    "Disruptive schema change blocked"
                );
                Err(Error::DisruptiveMigrationBlocked {
                    table: declared.name.clone(),
                    statements: report.disruptive,
                })
            }
            CompileMode::Normal | CompileMode::Force => Ok(CompilePlan { report, steps }),
        }
    }

    /// Compile one table: [`SchemaCompiler::prepare`], then execute the plan.
    pub fn compile(
        &self,
        conn: &mut dyn Connection,
        dialect: &dyn SqlDialect,
        declared: &TableDef,
    ) -> Result<CompileReport> {
        self.prepare(conn, dialect, declared)?.execute(conn)
    }
}

/// Statements for one table that passed the compile mode check.
#[derive(Debug, Clone)]
pub struct CompilePlan {
    report: CompileReport,
    steps: Vec<(SchemaOperation, Vec<String>)>,
}

impl CompilePlan {
    /// True if executing the plan runs at least one statement.
    pub fn has_statements(&self) -> bool {
        self.steps.iter().any(|(_, statements)| !statements.is_empty())
    }

    /// Run the statements in order on `conn`.
    pub fn execute(self, conn: &mut dyn Connection) -> Result<CompileReport> {
        let CompilePlan { mut report, steps } = self;
        if steps.is_empty() {
            return Ok(report);
        }
        for (op, statements) in steps {
            if op.is_disruptive() {
                tracing::warn!(table = %report.table, op = op.kind(), "Applying disruptive schema change");
            } else {
                tracing::info!(table = %report.table, op = op.kind(), "Applying schema change");
            }
            for sql in statements {
                conn.execute(&sql, &[])?;
                report.executed.push(sql);
            }
        }
        tracing::info!(
            table = %report.table,
            created = report.created,
            statements = report.executed.len(),
            "Compiled table"
        );
        Ok(report)
    }
}

/// Live tables not present in `declared` (case-insensitive). Nothing is modified.
#[tracing::instrument(level = "info", skip(conn, dialect, declared))]
pub fn database_check(
    conn: &mut dyn Connection,
    dialect: &dyn SqlDialect,
    declared: &[String],
) -> Result<Vec<String>> {
    let unmanaged: Vec<String> = list_tables(conn, dialect)?
        .into_iter()
        .filter(|live| !declared.iter().any(|d| d.eq_ignore_ascii_case(live)))
        .collect();
    for table in &unmanaged {
        tracing::info!(table = %table, "Unmanaged table in database");
    }
    Ok(unmanaged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnDef;
    use crate::testing::ScriptedConnection;
    use tabula_core::{DbTable, Value};
    use tabula_query::MySqlDialect;

    fn declared() -> TableDef {
        let mut def = TableDef::new("Item");
        def.columns = vec![
            ColumnDef::new("Code", "VARCHAR(20)").with_default("''"),
            ColumnDef::new("Qty", "INT"),
            ColumnDef::new("_version", "BIGINT"),
        ];
        def.primary_key = vec!["Code".to_string()];
        def.primary_key_name = Some("Item$PK".to_string());
        def
    }

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> DbTable {
        DbTable::from_rows(columns.iter().map(|c| (*c).to_string()).collect(), rows)
    }

    /// A MySQL catalog holding `Item` with the given columns and a `Code` key.
    fn mysql_catalog(columns: &[(&str, &str)]) -> ScriptedConnection {
        ScriptedConnection::new()
            .respond("information_schema.TABLES", table(&["TABLE_NAME"], vec![vec!["Item".into()]]))
            .respond(
                "information_schema.COLUMNS",
                table(
                    &["COLUMN_NAME", "COLUMN_TYPE", "EXTRA"],
                    columns
                        .iter()
                        .map(|(n, t)| vec![Value::from(*n), Value::from(*t), Value::from("")])
                        .collect(),
                ),
            )
            .respond(
                "information_schema.STATISTICS",
                table(
                    &["INDEX_NAME", "NON_UNIQUE", "COLUMN_NAME"],
                    vec![vec!["PRIMARY".into(), Value::Int(0), "Code".into()]],
                ),
            )
    }

    #[test]
    fn test_compile_mode_parse() {
        assert_eq!("check-only".parse::<CompileMode>().unwrap(), CompileMode::CheckOnly);
        assert_eq!("FORCE".parse::<CompileMode>().unwrap(), CompileMode::Force);
        assert!("sometimes".parse::<CompileMode>().is_err());
    }

    #[test]
    fn test_creates_missing_table() {
        let mut conn = ScriptedConnection::new();
        let report = SchemaCompiler::new(CompileMode::Normal)
            .compile(&mut conn, &MySqlDialect, &declared())
            .unwrap();
        assert!(report.created);
        assert_eq!(report.executed.len(), 1);
        assert!(conn.executed[0].starts_with("CREATE TABLE `Item`"));
    }

    #[test]
    fn test_unchanged_table_runs_nothing() {
        let mut conn = mysql_catalog(&[("Code", "varchar(20)"), ("Qty", "int(11)"), ("_version", "bigint(20)")]);
        let report = SchemaCompiler::new(CompileMode::Normal)
            .compile(&mut conn, &MySqlDialect, &declared())
            .unwrap();
        assert!(report.is_unchanged());
        assert!(conn.executed.is_empty());
    }

    #[test]
    fn test_normal_blocks_disruptive_change() {
        let mut conn = mysql_catalog(&[
            ("Code", "varchar(20)"),
            ("Qty", "int(11)"),
            ("_version", "bigint(20)"),
            ("Legacy", "int(11)"),
        ]);
        let err = SchemaCompiler::new(CompileMode::Normal)
            .compile(&mut conn, &MySqlDialect, &declared())
            .unwrap_err();
        match err {
            Error::DisruptiveMigrationBlocked { table, statements } => {
                assert_eq!(table, "Item");
                assert_eq!(statements, vec!["ALTER TABLE `Item` DROP COLUMN `Legacy`"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(conn.executed.is_empty());
    }

    #[test]
    fn test_check_only_reports_without_executing() {
        let columns = [
            ("Code", "varchar(20)"),
            ("Qty", "varchar(5)"),
            ("_version", "bigint(20)"),
        ];
        let compiler = SchemaCompiler::new(CompileMode::CheckOnly);
        let mut first = mysql_catalog(&columns);
        let a = compiler.compile(&mut first, &MySqlDialect, &declared()).unwrap();
        let mut second = mysql_catalog(&columns);
        let b = compiler.compile(&mut second, &MySqlDialect, &declared()).unwrap();

        assert!(first.executed.is_empty());
        assert!(second.executed.is_empty());
        assert_eq!(a.disruptive, vec!["ALTER TABLE `Item` DROP COLUMN `Qty`"]);
        assert_eq!(a.disruptive, b.disruptive);
        assert_eq!(a.pending.len(), 3);
    }

    #[test]
    fn test_force_applies_disruptive_change() {
        let mut conn = mysql_catalog(&[
            ("Code", "varchar(20)"),
            ("Qty", "int(11)"),
            ("_version", "bigint(20)"),
            ("Legacy", "int(11)"),
        ]);
        let report = SchemaCompiler::new(CompileMode::Force)
            .compile(&mut conn, &MySqlDialect, &declared())
            .unwrap();
        assert_eq!(conn.executed, vec!["ALTER TABLE `Item` DROP COLUMN `Legacy`"]);
        assert_eq!(report.disruptive.len(), 1);
    }

    #[test]
    fn test_nullable_live_column_is_made_not_null() {
        let mut conn = ScriptedConnection::new()
            .respond("information_schema.TABLES", table(&["TABLE_NAME"], vec![vec!["Item".into()]]))
            .respond(
                "information_schema.COLUMNS",
                table(
                    &["COLUMN_NAME", "COLUMN_TYPE", "IS_NULLABLE", "EXTRA"],
                    vec![
                        vec!["Code".into(), "varchar(20)".into(), "NO".into(), "".into()],
                        vec!["Qty".into(), "int(11)".into(), "YES".into(), "".into()],
                        vec!["_version".into(), "bigint(20)".into(), "NO".into(), "".into()],
                    ],
                ),
            )
            .respond(
                "information_schema.STATISTICS",
                table(
                    &["INDEX_NAME", "NON_UNIQUE", "COLUMN_NAME"],
                    vec![vec!["PRIMARY".into(), Value::Int(0), "Code".into()]],
                ),
            );
        let report = SchemaCompiler::new(CompileMode::Normal)
            .compile(&mut conn, &MySqlDialect, &declared())
            .unwrap();
        assert!(!report.is_unchanged());
        assert!(report.disruptive.is_empty());
        assert_eq!(
            conn.executed,
            vec![
                "UPDATE `Item` SET `Qty` = 0 WHERE `Qty` IS NULL",
                "ALTER TABLE `Item` MODIFY COLUMN `Qty` INT NOT NULL",
            ]
        );
    }

    #[test]
    fn test_database_check_lists_unmanaged() {
        let mut conn = ScriptedConnection::new().respond(
            "information_schema.TABLES",
            table(&["TABLE_NAME"], vec![vec!["Item".into()], vec!["audit_log".into()]]),
        );
        let unmanaged = database_check(&mut conn, &MySqlDialect, &["item".to_string()]).unwrap();
        assert_eq!(unmanaged, vec!["audit_log".to_string()]);
        assert!(conn.executed.is_empty());
    }
}
