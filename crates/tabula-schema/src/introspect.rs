//! Live schema introspection.
//!
//! Reads tables, columns, primary keys and secondary indexes back from the
//! database catalog into the same [`TableDef`] shape the declared model uses.
//! Each dialect reads its own catalog: `sqlite_master` and `PRAGMA`s for SQLite,
//! `information_schema` for MySQL, and `INFORMATION_SCHEMA` plus `sys.indexes`
//! for SQL Server.

use tabula_core::{Connection, DbRow, DbTable, Error, Result, Value};
use tabula_query::{DialectKind, SqlDialect};

use crate::model::{ColumnDef, IndexDef, TableDef, primary_key_name};

/// Canonical spelling of a column type for comparison.
///
/// Upper-cases, removes whitespace and drops MySQL integer display widths
/// (`int(11)` is `INT`), keeping `TINYINT(1)` which is how booleans are declared.
pub fn normalize_type(sql_type: &str) -> String {
    let compact: String = sql_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    for int in ["BIGINT", "SMALLINT", "MEDIUMINT", "INT"] {
        if let Some(rest) = compact.strip_prefix(int) {
            if rest.starts_with('(') && rest.ends_with(')') {
                return int.to_string();
            }
        }
    }
    if compact.starts_with("TINYINT(") && compact != "TINYINT(1)" {
        return "TINYINT".to_string();
    }
    compact
}

fn text_at(row: &DbRow, column: &str) -> Result<String> {
    match row.get_named(column) {
        Some(Value::Text(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(Error::Query {
            sql: String::new(),
            message: format!("catalog column '{column}' missing"),
        }),
        Some(other) => Ok(other.to_string()),
    }
}

fn int_at(row: &DbRow, column: &str) -> i64 {
    row.get_named(column).and_then(Value::as_i64).unwrap_or(0)
}

/// `INFORMATION_SCHEMA.COLUMNS.IS_NULLABLE`; a missing value reads as NOT NULL.
fn is_nullable(row: &DbRow) -> bool {
    row.get_named("IS_NULLABLE")
        .and_then(Value::as_str)
        .is_some_and(|v| v.eq_ignore_ascii_case("YES"))
}

fn first_column(table: &DbTable) -> Vec<String> {
    table
        .rows()
        .iter()
        .filter_map(|r| r.get(0).and_then(Value::as_str).map(str::to_string))
        .collect()
}

/// Group `(index, unique, column)` rows, already ordered by index then position.
fn group_indexes(rows: impl IntoIterator<Item = (String, bool, String)>) -> Vec<IndexDef> {
    let mut out: Vec<IndexDef> = Vec::new();
    for (name, unique, column) in rows {
        match out.last_mut() {
            Some(last) if last.name == name => last.columns.push(column),
            _ => out.push(IndexDef::new(name, vec![column], unique)),
        }
    }
    out
}

/// Names of all user tables, sorted.
#[tracing::instrument(level = "debug", skip(conn, dialect))]
pub fn list_tables(conn: &mut dyn Connection, dialect: &dyn SqlDialect) -> Result<Vec<String>> {
    let sql = match dialect.kind() {
        DialectKind::Sqlite => {
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name"
        }
        DialectKind::MySql => {
            "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
        }
        DialectKind::SqlServer => {
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
        }
    };
    Ok(first_column(&conn.query(sql, &[])?))
}

/// True if the table exists.
pub fn table_exists(
    conn: &mut dyn Connection,
    dialect: &dyn SqlDialect,
    table: &str,
) -> Result<bool> {
    let sql = match dialect.kind() {
        DialectKind::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
        DialectKind::MySql => {
            "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
        }
        DialectKind::SqlServer => {
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_NAME = @p1"
        }
    };
    let found = conn.query(sql, &[Value::from(table)])?;
    Ok(!found.is_empty())
}

/// Read the live definition of a table, or `None` when it does not exist.
#[tracing::instrument(level = "debug", skip(conn, dialect))]
pub fn inspect_table(
    conn: &mut dyn Connection,
    dialect: &dyn SqlDialect,
    table: &str,
) -> Result<Option<TableDef>> {
    if !table_exists(conn, dialect, table)? {
        return Ok(None);
    }
    let def = match dialect.kind() {
        DialectKind::Sqlite => inspect_sqlite(conn, dialect, table)?,
        DialectKind::MySql => inspect_mysql(conn, table)?,
        DialectKind::SqlServer => inspect_sqlserver(conn, table)?,
    };
    tracing::debug!(
        table = %def.name,
        columns = def.columns.len(),
        indexes = def.indexes.len(),
        "Inspected live table"
    );
    Ok(Some(def))
}

fn inspect_sqlite(
    conn: &mut dyn Connection,
    dialect: &dyn SqlDialect,
    table: &str,
) -> Result<TableDef> {
    let quoted = dialect.quote_ident(table);
    let create_sql = conn
        .query(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[Value::from(table)],
        )?
        .scalar()
        .and_then(Value::as_str)
        .map(str::to_ascii_uppercase)
        .unwrap_or_default();
    let autoincrement = create_sql.contains("AUTOINCREMENT");

    let mut def = TableDef::new(table);
    let mut pk_columns: Vec<(i64, String)> = Vec::new();
    for row in conn.query(&format!("PRAGMA table_info({quoted})"), &[])?.rows() {
        let name = text_at(row, "name")?;
        let sql_type = text_at(row, "type").unwrap_or_default();
        let pk = int_at(row, "pk");
        if pk > 0 {
            pk_columns.push((pk, name.clone()));
        }
        let mut column = ColumnDef::new(name, sql_type);
        // Key columns of rowid tables never hold NULL whatever `notnull` says.
        column.nullable = pk == 0
            && row
                .get_named("notnull")
                .and_then(Value::as_i64)
                .is_some_and(|n| n == 0);
        def.columns.push(column);
    }
    pk_columns.sort_by_key(|(pos, _)| *pos);

    let pk_index = primary_key_name(table);
    let index_list = conn.query(&format!("PRAGMA index_list({quoted})"), &[])?;
    for row in index_list.rows() {
        let name = text_at(row, "name")?;
        if name.starts_with("sqlite_autoindex_") {
            continue;
        }
        let info = conn.query(
            &format!("PRAGMA index_info({})", dialect.quote_ident(&name)),
            &[],
        )?;
        let mut ordered: Vec<(i64, String)> = Vec::new();
        for col in info.rows() {
            ordered.push((int_at(col, "seqno"), text_at(col, "name")?));
        }
        ordered.sort_by_key(|(pos, _)| *pos);
        let columns = ordered.into_iter().map(|(_, c)| c).collect();
        if name.eq_ignore_ascii_case(&pk_index) {
            def.primary_key = columns;
            def.primary_key_name = Some(name);
        } else {
            def.indexes.push(IndexDef::new(name, columns, int_at(row, "unique") != 0));
        }
    }
    def.indexes.sort_by(|a, b| a.name.cmp(&b.name));

    if def.primary_key.is_empty() {
        def.primary_key = pk_columns.into_iter().map(|(_, c)| c).collect();
        if autoincrement {
            if let [only] = def.primary_key.as_slice() {
                let only = only.clone();
                if let Some(col) = def.columns.iter_mut().find(|c| c.name == only) {
                    col.identity = true;
                }
            }
        }
    }
    Ok(def)
}

fn inspect_mysql(conn: &mut dyn Connection, table: &str) -> Result<TableDef> {
    let mut def = TableDef::new(table);
    let columns = conn.query(
        "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, EXTRA FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
        &[Value::from(table)],
    )?;
    for row in columns.rows() {
        let mut column = ColumnDef::new(text_at(row, "COLUMN_NAME")?, text_at(row, "COLUMN_TYPE")?);
        column.identity = text_at(row, "EXTRA")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .contains("auto_increment");
        column.nullable = is_nullable(row);
        def.columns.push(column);
    }

    let stats = conn.query(
        "SELECT INDEX_NAME, NON_UNIQUE, COLUMN_NAME FROM information_schema.STATISTICS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY INDEX_NAME, SEQ_IN_INDEX",
        &[Value::from(table)],
    )?;
    let mut rows = Vec::with_capacity(stats.len());
    for row in stats.rows() {
        rows.push((
            text_at(row, "INDEX_NAME")?,
            int_at(row, "NON_UNIQUE") == 0,
            text_at(row, "COLUMN_NAME")?,
        ));
    }
    for index in group_indexes(rows) {
        if index.name == "PRIMARY" {
            def.primary_key = index.columns;
            def.primary_key_name = Some(index.name);
        } else {
            def.indexes.push(index);
        }
    }
    Ok(def)
}

fn sqlserver_type(row: &DbRow) -> Result<String> {
    let data_type = text_at(row, "DATA_TYPE")?.to_ascii_uppercase();
    let length = int_at(row, "CHARACTER_MAXIMUM_LENGTH");
    Ok(match data_type.as_str() {
        "NVARCHAR" | "VARCHAR" | "NCHAR" | "CHAR" | "VARBINARY" | "BINARY" => {
            if length < 0 {
                format!("{data_type}(MAX)")
            } else {
                format!("{data_type}({length})")
            }
        }
        "DECIMAL" | "NUMERIC" => format!(
            "{data_type}({},{})",
            int_at(row, "NUMERIC_PRECISION"),
            int_at(row, "NUMERIC_SCALE")
        ),
        "TIME" | "DATETIME2" | "DATETIMEOFFSET" => {
            format!("{data_type}({})", int_at(row, "DATETIME_PRECISION"))
        }
        _ => data_type,
    })
}

fn inspect_sqlserver(conn: &mut dyn Connection, table: &str) -> Result<TableDef> {
    let mut def = TableDef::new(table);
    let columns = conn.query(
        "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, NUMERIC_SCALE, \
         DATETIME_PRECISION, IS_NULLABLE, COLUMNPROPERTY(OBJECT_ID(TABLE_SCHEMA + '.' + TABLE_NAME), COLUMN_NAME, 'IsIdentity') AS IS_IDENTITY \
         FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = @p1 ORDER BY ORDINAL_POSITION",
        &[Value::from(table)],
    )?;
    for row in columns.rows() {
        let mut column = ColumnDef::new(text_at(row, "COLUMN_NAME")?, sqlserver_type(row)?);
        column.identity = int_at(row, "IS_IDENTITY") == 1;
        column.nullable = is_nullable(row);
        def.columns.push(column);
    }

    let pk = conn.query(
        "SELECT tc.CONSTRAINT_NAME, kcu.COLUMN_NAME FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
         JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu ON kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND kcu.TABLE_NAME = tc.TABLE_NAME \
         WHERE tc.TABLE_NAME = @p1 AND tc.CONSTRAINT_TYPE = 'PRIMARY KEY' ORDER BY kcu.ORDINAL_POSITION",
        &[Value::from(table)],
    )?;
    for row in pk.rows() {
        if def.primary_key_name.is_none() {
            def.primary_key_name = Some(text_at(row, "CONSTRAINT_NAME")?);
        }
        def.primary_key.push(text_at(row, "COLUMN_NAME")?);
    }

    let indexes = conn.query(
        "SELECT i.name AS INDEX_NAME, i.is_unique AS IS_UNIQUE, c.name AS COLUMN_NAME FROM sys.indexes i \
         JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
         JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
         WHERE i.object_id = OBJECT_ID(@p1) AND i.is_primary_key = 0 AND i.type > 0 \
         ORDER BY i.name, ic.key_ordinal",
        &[Value::from(table)],
    )?;
    let mut rows = Vec::with_capacity(indexes.len());
    for row in indexes.rows() {
        let unique = row
            .get_named("IS_UNIQUE")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        rows.push((text_at(row, "INDEX_NAME")?, unique, text_at(row, "COLUMN_NAME")?));
    }
    def.indexes = group_indexes(rows);
    Ok(def)
}
