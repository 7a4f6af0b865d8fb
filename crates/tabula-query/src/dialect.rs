//! SQL dialect capabilities.
//!
//! The statement builders are shared by all backends. A [`SqlDialect`] supplies only
//! what differs: identifier quoting, placeholder syntax, row limiting, lock syntax,
//! the column type of each [`FieldType`], and value marshaling between logical field
//! values and native driver values.
//!
//! Blank dates are stored as the `1753-01-01` sentinel so date columns can be
//! `NOT NULL`; marshaling maps the sentinel back to the blank date.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tabula_core::{
    BLANK_DATE, BLANK_DATETIME, Error, FieldType, Result, SQL_MIN_DATE, Value,
};

/// The supported SQL backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// SQLite 3.
    #[serde(alias = "sqlite3")]
    Sqlite,
    /// MySQL / MariaDB.
    #[serde(alias = "mariadb")]
    MySql,
    /// Microsoft SQL Server.
    #[serde(alias = "mssql", alias = "sql_server")]
    SqlServer,
}

impl DialectKind {
    /// Stable lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            DialectKind::Sqlite => "sqlite",
            DialectKind::MySql => "mysql",
            DialectKind::SqlServer => "sqlserver",
        }
    }

    /// The shared dialect instance of this kind.
    pub fn dialect(self) -> Arc<dyn SqlDialect> {
        match self {
            DialectKind::Sqlite => Arc::new(SqliteDialect),
            DialectKind::MySql => Arc::new(MySqlDialect),
            DialectKind::SqlServer => Arc::new(SqlServerDialect),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            "mysql" | "mariadb" => Ok(DialectKind::MySql),
            "sqlserver" | "mssql" | "sql_server" => Ok(DialectKind::SqlServer),
            other => Err(Error::Config(format!("unknown dialect '{other}'"))),
        }
    }
}

/// Backend-specific SQL syntax and type mapping.
pub trait SqlDialect: fmt::Debug + Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> DialectKind;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// Positional parameter marker for the 1-based `index`.
    fn placeholder(&self, index: usize) -> String;

    /// `TOP (n)` prefix for the select list, for dialects that limit that way.
    fn top_clause(&self, _limit: usize) -> Option<String> {
        None
    }

    /// Trailing row-limit clause.
    fn limit_clause(&self, limit: usize) -> Option<String> {
        Some(format!(" LIMIT {limit}"))
    }

    /// Table hint placed after the table name when locking rows for update.
    fn lock_table_hint(&self) -> Option<&'static str> {
        None
    }

    /// Trailing clause when locking rows for update.
    fn lock_suffix(&self) -> Option<&'static str> {
        None
    }

    /// `ESCAPE` clause matching the `\` escapes in LIKE patterns.
    fn like_escape(&self) -> &'static str {
        " ESCAPE '\\'"
    }

    /// Column type for a field type.
    fn column_type(&self, field_type: &FieldType) -> Result<String>;

    /// Column type of the version column.
    fn version_column_type(&self) -> &'static str {
        "BIGINT"
    }

    /// Expression comparing and ordering a column by its logical value.
    fn comparable(&self, _field_type: &FieldType, column: String) -> String {
        column
    }

    /// Marshal a logical value into a native driver value.
    fn to_sql_value(&self, field_type: &FieldType, value: &Value) -> Value;

    /// Marshal a native driver value into a logical value of `field_type`.
    fn from_sql_value(&self, field_type: &FieldType, value: Value) -> Result<Value> {
        decode_native(self.kind(), field_type, value)
    }
}

/// SQLite: `"ident"`, `?N` parameters, `LIMIT`, no row locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

/// MySQL: `` `ident` ``, `?` parameters, `LIMIT`, `FOR UPDATE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

/// SQL Server: `[ident]`, `@pN` parameters, `TOP (n)`, `UPDLOCK` hints.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

fn storage_date(date: NaiveDate) -> NaiveDate {
    if date == BLANK_DATE { SQL_MIN_DATE } else { date }
}

fn storage_datetime(dt: NaiveDateTime) -> NaiveDateTime {
    if dt == BLANK_DATETIME {
        SQL_MIN_DATE.and_time(NaiveTime::MIN)
    } else {
        dt
    }
}

fn text_type(len: usize, bounded: &str, unbounded: &str) -> String {
    if len == 0 {
        unbounded.to_string()
    } else {
        format!("{bounded}({len})")
    }
}

impl SqlDialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn column_type(&self, field_type: &FieldType) -> Result<String> {
        Ok(match field_type {
            FieldType::Integer | FieldType::Option(_) => "INTEGER".to_string(),
            FieldType::BigInteger => "BIGINT".to_string(),
            FieldType::Decimal => "TEXT".to_string(),
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Text(len) => text_type(*len, "VARCHAR", "TEXT"),
            FieldType::Code(len) => text_type(*len, "VARCHAR", "TEXT"),
            FieldType::Date => "DATE".to_string(),
            FieldType::Time => "TIME".to_string(),
            FieldType::DateTime => "DATETIME".to_string(),
            FieldType::Guid => "CHAR(36)".to_string(),
            FieldType::Blob => "BLOB".to_string(),
        })
    }

    /// Decimals are stored as exact text; NUMERIC affinity would round them to
    /// a double, so comparisons cast instead.
    fn comparable(&self, field_type: &FieldType, column: String) -> String {
        match field_type {
            FieldType::Decimal => format!("CAST({column} AS NUMERIC)"),
            _ => column,
        }
    }

    fn to_sql_value(&self, _field_type: &FieldType, value: &Value) -> Value {
        match value {
            Value::Bool(b) => Value::Int(i32::from(*b)),
            Value::Decimal(d) => Value::Text(d.to_string()),
            Value::Date(d) => Value::Text(storage_date(*d).format("%Y-%m-%d").to_string()),
            Value::Time(t) => Value::Text(t.format("%H:%M:%S%.3f").to_string()),
            Value::DateTime(dt) => Value::Text(
                storage_datetime(*dt)
                    .format("%Y-%m-%d %H:%M:%S%.3f")
                    .to_string(),
            ),
            Value::Guid(g) => Value::Text(g.hyphenated().to_string()),
            other => other.clone(),
        }
    }
}

impl SqlDialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn lock_suffix(&self) -> Option<&'static str> {
        Some(" FOR UPDATE")
    }

    fn like_escape(&self) -> &'static str {
        " ESCAPE '\\\\'"
    }

    fn column_type(&self, field_type: &FieldType) -> Result<String> {
        Ok(match field_type {
            FieldType::Integer | FieldType::Option(_) => "INT".to_string(),
            FieldType::BigInteger => "BIGINT".to_string(),
            FieldType::Decimal => "DECIMAL(38,20)".to_string(),
            FieldType::Boolean => "TINYINT(1)".to_string(),
            FieldType::Text(len) | FieldType::Code(len) => text_type(*len, "VARCHAR", "LONGTEXT"),
            FieldType::Date => "DATE".to_string(),
            FieldType::Time => "TIME(3)".to_string(),
            FieldType::DateTime => "DATETIME(3)".to_string(),
            FieldType::Guid => "CHAR(36)".to_string(),
            FieldType::Blob => "LONGBLOB".to_string(),
        })
    }

    fn to_sql_value(&self, _field_type: &FieldType, value: &Value) -> Value {
        match value {
            Value::Date(d) => Value::Date(storage_date(*d)),
            Value::DateTime(dt) => Value::DateTime(storage_datetime(*dt)),
            Value::Guid(g) => Value::Text(g.hyphenated().to_string()),
            other => other.clone(),
        }
    }
}

impl SqlDialect for SqlServerDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{index}")
    }

    fn top_clause(&self, limit: usize) -> Option<String> {
        Some(format!("TOP ({limit}) "))
    }

    fn limit_clause(&self, _limit: usize) -> Option<String> {
        None
    }

    fn lock_table_hint(&self) -> Option<&'static str> {
        Some(" WITH (UPDLOCK, ROWLOCK)")
    }

    fn column_type(&self, field_type: &FieldType) -> Result<String> {
        Ok(match field_type {
            FieldType::Integer | FieldType::Option(_) => "INT".to_string(),
            FieldType::BigInteger => "BIGINT".to_string(),
            FieldType::Decimal => "DECIMAL(38,20)".to_string(),
            FieldType::Boolean => "BIT".to_string(),
            FieldType::Text(len) | FieldType::Code(len) => {
                text_type(*len, "NVARCHAR", "NVARCHAR(MAX)")
            }
            FieldType::Date => "DATE".to_string(),
            FieldType::Time => "TIME(3)".to_string(),
            FieldType::DateTime => "DATETIME2(3)".to_string(),
            FieldType::Guid => "UNIQUEIDENTIFIER".to_string(),
            FieldType::Blob => "VARBINARY(MAX)".to_string(),
        })
    }

    fn to_sql_value(&self, _field_type: &FieldType, value: &Value) -> Value {
        match value {
            Value::Date(d) => Value::Date(storage_date(*d)),
            Value::DateTime(dt) => Value::DateTime(storage_datetime(*dt)),
            other => other.clone(),
        }
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_datetime_text(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| parse_date_text(s).map(|d| d.and_time(NaiveTime::MIN)))
}

fn logical_date(date: NaiveDate) -> NaiveDate {
    if date <= SQL_MIN_DATE { BLANK_DATE } else { date }
}

fn logical_datetime(dt: NaiveDateTime) -> NaiveDateTime {
    if dt.date() <= SQL_MIN_DATE && dt.time() == NaiveTime::MIN {
        BLANK_DATETIME
    } else {
        dt
    }
}

/// Decode a native value into the logical value of `field_type`.
///
/// Drivers differ in what they return for the same column type (SQLite returns
/// dates as text, decimals as floats or integers); every plausible native shape is
/// accepted. NULL decodes as the blank value.
pub fn decode_native(kind: DialectKind, field_type: &FieldType, value: Value) -> Result<Value> {
    if value.is_null() {
        return Ok(field_type.blank_value());
    }
    let unknown = |value: &Value| Error::UnknownFieldType {
        dialect: kind.as_str().to_string(),
        field_type: format!("{field_type} from native {}", value.kind()),
    };

    let decoded = match (field_type, &value) {
        (FieldType::Integer | FieldType::Option(_), v) => v.as_i32().map(Value::Int),
        (FieldType::BigInteger, v) => v.as_i64().map(Value::BigInt),
        (FieldType::Boolean, v) => v.as_bool().map(Value::Bool),
        (FieldType::Decimal, Value::Double(f)) => {
            Decimal::from_str(&f.to_string()).ok().map(Value::Decimal)
        }
        (FieldType::Decimal, Value::Text(s)) => Decimal::from_str(s.trim()).ok().map(Value::Decimal),
        (FieldType::Decimal, v) => v.as_decimal().map(Value::Decimal),
        (FieldType::Text(_) | FieldType::Code(_), Value::Text(s)) => Some(Value::Text(s.clone())),
        (FieldType::Date, Value::Date(d)) => Some(Value::Date(logical_date(*d))),
        (FieldType::Date, Value::DateTime(dt)) => Some(Value::Date(logical_date(dt.date()))),
        (FieldType::Date, Value::Text(s)) => parse_date_text(s).map(|d| Value::Date(logical_date(d))),
        (FieldType::DateTime, Value::DateTime(dt)) => Some(Value::DateTime(logical_datetime(*dt))),
        (FieldType::DateTime, Value::Date(d)) => {
            Some(Value::DateTime(logical_datetime(d.and_time(NaiveTime::MIN))))
        }
        (FieldType::DateTime, Value::Text(s)) => {
            parse_datetime_text(s).map(|dt| Value::DateTime(logical_datetime(dt)))
        }
        (FieldType::Time, Value::Time(t)) => Some(Value::Time(*t)),
        (FieldType::Time, Value::Text(s)) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
            .ok()
            .map(Value::Time),
        (FieldType::Guid, Value::Guid(g)) => Some(Value::Guid(*g)),
        (FieldType::Guid, Value::Text(s)) => Uuid::parse_str(s.trim()).ok().map(Value::Guid),
        (FieldType::Guid, Value::Bytes(b)) => Uuid::from_slice(b).ok().map(Value::Guid),
        (FieldType::Blob, Value::Bytes(b)) => Some(Value::Bytes(b.clone())),
        (FieldType::Blob, Value::Text(s)) => Some(Value::Bytes(s.as_bytes().to_vec())),
        _ => None,
    };
    decoded.ok_or_else(|| unknown(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_quoting_and_placeholders() {
        assert_eq!(SqliteDialect.quote_ident("Unit Price"), "\"Unit Price\"");
        assert_eq!(MySqlDialect.quote_ident("a`b"), "`a``b`");
        assert_eq!(SqlServerDialect.quote_ident("No."), "[No.]");
        assert_eq!(SqliteDialect.placeholder(3), "?3");
        assert_eq!(MySqlDialect.placeholder(3), "?");
        assert_eq!(SqlServerDialect.placeholder(3), "@p3");
    }

    #[test]
    fn test_row_limit_syntax() {
        assert_eq!(SqliteDialect.limit_clause(5).as_deref(), Some(" LIMIT 5"));
        assert_eq!(SqlServerDialect.limit_clause(5), None);
        assert_eq!(SqlServerDialect.top_clause(5).as_deref(), Some("TOP (5) "));
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(SqliteDialect.column_type(&FieldType::Code(20)).unwrap(), "VARCHAR(20)");
        assert_eq!(MySqlDialect.column_type(&FieldType::Text(0)).unwrap(), "LONGTEXT");
        assert_eq!(
            SqlServerDialect.column_type(&FieldType::Text(0)).unwrap(),
            "NVARCHAR(MAX)"
        );
        assert_eq!(SqlServerDialect.column_type(&FieldType::Boolean).unwrap(), "BIT");
    }

    #[test]
    fn test_blank_date_maps_to_sentinel_and_back() {
        for dialect in [
            DialectKind::Sqlite.dialect(),
            DialectKind::MySql.dialect(),
            DialectKind::SqlServer.dialect(),
        ] {
            let native = dialect.to_sql_value(&FieldType::Date, &Value::Date(BLANK_DATE));
            assert_ne!(native, Value::Date(BLANK_DATE));
            let back = dialect.from_sql_value(&FieldType::Date, native).unwrap();
            assert_eq!(back, Value::Date(BLANK_DATE), "{:?}", dialect.kind());

            let real = Value::Date(d(2024, 1, 31));
            let native = dialect.to_sql_value(&FieldType::Date, &real);
            assert_eq!(dialect.from_sql_value(&FieldType::Date, native).unwrap(), real);
        }
    }

    #[test]
    fn test_sqlite_decimal_and_bool_marshaling() {
        let exact = Decimal::from_str("12345678901234567.89").unwrap();
        let native = SqliteDialect.to_sql_value(&FieldType::Decimal, &Value::Decimal(exact));
        assert_eq!(native, Value::from("12345678901234567.89"));
        assert_eq!(
            SqliteDialect.from_sql_value(&FieldType::Decimal, native).unwrap(),
            Value::Decimal(exact)
        );
        assert_eq!(SqliteDialect.column_type(&FieldType::Decimal).unwrap(), "TEXT");
        assert_eq!(
            SqliteDialect.comparable(&FieldType::Decimal, "\"Price\"".to_string()),
            "CAST(\"Price\" AS NUMERIC)"
        );
        assert_eq!(
            MySqlDialect.comparable(&FieldType::Decimal, "`Price`".to_string()),
            "`Price`"
        );
        assert_eq!(
            SqliteDialect.from_sql_value(&FieldType::Decimal, Value::BigInt(12)).unwrap(),
            Value::Decimal(Decimal::from(12))
        );
        assert_eq!(
            SqliteDialect.to_sql_value(&FieldType::Boolean, &Value::Bool(true)),
            Value::Int(1)
        );
        assert_eq!(
            SqliteDialect.from_sql_value(&FieldType::Boolean, Value::BigInt(0)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_unmappable_native_value() {
        let err = SqliteDialect
            .from_sql_value(&FieldType::Date, Value::Bytes(vec![1, 2]))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFieldType { .. }));
    }

    #[test]
    fn test_dialect_kind_parse() {
        assert_eq!("MSSQL".parse::<DialectKind>().unwrap(), DialectKind::SqlServer);
        assert!("oracle".parse::<DialectKind>().is_err());
    }
}
