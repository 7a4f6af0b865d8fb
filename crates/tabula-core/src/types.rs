//! Logical field types.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::options::OptionSet;
use crate::value::Value;

/// The logical type of a [`Field`](crate::Field).
///
/// Every field is stored `NOT NULL`; each type has a designated blank value
/// (see [`FieldType::blank_value`]) that stands in for "no value".
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Exact decimal.
    Decimal,
    /// Boolean.
    Boolean,
    /// Free text with a maximum length in characters (0 means unbounded).
    Text(usize),
    /// Upper-cased, trimmed text key with a maximum length in characters.
    Code(usize),
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
    /// GUID.
    Guid,
    /// Enumeration stored as an integer.
    Option(Arc<OptionSet>),
    /// Binary data. Not serializable on the wire.
    Blob,
}

/// Logical blank date. Stored as the [`SQL_MIN_DATE`] sentinel.
pub const BLANK_DATE: NaiveDate = NaiveDate::MIN;

/// Logical blank date-time. Stored as the [`SQL_MIN_DATE`] sentinel at midnight.
pub const BLANK_DATETIME: NaiveDateTime = NaiveDateTime::MIN;

/// Storage sentinel for the blank date: 1753-01-01.
pub const SQL_MIN_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1753, 1, 1) {
    Some(d) => d,
    None => NaiveDate::MIN,
};

/// Largest storable date: 9999-12-31.
pub const SQL_MAX_DATE: NaiveDate = match NaiveDate::from_ymd_opt(9999, 12, 31) {
    Some(d) => d,
    None => NaiveDate::MAX,
};

impl FieldType {
    /// Stable lower-case name of the type.
    pub const fn name(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::BigInteger => "biginteger",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Text(_) => "text",
            FieldType::Code(_) => "code",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::DateTime => "datetime",
            FieldType::Guid => "guid",
            FieldType::Option(_) => "option",
            FieldType::Blob => "blob",
        }
    }

    /// Maximum length for text types.
    pub const fn max_length(&self) -> Option<usize> {
        match self {
            FieldType::Text(len) | FieldType::Code(len) => Some(*len),
            _ => None,
        }
    }

    /// True for `Text` and `Code`.
    pub const fn is_text(&self) -> bool {
        matches!(self, FieldType::Text(_) | FieldType::Code(_))
    }

    /// True for types whose values are whole numbers.
    pub const fn is_integral(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::BigInteger | FieldType::Option(_)
        )
    }

    /// The option set of an option field.
    pub fn options(&self) -> Option<&Arc<OptionSet>> {
        match self {
            FieldType::Option(set) => Some(set),
            _ => None,
        }
    }

    /// The blank value of the type: 0, "", the blank date, the nil GUID, ...
    pub fn blank_value(&self) -> Value {
        match self {
            FieldType::Integer => Value::Int(0),
            FieldType::BigInteger => Value::BigInt(0),
            FieldType::Decimal => Value::Decimal(Decimal::ZERO),
            FieldType::Boolean => Value::Bool(false),
            FieldType::Text(_) | FieldType::Code(_) => Value::Text(String::new()),
            FieldType::Date => Value::Date(BLANK_DATE),
            FieldType::Time => Value::Time(NaiveTime::MIN),
            FieldType::DateTime => Value::DateTime(BLANK_DATETIME),
            FieldType::Guid => Value::Guid(Uuid::nil()),
            FieldType::Option(set) => Value::Int(set.first_value()),
            FieldType::Blob => Value::Bytes(Vec::new()),
        }
    }

    /// True if two types have the same logical kind and, for text, the same length.
    pub fn same_shape(&self, other: &FieldType) -> bool {
        match (self, other) {
            (FieldType::Option(_), FieldType::Option(_)) => true,
            (a, b) => a.name() == b.name() && a.max_length() == b.max_length(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text(len) | FieldType::Code(len) => write!(f, "{}[{len}]", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}
