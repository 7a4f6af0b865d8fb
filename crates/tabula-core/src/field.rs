//! Typed fields.
//!
//! A [`Field`] is a typed scalar holder with three values:
//!
//! - `value`: the current value, always coerced by [`Field::check_value`]
//! - `xvalue`: the last persisted value, updated only when a row is loaded or written
//! - `init_value`: the default assigned by [`Field::init`]
//!
//! The difference between `value` and `xvalue` is the unit of change for writes.

use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result, ValidationError, ValidationErrorKind};
use crate::options::OptionEntry;
use crate::relation::TableRelation;
use crate::text::{self, Locale};
use crate::types::{BLANK_DATE, BLANK_DATETIME, FieldType, SQL_MAX_DATE, SQL_MIN_DATE};
use crate::value::Value;

/// Handle to a field registered on a table.
///
/// Returned by the table's field registration call and used for every later
/// access to that field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

impl FieldId {
    /// Position of the field in its table.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A typed column of a table and the value it currently holds.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    caption: String,
    code_name: String,
    sql_name: String,
    field_type: FieldType,
    value: Value,
    xvalue: Value,
    init_value: Value,
    identity: bool,
    table: String,
    relations: Vec<TableRelation>,
}

/// Rendering metadata of a field, consumed by UI and API layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSchema {
    /// Field name.
    pub name: String,
    /// Display caption.
    pub caption: String,
    /// Identifier-safe name.
    pub code_name: String,
    /// Logical type name.
    #[serde(rename = "type")]
    pub type_name: &'static str,
    /// Maximum length for text types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    /// Whether the field declares relations to other tables.
    pub has_relations: bool,
    /// Members of an option field.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionEntry>,
}

impl Field {
    /// Create a field with its blank value.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        let blank = field_type.blank_value();
        Self {
            caption: name.clone(),
            code_name: text::code_name(&name),
            sql_name: name.clone(),
            name,
            field_type,
            value: blank.clone(),
            xvalue: blank.clone(),
            init_value: blank,
            identity: false,
            table: String::new(),
            relations: Vec::new(),
        }
    }

    /// Set the display caption.
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    /// Set the physical column name.
    pub fn sql_name(mut self, sql_name: impl Into<String>) -> Self {
        self.sql_name = sql_name.into();
        self
    }

    /// Mark the field as database-generated (auto-increment).
    ///
    /// Only integer fields can be identities; the flag is ignored otherwise.
    pub fn identity(mut self) -> Self {
        self.identity = matches!(
            self.field_type,
            FieldType::Integer | FieldType::BigInteger
        );
        self
    }

    /// Declare a relation to another table.
    pub fn relation(mut self, relation: TableRelation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Set the default value, validating it first.
    pub fn try_init_value(mut self, value: impl Into<Value>) -> Result<Self> {
        let checked = self.check_value(value.into())?;
        self.init_value = checked.clone();
        self.value = checked.clone();
        self.xvalue = checked;
        Ok(self)
    }

    /// Attach the field to its owning table.
    pub fn set_table(&mut self, table: &str) {
        self.table = table.to_string();
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display caption.
    pub fn caption_text(&self) -> &str {
        &self.caption
    }

    /// Identifier-safe name.
    pub fn code_name(&self) -> &str {
        &self.code_name
    }

    /// Physical column name.
    pub fn column(&self) -> &str {
        &self.sql_name
    }

    /// Logical type.
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Owning table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the database generates this field's value.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Declared relations.
    pub fn relations(&self) -> &[TableRelation] {
        &self.relations
    }

    /// Current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Last persisted value.
    pub fn xvalue(&self) -> &Value {
        &self.xvalue
    }

    /// Default value.
    pub fn init_value(&self) -> &Value {
        &self.init_value
    }

    /// The blank value of this field's type.
    pub fn blank_value(&self) -> Value {
        self.field_type.blank_value()
    }

    /// Coerce and store a new current value.
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        self.value = self.check_value(value.into())?;
        Ok(())
    }

    /// Parse text input and store the result.
    pub fn validate_text(&mut self, text: &str) -> Result<()> {
        self.value = self.evaluate(text)?;
        Ok(())
    }

    /// Store a value loaded from the database and mark it clean.
    pub fn load(&mut self, value: Value) -> Result<()> {
        let checked = self.check_value(value)?;
        self.xvalue = checked.clone();
        self.value = checked;
        Ok(())
    }

    /// Mark the current value as persisted.
    pub fn accept(&mut self) {
        self.xvalue = self.value.clone();
    }

    /// Restore the last persisted value.
    pub fn revert(&mut self) {
        self.value = self.xvalue.clone();
    }

    /// Reset the current and persisted value to the default.
    pub fn init(&mut self) {
        self.value = self.init_value.clone();
        self.xvalue = self.init_value.clone();
    }

    /// True if the current value differs from the last persisted value.
    pub fn is_dirty(&self) -> bool {
        self.value != self.xvalue
    }

    /// True if the current value is the type's blank value.
    pub fn is_empty(&self) -> bool {
        self.value == self.field_type.blank_value()
    }

    fn invalid(&self, kind: ValidationErrorKind, message: impl Into<String>) -> Error {
        Error::Validation(ValidationError::new(&self.name, kind, message).in_table(&self.table))
    }

    fn mismatch(&self, value: &Value) -> Error {
        self.invalid(
            ValidationErrorKind::TypeMismatch,
            format!("expected {}, got {}", self.field_type, value.kind()),
        )
    }

    /// Coerce a value to this field's type.
    ///
    /// Fails instead of truncating: over-long text, out-of-range numbers and dates,
    /// and values of an unrelated type are rejected.
    pub fn check_value(&self, value: Value) -> Result<Value> {
        match &self.field_type {
            FieldType::Integer => match value {
                Value::Int(_) => Ok(value),
                Value::BigInt(v) => i32::try_from(v).map(Value::Int).map_err(|_| {
                    self.invalid(
                        ValidationErrorKind::OutOfRange,
                        format!("{v} does not fit in an integer"),
                    )
                }),
                Value::Decimal(d) if d.fract().is_zero() => d
                    .to_i32()
                    .map(Value::Int)
                    .ok_or_else(|| {
                        self.invalid(
                            ValidationErrorKind::OutOfRange,
                            format!("{d} does not fit in an integer"),
                        )
                    }),
                other => Err(self.mismatch(&other)),
            },
            FieldType::BigInteger => match value {
                Value::BigInt(_) => Ok(value),
                Value::Int(v) => Ok(Value::BigInt(i64::from(v))),
                Value::Decimal(d) if d.fract().is_zero() => d
                    .to_i64()
                    .map(Value::BigInt)
                    .ok_or_else(|| {
                        self.invalid(
                            ValidationErrorKind::OutOfRange,
                            format!("{d} does not fit in a big integer"),
                        )
                    }),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Decimal => match value {
                Value::Decimal(_) => Ok(value),
                Value::Int(v) => Ok(Value::Decimal(Decimal::from(v))),
                Value::BigInt(v) => Ok(Value::Decimal(Decimal::from(v))),
                Value::Double(v) => Decimal::from_str(&v.to_string())
                    .map(Value::Decimal)
                    .map_err(|_| {
                        self.invalid(
                            ValidationErrorKind::OutOfRange,
                            format!("{v} is not representable as a decimal"),
                        )
                    }),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Boolean => match value {
                Value::Bool(_) => Ok(value),
                Value::Int(v @ (0 | 1)) => Ok(Value::Bool(v == 1)),
                Value::BigInt(v @ (0 | 1)) => Ok(Value::Bool(v == 1)),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Text(len) => match value {
                Value::Text(s) => self.check_length(s, *len),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Code(len) => match value {
                Value::Text(s) => self.check_length(s.trim().to_uppercase(), *len),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Date => match value {
                Value::Date(d) => self.check_date(d).map(Value::Date),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Time => match value {
                Value::Time(_) => Ok(value),
                other => Err(self.mismatch(&other)),
            },
            FieldType::DateTime => match value {
                Value::DateTime(dt) if dt == BLANK_DATETIME => Ok(value),
                Value::DateTime(dt) => self.check_date(dt.date()).map(|_| Value::DateTime(dt)),
                Value::Date(d) if d == BLANK_DATE => Ok(Value::DateTime(BLANK_DATETIME)),
                Value::Date(d) => self
                    .check_date(d)
                    .map(|d| Value::DateTime(d.and_time(NaiveTime::MIN))),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Guid => match value {
                Value::Guid(_) => Ok(value),
                Value::Text(s) => Uuid::parse_str(s.trim()).map(Value::Guid).map_err(|_| {
                    self.invalid(ValidationErrorKind::Format, format!("'{s}' is not a GUID"))
                }),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Option(set) => {
                let member = match &value {
                    Value::Int(_) | Value::BigInt(_) => {
                        value.as_i32().filter(|v| set.contains(*v))
                    }
                    Value::Text(s) => set.parse(s),
                    other => return Err(self.mismatch(other)),
                };
                member.map(Value::Int).ok_or_else(|| {
                    self.invalid(
                        ValidationErrorKind::OutOfRange,
                        format!("'{value}' is not a member of {}", set.type_name()),
                    )
                })
            }
            FieldType::Blob => match value {
                Value::Bytes(_) => Ok(value),
                other => Err(self.mismatch(&other)),
            },
        }
    }

    fn check_length(&self, text: String, max: usize) -> Result<Value> {
        let len = text.chars().count();
        if max > 0 && len > max {
            return Err(self.invalid(
                ValidationErrorKind::TooLong,
                format!("length {len} exceeds maximum {max}"),
            ));
        }
        Ok(Value::Text(text))
    }

    fn check_date(&self, date: NaiveDate) -> Result<NaiveDate> {
        if date == BLANK_DATE || (date > SQL_MIN_DATE && date <= SQL_MAX_DATE) {
            Ok(date)
        } else {
            Err(self.invalid(
                ValidationErrorKind::OutOfRange,
                format!("{date} is outside {SQL_MIN_DATE}..={SQL_MAX_DATE}"),
            ))
        }
    }

    /// Parse text input using the invariant locale.
    pub fn evaluate(&self, text: &str) -> Result<Value> {
        self.evaluate_with(text, &Locale::default())
    }

    /// Parse text input for this field's type.
    pub fn evaluate_with(&self, input: &str, locale: &Locale) -> Result<Value> {
        let trimmed = input.trim();
        let format_error = || {
            self.invalid(
                ValidationErrorKind::Format,
                format!("'{input}' is not a valid {}", self.field_type.name()),
            )
        };

        let parsed = match &self.field_type {
            FieldType::Integer => {
                if trimmed.is_empty() {
                    Value::Int(0)
                } else {
                    trimmed.parse::<i32>().map(Value::Int).map_err(|_| format_error())?
                }
            }
            FieldType::BigInteger => {
                if trimmed.is_empty() {
                    Value::BigInt(0)
                } else {
                    trimmed.parse::<i64>().map(Value::BigInt).map_err(|_| format_error())?
                }
            }
            FieldType::Decimal => {
                if trimmed.is_empty() {
                    Value::Decimal(Decimal::ZERO)
                } else {
                    Value::Decimal(text::parse_decimal(trimmed).ok_or_else(format_error)?)
                }
            }
            FieldType::Boolean => {
                Value::Bool(text::parse_bool(trimmed, locale).ok_or_else(format_error)?)
            }
            FieldType::Text(_) => Value::Text(input.to_string()),
            FieldType::Code(_) => Value::Text(trimmed.to_string()),
            FieldType::Date => {
                if trimmed.is_empty() {
                    Value::Date(BLANK_DATE)
                } else {
                    let today = Local::now().date_naive();
                    Value::Date(text::parse_date(trimmed, locale, today).ok_or_else(format_error)?)
                }
            }
            FieldType::Time => {
                if trimmed.is_empty() {
                    Value::Time(NaiveTime::MIN)
                } else {
                    Value::Time(text::parse_time(trimmed).ok_or_else(format_error)?)
                }
            }
            FieldType::DateTime => {
                if trimmed.is_empty() {
                    Value::DateTime(BLANK_DATETIME)
                } else {
                    Value::DateTime(parse_datetime(trimmed, locale).ok_or_else(format_error)?)
                }
            }
            FieldType::Guid => {
                if trimmed.is_empty() {
                    Value::Guid(Uuid::nil())
                } else {
                    Value::Guid(Uuid::parse_str(trimmed).map_err(|_| format_error())?)
                }
            }
            FieldType::Option(set) => {
                if trimmed.is_empty() {
                    Value::Int(set.first_value())
                } else {
                    Value::Int(set.parse(trimmed).ok_or_else(format_error)?)
                }
            }
            FieldType::Blob => return Err(format_error()),
        };
        self.check_value(parsed)
    }

    /// Render the current value for display using the invariant locale.
    pub fn format_value(&self) -> String {
        self.format_with(&self.value, &Locale::default())
    }

    /// Render a value for display.
    pub fn format(&self, value: &Value) -> String {
        self.format_with(value, &Locale::default())
    }

    /// Render a value for display in a locale. Blank dates render as empty text.
    pub fn format_with(&self, value: &Value, locale: &Locale) -> String {
        match (&self.field_type, value) {
            (FieldType::Boolean, Value::Bool(b)) => {
                if *b {
                    locale.yes.clone()
                } else {
                    locale.no.clone()
                }
            }
            (FieldType::Decimal, Value::Decimal(d)) => locale.format_decimal(*d),
            (FieldType::Date, Value::Date(d)) => {
                if *d == BLANK_DATE {
                    String::new()
                } else {
                    locale.format_date(*d)
                }
            }
            (FieldType::DateTime, Value::DateTime(dt)) => {
                if *dt == BLANK_DATETIME {
                    String::new()
                } else {
                    format!("{} {}", locale.format_date(dt.date()), dt.format("%H:%M:%S"))
                }
            }
            (FieldType::Time, Value::Time(t)) => t.format("%H:%M:%S").to_string(),
            (FieldType::Guid, Value::Guid(g)) => {
                if g.is_nil() {
                    String::new()
                } else {
                    g.to_string()
                }
            }
            (FieldType::Option(set), Value::Int(v)) => set
                .caption(*v)
                .map_or_else(|| v.to_string(), str::to_string),
            (_, other) => other.to_string(),
        }
    }

    /// Encode a value in the canonical wire format.
    ///
    /// Integers and booleans are JSON scalars; decimals are invariant strings that
    /// keep their exact digits; dates and times are ISO-8601; blank dates are `null`;
    /// option values are their member name. Blobs are not serializable.
    pub fn serialize(&self, value: &Value) -> Result<JsonValue> {
        let json = match (&self.field_type, value) {
            (FieldType::Integer, Value::Int(v)) => JsonValue::from(*v),
            (FieldType::BigInteger, Value::BigInt(v)) => JsonValue::from(*v),
            (FieldType::Decimal, Value::Decimal(d)) => JsonValue::String(d.to_string()),
            (FieldType::Boolean, Value::Bool(b)) => JsonValue::Bool(*b),
            (FieldType::Text(_) | FieldType::Code(_), Value::Text(s)) => {
                JsonValue::String(s.clone())
            }
            (FieldType::Date, Value::Date(d)) => {
                if *d == BLANK_DATE {
                    JsonValue::Null
                } else {
                    JsonValue::String(d.format("%Y-%m-%d").to_string())
                }
            }
            (FieldType::Time, Value::Time(t)) => {
                JsonValue::String(t.format("%H:%M:%S%.f").to_string())
            }
            (FieldType::DateTime, Value::DateTime(dt)) => {
                if *dt == BLANK_DATETIME {
                    JsonValue::Null
                } else {
                    JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
                }
            }
            (FieldType::Guid, Value::Guid(g)) => JsonValue::String(g.to_string()),
            (FieldType::Option(set), Value::Int(v)) => match set.name(*v) {
                Some(name) => JsonValue::String(name.to_string()),
                None => JsonValue::from(*v),
            },
            (FieldType::Blob, _) => {
                return Err(Error::Serialization(format!(
                    "blob field '{}' cannot be serialized",
                    self.name
                )));
            }
            (_, other) => {
                return Err(Error::Serialization(format!(
                    "field '{}' of type {} cannot serialize a {} value",
                    self.name,
                    self.field_type,
                    other.kind()
                )));
            }
        };
        Ok(json)
    }

    /// Decode a value from the canonical wire format.
    pub fn deserialize(&self, json: &JsonValue) -> Result<Value> {
        let bad = || {
            Error::Serialization(format!(
                "field '{}' of type {} cannot read {json}",
                self.name, self.field_type
            ))
        };

        let value = match (&self.field_type, json) {
            (FieldType::Blob, _) => {
                return Err(Error::Serialization(format!(
                    "blob field '{}' cannot be deserialized",
                    self.name
                )));
            }
            (FieldType::Date | FieldType::DateTime, JsonValue::Null) => self.blank_value(),
            (FieldType::Integer, JsonValue::Number(n)) => {
                Value::Int(n.as_i64().and_then(|v| i32::try_from(v).ok()).ok_or_else(bad)?)
            }
            (FieldType::BigInteger, JsonValue::Number(n)) => {
                Value::BigInt(n.as_i64().ok_or_else(bad)?)
            }
            (FieldType::Decimal, JsonValue::String(s)) => {
                Value::Decimal(Decimal::from_str(s).map_err(|_| bad())?)
            }
            (FieldType::Decimal, JsonValue::Number(n)) => {
                Value::Decimal(Decimal::from_str(&n.to_string()).map_err(|_| bad())?)
            }
            (FieldType::Boolean, JsonValue::Bool(b)) => Value::Bool(*b),
            (FieldType::Text(_) | FieldType::Code(_), JsonValue::String(s)) => {
                Value::Text(s.clone())
            }
            (FieldType::Date, JsonValue::String(s)) => Value::Date(
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| bad())?,
            ),
            (FieldType::Time, JsonValue::String(s)) => {
                Value::Time(NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| bad())?)
            }
            (FieldType::DateTime, JsonValue::String(s)) => Value::DateTime(
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map_err(|_| bad())?,
            ),
            (FieldType::Guid, JsonValue::String(s)) => {
                Value::Guid(Uuid::parse_str(s).map_err(|_| bad())?)
            }
            (FieldType::Option(_), JsonValue::String(s)) => Value::Text(s.clone()),
            (FieldType::Option(_), JsonValue::Number(n)) => {
                Value::Int(n.as_i64().and_then(|v| i32::try_from(v).ok()).ok_or_else(bad)?)
            }
            _ => return Err(bad()),
        };
        self.check_value(value)
    }

    /// Rendering metadata.
    pub fn schema(&self) -> FieldSchema {
        FieldSchema {
            name: self.name.clone(),
            caption: self.caption.clone(),
            code_name: self.code_name.clone(),
            type_name: self.field_type.name(),
            length: self.field_type.max_length(),
            has_relations: !self.relations.is_empty(),
            options: self
                .field_type
                .options()
                .map(|set| set.entries().to_vec())
                .unwrap_or_default(),
        }
    }
}

fn parse_datetime(text: &str, locale: &Locale) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    let mut parts = text.split_whitespace();
    let date = text::parse_date(parts.next()?, locale, Local::now().date_naive())?;
    let time = match parts.next() {
        Some(t) => text::parse_time(t)?,
        None => NaiveTime::MIN,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(date.and_time(time))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(field: &Field, value: Value) {
        let checked = field.check_value(value).unwrap();
        let json = field.serialize(&checked).unwrap();
        assert_eq!(field.deserialize(&json).unwrap(), checked);
    }

    proptest! {
        #[test]
        fn test_integer_roundtrip(v in any::<i32>()) {
            roundtrip(&Field::new("I", FieldType::Integer), Value::Int(v));
        }

        #[test]
        fn test_biginteger_roundtrip(v in any::<i64>()) {
            roundtrip(&Field::new("B", FieldType::BigInteger), Value::BigInt(v));
        }

        #[test]
        fn test_decimal_roundtrip(mantissa in any::<i64>(), scale in 0u32..10) {
            roundtrip(
                &Field::new("D", FieldType::Decimal),
                Value::Decimal(Decimal::new(mantissa, scale)),
            );
        }

        #[test]
        fn test_text_roundtrip(s in "[a-zA-Z0-9 ]{0,30}") {
            roundtrip(&Field::new("T", FieldType::Text(30)), Value::Text(s));
        }

        #[test]
        fn test_date_roundtrip(days in 0u64..2_900_000) {
            let d = SQL_MIN_DATE + chrono::Days::new(days + 1);
            roundtrip(&Field::new("Dt", FieldType::Date), Value::Date(d));
        }

        #[test]
        fn test_guid_roundtrip(bytes in any::<[u8; 16]>()) {
            roundtrip(&Field::new("G", FieldType::Guid), Value::Guid(Uuid::from_bytes(bytes)));
        }
    }
}
