//! Error types for Tabula.
//!
//! Every fallible operation in the workspace returns [`Result`]. Variants carry
//! enough context (table, field, SQL, expected vs. actual) for the caller to act
//! on them; the core never maps errors to user-visible behavior itself.

use thiserror::Error as ThisError;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy of the data-access core.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A value was rejected by a field's coercion or parsing rules.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A table was declared or compiled without a primary key.
    #[error("table '{table}' has no primary key")]
    NoPrimaryKey {
        /// Table name.
        table: String,
    },

    /// A write affected a number of rows other than one.
    ///
    /// The row was changed or deleted by someone else since it was loaded.
    /// The core never retries; callers re-read and try again.
    #[error("record in '{table}' with key ({key}) was changed by another user (affected {affected} rows)")]
    Concurrency {
        /// Table name.
        table: String,
        /// Formatted primary key of the loaded row.
        key: String,
        /// Affected row count reported by the driver.
        affected: u64,
    },

    /// A lookup found no row.
    #[error("no record found in '{table}'{}", describe_filters(.filters))]
    RecordNotFound {
        /// Table name.
        table: String,
        /// Human-readable description of the active filters.
        filters: String,
    },

    /// `modify` was called with a changed primary-key field.
    #[error("primary key field '{field}' of '{table}' cannot be changed by modify; use rename")]
    PrimaryKeyImmutable {
        /// Table name.
        table: String,
        /// The changed key field.
        field: String,
    },

    /// A dialect has no mapping for a field type.
    #[error("dialect '{dialect}' has no mapping for field type '{field_type}'")]
    UnknownFieldType {
        /// Dialect name.
        dialect: String,
        /// Field type name.
        field_type: String,
    },

    /// The schema compiler in normal mode hit a change that can lose data.
    #[error("schema change for '{table}' would lose data: {}", .statements.join("; "))]
    DisruptiveMigrationBlocked {
        /// Table name.
        table: String,
        /// Statements that were not executed.
        statements: Vec<String>,
    },

    /// A filter expression could not be parsed.
    #[error("invalid filter '{expression}' on '{field}': {message}")]
    Filter {
        /// Field the filter was set on.
        field: String,
        /// The expression text.
        expression: String,
        /// What went wrong.
        message: String,
    },

    /// Declared relations are inconsistent with the related table.
    #[error("relation error: {0}")]
    Relation(String),

    /// The driver failed to run a statement.
    #[error("query failed: {message} [{sql}]")]
    Query {
        /// Statement text.
        sql: String,
        /// Driver message.
        message: String,
    },

    /// The driver failed to open, close, or manage a connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A value cannot be serialized or deserialized on the wire.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A cursor or table was used in a state that does not allow the call.
    #[error("invalid state: {0}")]
    State(String),
}

fn describe_filters(filters: &str) -> String {
    if filters.is_empty() {
        String::new()
    } else {
        format!(" with filters {filters}")
    }
}

impl Error {
    /// Build a [`Error::Query`] from a driver error and the failing SQL.
    pub fn query(sql: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Query {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// True for [`Error::Concurrency`].
    pub const fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }

    /// True for [`Error::RecordNotFound`].
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }
}

/// The reason a value failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Text longer than the field allows.
    TooLong,
    /// Number or date outside the representable range.
    OutOfRange,
    /// Value of the wrong logical type.
    TypeMismatch,
    /// Text input that cannot be parsed for the field type.
    Format,
    /// Value refers to a row that does not exist in a related table.
    RelationMissing,
}

impl ValidationErrorKind {
    /// Stable identifier of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TooLong => "too_long",
            Self::OutOfRange => "out_of_range",
            Self::TypeMismatch => "type_mismatch",
            Self::Format => "format",
            Self::RelationMissing => "relation_missing",
        }
    }
}

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{table}.{field}: {message}")]
pub struct ValidationError {
    /// Owning table (empty for a detached field).
    pub table: String,
    /// Field name.
    pub field: String,
    /// What kind of failure.
    pub kind: ValidationErrorKind,
    /// Message with expected vs. actual.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            table: String::new(),
            field: field.into(),
            kind,
            message: message.into(),
        }
    }

    /// Attach the owning table name.
    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("Code", ValidationErrorKind::TooLong, "length 25 exceeds 20")
            .in_table("Item");
        assert_eq!(err.to_string(), "Item.Code: length 25 exceeds 20");
        assert_eq!(err.kind.as_str(), "too_long");
    }

    #[test]
    fn test_not_found_mentions_filters() {
        let err = Error::RecordNotFound {
            table: "Item".to_string(),
            filters: "Code: A001".to_string(),
        };
        assert!(err.to_string().contains("with filters Code: A001"));
        assert!(err.is_not_found());

        let bare = Error::RecordNotFound {
            table: "Item".to_string(),
            filters: String::new(),
        };
        assert_eq!(bare.to_string(), "no record found in 'Item'");
    }

    #[test]
    fn test_concurrency_flag() {
        let err = Error::Concurrency {
            table: "Item".to_string(),
            key: "A001".to_string(),
            affected: 0,
        };
        assert!(err.is_concurrency());
        assert!(!err.is_not_found());
    }
}
