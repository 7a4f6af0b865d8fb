//! Relation metadata between tables.
//!
//! A relation is declared on a source field and points at a field of another
//! table, by default that table's first primary-key field. Relations are checked
//! logically; no foreign-key constraint is created in the database.

use crate::error::{Error, Result};
use crate::types::FieldType;
use crate::value::Value;

/// A condition restricting which source rows a relation applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationCondition {
    /// Field name on the source table.
    pub field: String,
    /// Required value of that field.
    pub value: Value,
}

/// Link from a field to a field of another table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRelation {
    /// Related table name.
    pub table: String,
    /// Related field name. `None` means the first primary-key field.
    pub field: Option<String>,
    /// Source-row conditions under which the relation holds.
    pub conditions: Vec<RelationCondition>,
    /// Whether renaming the related key propagates to source rows.
    pub cascade_rename: bool,
}

impl TableRelation {
    /// Relate to the primary key of `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: None,
            conditions: Vec::new(),
            cascade_rename: true,
        }
    }

    /// Relate to a specific field of the related table.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Only apply when the source field `field` holds `value`.
    #[must_use]
    pub fn when(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(RelationCondition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Enable/disable rename propagation.
    #[must_use]
    pub const fn cascade_rename(mut self, value: bool) -> Self {
        self.cascade_rename = value;
        self
    }

    /// Check that a source field type can hold values of the related field type.
    ///
    /// Both fields must have the same logical type; text types must also agree
    /// on their maximum length.
    pub fn check_compatible(
        &self,
        source_table: &str,
        source_field: &str,
        source: &FieldType,
        related_field: &str,
        related: &FieldType,
    ) -> Result<()> {
        if source.same_shape(related) {
            return Ok(());
        }
        Err(Error::Relation(format!(
            "{source_table}.{source_field} ({source}) is not compatible with {}.{related_field} ({related})",
            self.table
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let rel = TableRelation::new("Customer")
            .field("No")
            .when("Type", 1)
            .cascade_rename(false);
        assert_eq!(rel.table, "Customer");
        assert_eq!(rel.field.as_deref(), Some("No"));
        assert_eq!(rel.conditions.len(), 1);
        assert!(!rel.cascade_rename);
    }

    #[test]
    fn test_compatibility() {
        let rel = TableRelation::new("Item");
        assert!(
            rel.check_compatible("Line", "Item No", &FieldType::Code(20), "No", &FieldType::Code(20))
                .is_ok()
        );
        let err = rel
            .check_compatible("Line", "Item No", &FieldType::Code(10), "No", &FieldType::Code(20))
            .unwrap_err();
        assert!(err.to_string().contains("Line.Item No"));
        assert!(
            rel.check_compatible("Line", "Qty", &FieldType::Integer, "No", &FieldType::Code(20))
                .is_err()
        );
    }
}
