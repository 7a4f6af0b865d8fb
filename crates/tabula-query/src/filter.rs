//! Field filters scoped by level.
//!
//! Each filter belongs to one [`FilterLevel`]. A layer that owns a level can replace
//! or clear its own filters without touching filters set by other layers:
//! the UI sets `Public` filters, internal code uses `Private`, and the rename
//! cascade uses `Relations`.

use std::fmt;

use tabula_core::{Field, FieldId, Value};

use crate::expression::FilterExpr;

/// Namespace of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum FilterLevel {
    /// Filters set by the caller (UI or API).
    #[default]
    Public,
    /// Filters set by application code that the caller must not see or clear.
    Private,
    /// Filters that combine with OR inside their group.
    Or,
    /// Filters applied while propagating key renames.
    Relations,
    /// Application-defined level.
    Custom(u8),
}

impl FilterLevel {
    /// True if filters of this level are OR-joined within their group.
    pub const fn is_disjunctive(self) -> bool {
        matches!(self, FilterLevel::Or)
    }
}

impl fmt::Display for FilterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterLevel::Public => f.write_str("public"),
            FilterLevel::Private => f.write_str("private"),
            FilterLevel::Or => f.write_str("or"),
            FilterLevel::Relations => f.write_str("relations"),
            FilterLevel::Custom(n) => write!(f, "custom({n})"),
        }
    }
}

/// What a filter matches.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    /// Field equals a value.
    Equal(Value),
    /// Field lies in an inclusive range.
    Range {
        /// Lower bound.
        min: Value,
        /// Upper bound.
        max: Value,
    },
    /// Parsed filter expression.
    Expression {
        /// Source text as given by the caller.
        text: String,
        /// Resolved expression tree.
        expr: FilterExpr,
    },
}

/// A filter on one field at one level.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// The filtered field.
    pub field: FieldId,
    /// Owning level.
    pub level: FilterLevel,
    /// Match condition.
    pub kind: FilterKind,
}

impl FieldFilter {
    /// Create a filter.
    pub fn new(field: FieldId, level: FilterLevel, kind: FilterKind) -> Self {
        Self { field, level, kind }
    }

    /// Human-readable condition, using the field to format values.
    pub fn describe(&self, field: &Field) -> String {
        match &self.kind {
            FilterKind::Equal(v) => field.format(v),
            FilterKind::Range { min, max } => {
                format!("{}..{}", field.format(min), field.format(max))
            }
            FilterKind::Expression { text, .. } => text.clone(),
        }
    }
}

/// The active filters of a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    filters: Vec<FieldFilter>,
}

impl FilterSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the filters the same level holds on the same field.
    pub fn set(&mut self, filter: FieldFilter) {
        self.reset_field(filter.field, filter.level);
        self.filters.push(filter);
    }

    /// Add a filter without clearing existing ones. Filters on the same field and
    /// level are AND-ed.
    pub fn add(&mut self, filter: FieldFilter) {
        self.filters.push(filter);
    }

    /// Remove one field's filters at a level.
    pub fn reset_field(&mut self, field: FieldId, level: FilterLevel) {
        self.filters
            .retain(|f| !(f.field == field && f.level == level));
    }

    /// Remove every filter of a level.
    pub fn reset(&mut self, level: FilterLevel) {
        self.filters.retain(|f| f.level != level);
    }

    /// Remove every filter.
    pub fn clear(&mut self) {
        self.filters.clear();
    }

    /// True if no filter is active.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Number of active filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Active filters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldFilter> {
        self.filters.iter()
    }

    /// Filters on one field, any level.
    pub fn for_field(&self, field: FieldId) -> impl Iterator<Item = &FieldFilter> {
        self.filters.iter().filter(move |f| f.field == field)
    }

    /// Active filters grouped by level, levels in ascending order.
    pub fn groups(&self) -> Vec<(FilterLevel, Vec<&FieldFilter>)> {
        let mut levels: Vec<FilterLevel> = self.filters.iter().map(|f| f.level).collect();
        levels.sort();
        levels.dedup();
        levels
            .into_iter()
            .map(|level| {
                let members = self.filters.iter().filter(|f| f.level == level).collect();
                (level, members)
            })
            .collect()
    }

    /// Description of the active filters, e.g. `Code: A001, Qty: 10..20`.
    pub fn describe(&self, fields: &[Field]) -> String {
        self.filters
            .iter()
            .filter_map(|f| {
                fields
                    .get(f.field.index())
                    .map(|field| format!("{}: {}", field.name(), f.describe(field)))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
