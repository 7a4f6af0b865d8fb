//! WHERE clause assembly.
//!
//! Filters are grouped by level. Each level renders as one parenthesized group,
//! OR-joined for [`FilterLevel::Or`](crate::FilterLevel::Or) and AND-joined
//! otherwise; the groups are AND-ed together.

use tabula_core::{Error, Field, Result, Value};

use crate::dialect::SqlDialect;
use crate::expression::{CompareOp, FilterExpr};
use crate::filter::{FieldFilter, FilterKind, FilterSet};

/// Push a native parameter and return its placeholder.
pub fn bind(dialect: &dyn SqlDialect, params: &mut Vec<Value>, value: Value) -> String {
    params.push(value);
    dialect.placeholder(params.len())
}

/// Render `column <op> value` for a field, marshaling the value for the dialect.
pub fn render_condition(
    dialect: &dyn SqlDialect,
    field: &Field,
    op: CompareOp,
    value: &Value,
    params: &mut Vec<Value>,
) -> String {
    let column = dialect.quote_ident(field.column());
    if op.is_pattern() {
        let ph = bind(dialect, params, value.clone());
        format!("{column} {} {ph}{}", op.sql(), dialect.like_escape())
    } else {
        let column = dialect.comparable(field.field_type(), column);
        let native = dialect.to_sql_value(field.field_type(), value);
        let ph = bind(dialect, params, native);
        format!("{column} {} {ph}", op.sql())
    }
}

/// Render `column = value` for an UPDATE assignment.
pub fn render_assignment(
    dialect: &dyn SqlDialect,
    field: &Field,
    value: &Value,
    params: &mut Vec<Value>,
) -> String {
    let native = dialect.to_sql_value(field.field_type(), value);
    let ph = bind(dialect, params, native);
    format!("{} = {ph}", dialect.quote_ident(field.column()))
}

fn render_expr(
    dialect: &dyn SqlDialect,
    field: &Field,
    expr: &FilterExpr,
    params: &mut Vec<Value>,
) -> String {
    match expr {
        FilterExpr::Compare { op, value } => render_condition(dialect, field, *op, value, params),
        FilterExpr::And(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|e| render_expr(dialect, field, e, params))
                .collect();
            format!("({})", parts.join(" AND "))
        }
        FilterExpr::Or(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|e| render_expr(dialect, field, e, params))
                .collect();
            format!("({})", parts.join(" OR "))
        }
    }
}

fn render_filter(
    dialect: &dyn SqlDialect,
    fields: &[Field],
    filter: &FieldFilter,
    params: &mut Vec<Value>,
) -> Result<String> {
    let field = fields.get(filter.field.index()).ok_or_else(|| {
        Error::State(format!("filter refers to unknown field #{}", filter.field.index()))
    })?;
    Ok(match &filter.kind {
        FilterKind::Equal(v) => render_condition(dialect, field, CompareOp::Eq, v, params),
        FilterKind::Range { min, max } => {
            let lo = render_condition(dialect, field, CompareOp::Ge, min, params);
            let hi = render_condition(dialect, field, CompareOp::Le, max, params);
            format!("({lo} AND {hi})")
        }
        FilterKind::Expression { expr, .. } => render_expr(dialect, field, expr, params),
    })
}

/// Render the active filters as a WHERE condition (without the keyword).
///
/// Returns `None` when no filter is active. Parameters are appended to `params`
/// and numbered after the ones already there.
pub fn build_where(
    dialect: &dyn SqlDialect,
    fields: &[Field],
    filters: &FilterSet,
    params: &mut Vec<Value>,
) -> Result<Option<String>> {
    let mut groups = Vec::new();
    for (level, members) in filters.groups() {
        let mut parts = Vec::with_capacity(members.len());
        for filter in members {
            parts.push(render_filter(dialect, fields, filter, params)?);
        }
        let joiner = if level.is_disjunctive() { " OR " } else { " AND " };
        groups.push(format!("({})", parts.join(joiner)));
    }
    Ok(if groups.is_empty() {
        None
    } else {
        Some(groups.join(" AND "))
    })
}
