//! The table catalog.
//!
//! Hosts register one factory per table type. The catalog instantiates tables on
//! demand, checks declared relations once at collection time, and keeps the
//! inbound relation index that key renames cascade through.

use std::collections::HashMap;

use tabula_core::{Error, RelationCondition, Result};
use tabula_schema::CompileReport;

use crate::database::Database;
use crate::table::Table;

/// Builds a fresh instance of one table type.
pub type TableFactory = fn() -> Result<Table>;

/// A relation seen from its target table.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRelation {
    /// Table declaring the relation.
    pub source_table: String,
    /// Field holding the related value.
    pub source_field: String,
    /// Field of the target table the relation points at.
    pub target_field: String,
    /// Source-row conditions under which the relation holds.
    pub conditions: Vec<RelationCondition>,
    /// Whether renames of the target field propagate.
    pub cascade_rename: bool,
}

/// Registered table types and their relations.
#[derive(Debug, Default)]
pub struct Catalog {
    factories: Vec<(String, TableFactory)>,
    inbound: HashMap<String, Vec<InboundRelation>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table type. The declaration is checked immediately.
    pub fn register(&mut self, factory: TableFactory) -> Result<()> {
        let table = factory()?;
        table.check_definition()?;
        if self
            .factories
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(table.name()))
        {
            return Err(Error::Config(format!(
                "table '{}' is registered twice",
                table.name()
            )));
        }
        tracing::debug!(table = %table.name(), "Registered table");
        self.factories.push((table.name().to_string(), factory));
        Ok(())
    }

    /// Names of the registered tables, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.factories.iter().map(|(name, _)| name.clone()).collect()
    }

    /// A fresh instance of a registered table.
    pub fn table(&self, name: &str) -> Result<Table> {
        let (_, factory) = self
            .factories
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Relation(format!("table '{name}' is not registered")))?;
        factory()
    }

    /// Relations pointing at `table`.
    pub fn inbound(&self, table: &str) -> &[InboundRelation] {
        self.inbound
            .get(&table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve every declared relation and rebuild the inbound index.
    ///
    /// Fails if a relation names an unknown table, field or condition field, or if
    /// the related field's type or length differs from the source field's.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn collect(&mut self) -> Result<()> {
        let mut inbound: HashMap<String, Vec<InboundRelation>> = HashMap::new();
        for (name, factory) in &self.factories {
            let source = factory()?;
            for field in source.fields() {
                for relation in field.relations() {
                    let target = self.table(&relation.table).map_err(|_| {
                        Error::Relation(format!(
                            "{name}.{} relates to unknown table '{}'",
                            field.name(),
                            relation.table
                        ))
                    })?;
                    let target_id = match &relation.field {
                        Some(f) => target.field_id(f).map_err(|e| Error::Relation(e.to_string()))?,
                        None => *target.primary_key().first().ok_or_else(|| {
                            Error::NoPrimaryKey {
                                table: target.name().to_string(),
                            }
                        })?,
                    };
                    let target_field = target.get_field(target_id)?;
                    relation.check_compatible(
                        name,
                        field.name(),
                        field.field_type(),
                        target_field.name(),
                        target_field.field_type(),
                    )?;
                    for condition in &relation.conditions {
                        let id = source.field_id(&condition.field).map_err(|_| {
                            Error::Relation(format!(
                                "condition of {name}.{} names unknown field '{}'",
                                field.name(),
                                condition.field
                            ))
                        })?;
                        source.get_field(id)?.check_value(condition.value.clone())?;
                    }
                    inbound
                        .entry(target.name().to_ascii_lowercase())
                        .or_default()
                        .push(InboundRelation {
                            source_table: name.clone(),
                            source_field: field.name().to_string(),
                            target_field: target_field.name().to_string(),
                            conditions: relation.conditions.clone(),
                            cascade_rename: relation.cascade_rename,
                        });
                }
            }
        }
        tracing::info!(
            tables = self.factories.len(),
            relations = inbound.values().map(Vec::len).sum::<usize>(),
            "Collected table relations"
        );
        self.inbound = inbound;
        Ok(())
    }

    /// Compile every registered table, committing after each one.
    ///
    /// A failing table is rolled back and stops the run; tables compiled before it
    /// stay committed.
    #[tracing::instrument(level = "info", skip(self, db))]
    pub fn compile_all(&self, db: &mut Database) -> Result<Vec<CompileReport>> {
        let mut reports = Vec::with_capacity(self.factories.len());
        for (name, factory) in &self.factories {
            let table = factory()?;
            match db.compile_table(&table) {
                Ok(report) => {
                    db.commit()?;
                    reports.push(report);
                }
                Err(e) => {
                    tracing::warn!(table = %name, error = %e, "Schema compile failed");
                    if let Err(rollback) = db.rollback() {
                        tracing::warn!(error = %rollback, "Rollback after failed compile failed");
                    }
                    return Err(e);
                }
            }
        }
        Ok(reports)
    }

    /// Live tables that no registered table declares.
    pub fn database_check(&self, db: &mut Database) -> Result<Vec<String>> {
        db.database_check(&self.names())
    }
}
