//! Scripted connection double for catalog and DDL tests.

use tabula_core::{Connection, DbTable, Result, Value};

/// Answers queries from canned results and records every statement.
///
/// A query gets the result of the first registered pattern it contains, or an
/// empty result when none matches.
#[derive(Debug, Default)]
pub(crate) struct ScriptedConnection {
    responses: Vec<(String, DbTable)>,
    pub queries: Vec<String>,
    pub executed: Vec<String>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: &str, result: DbTable) -> Self {
        self.responses.push((pattern.to_string(), result));
        self
    }
}

impl Connection for ScriptedConnection {
    fn query(&mut self, sql: &str, _params: &[Value]) -> Result<DbTable> {
        self.queries.push(sql.to_string());
        Ok(self
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.executed.push(sql.to_string());
        Ok(0)
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        Ok(0)
    }

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
