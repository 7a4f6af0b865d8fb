//! The unit of work.
//!
//! A [`Database`] owns one primary connection with at most one open write
//! transaction. The transaction starts with the first write and ends only when the
//! caller commits or rolls back. Cursor queries issued while the transaction is
//! open run on secondary reader connections when the driver offers them, so an
//! open cursor never blocks the writer. Readers and temporary tables are released
//! deterministically by [`Database::disconnect`], or best-effort on drop.

use std::sync::Arc;

use tabula_core::{Connection, DbTable, Error, Result, Value};
use tabula_query::{DialectKind, SqlDialect};
use tabula_schema::{
    CompileMode, CompileReport, DdlGenerator, SchemaCompiler, TableDef, database_check,
    generator_for,
};

use crate::table::Table;

/// Default number of rows fetched per cursor page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Handle of an open reader connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(u64);

/// A dialect-bound unit of work over one connection.
pub struct Database {
    conn: Box<dyn Connection>,
    dialect: Arc<dyn SqlDialect>,
    ddl: Box<dyn DdlGenerator>,
    in_transaction: bool,
    readers: Vec<(ReaderId, Box<dyn Connection>)>,
    next_reader: u64,
    temporaries: Vec<String>,
    temp_seq: usize,
    page_size: usize,
    compile_mode: CompileMode,
    closed: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect.kind())
            .field("in_transaction", &self.in_transaction)
            .field("readers", &self.readers.len())
            .field("temporaries", &self.temporaries)
            .field("page_size", &self.page_size)
            .field("compile_mode", &self.compile_mode)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Database {
    /// Wrap a connection speaking `dialect`.
    pub fn new(dialect: Arc<dyn SqlDialect>, conn: Box<dyn Connection>) -> Self {
        let ddl = generator_for(dialect.kind());
        Self {
            conn,
            dialect,
            ddl,
            in_transaction: false,
            readers: Vec::new(),
            next_reader: 0,
            temporaries: Vec::new(),
            temp_seq: 0,
            page_size: DEFAULT_PAGE_SIZE,
            compile_mode: CompileMode::Normal,
            closed: false,
        }
    }

    /// Rows per cursor page. Zero is treated as one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Mode used by [`Database::compile`].
    #[must_use]
    pub fn with_compile_mode(mut self, mode: CompileMode) -> Self {
        self.compile_mode = mode;
        self
    }

    /// The SQL dialect.
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// The dialect kind.
    pub fn kind(&self) -> DialectKind {
        self.dialect.kind()
    }

    /// Rows per cursor page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The schema compile mode.
    pub fn compile_mode(&self) -> CompileMode {
        self.compile_mode
    }

    /// Whether a write transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Number of open reader connections.
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// Names of the temporary tables created in this unit of work.
    pub fn temporary_tables(&self) -> &[String] {
        &self.temporaries
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Connection("database is disconnected".to_string()));
        }
        Ok(())
    }

    /// Start the write transaction if none is open.
    pub fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.in_transaction {
            return Ok(());
        }
        tracing::info!("Beginning transaction");
        self.conn.begin()?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the write transaction, if any.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.in_transaction {
            return Ok(());
        }
        tracing::info!("Committing transaction");
        self.conn.commit()?;
        self.in_transaction = false;
        Ok(())
    }

    /// Roll back the write transaction, if any. Readers are unaffected.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.in_transaction {
            return Ok(());
        }
        tracing::info!("Rolling back transaction");
        self.in_transaction = false;
        self.conn.rollback()
    }

    /// Run a query on the primary connection.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<DbTable> {
        self.ensure_open()?;
        tracing::debug!(sql = %sql, params = params.len(), "Executing query");
        self.conn.query(sql, params)
    }

    /// Run a write statement inside the transaction, starting it if needed.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.begin()?;
        tracing::debug!(sql = %sql, params = params.len(), "Executing statement");
        self.conn.execute(sql, params)
    }

    /// Run a write statement that returns rows (`OUTPUT INSERTED`).
    pub(crate) fn execute_returning(&mut self, sql: &str, params: &[Value]) -> Result<DbTable> {
        self.begin()?;
        tracing::debug!(sql = %sql, params = params.len(), "Executing statement");
        self.conn.query(sql, params)
    }

    /// Identity generated by the last insert on the primary connection.
    pub fn last_insert_id(&mut self) -> Result<i64> {
        self.ensure_open()?;
        self.conn.last_insert_id()
    }

    fn open_reader(&mut self) -> Result<Option<ReaderId>> {
        match self.conn.open_reader()? {
            Some(reader) => {
                self.next_reader += 1;
                let id = ReaderId(self.next_reader);
                tracing::debug!(reader = id.0, "Opened reader connection");
                self.readers.push((id, reader));
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Run a cursor query.
    ///
    /// While a write transaction is open, unlocked cursor queries go to a reader
    /// connection bound to `reader`, opened on first use.
    pub(crate) fn query_cursor(
        &mut self,
        reader: &mut Option<ReaderId>,
        lock: bool,
        sql: &str,
        params: &[Value],
    ) -> Result<DbTable> {
        self.ensure_open()?;
        if reader.is_none() && self.in_transaction && !lock {
            *reader = self.open_reader()?;
        }
        let Some(id) = *reader else {
            return self.query(sql, params);
        };
        let conn = self
            .readers
            .iter_mut()
            .find(|(rid, _)| *rid == id)
            .map(|(_, conn)| conn)
            .ok_or_else(|| Error::State(format!("reader {} is closed", id.0)))?;
        tracing::debug!(sql = %sql, params = params.len(), reader = id.0, "Executing query");
        conn.query(sql, params)
    }

    /// Close a reader connection. Failures are logged.
    pub(crate) fn close_reader(&mut self, id: ReaderId) {
        if let Some(pos) = self.readers.iter().position(|(rid, _)| *rid == id) {
            let (_, mut conn) = self.readers.swap_remove(pos);
            if let Err(e) = conn.close() {
                tracing::warn!(reader = id.0, error = %e, "Failed to close reader connection");
            } else {
                tracing::debug!(reader = id.0, "Closed reader connection");
            }
        }
    }

    /// Reconcile the live schema of one table with its declaration.
    ///
    /// Changes run inside the write transaction, which is begun only when there
    /// is something to run; the caller commits.
    #[tracing::instrument(level = "debug", skip(self, def), fields(table = %def.name))]
    pub fn compile(&mut self, def: &TableDef) -> Result<CompileReport> {
        self.ensure_open()?;
        let plan = SchemaCompiler::new(self.compile_mode).prepare(
            self.conn.as_mut(),
            self.dialect.as_ref(),
            def,
        )?;
        if plan.has_statements() {
            self.begin()?;
        }
        plan.execute(self.conn.as_mut())
    }

    /// Compile the declaration of `table`.
    pub fn compile_table(&mut self, table: &Table) -> Result<CompileReport> {
        table.check_definition()?;
        let def = table.table_def(self.dialect.as_ref())?;
        self.compile(&def)
    }

    /// Live tables that are not in `declared`.
    pub fn database_check(&mut self, declared: &[String]) -> Result<Vec<String>> {
        self.ensure_open()?;
        database_check(self.conn.as_mut(), self.dialect.as_ref(), declared)
    }

    /// Create a session-scoped copy of `table` and point `table` at it.
    ///
    /// The copy is dropped by [`Database::disconnect`].
    #[tracing::instrument(level = "debug", skip(self, table), fields(table = %table.name()))]
    pub fn create_temporary(&mut self, table: &mut Table) -> Result<()> {
        self.ensure_open()?;
        table.check_definition()?;
        let mut def = table.table_def(self.dialect.as_ref())?;
        self.temp_seq += 1;
        def.name = self.ddl.temporary_name(table.name(), self.temp_seq);
        for sql in self.ddl.create_temporary(&def) {
            tracing::debug!(sql = %sql, "Creating temporary table");
            self.conn.execute(&sql, &[])?;
        }
        tracing::info!(table = %table.name(), temporary = %def.name, "Created temporary table");
        table.set_physical_name(def.name.clone());
        self.temporaries.push(def.name);
        Ok(())
    }

    /// End the unit of work.
    ///
    /// Closes readers, drops temporary tables and rolls back an uncommitted
    /// transaction; those cleanup failures are logged. Only the failure to close
    /// the primary connection is returned. Calling it again does nothing.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn disconnect(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        for id in self.readers.iter().map(|(id, _)| *id).collect::<Vec<_>>() {
            self.close_reader(id);
        }
        for name in std::mem::take(&mut self.temporaries) {
            let sql = self.ddl.drop_temporary(&name);
            if let Err(e) = self.conn.execute(&sql, &[]) {
                tracing::warn!(table = %name, error = %e, "Failed to drop temporary table");
            }
        }
        if self.in_transaction {
            self.in_transaction = false;
            tracing::info!("Rolling back uncommitted transaction at disconnect");
            if let Err(e) = self.conn.rollback() {
                tracing::warn!(error = %e, "Rollback at disconnect failed");
            }
        }
        self.closed = true;
        self.conn.close()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::warn!(error = %e, "Failed to close connection");
        }
    }
}
