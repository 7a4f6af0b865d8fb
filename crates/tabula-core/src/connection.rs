//! The driver contract.
//!
//! A [`Connection`] is a synchronous handle to one physical database session. It
//! executes literal SQL with positional parameters and manages one transaction at
//! a time. Parameters and results are *native* values; translating them to and
//! from logical field values is the dialect's job.

use crate::error::Result;
use crate::row::DbTable;
use crate::value::Value;

/// A synchronous database connection.
pub trait Connection: Send {
    /// Run a statement that returns rows and buffer all of them.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<DbTable>;

    /// Run a statement that returns no rows. Returns the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Identity value generated by the most recent insert on this connection.
    fn last_insert_id(&mut self) -> Result<i64>;

    /// Start a transaction.
    fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Open a second session to the same database for reading while this one
    /// holds an open transaction.
    ///
    /// Returns `Ok(None)` when the backend cannot read concurrently from a
    /// second session; callers then read on this connection.
    fn open_reader(&mut self) -> Result<Option<Box<dyn Connection>>> {
        Ok(None)
    }

    /// Release the session. Further calls fail.
    fn close(&mut self) -> Result<()>;
}
