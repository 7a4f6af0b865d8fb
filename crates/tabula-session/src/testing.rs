//! Recording connection double for unit-of-work and cursor tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tabula_core::{Connection, DbTable, Result, Value};

/// Everything a [`RecordingConnection`] saw.
#[derive(Debug, Clone, Default)]
pub(crate) struct Log {
    pub queries: Vec<String>,
    pub executed: Vec<String>,
    pub params: Vec<Vec<Value>>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub readers_opened: usize,
    pub readers_closed: usize,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct Script {
    responses: Vec<(String, VecDeque<DbTable>)>,
    affected: VecDeque<u64>,
    last_insert_id: i64,
}

/// Shared state behind every connection opened from it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    log: Arc<Mutex<Log>>,
    script: Arc<Mutex<Script>>,
    readers: bool,
}

impl Recorder {
    /// Let the primary connection open reader connections.
    pub fn with_readers(mut self) -> Self {
        self.readers = true;
        self
    }

    /// Queue a result for the next query containing `pattern`.
    ///
    /// Results queued for the same pattern are returned in order; the last one
    /// repeats.
    pub fn respond(&self, pattern: &str, result: DbTable) {
        let mut script = self.script.lock().unwrap();
        if let Some((_, queue)) = script.responses.iter_mut().find(|(p, _)| p == pattern) {
            queue.push_back(result);
        } else {
            script
                .responses
                .push((pattern.to_string(), VecDeque::from([result])));
        }
    }

    /// Affected-row count of the next statement. Unscripted statements affect 1 row.
    pub fn affect(&self, rows: u64) {
        self.script.lock().unwrap().affected.push_back(rows);
    }

    pub fn set_last_insert_id(&self, id: i64) {
        self.script.lock().unwrap().last_insert_id = id;
    }

    pub fn log(&self) -> Log {
        self.log.lock().unwrap().clone()
    }
}

/// A connection that records statements and answers from a script.
#[derive(Debug)]
pub(crate) struct RecordingConnection {
    recorder: Recorder,
    reader: bool,
}

impl RecordingConnection {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            reader: false,
        }
    }
}

impl Connection for RecordingConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<DbTable> {
        {
            let mut log = self.recorder.log.lock().unwrap();
            log.queries.push(sql.to_string());
            log.params.push(params.to_vec());
        }
        let mut script = self.recorder.script.lock().unwrap();
        let result = script
            .responses
            .iter_mut()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .and_then(|(_, queue)| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });
        Ok(result.unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        {
            let mut log = self.recorder.log.lock().unwrap();
            log.executed.push(sql.to_string());
            log.params.push(params.to_vec());
        }
        Ok(self.recorder.script.lock().unwrap().affected.pop_front().unwrap_or(1))
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        Ok(self.recorder.script.lock().unwrap().last_insert_id)
    }

    fn begin(&mut self) -> Result<()> {
        self.recorder.log.lock().unwrap().begins += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.recorder.log.lock().unwrap().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.recorder.log.lock().unwrap().rollbacks += 1;
        Ok(())
    }

    fn open_reader(&mut self) -> Result<Option<Box<dyn Connection>>> {
        if !self.recorder.readers {
            return Ok(None);
        }
        self.recorder.log.lock().unwrap().readers_opened += 1;
        Ok(Some(Box::new(RecordingConnection {
            recorder: self.recorder.clone(),
            reader: true,
        })))
    }

    fn close(&mut self) -> Result<()> {
        let mut log = self.recorder.log.lock().unwrap();
        if self.reader {
            log.readers_closed += 1;
        } else {
            log.closed = true;
        }
        Ok(())
    }
}
