//! SQLite connection pool.
//!
//! A fixed set of `rusqlite` connections behind a mutex. `acquire` blocks on
//! a condition variable while every connection is checked out; the guard
//! puts its connection back and wakes one waiter when dropped.

use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use serde_json::{Number, Value};
use tracing::{debug, info};

use super::{Connection, ExecError, ExecResult, Pool};
use crate::compile::OutputColumn;
use crate::field::ScanTarget;

pub struct SqlitePool {
    idle: Mutex<Vec<rusqlite::Connection>>,
    available: Condvar,
    size: usize,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").field("size", &self.size).finish()
    }
}

impl SqlitePool {
    /// Open `size` connections to the database file at `path`.
    pub fn open(path: &Path, size: usize) -> ExecResult<Self> {
        let size = size.max(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = rusqlite::Connection::open(path)
                .map_err(|e| ExecError::Pool(format!("opening {}: {}", path.display(), e)))?;
            connections.push(conn);
        }
        info!(path = %path.display(), size, "opened sqlite pool");
        Ok(Self::from_connections(connections))
    }

    /// A single-connection pool over a private in-memory database.
    pub fn open_in_memory() -> ExecResult<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| ExecError::Pool(format!("opening in-memory database: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self::from_connections(vec![conn])
    }

    fn from_connections(connections: Vec<rusqlite::Connection>) -> Self {
        let size = connections.len();
        Self {
            idle: Mutex::new(connections),
            available: Condvar::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run a batch of statements (schema setup, fixtures) on one connection.
    pub fn execute_batch(&self, sql: &str) -> ExecResult<()> {
        let guard = self.checkout()?;
        let conn = guard.conn()?;
        conn.execute_batch(sql)
            .map_err(|e| ExecError::database(sql, e))
    }

    fn lock(&self) -> ExecResult<MutexGuard<'_, Vec<rusqlite::Connection>>> {
        self.idle
            .lock()
            .map_err(|_| ExecError::Pool("pool lock poisoned".into()))
    }

    fn checkout(&self) -> ExecResult<PooledConnection<'_>> {
        let mut idle = self.lock()?;
        loop {
            if let Some(conn) = idle.pop() {
                return Ok(PooledConnection {
                    pool: self,
                    conn: Some(conn),
                });
            }
            debug!("waiting for a free connection");
            idle = self
                .available
                .wait(idle)
                .map_err(|_| ExecError::Pool("pool lock poisoned".into()))?;
        }
    }

    fn release(&self, conn: rusqlite::Connection) {
        // A poisoned pool drops the connection instead of returning it
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
            self.available.notify_one();
        }
    }
}

impl Pool for SqlitePool {
    fn acquire(&self) -> ExecResult<Box<dyn Connection + '_>> {
        Ok(Box::new(self.checkout()?))
    }
}

/// A connection on loan from a [`SqlitePool`].
struct PooledConnection<'p> {
    pool: &'p SqlitePool,
    conn: Option<rusqlite::Connection>,
}

impl PooledConnection<'_> {
    fn conn(&self) -> ExecResult<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| ExecError::Pool("connection already released".into()))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl Connection for PooledConnection<'_> {
    fn query(&mut self, sql: &str, columns: &[OutputColumn]) -> ExecResult<Vec<Vec<Value>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|e| ExecError::database(sql, e))?;
        let mut rows = stmt.query([]).map_err(|e| ExecError::database(sql, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| ExecError::database(sql, e))? {
            let mut values = Vec::with_capacity(columns.len());
            for column in columns {
                // By name, so custom query columns may be selected in any order
                let raw = row
                    .get_ref(column.label.as_str())
                    .map_err(|e| ExecError::database(sql, e))?;
                values.push(decode(column, raw)?);
            }
            out.push(values);
        }
        Ok(out)
    }
}

fn decode_error(column: &OutputColumn, message: impl Into<String>) -> ExecError {
    ExecError::Decode {
        column: column.path.clone(),
        message: message.into(),
    }
}

/// Convert one SQLite value to JSON according to the column's scan target.
fn decode(column: &OutputColumn, raw: ValueRef<'_>) -> ExecResult<Value> {
    let value = match (column.scan, raw) {
        (_, ValueRef::Null) => Value::Null,
        (_, ValueRef::Blob(_)) => return Err(decode_error(column, "unexpected blob")),

        (ScanTarget::Text, ValueRef::Text(bytes)) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        (ScanTarget::Text, ValueRef::Integer(i)) => Value::String(i.to_string()),
        (ScanTarget::Text, ValueRef::Real(f)) => Value::String(f.to_string()),

        (ScanTarget::Integer, ValueRef::Integer(i)) => Value::from(i),
        (ScanTarget::Integer, ValueRef::Real(f)) => Value::from(f as i64),
        (ScanTarget::Integer, ValueRef::Text(bytes)) => {
            let text = String::from_utf8_lossy(bytes);
            let n: i64 = text
                .trim()
                .parse()
                .map_err(|_| decode_error(column, format!("'{}' is not an integer", text)))?;
            Value::from(n)
        }

        (ScanTarget::Float, ValueRef::Integer(i)) => float(column, i as f64)?,
        (ScanTarget::Float, ValueRef::Real(f)) => float(column, f)?,
        (ScanTarget::Float, ValueRef::Text(bytes)) => {
            let text = String::from_utf8_lossy(bytes);
            let f: f64 = text
                .trim()
                .parse()
                .map_err(|_| decode_error(column, format!("'{}' is not a number", text)))?;
            float(column, f)?
        }

        (ScanTarget::Bool, ValueRef::Integer(i)) => Value::Bool(i != 0),
        (ScanTarget::Bool, ValueRef::Real(f)) => Value::Bool(f != 0.0),
        (ScanTarget::Bool, ValueRef::Text(bytes)) => match bytes {
            b"1" | b"true" => Value::Bool(true),
            b"0" | b"false" => Value::Bool(false),
            _ => return Err(decode_error(column, "not a boolean")),
        },
    };
    Ok(value)
}

fn float(column: &OutputColumn, f: f64) -> ExecResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| decode_error(column, "non-finite float"))
}
