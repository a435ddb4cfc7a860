//! SQLite-backed persistence for todos.
//!
//! # Design
//! `Store` is a cheaply cloneable handle holding only configuration and a
//! shut-down flag. It never caches a connection: every request asks for a
//! fresh `Session`, which owns at most one `rusqlite::Connection` and closes
//! it when dropped. Sessions connect lazily, so a request that is rejected
//! before touching the database performs no I/O at all.
//!
//! Writes go through `Session::transaction`, which hands the caller a
//! `UnitOfWork` and commits if the closure returns `Ok`, or rolls back
//! explicitly if it returns `Err`.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::types::{NewTodo, Title, Todo, TodoPatch};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS todos (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title VARCHAR(255) NOT NULL CHECK (typeof(title) = 'text' AND length(title) <= 255),
  done BOOLEAN NOT NULL DEFAULT 0
);
"#;

const SELECT_TODO: &str = "SELECT id, title, done FROM todos";

/// Where the database lives and how each connection is tuned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Accepts a bare path or one prefixed with `sqlite://` / `sqlite:`.
    pub fn from_url(url: &str) -> Self {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Self::new(path)
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

/// Connection factory shared by all request handlers.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    config: StoreConfig,
    shut_down: AtomicBool,
}

impl Store {
    /// Creates a handle without touching the database. Call `init` before
    /// serving requests.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Creates the `todos` table if it does not exist yet.
    pub fn init(&self) -> StoreResult<()> {
        let started_at = Instant::now();
        let conn = self.connect(OpenFlags::SQLITE_OPEN_CREATE)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        info!(
            path = %self.inner.config.path.display(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "store initialised"
        );
        Ok(())
    }

    /// Stops handing out sessions. Sessions already in flight finish normally.
    pub fn shutdown(&self) {
        if !self.inner.shut_down.swap(true, Ordering::SeqCst) {
            info!(path = %self.inner.config.path.display(), "store shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Acquires a new request-scoped session. The connection is opened on
    /// first use.
    pub fn session(&self) -> StoreResult<Session> {
        if self.is_shut_down() {
            return Err(StoreError::ShutDown);
        }
        Ok(Session {
            store: self.clone(),
            conn: None,
            acquired_at: Instant::now(),
        })
    }

    /// Runs a trivial liveness query on a fresh connection.
    pub fn ping(&self) -> StoreResult<()> {
        self.session()?.ping()
    }

    /// Only `init` passes `SQLITE_OPEN_CREATE`; everything else requires the
    /// database file to already exist.
    fn connect(&self, extra: OpenFlags) -> StoreResult<Connection> {
        let config = &self.inner.config;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | extra;
        let conn = Connection::open_with_flags(&config.path, flags)?;
        conn.busy_timeout(config.busy_timeout)?;
        Ok(conn)
    }
}

/// A unit-of-work handle scoped to one request.
///
/// Dropping the session closes its connection, whatever path the request took.
pub struct Session {
    store: Store,
    conn: Option<Connection>,
    acquired_at: Instant,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn ping(&mut self) -> StoreResult<()> {
        let conn = self.connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// All todos in ascending id order.
    pub fn list_todos(&mut self) -> StoreResult<Vec<Todo>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("{SELECT_TODO} ORDER BY id ASC"))?;
        let todos = stmt
            .query_map([], todo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(todos)
    }

    pub fn find_todo(&mut self, id: i64) -> StoreResult<Option<Todo>> {
        let conn = self.connection()?;
        find_todo(conn, id)
    }

    /// Re-reads a todo that a committed transaction just wrote.
    pub fn reload_todo(&mut self, id: i64) -> StoreResult<Todo> {
        self.find_todo(id)?.ok_or(StoreError::Vanished { id })
    }

    /// Runs `work` inside a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// The closure may fail with any error type a `StoreError` converts into,
    /// so callers can abort with their own errors (a missing row, say) and
    /// still get the rollback.
    pub fn transaction<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: FnOnce(&UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError> + fmt::Display,
    {
        let conn = self.connection()?;
        let unit = UnitOfWork {
            tx: conn.transaction().map_err(StoreError::from)?,
        };
        match work(&unit) {
            Ok(value) => {
                unit.tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                match unit.tx.rollback() {
                    Ok(()) => debug!(error = %err, "transaction rolled back"),
                    Err(rollback_err) => {
                        warn!(error = %err, rollback_error = %rollback_err, "rollback failed")
                    }
                }
                Err(err)
            }
        }
    }

    fn connection(&mut self) -> StoreResult<&mut Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.store.connect(OpenFlags::empty())?,
        };
        Ok(self.conn.insert(conn))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let connected = self.conn.is_some();
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                warn!(error = %err, "failed to close store connection");
            }
        }
        debug!(
            connected,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "session released"
        );
    }
}

/// Statements available inside `Session::transaction`.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl UnitOfWork<'_> {
    /// Inserts a row and returns the id the store assigned.
    pub fn insert(&self, todo: &NewTodo) -> StoreResult<i64> {
        self.tx.execute(
            "INSERT INTO todos (title, done) VALUES (?1, ?2)",
            params![todo.title, todo.done],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn get(&self, id: i64) -> StoreResult<Option<Todo>> {
        find_todo(&self.tx, id)
    }

    /// Writes only the columns present in `patch`.
    pub fn apply(&self, id: i64, patch: &TodoPatch) -> StoreResult<()> {
        let mut assignments = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(title) = &patch.title {
            assignments.push("title = ?");
            values.push(title);
        }
        if let Some(done) = &patch.done {
            assignments.push("done = ?");
            values.push(done);
        }
        if assignments.is_empty() {
            return Ok(());
        }

        values.push(&id);
        let sql = format!("UPDATE todos SET {} WHERE id = ?", assignments.join(", "));
        self.tx.execute(&sql, values.as_slice())?;
        Ok(())
    }

    pub fn delete(&self, id: i64) -> StoreResult<()> {
        self.tx.execute("DELETE FROM todos WHERE id = ?1", params![id])?;
        Ok(())
    }
}

fn find_todo(conn: &Connection, id: i64) -> StoreResult<Option<Todo>> {
    let todo = conn
        .query_row(&format!("{SELECT_TODO} WHERE id = ?1"), params![id], todo_from_row)
        .optional()?;
    Ok(todo)
}

/// Text binds as TEXT. Structured JSON binds as a BLOB, which the schema's
/// `typeof` check rejects.
impl ToSql for Title {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Title::Text(text) => ToSqlOutput::from(text.as_str()),
            Title::Structured(json) => ToSqlOutput::Borrowed(ValueRef::Blob(json.as_bytes())),
            Title::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        done: row.get(2)?,
    })
}
