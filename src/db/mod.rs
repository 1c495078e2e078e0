//! Relation store: SQLite persistence for function definitions, call sites
//! and file dependencies.
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::retry::RetryPolicy;

pub mod models;
pub mod queries;
pub mod store;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS function_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    function_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line_number INTEGER,
    return_type TEXT,
    parameters TEXT,
    signature TEXT,
    project_name TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(function_name, file_path, project_name)
);

CREATE TABLE IF NOT EXISTS function_calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    caller_file TEXT NOT NULL,
    caller_function TEXT,
    caller_line INTEGER,
    called_function TEXT NOT NULL,
    called_file TEXT,
    project_name TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS file_dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_file TEXT NOT NULL,
    target_file TEXT NOT NULL,
    dependency_type TEXT,
    project_name TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(source_file, target_file, project_name)
);

CREATE INDEX IF NOT EXISTS idx_func_def_name ON function_definitions(function_name);
CREATE INDEX IF NOT EXISTS idx_func_def_file ON function_definitions(file_path);
CREATE INDEX IF NOT EXISTS idx_func_def_project ON function_definitions(project_name);
CREATE INDEX IF NOT EXISTS idx_func_calls_caller ON function_calls(caller_file);
CREATE INDEX IF NOT EXISTS idx_func_calls_caller_fn ON function_calls(caller_function);
CREATE INDEX IF NOT EXISTS idx_func_calls_called ON function_calls(called_function);
CREATE INDEX IF NOT EXISTS idx_func_calls_project ON function_calls(project_name);
CREATE INDEX IF NOT EXISTS idx_file_deps_source ON file_dependencies(source_file);
CREATE INDEX IF NOT EXISTS idx_file_deps_target ON file_dependencies(target_file);
"#;

/// Where the store's connection comes from, which decides how it can be
/// re-established.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
    /// Supplied by the caller; cannot be reopened here.
    External,
}

/// SQLite-backed relation store.
///
/// Callers must serialise analyzer runs against one store. When the
/// connection is gone, one reconnection round (per the retry policy) is
/// attempted: writes then fail with [`StoreError::Unavailable`], reads
/// return an empty result.
pub struct RelationStore {
    conn: Option<Connection>,
    location: Location,
    retry: RetryPolicy,
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

fn connect(location: &Location) -> Result<Connection, StoreError> {
    let conn = match location {
        Location::File(path) => Connection::open(path)?,
        Location::Memory => Connection::open_in_memory()?,
        Location::External => {
            return Err(StoreError::Unavailable(
                "externally supplied connection was closed".to_string(),
            ));
        }
    };
    init_schema(&conn)?;
    Ok(conn)
}

impl RelationStore {
    /// Open (or create) the store at `path` and initialise the schema.
    pub fn open<P: AsRef<Path>>(path: P, retry: RetryPolicy) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Initializing relation store: {}", path.display());
        let location = Location::File(path.to_path_buf());
        let conn = connect(&location)?;
        Ok(Self {
            conn: Some(conn),
            location,
            retry,
        })
    }

    /// In-memory store, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let location = Location::Memory;
        let conn = connect(&location)?;
        Ok(Self {
            conn: Some(conn),
            location,
            retry: RetryPolicy::default(),
        })
    }

    /// Wrap a connection owned by someone else. The schema is created if
    /// missing; the connection is not reopened after [`close`](Self::close).
    pub fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Some(conn),
            location: Location::External,
            retry: RetryPolicy::default(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!("Error while closing relation store: {e}");
            }
        }
    }

    /// Connection for a write path, reconnecting if needed.
    pub(crate) fn writer(&mut self) -> Result<&mut Connection, StoreError> {
        if self.conn.is_none() {
            let location = self.location.clone();
            let conn = self
                .retry
                .run("relation store reconnect", |_| connect(&location))
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            info!("Relation store reconnected");
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("no connection".to_string()))
    }

    /// Run a read query, turning an unavailable store or a query failure
    /// into `T::default()`.
    pub(crate) fn read_or_default<T, F>(&mut self, what: &str, query: F) -> T
    where
        T: Default,
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = match self.writer() {
            Ok(conn) => conn,
            Err(e) => {
                error!("{what}: {e}");
                return T::default();
            }
        };
        match query(&*conn) {
            Ok(v) => v,
            Err(e) => {
                error!("{what} failed: {e}");
                T::default()
            }
        }
    }
}

impl Drop for RelationStore {
    fn drop(&mut self) {
        self.close();
    }
}
