use rusqlite::Connection;
use std::path::Path;
use tokio::task;
use crate::error::{Result, PortalError};

pub mod migrate;

const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA busy_timeout = 5000;";

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Path of the SQLite file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new database connection with the portal pragmas
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .map_err(PortalError::Database)?;

        // WAL for concurrent readers during a save; busy_timeout so two
        // simultaneous saves wait instead of failing with SQLITE_BUSY
        conn.execute_batch(CONNECTION_PRAGMAS)?;

        Ok(conn)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        task::spawn_blocking(move || {
            let mut conn = db.open_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PortalError::Io(std::io::Error::other(format!("database task failed: {}", e))))?
    }
}
