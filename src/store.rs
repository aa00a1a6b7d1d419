// src/store.rs
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::EtudeResult;

/// The single capability the request state machine needs from the relational
/// store. Implementations must serialize concurrent callers; the state
/// machine runs on many worker threads at once.
pub trait CredentialStore: Send + Sync {
    /// Password column for an exact username match, or `None` when the user
    /// does not exist.
    fn find_password(&self, name: &str) -> EtudeResult<Option<String>>;

    /// Insert a new (name, password) row.
    fn insert_user(&self, name: &str, password: &str) -> EtudeResult<()>;
}

/// SQLite-backed credential store. A single connection guarded by a mutex;
/// both statements are parameterized, so caller-supplied bytes are never
/// spliced into SQL text.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> EtudeResult<Self> {
        Self::from_conn(Connection::open(path)?)
    }

    pub fn open_in_memory() -> EtudeResult<Self> {
        Self::from_conn(Connection::open_in_memory()?)
    }

    fn from_conn(conn: Connection) -> EtudeResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS webuser (
                user_name TEXT PRIMARY KEY,
                user_pswd TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CredentialStore for SqliteStore {
    fn find_password(&self, name: &str) -> EtudeResult<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let pswd = conn
            .query_row(
                "SELECT user_pswd FROM webuser WHERE user_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(pswd)
    }

    fn insert_user(&self, name: &str, password: &str) -> EtudeResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO webuser (user_name, user_pswd) VALUES (?1, ?2)",
            params![name, password],
        )?;
        Ok(())
    }
}
