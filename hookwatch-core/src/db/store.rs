//! Datastore: the single SQLite connection and its locking discipline
//!
//! Every mutation runs under the exclusive side of an application-level
//! read/write lock and every query under the shared side. SQLite already
//! serialises writers in WAL mode; the extra lock keeps multi-statement
//! operations (upserts that read their own prior row) atomic relative to
//! other writers in this process.

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

/// Row counts and on-disk size reported by [`Database::table_counts`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TableCounts {
    pub shell_commands: i64,
    pub claude_commands: i64,
    pub user_messages: i64,
    pub notifications: i64,
    pub conversations: i64,
    pub command_stats: i64,
    /// Size of the main database file (0 for in-memory stores)
    pub db_size_bytes: u64,
}

impl TableCounts {
    /// Rows across every table
    pub fn total(&self) -> i64 {
        self.shell_commands
            + self.claude_commands
            + self.user_messages
            + self.notifications
            + self.conversations
            + self.command_stats
    }
}

/// Database handle wrapping one SQLite connection.
///
/// Constructed once at startup and shared by reference (`Arc<Database>`);
/// there is no process-wide instance.
pub struct Database {
    conn: Mutex<Connection>,
    gate: RwLock<()>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let existed = path.exists();
        let conn = Connection::open(path)?;

        // WAL for concurrent readers; NORMAL sync is durable enough for telemetry
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        if !existed {
            restrict_permissions(path)?;
        }

        tracing::debug!(path = %path.display(), created = !existed, "Opened database");

        Ok(Self {
            conn: Mutex::new(conn),
            gate: RwLock::new(()),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
            gate: RwLock::new(()),
            path: None,
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        self.write(super::schema::run_migrations)
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::LockPoisoned("database connection"))
    }

    /// Run a query under the shared lock.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _shared = self
            .gate
            .read()
            .map_err(|_| Error::LockPoisoned("database gate"))?;
        let conn = self.connection()?;
        f(&conn)
    }

    /// Run a mutation under the exclusive lock.
    pub fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _exclusive = self
            .gate
            .write()
            .map_err(|_| Error::LockPoisoned("database gate"))?;
        let conn = self.connection()?;
        f(&conn)
    }

    /// Run a closure inside one SQLite transaction under the exclusive lock.
    ///
    /// The transaction commits when the closure returns `Ok` and rolls back otherwise.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let _exclusive = self
            .gate
            .write()
            .map_err(|_| Error::LockPoisoned("database gate"))?;
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Verify the connection answers queries
    pub fn health_check(&self) -> Result<()> {
        self.read(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
    }

    /// Row counts per table plus the database file size
    pub fn table_counts(&self) -> Result<TableCounts> {
        let mut counts = self.read(|conn| {
            let count = |table: &str| -> Result<i64> {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                    r.get(0)
                })?)
            };
            Ok(TableCounts {
                shell_commands: count("shell_commands")?,
                claude_commands: count("claude_commands")?,
                user_messages: count("user_messages")?,
                notifications: count("notifications")?,
                conversations: count("conversations")?,
                command_stats: count("command_stats")?,
                db_size_bytes: 0,
            })
        })?;
        counts.db_size_bytes = self.size_bytes();
        Ok(counts)
    }

    /// Size of the main database file in bytes
    pub fn size_bytes(&self) -> u64 {
        self.path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Reclaim unused space and fold the WAL back into the main file
    pub fn vacuum(&self) -> Result<()> {
        self.write(|conn| {
            conn.execute_batch("VACUUM")?;
            if self.path.is_some() {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            }
            Ok(())
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // Command history may contain secrets; owner read/write only
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hookwatch.db");

        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        db.health_check().unwrap();

        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));

        let counts = db.table_counts().unwrap();
        assert_eq!(counts.shell_commands, 0);
        assert!(counts.db_size_bytes > 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_database_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hookwatch.db");
        let _db = Database::open(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();

        let result: Result<()> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO command_stats (command_type, command_name, last_executed_at, created_at, updated_at)
                 VALUES ('shell', 'git', 'x', 'x', 'x')",
                [],
            )?;
            Err(Error::Config("abort".to_string()))
        });
        assert!(result.is_err());

        assert_eq!(db.table_counts().unwrap().command_stats, 0);
    }

    #[test]
    fn test_vacuum_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.vacuum().unwrap();
    }
}
