//! SQLite connection handling: pool construction, per-connection pragmas,
//! and schema initialization.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use super::counters::{self, CounterDrift};
use super::error::{DbError, DbResult};
use super::schema::{SCHEMA, SCHEMA_VERSION, TABLES};
use crate::config::DatabaseConfig;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pooled handle to the application database.
///
/// Repository functions take a plain `&Connection`; borrow one with
/// [`Database::conn`] or run several calls in one transaction with
/// [`Database::transaction`].
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

fn configure(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> DbResult<Self> {
        Self::open_path(&config.path, config.pool_size, config.busy_timeout())
    }

    pub fn open_path(path: &Path, pool_size: u32, busy_timeout: Duration) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::Storage(format!("creating {}: {e}", parent.display())))?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            configure(conn, busy_timeout)?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        tracing::info!("Opened database at {:?} (pool size {})", path, pool_size.max(1));
        Ok(Self { pool })
    }

    pub fn initialize(&self) -> DbResult<()> {
        let conn = self.conn()?;
        initialize(&conn)
    }

    pub fn conn(&self) -> DbResult<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside one transaction on a pooled connection.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let conn = self.conn()?;
        super::atomically(&conn, f)
    }

    /// Row count per table, parents first.
    pub fn table_counts(&self) -> DbResult<Vec<(&'static str, u64)>> {
        let conn = self.conn()?;
        TABLES
            .iter()
            .map(|table| -> DbResult<(&'static str, u64)> {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                Ok((*table, count as u64))
            })
            .collect()
    }

    pub fn verify_counters(&self) -> DbResult<Vec<CounterDrift>> {
        let conn = self.conn()?;
        counters::verify(&conn)
    }

    pub fn repair_counters(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        counters::repair(&conn)
    }
}

/// Create the schema if needed and record its version.
pub fn initialize(conn: &Connection) -> DbResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(DbError::Storage(format!(
            "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    conn.execute_batch(SCHEMA)?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
        tracing::info!("Database schema upgraded from version {} to {}", version, SCHEMA_VERSION);
    }
    Ok(())
}

/// Private in-memory database with the schema applied.
pub fn open_in_memory() -> DbResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, Duration::from_secs(5))?;
    initialize(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99").unwrap();
        assert!(matches!(initialize(&conn), Err(DbError::Storage(_))));
    }

    #[test]
    fn test_file_database_shares_rows_across_pool() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("nested/placelist.db"), 2, Duration::from_secs(1))
            .unwrap();
        db.initialize().unwrap();

        db.transaction(|conn| {
            crate::db::fixtures::user(conn, "pool@example.com");
            Ok(())
        })
        .unwrap();

        let counts = db.table_counts().unwrap();
        assert_eq!(counts[0], ("users", 1));
        assert!(db.verify_counters().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_writers_are_serialized() {
        use crate::db::{atomically, fixtures, list_likes, lists, users};
        use std::sync::mpsc;

        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("writers.db"), 2, Duration::from_secs(5)).unwrap();
        db.initialize().unwrap();
        let (fan, first, second) = db
            .transaction(|conn| {
                let fan = fixtures::user(conn, "fan@example.com");
                let usa = fixtures::country(conn, "USA", "US");
                let austin = fixtures::city(conn, &usa, "Austin");
                let first = fixtures::list(conn, &fan, &austin, "Tacos");
                let second = fixtures::list(conn, &fan, &austin, "BBQ");
                Ok((fan, first, second))
            })
            .unwrap();

        let (ready_tx, ready_rx) = mpsc::channel();
        let other = db.clone();
        let (fan_id, second_id) = (fan.id.clone(), second.id.clone());
        let writer = std::thread::spawn(move || {
            ready_rx.recv().unwrap();
            let conn = other.conn().unwrap();
            list_likes::like(&conn, &fan_id, &second_id)
        });

        // Read first, let the other connection try to commit, then write.
        let conn = db.conn().unwrap();
        let liked = atomically(&conn, |conn| {
            users::get(conn, &fan.id)?;
            ready_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(200));
            list_likes::like(conn, &fan.id, &first.id)
        });

        assert!(liked.is_ok(), "{liked:?}");
        let other_liked = writer.join().unwrap();
        assert!(other_liked.is_ok(), "{other_liked:?}");
        assert_eq!(lists::get(&conn, &first.id).unwrap().like_count, 1);
        assert_eq!(lists::get(&conn, &second.id).unwrap().like_count, 1);
        assert!(db.verify_counters().unwrap().is_empty());
    }

    #[test]
    fn test_foreign_keys_enabled_on_pooled_connections() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("fk.db"), 1, Duration::from_secs(1)).unwrap();
        let conn = db.conn().unwrap();
        let enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(enabled, 1);
    }
}
