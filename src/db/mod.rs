mod schema;
mod sqlite;

pub mod cities;
pub mod counters;
pub mod countries;
pub mod error;
pub mod list_likes;
pub mod list_places;
pub mod lists;
pub mod places;
pub mod query;
pub mod user_locations;
pub mod users;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

pub use cities::{City, CityFilter, CityPatch, CitySort, NewCity};
pub use counters::CounterDrift;
pub use countries::{Country, CountryFilter, CountryPatch, CountrySort, NewCountry};
pub use error::{DbError, DbResult};
pub use list_likes::{ListLike, ListLikeFilter, ListLikeSort};
pub use list_places::{ListPlace, ListPlaceFilter, ListPlacePatch, ListPlaceSort, NewListPlace, PlaceInList};
pub use lists::{List, ListFilter, ListPatch, ListSort, NewList};
pub use places::{NewPlace, Place, PlaceFilter, PlacePatch, PlaceSort};
pub use query::{OrderBy, Pagination, Query, SortDirection};
pub use schema::{SCHEMA, SCHEMA_VERSION, TABLES};
pub use sqlite::{initialize, open_in_memory, Database, PooledConnection};
pub use user_locations::{LocationStatus, NewUserLocation, UserLocation, UserLocationFilter, UserLocationSort};
pub use users::{NewUser, User, UserFilter, UserPatch, UserSort};

/// Run `f` atomically.
///
/// Outside a transaction a new one is opened and committed. It begins
/// `IMMEDIATE` so the write lock is held from the first read. When the
/// caller already holds a transaction, `f` runs inside a savepoint so a
/// failure only rolls back its own writes.
pub fn atomically<T>(conn: &Connection, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
    if conn.is_autocommit() {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        return Ok(value);
    }

    conn.execute_batch("SAVEPOINT placelist_write")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("RELEASE placelist_write")?;
            Ok(value)
        }
        Err(e) => {
            conn.execute_batch("ROLLBACK TO placelist_write; RELEASE placelist_write")?;
            Err(e)
        }
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Fail with `ForeignKeyViolation` unless `table` has a row with `id`.
pub(crate) fn ensure_exists(
    conn: &Connection,
    table: &str,
    id: &str,
    entity: &'static str,
    reference: &str,
) -> DbResult<()> {
    let found: Option<i64> = conn
        .query_row(&format!("SELECT 1 FROM {table} WHERE id = ?"), [id], |row| row.get(0))
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(DbError::foreign_key(entity, reference)),
    }
}

/// Fail with `ForeignKeyViolation` when dependent rows exist.
pub(crate) fn ensure_no_dependents(
    conn: &Connection,
    sql: &str,
    id: &str,
    entity: &'static str,
    reference: &str,
) -> DbResult<()> {
    let count: i64 = conn.query_row(sql, [id], |row| row.get(0))?;
    if count > 0 {
        tracing::debug!(entity, id, reference, count, "delete restricted by dependents");
        return Err(DbError::foreign_key(entity, reference));
    }
    Ok(())
}

pub(crate) fn require_text(field: &str, value: &str) -> DbResult<()> {
    if value.trim().is_empty() {
        return Err(DbError::validation(field, "must not be blank"));
    }
    Ok(())
}

pub(crate) fn check_lat(field: &str, lat: Option<f64>) -> DbResult<()> {
    match lat {
        Some(v) if !(-90.0..=90.0).contains(&v) => {
            Err(DbError::validation(field, "latitude must be within [-90, 90]"))
        }
        _ => Ok(()),
    }
}

pub(crate) fn check_lng(field: &str, lng: Option<f64>) -> DbResult<()> {
    match lng {
        Some(v) if !(-180.0..=180.0).contains(&v) => {
            Err(DbError::validation(field, "longitude must be within [-180, 180]"))
        }
        _ => Ok(()),
    }
}

/// Collects `column = ?` assignments for an UPDATE built from a patch.
pub(crate) struct Assignments {
    columns: Vec<&'static str>,
    params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl Assignments {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn set<V: rusqlite::ToSql + 'static>(&mut self, column: &'static str, value: Option<V>) {
        if let Some(value) = value {
            self.columns.push(column);
            self.params.push(Box::new(value));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Execute the UPDATE. Returns the number of rows touched.
    pub fn apply(mut self, conn: &Connection, table: &str, id: &str) -> DbResult<usize> {
        let set = self
            .columns
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        self.params.push(Box::new(id.to_string()));
        let sql = format!("UPDATE {table} SET {set} WHERE id = ?");
        let changed = conn.execute(&sql, rusqlite::params_from_iter(self.params.iter()))?;
        Ok(changed)
    }
}
