//! Verification and repair of the maintained counters.
//!
//! `like_count`, `place_count` and `list_count` are caches of join-row
//! counts. The write paths keep them in step; these routines recompute
//! them from the rows themselves.

use rusqlite::Connection;
use serde::Serialize;

use super::atomically;
use super::cities::{self, City};
use super::error::{DbError, DbResult};
use super::lists::{self, List};

struct Counter {
    entity: &'static str,
    table: &'static str,
    column: &'static str,
    field: &'static str,
    source_table: &'static str,
    source_column: &'static str,
}

impl Counter {
    fn actual_sql(&self) -> String {
        format!(
            "(SELECT COUNT(*) FROM {src} WHERE {src}.{fk} = {table}.id)",
            src = self.source_table,
            fk = self.source_column,
            table = self.table,
        )
    }

    fn recount(&self, conn: &Connection, id: Option<&str>) -> DbResult<usize> {
        let actual = self.actual_sql();
        let sql = format!(
            "UPDATE {table} SET {column} = {actual} WHERE {column} != {actual}",
            table = self.table,
            column = self.column,
        );
        let changed = match id {
            Some(id) => conn.execute(&format!("{sql} AND id = ?"), [id])?,
            None => conn.execute(&sql, [])?,
        };
        Ok(changed)
    }
}

const COUNTERS: &[Counter] = &[
    Counter {
        entity: "List",
        table: "lists",
        column: "like_count",
        field: "likeCount",
        source_table: "list_likes",
        source_column: "list_id",
    },
    Counter {
        entity: "List",
        table: "lists",
        column: "place_count",
        field: "placeCount",
        source_table: "list_places",
        source_column: "list_id",
    },
    Counter {
        entity: "City",
        table: "cities",
        column: "list_count",
        field: "listCount",
        source_table: "lists",
        source_column: "city_id",
    },
];

/// A stored counter that disagrees with its source rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDrift {
    pub entity: &'static str,
    pub id: String,
    pub field: &'static str,
    pub stored: i64,
    pub actual: i64,
}

/// Every counter whose stored value differs from a fresh count.
pub fn verify(conn: &Connection) -> DbResult<Vec<CounterDrift>> {
    let mut drift = Vec::new();
    for counter in COUNTERS {
        let sql = format!(
            "SELECT id, stored, actual FROM (
                 SELECT {table}.id AS id, {table}.{column} AS stored, {actual} AS actual FROM {table}
             ) WHERE stored != actual ORDER BY id",
            table = counter.table,
            column = counter.column,
            actual = counter.actual_sql(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(CounterDrift {
                entity: counter.entity,
                id: row.get(0)?,
                field: counter.field,
                stored: row.get(1)?,
                actual: row.get(2)?,
            })
        })?;
        for row in rows {
            let row = row?;
            tracing::warn!(
                entity = row.entity,
                id = %row.id,
                field = row.field,
                stored = row.stored,
                actual = row.actual,
                "counter drift"
            );
            drift.push(row);
        }
    }
    Ok(drift)
}

/// Recompute every counter in one transaction. Returns the number of
/// counter values that changed.
pub fn repair(conn: &Connection) -> DbResult<usize> {
    let changed = atomically(conn, |conn| {
        COUNTERS
            .iter()
            .try_fold(0usize, |total, counter| -> DbResult<usize> {
                Ok(total + counter.recount(conn, None)?)
            })
    })?;
    tracing::info!("Repaired {} counter value(s)", changed);
    Ok(changed)
}

/// Recompute `likeCount` and `placeCount` of one list.
pub fn recount_list(conn: &Connection, list_id: &str) -> DbResult<List> {
    atomically(conn, |conn| {
        let list = lists::get(conn, list_id)?;
        for counter in COUNTERS.iter().filter(|c| c.table == "lists") {
            counter.recount(conn, Some(&list.id))?;
        }
        lists::get(conn, list_id)
    })
}

/// Recompute `listCount` of one city.
pub fn recount_city(conn: &Connection, city_id: &str) -> DbResult<City> {
    atomically(conn, |conn| {
        let city = cities::get(conn, city_id)?;
        for counter in COUNTERS.iter().filter(|c| c.table == "cities") {
            counter.recount(conn, Some(&city.id))?;
        }
        cities::get(conn, city_id)
    })
}

/// Fail unless every counter matches its source rows.
pub fn ensure_consistent(conn: &Connection) -> DbResult<()> {
    match verify(conn)?.first() {
        None => Ok(()),
        Some(drift) => Err(DbError::validation(
            drift.field,
            format!(
                "{} {} stores {} but has {}",
                drift.entity, drift.id, drift.stored, drift.actual
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::db::{list_likes, list_places, NewListPlace};

    fn corrupted(conn: &Connection) -> (List, City) {
        let user = fixtures::user(conn, "u@example.com");
        let usa = fixtures::country(conn, "USA", "US");
        let austin = fixtures::city(conn, &usa, "Austin");
        let list = fixtures::list(conn, &user, &austin, "Tacos");
        let place = fixtures::place(conn, &austin, "g-1");
        list_places::add_place(conn, NewListPlace::new(&list.id, &place.id)).unwrap();
        list_likes::like(conn, &user.id, &list.id).unwrap();

        conn.execute(
            "UPDATE lists SET like_count = 7, place_count = 0 WHERE id = ?",
            [&list.id],
        )
        .unwrap();
        conn.execute("UPDATE cities SET list_count = 3 WHERE id = ?", [&austin.id])
            .unwrap();
        (list, austin)
    }

    #[test]
    fn test_consistent_after_normal_writes() {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "u@example.com");
        let usa = fixtures::country(&conn, "USA", "US");
        let austin = fixtures::city(&conn, &usa, "Austin");
        let list = fixtures::list(&conn, &user, &austin, "Tacos");
        list_likes::like(&conn, &user.id, &list.id).unwrap();

        assert!(verify(&conn).unwrap().is_empty());
        assert!(ensure_consistent(&conn).is_ok());
    }

    #[test]
    fn test_verify_reports_drift() {
        let conn = fixtures::conn();
        let (list, austin) = corrupted(&conn);
        let drift = verify(&conn).unwrap();
        assert_eq!(
            drift,
            vec![
                CounterDrift {
                    entity: "List",
                    id: list.id.clone(),
                    field: "likeCount",
                    stored: 7,
                    actual: 1,
                },
                CounterDrift {
                    entity: "List",
                    id: list.id.clone(),
                    field: "placeCount",
                    stored: 0,
                    actual: 1,
                },
                CounterDrift {
                    entity: "City",
                    id: austin.id.clone(),
                    field: "listCount",
                    stored: 3,
                    actual: 1,
                },
            ]
        );
        assert!(ensure_consistent(&conn).is_err());
    }

    #[test]
    fn test_repair_restores_counts() {
        let conn = fixtures::conn();
        let (list, austin) = corrupted(&conn);

        assert_eq!(repair(&conn).unwrap(), 3);
        assert!(verify(&conn).unwrap().is_empty());
        assert_eq!(repair(&conn).unwrap(), 0);

        let list = lists::get(&conn, &list.id).unwrap();
        assert_eq!((list.like_count, list.place_count), (1, 1));
        assert_eq!(cities::get(&conn, &austin.id).unwrap().list_count, 1);
    }

    #[test]
    fn test_recount_single_parent() {
        let conn = fixtures::conn();
        let (list, austin) = corrupted(&conn);

        let list = recount_list(&conn, &list.id).unwrap();
        assert_eq!((list.like_count, list.place_count), (1, 1));
        // The city is untouched until recounted itself.
        assert_eq!(verify(&conn).unwrap().len(), 1);

        assert_eq!(recount_city(&conn, &austin.id).unwrap().list_count, 1);
        assert!(verify(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_recount_missing_list() {
        let conn = fixtures::conn();
        assert!(recount_list(&conn, "missing").unwrap_err().is_not_found());
    }
}
