//! The cities a user is connected to, and how.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};
use super::query::{Query, Select, SortField};
use super::{atomically, ensure_exists, new_id, now};

const ENTITY: &str = "UserLocation";
const COLUMNS: &str = "user_locations.id, user_locations.user_id, user_locations.city_id, \
                       user_locations.status, user_locations.created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationStatus {
    BornThere,
    LivedPast,
    CurrentlyLiving,
}

impl LocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationStatus::BornThere => "BORN_THERE",
            LocationStatus::LivedPast => "LIVED_PAST",
            LocationStatus::CurrentlyLiving => "CURRENTLY_LIVING",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BORN_THERE" => Some(LocationStatus::BornThere),
            "LIVED_PAST" => Some(LocationStatus::LivedPast),
            "CURRENTLY_LIVING" => Some(LocationStatus::CurrentlyLiving),
            _ => None,
        }
    }
}

impl ToSql for LocationStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LocationStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        LocationStatus::from_str(s).ok_or_else(|| FromSqlError::Other(format!("unknown location status {s}").into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocation {
    pub id: String,
    pub user_id: String,
    pub city_id: String,
    pub status: LocationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUserLocation {
    pub id: Option<String>,
    pub user_id: String,
    pub city_id: String,
    pub status: LocationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct UserLocationFilter {
    pub user_id: Option<String>,
    pub city_id: Option<String>,
    pub status: Option<LocationStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserLocationSort {
    #[default]
    CreatedAt,
    Status,
}

impl SortField for UserLocationSort {
    fn column(&self) -> &'static str {
        match self {
            UserLocationSort::CreatedAt => "created_at",
            UserLocationSort::Status => "status",
        }
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<UserLocation> {
    Ok(UserLocation {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        city_id: row.get("city_id")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
    })
}

pub fn find_by_id(conn: &Connection, id: &str) -> DbResult<Option<UserLocation>> {
    let location = conn
        .query_row(&format!("SELECT {COLUMNS} FROM user_locations WHERE id = ?"), [id], from_row)
        .optional()?;
    Ok(location)
}

pub fn get(conn: &Connection, id: &str) -> DbResult<UserLocation> {
    find_by_id(conn, id)?.ok_or_else(|| DbError::not_found(ENTITY, id))
}

pub fn find_by_pair(conn: &Connection, user_id: &str, city_id: &str) -> DbResult<Option<UserLocation>> {
    let location = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM user_locations WHERE user_id = ? AND city_id = ?"),
            [user_id, city_id],
            from_row,
        )
        .optional()?;
    Ok(location)
}

fn select(filter: &UserLocationFilter) -> Select {
    let mut select = Select::new("user_locations", COLUMNS);
    select
        .eq("user_id", filter.user_id.clone())
        .eq("city_id", filter.city_id.clone())
        .eq("status", filter.status);
    select
}

pub fn find_many(
    conn: &Connection,
    filter: &UserLocationFilter,
    query: &Query<UserLocationSort>,
) -> DbResult<Vec<UserLocation>> {
    select(filter).fetch(conn, query, from_row)
}

pub fn count(conn: &Connection, filter: &UserLocationFilter) -> DbResult<u64> {
    select(filter).count(conn)
}

/// Every location of a user, oldest first.
pub fn for_user(conn: &Connection, user_id: &str) -> DbResult<Vec<UserLocation>> {
    let filter = UserLocationFilter {
        user_id: Some(user_id.to_string()),
        ..Default::default()
    };
    find_many(conn, &filter, &Query::all())
}

/// A user holds at most one location per city.
pub fn create(conn: &Connection, input: NewUserLocation) -> DbResult<UserLocation> {
    atomically(conn, |conn| {
        ensure_exists(conn, "users", &input.user_id, ENTITY, "userId")?;
        ensure_exists(conn, "cities", &input.city_id, ENTITY, "cityId")?;

        let location = UserLocation {
            id: input.id.unwrap_or_else(new_id),
            user_id: input.user_id,
            city_id: input.city_id,
            status: input.status,
            created_at: now(),
        };
        conn.execute(
            "INSERT INTO user_locations (id, user_id, city_id, status, created_at) VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![
                location.id,
                location.user_id,
                location.city_id,
                location.status,
                location.created_at,
            ],
        )?;
        tracing::debug!(user_id = %location.user_id, city_id = %location.city_id, status = location.status.as_str(), "added user location");
        Ok(location)
    })
}

pub fn update(conn: &Connection, id: &str, status: LocationStatus) -> DbResult<UserLocation> {
    let changed = conn.execute(
        "UPDATE user_locations SET status = ? WHERE id = ?",
        rusqlite::params![status, id],
    )?;
    if changed == 0 {
        return Err(DbError::not_found(ENTITY, id));
    }
    get(conn, id)
}

/// Change the status of the user's location in a city.
pub fn set_status(
    conn: &Connection,
    user_id: &str,
    city_id: &str,
    status: LocationStatus,
) -> DbResult<UserLocation> {
    let changed = conn.execute(
        "UPDATE user_locations SET status = ? WHERE user_id = ? AND city_id = ?",
        rusqlite::params![status, user_id, city_id],
    )?;
    if changed == 0 {
        return Err(DbError::not_found(ENTITY, format!("{user_id}/{city_id}")));
    }
    find_by_pair(conn, user_id, city_id)?.ok_or_else(|| DbError::not_found(ENTITY, format!("{user_id}/{city_id}")))
}

pub fn delete(conn: &Connection, id: &str) -> DbResult<()> {
    let removed = conn.execute("DELETE FROM user_locations WHERE id = ?", [id])?;
    if removed == 0 {
        return Err(DbError::not_found(ENTITY, id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::db::{cities, users, City, User};

    fn setup(conn: &Connection) -> (User, City) {
        let user = fixtures::user(conn, "local@example.com");
        let usa = fixtures::country(conn, "USA", "US");
        let austin = fixtures::city(conn, &usa, "Austin");
        (user, austin)
    }

    fn living(user: &User, city: &City) -> NewUserLocation {
        NewUserLocation {
            id: None,
            user_id: user.id.clone(),
            city_id: city.id.clone(),
            status: LocationStatus::CurrentlyLiving,
        }
    }

    #[test]
    fn test_second_location_in_same_city_rejected() {
        let conn = fixtures::conn();
        let (user, austin) = setup(&conn);
        create(&conn, living(&user, &austin)).unwrap();

        let err = create(
            &conn,
            NewUserLocation {
                status: LocationStatus::BornThere,
                ..living(&user, &austin)
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            DbError::UniqueConstraintViolation {
                entity: "UserLocation",
                key: "userId_cityId".to_string()
            }
        );
    }

    #[test]
    fn test_set_status_and_filter() {
        let conn = fixtures::conn();
        let (user, austin) = setup(&conn);
        create(&conn, living(&user, &austin)).unwrap();

        let moved = set_status(&conn, &user.id, &austin.id, LocationStatus::LivedPast).unwrap();
        assert_eq!(moved.status, LocationStatus::LivedPast);

        let filter = UserLocationFilter {
            status: Some(LocationStatus::LivedPast),
            ..Default::default()
        };
        assert_eq!(count(&conn, &filter).unwrap(), 1);
        assert_eq!(for_user(&conn, &user.id).unwrap(), vec![moved]);
    }

    #[test]
    fn test_set_status_missing() {
        let conn = fixtures::conn();
        let (user, austin) = setup(&conn);
        let err = set_status(&conn, &user.id, &austin.id, LocationStatus::BornThere).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unknown_city_rejected() {
        let conn = fixtures::conn();
        let (user, austin) = setup(&conn);
        let err = create(
            &conn,
            NewUserLocation {
                city_id: "nowhere".to_string(),
                ..living(&user, &austin)
            },
        )
        .unwrap_err();
        assert_eq!(err, DbError::foreign_key("UserLocation", "cityId"));
    }

    #[test]
    fn test_locations_cascade_with_user_and_city() {
        let conn = fixtures::conn();
        let (user, austin) = setup(&conn);
        create(&conn, living(&user, &austin)).unwrap();
        users::delete(&conn, &user.id).unwrap();
        assert_eq!(count(&conn, &UserLocationFilter::default()).unwrap(), 0);

        let other = fixtures::user(&conn, "other@example.com");
        create(&conn, living(&other, &austin)).unwrap();
        cities::delete(&conn, &austin.id).unwrap();
        assert_eq!(count(&conn, &UserLocationFilter::default()).unwrap(), 0);
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&LocationStatus::CurrentlyLiving).unwrap();
        assert_eq!(json, "\"CURRENTLY_LIVING\"");
        assert_eq!(LocationStatus::from_str("BORN_THERE"), Some(LocationStatus::BornThere));
        assert_eq!(LocationStatus::from_str("born_there"), None);
    }
}
