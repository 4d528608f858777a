//! Likes: one row per (user, list) pair.
//!
//! Liking and unliking move the list's `like_count` in the same
//! transaction as the row itself.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};
use super::query::{Query, Select, SortField};
use super::{atomically, ensure_exists, now};

const ENTITY: &str = "ListLike";
const COLUMNS: &str = "list_likes.user_id, list_likes.list_id, list_likes.created_at";
/// Unique key used for ordering ties and cursors. The user id is length
/// prefixed so ids containing the separator cannot collide.
const KEY: &str = "(length(list_likes.user_id) || ':' || list_likes.user_id || list_likes.list_id)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLike {
    pub user_id: String,
    pub list_id: String,
    pub created_at: DateTime<Utc>,
}

impl ListLike {
    /// Cursor naming this like for [`Query::after`].
    pub fn cursor(&self) -> String {
        format!("{}:{}{}", self.user_id.chars().count(), self.user_id, self.list_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListLikeFilter {
    pub user_id: Option<String>,
    pub list_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListLikeSort {
    #[default]
    CreatedAt,
}

impl SortField for ListLikeSort {
    fn column(&self) -> &'static str {
        match self {
            ListLikeSort::CreatedAt => "created_at",
        }
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ListLike> {
    Ok(ListLike {
        user_id: row.get("user_id")?,
        list_id: row.get("list_id")?,
        created_at: row.get("created_at")?,
    })
}

fn pair_id(user_id: &str, list_id: &str) -> String {
    format!("{user_id}/{list_id}")
}

fn adjust_like_count(conn: &Connection, list_id: &str, delta: i64) -> DbResult<()> {
    conn.execute(
        "UPDATE lists SET like_count = like_count + ?1 WHERE id = ?2",
        rusqlite::params![delta, list_id],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, user_id: &str, list_id: &str) -> DbResult<Option<ListLike>> {
    let like = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM list_likes WHERE user_id = ? AND list_id = ?"),
            [user_id, list_id],
            from_row,
        )
        .optional()?;
    Ok(like)
}

pub fn get(conn: &Connection, user_id: &str, list_id: &str) -> DbResult<ListLike> {
    find(conn, user_id, list_id)?.ok_or_else(|| DbError::not_found(ENTITY, pair_id(user_id, list_id)))
}

pub fn is_liked(conn: &Connection, user_id: &str, list_id: &str) -> DbResult<bool> {
    Ok(find(conn, user_id, list_id)?.is_some())
}

fn select(filter: &ListLikeFilter) -> Select {
    let mut select = Select::new("list_likes", COLUMNS).keyed_by(KEY);
    select
        .eq("user_id", filter.user_id.clone())
        .eq("list_id", filter.list_id.clone())
        .at_least("created_at", filter.created_after);
    select
}

pub fn find_many(
    conn: &Connection,
    filter: &ListLikeFilter,
    query: &Query<ListLikeSort>,
) -> DbResult<Vec<ListLike>> {
    select(filter).fetch(conn, query, from_row)
}

pub fn count(conn: &Connection, filter: &ListLikeFilter) -> DbResult<u64> {
    select(filter).count(conn)
}

pub fn likes_for_list(conn: &Connection, list_id: &str, query: &Query<ListLikeSort>) -> DbResult<Vec<ListLike>> {
    let filter = ListLikeFilter {
        list_id: Some(list_id.to_string()),
        ..Default::default()
    };
    find_many(conn, &filter, query)
}

pub fn likes_by_user(conn: &Connection, user_id: &str, query: &Query<ListLikeSort>) -> DbResult<Vec<ListLike>> {
    let filter = ListLikeFilter {
        user_id: Some(user_id.to_string()),
        ..Default::default()
    };
    find_many(conn, &filter, query)
}

/// Record that `user_id` likes `list_id` and bump the list's `like_count`.
///
/// Liking twice fails with `UniqueConstraintViolation` on `userId_listId`.
pub fn like(conn: &Connection, user_id: &str, list_id: &str) -> DbResult<ListLike> {
    atomically(conn, |conn| {
        ensure_exists(conn, "users", user_id, ENTITY, "userId")?;
        ensure_exists(conn, "lists", list_id, ENTITY, "listId")?;

        let like = ListLike {
            user_id: user_id.to_string(),
            list_id: list_id.to_string(),
            created_at: now(),
        };
        conn.execute(
            "INSERT INTO list_likes (user_id, list_id, created_at) VALUES (?, ?, ?)",
            rusqlite::params![like.user_id, like.list_id, like.created_at],
        )?;
        adjust_like_count(conn, list_id, 1)?;
        tracing::debug!(user_id, list_id, "liked list");
        Ok(like)
    })
}

/// Remove a like and decrement the list's `like_count`.
pub fn unlike(conn: &Connection, user_id: &str, list_id: &str) -> DbResult<()> {
    atomically(conn, |conn| {
        let removed = conn.execute(
            "DELETE FROM list_likes WHERE user_id = ? AND list_id = ?",
            [user_id, list_id],
        )?;
        if removed == 0 {
            return Err(DbError::not_found(ENTITY, pair_id(user_id, list_id)));
        }
        adjust_like_count(conn, list_id, -1)?;
        tracing::debug!(user_id, list_id, "unliked list");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::db::{lists, users, List, NewList, NewUser, SortDirection, User};

    fn setup(conn: &Connection) -> (User, List) {
        let user = fixtures::user(conn, "fan@example.com");
        let usa = fixtures::country(conn, "USA", "US");
        let austin = fixtures::city(conn, &usa, "Austin");
        let list = fixtures::list(conn, &user, &austin, "Tacos");
        (user, list)
    }

    #[test]
    fn test_like_then_unlike_moves_count() {
        let conn = fixtures::conn();
        let (user, list) = setup(&conn);

        like(&conn, &user.id, &list.id).unwrap();
        assert_eq!(lists::get(&conn, &list.id).unwrap().like_count, 1);
        assert!(is_liked(&conn, &user.id, &list.id).unwrap());

        unlike(&conn, &user.id, &list.id).unwrap();
        assert_eq!(lists::get(&conn, &list.id).unwrap().like_count, 0);
        assert!(!is_liked(&conn, &user.id, &list.id).unwrap());
    }

    #[test]
    fn test_duplicate_like_rejected_without_counting() {
        let conn = fixtures::conn();
        let (user, list) = setup(&conn);
        like(&conn, &user.id, &list.id).unwrap();

        let err = like(&conn, &user.id, &list.id).unwrap_err();
        assert_eq!(
            err,
            DbError::UniqueConstraintViolation {
                entity: "ListLike",
                key: "userId_listId".to_string()
            }
        );
        assert_eq!(lists::get(&conn, &list.id).unwrap().like_count, 1);
    }

    #[test]
    fn test_unlike_missing() {
        let conn = fixtures::conn();
        let (user, list) = setup(&conn);
        let err = unlike(&conn, &user.id, &list.id).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(lists::get(&conn, &list.id).unwrap().like_count, 0);
    }

    #[test]
    fn test_like_unknown_list() {
        let conn = fixtures::conn();
        let (user, _) = setup(&conn);
        let err = like(&conn, &user.id, "missing").unwrap_err();
        assert_eq!(err, DbError::foreign_key("ListLike", "listId"));
    }

    #[test]
    fn test_cursor_pages_through_likes() {
        let conn = fixtures::conn();
        let (_, list) = setup(&conn);
        for i in 0..5 {
            let fan = fixtures::user(&conn, &format!("fan{i}@example.com"));
            like(&conn, &fan.id, &list.id).unwrap();
        }

        let mut seen = Vec::new();
        let mut query = Query::new()
            .order_by(ListLikeSort::CreatedAt, SortDirection::Desc)
            .offset(0, 2);
        loop {
            let page = likes_for_list(&conn, &list.id, &query).unwrap();
            let Some(last) = page.last() else { break };
            query = query.after(last.cursor(), 2);
            seen.extend(page);
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(count(&conn, &ListLikeFilter::default()).unwrap(), 5);
    }

    #[test]
    fn test_cursor_distinguishes_ids_containing_separator() {
        let conn = fixtures::conn();
        let usa = fixtures::country(&conn, "USA", "US");
        let austin = fixtures::city(&conn, &usa, "Austin");
        for (user_id, list_id) in [("a/b", "c"), ("a", "b/c")] {
            let user = users::create(
                &conn,
                NewUser {
                    id: Some(user_id.to_string()),
                    email: format!("{}@example.com", user_id.replace('/', "-")),
                    password: "hash".to_string(),
                    name: "Slash".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
            lists::create(
                &conn,
                NewList {
                    id: Some(list_id.to_string()),
                    name: format!("List {list_id}"),
                    city_id: austin.id.clone(),
                    creator_id: user.id.clone(),
                    ..Default::default()
                },
            )
            .unwrap();
            like(&conn, user_id, list_id).unwrap();
        }

        let all = find_many(&conn, &ListLikeFilter::default(), &Query::all()).unwrap();
        assert_ne!(all[0].cursor(), all[1].cursor());

        let first = find_many(&conn, &ListLikeFilter::default(), &Query::new().offset(0, 1)).unwrap();
        let rest = find_many(
            &conn,
            &ListLikeFilter::default(),
            &Query::new().after(first[0].cursor(), 10),
        )
        .unwrap();
        assert_eq!(rest.len(), 1);
        assert_ne!(rest[0], first[0]);
    }
}
