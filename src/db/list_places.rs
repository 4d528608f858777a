//! Ordered membership of places in lists.
//!
//! Every insert or delete here moves the owning list's `place_count` in the
//! same transaction.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};
use super::places::{self, Place, PlaceFilter};
use super::query::{Query, Select, SortField};
use super::{atomically, ensure_exists, new_id, now, Assignments};

const ENTITY: &str = "ListPlace";
const COLUMNS: &str = "list_places.id, list_places.list_id, list_places.place_id, list_places.sort_order, \
                       list_places.note, list_places.price_range, list_places.created_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPlace {
    pub id: String,
    pub list_id: String,
    pub place_id: String,
    /// Zero-based position within the list.
    pub order: i64,
    pub note: Option<String>,
    pub price_range: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A list entry together with its place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceInList {
    #[serde(flatten)]
    pub entry: ListPlace,
    pub place: Place,
}

/// A missing `order` appends after the list's current last entry.
#[derive(Debug, Clone, Default)]
pub struct NewListPlace {
    pub id: Option<String>,
    pub list_id: String,
    pub place_id: String,
    pub order: Option<i64>,
    pub note: Option<String>,
    pub price_range: Option<String>,
}

impl NewListPlace {
    pub fn new(list_id: &str, place_id: &str) -> Self {
        Self {
            list_id: list_id.to_string(),
            place_id: place_id.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListPlacePatch {
    pub order: Option<i64>,
    pub note: Option<Option<String>>,
    pub price_range: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListPlaceFilter {
    pub list_id: Option<String>,
    pub place_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListPlaceSort {
    #[default]
    Order,
    CreatedAt,
}

impl SortField for ListPlaceSort {
    fn column(&self) -> &'static str {
        match self {
            ListPlaceSort::Order => "sort_order",
            ListPlaceSort::CreatedAt => "created_at",
        }
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ListPlace> {
    Ok(ListPlace {
        id: row.get("id")?,
        list_id: row.get("list_id")?,
        place_id: row.get("place_id")?,
        order: row.get("sort_order")?,
        note: row.get("note")?,
        price_range: row.get("price_range")?,
        created_at: row.get("created_at")?,
    })
}

fn check_order(order: i64) -> DbResult<()> {
    if order < 0 {
        return Err(DbError::validation("order", "must not be negative"));
    }
    Ok(())
}

fn pair_id(list_id: &str, place_id: &str) -> String {
    format!("{list_id}/{place_id}")
}

fn adjust_place_count(conn: &Connection, list_id: &str, delta: i64) -> DbResult<()> {
    conn.execute(
        "UPDATE lists SET place_count = place_count + ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![delta, now(), list_id],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> DbResult<Option<ListPlace>> {
    let entry = conn
        .query_row(&format!("SELECT {COLUMNS} FROM list_places WHERE id = ?"), [id], from_row)
        .optional()?;
    Ok(entry)
}

pub fn get(conn: &Connection, id: &str) -> DbResult<ListPlace> {
    find_by_id(conn, id)?.ok_or_else(|| DbError::not_found(ENTITY, id))
}

pub fn find_by_pair(conn: &Connection, list_id: &str, place_id: &str) -> DbResult<Option<ListPlace>> {
    let entry = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM list_places WHERE list_id = ? AND place_id = ?"),
            [list_id, place_id],
            from_row,
        )
        .optional()?;
    Ok(entry)
}

fn select(filter: &ListPlaceFilter) -> Select {
    let mut select = Select::new("list_places", COLUMNS);
    select
        .eq("list_id", filter.list_id.clone())
        .eq("place_id", filter.place_id.clone());
    select
}

pub fn find_many(
    conn: &Connection,
    filter: &ListPlaceFilter,
    query: &Query<ListPlaceSort>,
) -> DbResult<Vec<ListPlace>> {
    select(filter).fetch(conn, query, from_row)
}

pub fn count(conn: &Connection, filter: &ListPlaceFilter) -> DbResult<u64> {
    select(filter).count(conn)
}

/// The list's entries in order, each with its place.
pub fn places_in_list(conn: &Connection, list_id: &str) -> DbResult<Vec<PlaceInList>> {
    let entries = find_many(
        conn,
        &ListPlaceFilter {
            list_id: Some(list_id.to_string()),
            ..Default::default()
        },
        &Query::all(),
    )?;
    let mut places: HashMap<String, Place> = places::find_many(
        conn,
        &PlaceFilter {
            in_list: Some(list_id.to_string()),
            ..Default::default()
        },
        &Query::all(),
    )?
    .into_iter()
    .map(|p| (p.id.clone(), p))
    .collect();

    entries
        .into_iter()
        .map(|entry| -> DbResult<PlaceInList> {
            let place = places
                .remove(&entry.place_id)
                .ok_or_else(|| DbError::not_found("Place", entry.place_id.clone()))?;
            Ok(PlaceInList { entry, place })
        })
        .collect()
}

/// Add a place to a list and bump the list's `place_count`.
pub fn add_place(conn: &Connection, input: NewListPlace) -> DbResult<ListPlace> {
    if let Some(order) = input.order {
        check_order(order)?;
    }
    atomically(conn, |conn| {
        ensure_exists(conn, "lists", &input.list_id, ENTITY, "listId")?;
        ensure_exists(conn, "places", &input.place_id, ENTITY, "placeId")?;

        let order = match input.order {
            Some(order) => order,
            None => conn.query_row(
                "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM list_places WHERE list_id = ?",
                [&input.list_id],
                |row| row.get(0),
            )?,
        };
        let entry = ListPlace {
            id: input.id.unwrap_or_else(new_id),
            list_id: input.list_id,
            place_id: input.place_id,
            order,
            note: input.note,
            price_range: input.price_range,
            created_at: now(),
        };
        conn.execute(
            "INSERT INTO list_places (id, list_id, place_id, sort_order, note, price_range, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                entry.id,
                entry.list_id,
                entry.place_id,
                entry.order,
                entry.note,
                entry.price_range,
                entry.created_at,
            ],
        )?;
        adjust_place_count(conn, &entry.list_id, 1)?;
        tracing::debug!(list_id = %entry.list_id, place_id = %entry.place_id, "added place to list");
        Ok(entry)
    })
}

/// Remove a place from a list and decrement the list's `place_count`.
pub fn remove_place(conn: &Connection, list_id: &str, place_id: &str) -> DbResult<()> {
    atomically(conn, |conn| {
        let removed = conn.execute(
            "DELETE FROM list_places WHERE list_id = ? AND place_id = ?",
            [list_id, place_id],
        )?;
        if removed == 0 {
            return Err(DbError::not_found(ENTITY, pair_id(list_id, place_id)));
        }
        adjust_place_count(conn, list_id, -1)?;
        tracing::debug!(list_id, place_id, "removed place from list");
        Ok(())
    })
}

pub fn update(conn: &Connection, id: &str, patch: ListPlacePatch) -> DbResult<ListPlace> {
    if let Some(order) = patch.order {
        check_order(order)?;
    }
    let mut set = Assignments::new();
    set.set("sort_order", patch.order);
    set.set("note", patch.note);
    set.set("price_range", patch.price_range);

    if !set.is_empty() && set.apply(conn, "list_places", id)? == 0 {
        return Err(DbError::not_found(ENTITY, id));
    }
    get(conn, id)
}

pub fn delete(conn: &Connection, id: &str) -> DbResult<()> {
    atomically(conn, |conn| {
        let entry = get(conn, id)?;
        conn.execute("DELETE FROM list_places WHERE id = ?", [id])?;
        adjust_place_count(conn, &entry.list_id, -1)
    })
}

/// Rewrite the order of a list so `place_ids[i]` sits at position `i`.
///
/// `place_ids` must name every place of the list exactly once.
pub fn reorder(conn: &Connection, list_id: &str, place_ids: &[String]) -> DbResult<Vec<ListPlace>> {
    atomically(conn, |conn| {
        let filter = ListPlaceFilter {
            list_id: Some(list_id.to_string()),
            ..Default::default()
        };
        let current: HashSet<String> = find_many(conn, &filter, &Query::all())?
            .into_iter()
            .map(|entry| entry.place_id)
            .collect();
        let requested: HashSet<String> = place_ids.iter().cloned().collect();
        if requested.len() != place_ids.len() {
            return Err(DbError::validation("placeIds", "contains duplicates"));
        }
        if requested != current {
            return Err(DbError::validation(
                "placeIds",
                "must list exactly the places currently in the list",
            ));
        }

        let mut stmt =
            conn.prepare("UPDATE list_places SET sort_order = ? WHERE list_id = ? AND place_id = ?")?;
        for (position, place_id) in place_ids.iter().enumerate() {
            stmt.execute(rusqlite::params![position as i64, list_id, place_id])?;
        }
        find_many(conn, &filter, &Query::all())
    })
}
