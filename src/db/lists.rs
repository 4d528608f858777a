//! Lists: user-curated collections of places in a city.
//!
//! `like_count`, `place_count`, `average_rating` and `rating_count` are
//! maintained aggregates. They are never written through [`update`]; the
//! like and list-place modules adjust them in the same transaction as the
//! join-row write, and [`rate_list`] folds in new ratings.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};
use super::query::{Query, Select, SortField};
use super::{atomically, check_lat, check_lng, ensure_exists, new_id, now, require_text, Assignments};

const ENTITY: &str = "List";
const COLUMNS: &str = "lists.id, lists.name, lists.description, lists.genre, lists.subgenre, lists.city_id, \
                       lists.lat, lists.lng, lists.creator_id, lists.average_rating, lists.rating_count, \
                       lists.like_count, lists.place_count, lists.cover_image, lists.created_at, lists.updated_at";

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub subgenre: Option<String>,
    pub city_id: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub creator_id: String,
    pub average_rating: f64,
    pub rating_count: i64,
    pub like_count: i64,
    pub place_count: i64,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewList {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub subgenre: Option<String>,
    pub city_id: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub creator_id: String,
    pub cover_image: Option<String>,
}

/// Scalar changes. City and creator are fixed once a list exists.
#[derive(Debug, Clone, Default)]
pub struct ListPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub genre: Option<Option<String>>,
    pub subgenre: Option<Option<String>>,
    pub lat: Option<Option<f64>>,
    pub lng: Option<Option<f64>>,
    pub cover_image: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub city_id: Option<String>,
    pub creator_id: Option<String>,
    pub genre: Option<String>,
    pub subgenre: Option<String>,
    pub name_contains: Option<String>,
    pub min_rating: Option<f64>,
    pub min_likes: Option<i64>,
    pub created_after: Option<DateTime<Utc>>,
    /// Lists in the city with this slug.
    pub city_slug: Option<String>,
    /// Lists in a city of the country with this code.
    pub country_code: Option<String>,
    /// Lists liked by this user.
    pub liked_by: Option<String>,
    /// Lists containing this place.
    pub contains_place: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    LikeCount,
    PlaceCount,
    AverageRating,
}

impl SortField for ListSort {
    fn column(&self) -> &'static str {
        match self {
            ListSort::CreatedAt => "created_at",
            ListSort::UpdatedAt => "updated_at",
            ListSort::Name => "name",
            ListSort::LikeCount => "like_count",
            ListSort::PlaceCount => "place_count",
            ListSort::AverageRating => "average_rating",
        }
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<List> {
    Ok(List {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        genre: row.get("genre")?,
        subgenre: row.get("subgenre")?,
        city_id: row.get("city_id")?,
        lat: row.get("lat")?,
        lng: row.get("lng")?,
        creator_id: row.get("creator_id")?,
        average_rating: row.get("average_rating")?,
        rating_count: row.get("rating_count")?,
        like_count: row.get("like_count")?,
        place_count: row.get("place_count")?,
        cover_image: row.get("cover_image")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_by_id(conn: &Connection, id: &str) -> DbResult<Option<List>> {
    let list = conn
        .query_row(&format!("SELECT {COLUMNS} FROM lists WHERE id = ?"), [id], from_row)
        .optional()?;
    Ok(list)
}

pub fn get(conn: &Connection, id: &str) -> DbResult<List> {
    find_by_id(conn, id)?.ok_or_else(|| DbError::not_found(ENTITY, id))
}

fn select(filter: &ListFilter) -> Select {
    let mut select = Select::new("lists", COLUMNS);
    select
        .eq("city_id", filter.city_id.clone())
        .eq("creator_id", filter.creator_id.clone())
        .eq("genre", filter.genre.clone())
        .eq("subgenre", filter.subgenre.clone())
        .contains("name", filter.name_contains.as_deref())
        .at_least("average_rating", filter.min_rating)
        .at_least("like_count", filter.min_likes)
        .at_least("created_at", filter.created_after);
    if let Some(slug) = &filter.city_slug {
        select.push(
            "EXISTS (SELECT 1 FROM cities c WHERE c.id = lists.city_id AND c.slug = ?)",
            slug.clone(),
        );
    }
    if let Some(code) = &filter.country_code {
        select.push(
            "EXISTS (SELECT 1 FROM cities c JOIN countries co ON co.id = c.country_id
                     WHERE c.id = lists.city_id AND co.code = ?)",
            code.trim().to_ascii_uppercase(),
        );
    }
    if let Some(user_id) = &filter.liked_by {
        select.push(
            "EXISTS (SELECT 1 FROM list_likes ll WHERE ll.list_id = lists.id AND ll.user_id = ?)",
            user_id.clone(),
        );
    }
    if let Some(place_id) = &filter.contains_place {
        select.push(
            "EXISTS (SELECT 1 FROM list_places lp WHERE lp.list_id = lists.id AND lp.place_id = ?)",
            place_id.clone(),
        );
    }
    select
}

pub fn find_many(conn: &Connection, filter: &ListFilter, query: &Query<ListSort>) -> DbResult<Vec<List>> {
    select(filter).fetch(conn, query, from_row)
}

pub fn count(conn: &Connection, filter: &ListFilter) -> DbResult<u64> {
    select(filter).count(conn)
}

/// Create a list and bump its city's `list_count`.
pub fn create(conn: &Connection, input: NewList) -> DbResult<List> {
    require_text("name", &input.name)?;
    check_lat("lat", input.lat)?;
    check_lng("lng", input.lng)?;

    atomically(conn, |conn| {
        ensure_exists(conn, "cities", &input.city_id, ENTITY, "cityId")?;
        ensure_exists(conn, "users", &input.creator_id, ENTITY, "creatorId")?;

        let created_at = now();
        let list = List {
            id: input.id.unwrap_or_else(new_id),
            name: input.name.trim().to_string(),
            description: input.description,
            genre: input.genre,
            subgenre: input.subgenre,
            city_id: input.city_id,
            lat: input.lat,
            lng: input.lng,
            creator_id: input.creator_id,
            average_rating: 0.0,
            rating_count: 0,
            like_count: 0,
            place_count: 0,
            cover_image: input.cover_image,
            created_at,
            updated_at: created_at,
        };
        conn.execute(
            "INSERT INTO lists (id, name, description, genre, subgenre, city_id, lat, lng, creator_id,
                                cover_image, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                list.id,
                list.name,
                list.description,
                list.genre,
                list.subgenre,
                list.city_id,
                list.lat,
                list.lng,
                list.creator_id,
                list.cover_image,
                list.created_at,
                list.updated_at,
            ],
        )?;
        conn.execute(
            "UPDATE cities SET list_count = list_count + 1 WHERE id = ?",
            [&list.city_id],
        )?;
        tracing::debug!(list_id = %list.id, city_id = %list.city_id, "created list");
        Ok(list)
    })
}

pub fn update(conn: &Connection, id: &str, patch: ListPatch) -> DbResult<List> {
    if let Some(name) = &patch.name {
        require_text("name", name)?;
    }
    if let Some(lat) = patch.lat {
        check_lat("lat", lat)?;
    }
    if let Some(lng) = patch.lng {
        check_lng("lng", lng)?;
    }

    let mut set = Assignments::new();
    set.set("name", patch.name.map(|n| n.trim().to_string()));
    set.set("description", patch.description);
    set.set("genre", patch.genre);
    set.set("subgenre", patch.subgenre);
    set.set("lat", patch.lat);
    set.set("lng", patch.lng);
    set.set("cover_image", patch.cover_image);

    if !set.is_empty() {
        set.set("updated_at", Some(now()));
        if set.apply(conn, "lists", id)? == 0 {
            return Err(DbError::not_found(ENTITY, id));
        }
    }
    get(conn, id)
}

/// Fold one rating into the list's running average.
pub fn rate_list(conn: &Connection, id: &str, rating: f64) -> DbResult<List> {
    if !rating.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(DbError::validation(
            "rating",
            format!("must be within [{MIN_RATING}, {MAX_RATING}]"),
        ));
    }
    let changed = conn.execute(
        "UPDATE lists
         SET average_rating = (average_rating * rating_count + ?1) / (rating_count + 1),
             rating_count = rating_count + 1
         WHERE id = ?2",
        rusqlite::params![rating, id],
    )?;
    if changed == 0 {
        return Err(DbError::not_found(ENTITY, id));
    }
    get(conn, id)
}

/// Delete a list with its likes and place entries, and decrement its
/// city's `list_count`.
pub fn delete(conn: &Connection, id: &str) -> DbResult<()> {
    atomically(conn, |conn| {
        let list = get(conn, id)?;
        conn.execute(
            "UPDATE cities SET list_count = list_count - 1 WHERE id = ?",
            [&list.city_id],
        )?;
        conn.execute("DELETE FROM lists WHERE id = ?", [id])?;
        tracing::debug!(list_id = %id, city_id = %list.city_id, "deleted list");
        Ok(())
    })
}
