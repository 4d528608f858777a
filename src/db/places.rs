//! Places: venues identified by their Google place id and located in a city.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};
use super::query::{Query, Select, SortField};
use super::{atomically, check_lat, check_lng, ensure_exists, new_id, now, require_text, Assignments};

const ENTITY: &str = "Place";
const COLUMNS: &str = "places.id, places.name, places.address, places.lat, places.lng, places.google_place_id, \
                       places.description, places.primary_image_url, places.created_at, places.updated_at, \
                       places.city_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: String,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub google_place_id: String,
    pub description: Option<String>,
    pub primary_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub city_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewPlace {
    pub id: Option<String>,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub google_place_id: String,
    pub description: Option<String>,
    pub primary_image_url: Option<String>,
    pub city_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlacePatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub description: Option<Option<String>>,
    pub primary_image_url: Option<Option<String>>,
}

/// Inclusive latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PlaceFilter {
    pub city_id: Option<String>,
    pub google_place_id: Option<String>,
    pub name_contains: Option<String>,
    pub within: Option<BoundingBox>,
    /// Places that appear in this list.
    pub in_list: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
}

impl SortField for PlaceSort {
    fn column(&self) -> &'static str {
        match self {
            PlaceSort::CreatedAt => "created_at",
            PlaceSort::UpdatedAt => "updated_at",
            PlaceSort::Name => "name",
        }
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Place> {
    Ok(Place {
        id: row.get("id")?,
        name: row.get("name")?,
        address: row.get("address")?,
        lat: row.get("lat")?,
        lng: row.get("lng")?,
        google_place_id: row.get("google_place_id")?,
        description: row.get("description")?,
        primary_image_url: row.get("primary_image_url")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        city_id: row.get("city_id")?,
    })
}

pub fn find_by_id(conn: &Connection, id: &str) -> DbResult<Option<Place>> {
    let place = conn
        .query_row(&format!("SELECT {COLUMNS} FROM places WHERE id = ?"), [id], from_row)
        .optional()?;
    Ok(place)
}

pub fn get(conn: &Connection, id: &str) -> DbResult<Place> {
    find_by_id(conn, id)?.ok_or_else(|| DbError::not_found(ENTITY, id))
}

pub fn find_by_google_place_id(conn: &Connection, google_place_id: &str) -> DbResult<Option<Place>> {
    let place = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM places WHERE google_place_id = ?"),
            [google_place_id],
            from_row,
        )
        .optional()?;
    Ok(place)
}

fn select(filter: &PlaceFilter) -> Select {
    let mut select = Select::new("places", COLUMNS);
    select
        .eq("city_id", filter.city_id.clone())
        .eq("google_place_id", filter.google_place_id.clone())
        .contains("name", filter.name_contains.as_deref());
    if let Some(bbox) = filter.within {
        select
            .at_least("lat", Some(bbox.min_lat))
            .at_most("lat", Some(bbox.max_lat))
            .at_least("lng", Some(bbox.min_lng))
            .at_most("lng", Some(bbox.max_lng));
    }
    if let Some(list_id) = &filter.in_list {
        select.push(
            "EXISTS (SELECT 1 FROM list_places lp WHERE lp.place_id = places.id AND lp.list_id = ?)",
            list_id.clone(),
        );
    }
    select
}

pub fn find_many(conn: &Connection, filter: &PlaceFilter, query: &Query<PlaceSort>) -> DbResult<Vec<Place>> {
    select(filter).fetch(conn, query, from_row)
}

pub fn count(conn: &Connection, filter: &PlaceFilter) -> DbResult<u64> {
    select(filter).count(conn)
}

fn validate(input: &NewPlace) -> DbResult<()> {
    require_text("name", &input.name)?;
    require_text("address", &input.address)?;
    require_text("googlePlaceId", &input.google_place_id)?;
    check_lat("lat", Some(input.lat))?;
    check_lng("lng", Some(input.lng))
}

pub fn create(conn: &Connection, input: NewPlace) -> DbResult<Place> {
    validate(&input)?;
    atomically(conn, |conn| {
        ensure_exists(conn, "cities", &input.city_id, ENTITY, "cityId")?;
        let created_at = now();
        let place = Place {
            id: input.id.unwrap_or_else(new_id),
            name: input.name.trim().to_string(),
            address: input.address.trim().to_string(),
            lat: input.lat,
            lng: input.lng,
            google_place_id: input.google_place_id.trim().to_string(),
            description: input.description,
            primary_image_url: input.primary_image_url,
            created_at,
            updated_at: created_at,
            city_id: input.city_id,
        };
        conn.execute(
            "INSERT INTO places (id, name, address, lat, lng, google_place_id, description,
                                 primary_image_url, created_at, updated_at, city_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                place.id,
                place.name,
                place.address,
                place.lat,
                place.lng,
                place.google_place_id,
                place.description,
                place.primary_image_url,
                place.created_at,
                place.updated_at,
                place.city_id,
            ],
        )?;
        tracing::debug!(place_id = %place.id, google_place_id = %place.google_place_id, "created place");
        Ok(place)
    })
}

/// Create the place with this Google place id, or refresh the scalar
/// fields of the existing one. The city of an existing place is kept.
pub fn upsert_by_google_place_id(conn: &Connection, input: NewPlace) -> DbResult<Place> {
    validate(&input)?;
    atomically(conn, |conn| match find_by_google_place_id(conn, input.google_place_id.trim())? {
        Some(existing) => update(
            conn,
            &existing.id,
            PlacePatch {
                name: Some(input.name),
                address: Some(input.address),
                lat: Some(input.lat),
                lng: Some(input.lng),
                description: Some(input.description),
                primary_image_url: Some(input.primary_image_url),
            },
        ),
        None => create(conn, input),
    })
}

pub fn update(conn: &Connection, id: &str, patch: PlacePatch) -> DbResult<Place> {
    if let Some(name) = &patch.name {
        require_text("name", name)?;
    }
    if let Some(address) = &patch.address {
        require_text("address", address)?;
    }
    check_lat("lat", patch.lat)?;
    check_lng("lng", patch.lng)?;

    let mut set = Assignments::new();
    set.set("name", patch.name.map(|n| n.trim().to_string()));
    set.set("address", patch.address.map(|a| a.trim().to_string()));
    set.set("lat", patch.lat);
    set.set("lng", patch.lng);
    set.set("description", patch.description);
    set.set("primary_image_url", patch.primary_image_url);

    if !set.is_empty() {
        set.set("updated_at", Some(now()));
        if set.apply(conn, "places", id)? == 0 {
            return Err(DbError::not_found(ENTITY, id));
        }
    }
    get(conn, id)
}

/// Delete a place and remove it from every list, keeping each list's
/// `place_count` in step.
pub fn delete(conn: &Connection, id: &str) -> DbResult<()> {
    atomically(conn, |conn| {
        get(conn, id)?;
        let touched = conn.execute(
            "UPDATE lists SET place_count = place_count - 1
             WHERE id IN (SELECT list_id FROM list_places WHERE place_id = ?)",
            [id],
        )?;
        conn.execute("DELETE FROM places WHERE id = ?", [id])?;
        tracing::debug!(place_id = %id, lists = touched, "deleted place");
        Ok(())
    })
}
