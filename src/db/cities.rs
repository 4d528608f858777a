//! Cities. Each city belongs to one country and is unique by name within it.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};
use super::query::{Query, Select, SortField};
use super::{
    atomically, check_lat, check_lng, ensure_exists, ensure_no_dependents, new_id, require_text, Assignments,
};
use crate::slug::{derive_slug, slugify};

const ENTITY: &str = "City";
const COLUMNS: &str = "cities.id, cities.country_id, cities.name, cities.slug, cities.lat, cities.lng, \
                       cities.list_count, cities.google_place_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub id: String,
    pub country_id: String,
    pub name: String,
    pub slug: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Number of lists in this city, maintained on list create/delete.
    pub list_count: i64,
    pub google_place_id: Option<String>,
}

/// A missing `slug` is derived from `name`.
#[derive(Debug, Clone, Default)]
pub struct NewCity {
    pub id: Option<String>,
    pub country_id: String,
    pub name: String,
    pub slug: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub google_place_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CityPatch {
    pub name: Option<String>,
    pub slug: Option<Option<String>>,
    pub lat: Option<Option<f64>>,
    pub lng: Option<Option<f64>>,
    pub google_place_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct CityFilter {
    pub country_id: Option<String>,
    /// Cities whose country has this code.
    pub country_code: Option<String>,
    /// Cities whose country has this slug.
    pub country_slug: Option<String>,
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub slug: Option<String>,
    pub min_list_count: Option<i64>,
    /// `Some(true)` keeps cities with at least one list, `Some(false)` those without.
    pub has_lists: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CitySort {
    #[default]
    Name,
    ListCount,
    Id,
}

impl SortField for CitySort {
    fn column(&self) -> &'static str {
        match self {
            CitySort::Name => "name",
            CitySort::ListCount => "list_count",
            CitySort::Id => "id",
        }
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<City> {
    Ok(City {
        id: row.get("id")?,
        country_id: row.get("country_id")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
        lat: row.get("lat")?,
        lng: row.get("lng")?,
        list_count: row.get("list_count")?,
        google_place_id: row.get("google_place_id")?,
    })
}

pub fn find_by_id(conn: &Connection, id: &str) -> DbResult<Option<City>> {
    let city = conn
        .query_row(&format!("SELECT {COLUMNS} FROM cities WHERE id = ?"), [id], from_row)
        .optional()?;
    Ok(city)
}

pub fn get(conn: &Connection, id: &str) -> DbResult<City> {
    find_by_id(conn, id)?.ok_or_else(|| DbError::not_found(ENTITY, id))
}

pub fn find_by_slug(conn: &Connection, country_id: &str, slug: &str) -> DbResult<Option<City>> {
    let city = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM cities WHERE country_id = ? AND slug = ? ORDER BY name LIMIT 1"),
            [country_id, slug],
            from_row,
        )
        .optional()?;
    Ok(city)
}

pub fn find_by_google_place_id(conn: &Connection, google_place_id: &str) -> DbResult<Option<City>> {
    let city = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM cities WHERE google_place_id = ?"),
            [google_place_id],
            from_row,
        )
        .optional()?;
    Ok(city)
}

fn select(filter: &CityFilter) -> Select {
    let mut select = Select::new("cities", COLUMNS);
    select
        .eq("country_id", filter.country_id.clone())
        .eq("name", filter.name.clone())
        .contains("name", filter.name_contains.as_deref())
        .eq("slug", filter.slug.clone())
        .at_least("list_count", filter.min_list_count);
    if let Some(code) = &filter.country_code {
        select.push(
            "EXISTS (SELECT 1 FROM countries c WHERE c.id = cities.country_id AND c.code = ?)",
            code.trim().to_ascii_uppercase(),
        );
    }
    if let Some(slug) = &filter.country_slug {
        select.push(
            "EXISTS (SELECT 1 FROM countries c WHERE c.id = cities.country_id AND c.slug = ?)",
            slug.clone(),
        );
    }
    match filter.has_lists {
        Some(true) => {
            select.push_raw("EXISTS (SELECT 1 FROM lists l WHERE l.city_id = cities.id)");
        }
        Some(false) => {
            select.push_raw("NOT EXISTS (SELECT 1 FROM lists l WHERE l.city_id = cities.id)");
        }
        None => {}
    }
    select
}

pub fn find_many(conn: &Connection, filter: &CityFilter, query: &Query<CitySort>) -> DbResult<Vec<City>> {
    select(filter).fetch(conn, query, from_row)
}

pub fn count(conn: &Connection, filter: &CityFilter) -> DbResult<u64> {
    select(filter).count(conn)
}

fn normalize_slug(slug: &str) -> DbResult<String> {
    let slug = slugify(slug);
    require_text("slug", &slug)?;
    Ok(slug)
}

pub fn create(conn: &Connection, input: NewCity) -> DbResult<City> {
    require_text("name", &input.name)?;
    check_lat("lat", input.lat)?;
    check_lng("lng", input.lng)?;
    let name = input.name.trim().to_string();
    let slug = match input.slug.as_deref() {
        Some(slug) => Some(normalize_slug(slug)?),
        None => derive_slug(&name),
    };

    atomically(conn, |conn| {
        ensure_exists(conn, "countries", &input.country_id, ENTITY, "countryId")?;
        let city = City {
            id: input.id.clone().unwrap_or_else(new_id),
            country_id: input.country_id.clone(),
            name,
            slug,
            lat: input.lat,
            lng: input.lng,
            list_count: 0,
            google_place_id: input.google_place_id.clone(),
        };
        conn.execute(
            "INSERT INTO cities (id, country_id, name, slug, lat, lng, list_count, google_place_id)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
            rusqlite::params![
                city.id,
                city.country_id,
                city.name,
                city.slug,
                city.lat,
                city.lng,
                city.google_place_id,
            ],
        )?;
        tracing::debug!(city_id = %city.id, name = %city.name, "created city");
        Ok(city)
    })
}

pub fn update(conn: &Connection, id: &str, patch: CityPatch) -> DbResult<City> {
    let mut set = Assignments::new();
    if let Some(name) = &patch.name {
        require_text("name", name)?;
    }
    if let Some(lat) = patch.lat {
        check_lat("lat", lat)?;
    }
    if let Some(lng) = patch.lng {
        check_lng("lng", lng)?;
    }
    set.set("name", patch.name.map(|n| n.trim().to_string()));
    set.set(
        "slug",
        patch
            .slug
            .map(|slug| slug.as_deref().map(normalize_slug).transpose())
            .transpose()?,
    );
    set.set("lat", patch.lat);
    set.set("lng", patch.lng);
    set.set("google_place_id", patch.google_place_id);

    if !set.is_empty() && set.apply(conn, "cities", id)? == 0 {
        return Err(DbError::not_found(ENTITY, id));
    }
    get(conn, id)
}

/// Delete a city and the user locations pointing at it.
///
/// Refused while lists or places still reference the city.
pub fn delete(conn: &Connection, id: &str) -> DbResult<()> {
    atomically(conn, |conn| {
        get(conn, id)?;
        ensure_no_dependents(conn, "SELECT COUNT(*) FROM lists WHERE city_id = ?", id, ENTITY, "List.cityId")?;
        ensure_no_dependents(conn, "SELECT COUNT(*) FROM places WHERE city_id = ?", id, ENTITY, "Place.cityId")?;
        conn.execute("DELETE FROM cities WHERE id = ?", [id])?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::db::{lists, SortDirection};

    #[test]
    fn test_duplicate_name_in_country_rejected() {
        let conn = fixtures::conn();
        let usa = fixtures::country(&conn, "USA", "US");
        fixtures::city(&conn, &usa, "Austin");

        let err = create(
            &conn,
            NewCity {
                country_id: usa.id.clone(),
                name: "Austin".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            DbError::UniqueConstraintViolation {
                entity: "City",
                key: "countryId_name".to_string()
            }
        );
        assert_eq!(count(&conn, &CityFilter::default()).unwrap(), 1);
    }

    #[test]
    fn test_non_latin_name_stored_without_slug() {
        let conn = fixtures::conn();
        let japan = fixtures::country(&conn, "日本", "JP");
        let tokyo = fixtures::city(&conn, &japan, "東京");
        assert_eq!(tokyo.slug, None);
        assert_eq!(get(&conn, &tokyo.id).unwrap(), tokyo);

        let osaka = fixtures::city(&conn, &japan, "大阪 Osaka");
        assert_eq!(osaka.slug.as_deref(), Some("osaka"));
    }

    #[test]
    fn test_same_name_in_other_country_allowed() {
        let conn = fixtures::conn();
        let usa = fixtures::country(&conn, "USA", "US");
        let uk = fixtures::country(&conn, "United Kingdom", "GB");
        fixtures::city(&conn, &usa, "Cambridge");
        fixtures::city(&conn, &uk, "Cambridge");

        let filter = CityFilter {
            country_code: Some("gb".to_string()),
            ..Default::default()
        };
        let found = find_many(&conn, &filter, &Query::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].country_id, uk.id);
        assert_eq!(found[0].slug.as_deref(), Some("cambridge"));
        assert_eq!(find_by_slug(&conn, &uk.id, "cambridge").unwrap(), Some(found[0].clone()));
    }

    #[test]
    fn test_missing_country_is_foreign_key_violation() {
        let conn = fixtures::conn();
        let err = create(
            &conn,
            NewCity {
                country_id: "missing".to_string(),
                name: "Atlantis".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, DbError::foreign_key("City", "countryId"));
    }

    #[test]
    fn test_out_of_range_coordinates() {
        let conn = fixtures::conn();
        let usa = fixtures::country(&conn, "USA", "US");
        let err = create(
            &conn,
            NewCity {
                country_id: usa.id,
                name: "Nowhere".to_string(),
                lat: Some(91.0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, DbError::ValidationError { ref field, .. } if field == "lat"));
    }

    #[test]
    fn test_google_place_id_unique() {
        let conn = fixtures::conn();
        let usa = fixtures::country(&conn, "USA", "US");
        let austin = fixtures::city(&conn, &usa, "Austin");
        update(
            &conn,
            &austin.id,
            CityPatch {
                google_place_id: Some(Some("g-austin".to_string())),
                ..Default::default()
            },
        )
        .unwrap();
        let dallas = fixtures::city(&conn, &usa, "Dallas");
        let err = update(
            &conn,
            &dallas.id,
            CityPatch {
                google_place_id: Some(Some("g-austin".to_string())),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(find_by_google_place_id(&conn, "g-austin").unwrap().unwrap().id, austin.id);
    }

    #[test]
    fn test_delete_restricted_by_lists() {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "u@example.com");
        let usa = fixtures::country(&conn, "USA", "US");
        let austin = fixtures::city(&conn, &usa, "Austin");
        let list = fixtures::list(&conn, &user, &austin, "Coffee");

        assert_eq!(delete(&conn, &austin.id).unwrap_err(), DbError::foreign_key("City", "List.cityId"));
        lists::delete(&conn, &list.id).unwrap();
        delete(&conn, &austin.id).unwrap();
    }

    #[test]
    fn test_filters_by_list_presence_and_sorts_by_count() {
        let conn = fixtures::conn();
        let user = fixtures::user(&conn, "u@example.com");
        let usa = fixtures::country(&conn, "USA", "US");
        let austin = fixtures::city(&conn, &usa, "Austin");
        let dallas = fixtures::city(&conn, &usa, "Dallas");
        fixtures::city(&conn, &usa, "Houston");
        fixtures::list(&conn, &user, &austin, "Coffee");
        fixtures::list(&conn, &user, &dallas, "Tacos");
        fixtures::list(&conn, &user, &dallas, "BBQ");

        let filter = CityFilter {
            has_lists: Some(true),
            ..Default::default()
        };
        let query = Query::new().order_by(CitySort::ListCount, SortDirection::Desc);
        let found = find_many(&conn, &filter, &query).unwrap();
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Dallas", "Austin"]);
        assert_eq!(found[0].list_count, 2);

        let empty = CityFilter {
            has_lists: Some(false),
            ..Default::default()
        };
        assert_eq!(count(&conn, &empty).unwrap(), 1);
    }
}
