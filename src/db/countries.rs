//! Countries, the root of the location hierarchy.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};
use super::query::{Query, Select, SortField};
use super::{atomically, ensure_no_dependents, new_id, require_text, Assignments};
use crate::slug::{derive_slug, slugify};

const ENTITY: &str = "Country";
const COLUMNS: &str = "countries.id, countries.name, countries.code, countries.slug";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: String,
    pub name: String,
    /// ISO-style code, stored upper-case.
    pub code: Option<String>,
    pub slug: Option<String>,
}

/// A missing `slug` is derived from `name`.
#[derive(Debug, Clone, Default)]
pub struct NewCountry {
    pub id: Option<String>,
    pub name: String,
    pub code: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CountryPatch {
    pub name: Option<String>,
    pub code: Option<Option<String>>,
    pub slug: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct CountryFilter {
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub code: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountrySort {
    #[default]
    Name,
    Id,
}

impl SortField for CountrySort {
    fn column(&self) -> &'static str {
        match self {
            CountrySort::Name => "name",
            CountrySort::Id => "id",
        }
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Country> {
    Ok(Country {
        id: row.get("id")?,
        name: row.get("name")?,
        code: row.get("code")?,
        slug: row.get("slug")?,
    })
}

fn normalize_code(code: &str) -> DbResult<String> {
    let code = code.trim();
    if !(2..=3).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DbError::validation("code", "must be 2 or 3 ASCII letters"));
    }
    Ok(code.to_ascii_uppercase())
}

fn normalize_slug(slug: &str) -> DbResult<String> {
    let slug = slugify(slug);
    require_text("slug", &slug)?;
    Ok(slug)
}

pub fn find_by_id(conn: &Connection, id: &str) -> DbResult<Option<Country>> {
    let country = conn
        .query_row(&format!("SELECT {COLUMNS} FROM countries WHERE id = ?"), [id], from_row)
        .optional()?;
    Ok(country)
}

pub fn get(conn: &Connection, id: &str) -> DbResult<Country> {
    find_by_id(conn, id)?.ok_or_else(|| DbError::not_found(ENTITY, id))
}

pub fn find_by_code(conn: &Connection, code: &str) -> DbResult<Option<Country>> {
    let country = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM countries WHERE code = ?"),
            [code.trim().to_ascii_uppercase()],
            from_row,
        )
        .optional()?;
    Ok(country)
}

pub fn find_by_slug(conn: &Connection, slug: &str) -> DbResult<Option<Country>> {
    let country = conn
        .query_row(&format!("SELECT {COLUMNS} FROM countries WHERE slug = ?"), [slug], from_row)
        .optional()?;
    Ok(country)
}

fn select(filter: &CountryFilter) -> Select {
    let mut select = Select::new("countries", COLUMNS);
    select
        .eq("name", filter.name.clone())
        .contains("name", filter.name_contains.as_deref())
        .eq("code", filter.code.as_ref().map(|c| c.trim().to_ascii_uppercase()))
        .eq("slug", filter.slug.clone());
    select
}

pub fn find_many(conn: &Connection, filter: &CountryFilter, query: &Query<CountrySort>) -> DbResult<Vec<Country>> {
    select(filter).fetch(conn, query, from_row)
}

pub fn count(conn: &Connection, filter: &CountryFilter) -> DbResult<u64> {
    select(filter).count(conn)
}

pub fn create(conn: &Connection, input: NewCountry) -> DbResult<Country> {
    require_text("name", &input.name)?;
    let name = input.name.trim().to_string();
    let code = input.code.as_deref().map(normalize_code).transpose()?;
    let slug = match input.slug.as_deref() {
        Some(slug) => Some(normalize_slug(slug)?),
        None => derive_slug(&name),
    };

    let country = Country {
        id: input.id.unwrap_or_else(new_id),
        name,
        code,
        slug,
    };
    conn.execute(
        "INSERT INTO countries (id, name, code, slug) VALUES (?, ?, ?, ?)",
        rusqlite::params![country.id, country.name, country.code, country.slug],
    )?;
    tracing::debug!(country_id = %country.id, name = %country.name, "created country");
    Ok(country)
}

pub fn update(conn: &Connection, id: &str, patch: CountryPatch) -> DbResult<Country> {
    let mut set = Assignments::new();
    if let Some(name) = &patch.name {
        require_text("name", name)?;
    }
    set.set("name", patch.name.map(|n| n.trim().to_string()));
    set.set(
        "code",
        patch
            .code
            .map(|code| code.as_deref().map(normalize_code).transpose())
            .transpose()?,
    );
    set.set(
        "slug",
        patch
            .slug
            .map(|slug| slug.as_deref().map(normalize_slug).transpose())
            .transpose()?,
    );

    if !set.is_empty() && set.apply(conn, "countries", id)? == 0 {
        return Err(DbError::not_found(ENTITY, id));
    }
    get(conn, id)
}

/// Delete a country. Refused while it still has cities.
pub fn delete(conn: &Connection, id: &str) -> DbResult<()> {
    atomically(conn, |conn| {
        get(conn, id)?;
        ensure_no_dependents(
            conn,
            "SELECT COUNT(*) FROM cities WHERE country_id = ?",
            id,
            ENTITY,
            "City.countryId",
        )?;
        conn.execute("DELETE FROM countries WHERE id = ?", [id])?;
        Ok(())
    })
}
