//! Users: accounts that create lists, like lists, and record the cities
//! they are connected to.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};
use super::query::{Query, Select, SortField};
use super::{atomically, ensure_no_dependents, new_id, now, require_text, Assignments};

const ENTITY: &str = "User";
const COLUMNS: &str =
    "users.id, users.email, users.password, users.name, users.created_at, users.avatar, users.address, users.is_local";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    /// Password hash. Hashing belongs to the caller.
    #[serde(skip_serializing, default)]
    pub password: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub is_local: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub id: Option<String>,
    pub email: String,
    pub password: String,
    pub name: String,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub is_local: bool,
}

/// Scalar changes. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub is_local: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub email: Option<String>,
    pub name_contains: Option<String>,
    pub is_local: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Users with a location row for this city.
    pub lived_in_city: Option<String>,
    /// Users who liked this list.
    pub liked_list: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserSort {
    #[default]
    CreatedAt,
    Name,
    Email,
}

impl SortField for UserSort {
    fn column(&self) -> &'static str {
        match self {
            UserSort::CreatedAt => "created_at",
            UserSort::Name => "name",
            UserSort::Email => "email",
        }
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        password: row.get("password")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
        avatar: row.get("avatar")?,
        address: row.get("address")?,
        is_local: row.get("is_local")?,
    })
}

fn normalize_email(email: &str) -> DbResult<String> {
    let email = email.trim().to_lowercase();
    require_text("email", &email)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DbError::validation("email", "must be an address like name@example.com")),
    }
}

pub fn find_by_id(conn: &Connection, id: &str) -> DbResult<Option<User>> {
    let user = conn
        .query_row(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"), [id], from_row)
        .optional()?;
    Ok(user)
}

pub fn get(conn: &Connection, id: &str) -> DbResult<User> {
    find_by_id(conn, id)?.ok_or_else(|| DbError::not_found(ENTITY, id))
}

pub fn find_by_email(conn: &Connection, email: &str) -> DbResult<Option<User>> {
    let email = email.trim().to_lowercase();
    let user = conn
        .query_row(&format!("SELECT {COLUMNS} FROM users WHERE email = ?"), [email], from_row)
        .optional()?;
    Ok(user)
}

fn select(filter: &UserFilter) -> Select {
    let mut select = Select::new("users", COLUMNS);
    select
        .eq("email", filter.email.as_ref().map(|e| e.trim().to_lowercase()))
        .contains("name", filter.name_contains.as_deref())
        .eq("is_local", filter.is_local)
        .at_least("created_at", filter.created_after)
        .at_most("created_at", filter.created_before);
    if let Some(city_id) = &filter.lived_in_city {
        select.push(
            "EXISTS (SELECT 1 FROM user_locations ul WHERE ul.user_id = users.id AND ul.city_id = ?)",
            city_id.clone(),
        );
    }
    if let Some(list_id) = &filter.liked_list {
        select.push(
            "EXISTS (SELECT 1 FROM list_likes ll WHERE ll.user_id = users.id AND ll.list_id = ?)",
            list_id.clone(),
        );
    }
    select
}

pub fn find_many(conn: &Connection, filter: &UserFilter, query: &Query<UserSort>) -> DbResult<Vec<User>> {
    select(filter).fetch(conn, query, from_row)
}

pub fn count(conn: &Connection, filter: &UserFilter) -> DbResult<u64> {
    select(filter).count(conn)
}

pub fn create(conn: &Connection, input: NewUser) -> DbResult<User> {
    let email = normalize_email(&input.email)?;
    require_text("password", &input.password)?;
    require_text("name", &input.name)?;

    let user = User {
        id: input.id.unwrap_or_else(new_id),
        email,
        password: input.password,
        name: input.name.trim().to_string(),
        created_at: now(),
        avatar: input.avatar,
        address: input.address,
        is_local: input.is_local,
    };
    conn.execute(
        "INSERT INTO users (id, email, password, name, created_at, avatar, address, is_local)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            user.id,
            user.email,
            user.password,
            user.name,
            user.created_at,
            user.avatar,
            user.address,
            user.is_local,
        ],
    )?;
    tracing::debug!(user_id = %user.id, "created user");
    Ok(user)
}

pub fn update(conn: &Connection, id: &str, patch: UserPatch) -> DbResult<User> {
    let mut set = Assignments::new();
    set.set("email", patch.email.as_deref().map(normalize_email).transpose()?);
    if let Some(password) = &patch.password {
        require_text("password", password)?;
    }
    set.set("password", patch.password);
    if let Some(name) = &patch.name {
        require_text("name", name)?;
    }
    set.set("name", patch.name.map(|n| n.trim().to_string()));
    set.set("avatar", patch.avatar);
    set.set("address", patch.address);
    set.set("is_local", patch.is_local);

    if !set.is_empty() && set.apply(conn, "users", id)? == 0 {
        return Err(DbError::not_found(ENTITY, id));
    }
    get(conn, id)
}

/// Delete a user, their likes, and their locations.
///
/// Refused while the user still owns lists.
pub fn delete(conn: &Connection, id: &str) -> DbResult<()> {
    atomically(conn, |conn| {
        get(conn, id)?;
        ensure_no_dependents(
            conn,
            "SELECT COUNT(*) FROM lists WHERE creator_id = ?",
            id,
            ENTITY,
            "List.creatorId",
        )?;
        conn.execute(
            "UPDATE lists SET like_count = like_count - 1
             WHERE id IN (SELECT list_id FROM list_likes WHERE user_id = ?)",
            [id],
        )?;
        conn.execute("DELETE FROM users WHERE id = ?", [id])?;
        tracing::debug!(user_id = %id, "deleted user");
        Ok(())
    })
}
