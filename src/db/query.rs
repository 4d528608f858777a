//! Ordering, pagination, and the small SELECT builder shared by every
//! repository module.

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::{DbError, DbResult};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn after_operator(self) -> &'static str {
        match self {
            SortDirection::Asc => ">",
            SortDirection::Desc => "<",
        }
    }
}

/// A sortable, non-nullable column of an entity.
pub trait SortField: Copy + Default {
    fn column(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy<F> {
    pub field: F,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    Offset { offset: u64, limit: u32 },
    /// Keyset pagination: rows strictly after the row with id `after` in
    /// the current ordering.
    Cursor { after: String, limit: u32 },
    /// Every matching row. Meant for exports and maintenance jobs.
    All,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination::Offset {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<F> {
    pub order: Option<OrderBy<F>>,
    pub page: Pagination,
}

impl<F> Default for Query<F> {
    fn default() -> Self {
        Self {
            order: None,
            page: Pagination::default(),
        }
    }
}

impl<F: SortField> Query<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            order: None,
            page: Pagination::All,
        }
    }

    pub fn order_by(mut self, field: F, direction: SortDirection) -> Self {
        self.order = Some(OrderBy { field, direction });
        self
    }

    pub fn offset(mut self, offset: u64, limit: u32) -> Self {
        self.page = Pagination::Offset { offset, limit };
        self
    }

    pub fn after(mut self, cursor: impl Into<String>, limit: u32) -> Self {
        self.page = Pagination::Cursor {
            after: cursor.into(),
            limit,
        };
        self
    }
}

fn checked_limit(limit: u32) -> DbResult<u32> {
    if limit == 0 {
        return Err(DbError::validation("limit", "must be greater than zero"));
    }
    Ok(limit.min(MAX_PAGE_SIZE))
}

/// Accumulates WHERE clauses and their parameters for one table.
///
/// Each clause carries its own anonymous `?` placeholders, pushed in the
/// same order as its parameters.
pub(crate) struct Select {
    table: &'static str,
    columns: &'static str,
    key: String,
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Select {
    pub fn new(table: &'static str, columns: &'static str) -> Self {
        Self {
            table,
            columns,
            key: format!("{table}.id"),
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Use `expr` instead of the `id` column as the unique tie-breaker and
    /// cursor key.
    pub fn keyed_by(mut self, expr: &str) -> Self {
        self.key = expr.to_string();
        self
    }

    /// Add a clause containing exactly one `?` placeholder.
    pub fn push<V: ToSql + 'static>(&mut self, clause: impl Into<String>, value: V) -> &mut Self {
        self.clauses.push(clause.into());
        self.params.push(Box::new(value));
        self
    }

    pub fn push_raw(&mut self, clause: impl Into<String>) -> &mut Self {
        self.clauses.push(clause.into());
        self
    }

    pub fn eq<V: ToSql + 'static>(&mut self, column: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            let clause = format!("{}.{} = ?", self.table, column);
            self.push(clause, value);
        }
        self
    }

    pub fn contains(&mut self, column: &str, needle: Option<&str>) -> &mut Self {
        if let Some(needle) = needle {
            let clause = format!("instr(lower({}.{}), lower(?)) > 0", self.table, column);
            self.push(clause, needle.to_string());
        }
        self
    }

    pub fn at_least<V: ToSql + 'static>(&mut self, column: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            let clause = format!("{}.{} >= ?", self.table, column);
            self.push(clause, value);
        }
        self
    }

    pub fn at_most<V: ToSql + 'static>(&mut self, column: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            let clause = format!("{}.{} <= ?", self.table, column);
            self.push(clause, value);
        }
        self
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn count(self, conn: &Connection) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}{}", self.table, self.where_sql());
        let count: i64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(self.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn fetch<F, T>(
        mut self,
        conn: &Connection,
        query: &Query<F>,
        map_row: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> DbResult<Vec<T>>
    where
        F: SortField,
    {
        let order = query.order.unwrap_or(OrderBy {
            field: F::default(),
            direction: SortDirection::Asc,
        });
        let sort_column = format!("{}.{}", self.table, order.field.column());
        let key = self.key.clone();

        let mut tail_params: Vec<Box<dyn ToSql>> = Vec::new();
        let limit_sql = match &query.page {
            Pagination::Offset { offset, limit } => {
                tail_params.push(Box::new(checked_limit(*limit)?));
                let offset = i64::try_from(*offset)
                    .map_err(|_| DbError::validation("offset", format!("must be at most {}", i64::MAX)))?;
                tail_params.push(Box::new(offset));
                " LIMIT ? OFFSET ?"
            }
            Pagination::Cursor { after, limit } => {
                let known: Option<i64> = conn
                    .query_row(
                        &format!("SELECT 1 FROM {} WHERE {key} = ?", self.table),
                        [after],
                        |row| row.get(0),
                    )
                    .optional()?;
                if known.is_none() {
                    return Err(DbError::validation("cursor", format!("unknown cursor {after}")));
                }
                let clause = format!(
                    "({sort_column}, {key}) {} ((SELECT {sort_column} FROM {table} WHERE {key} = ?), ?)",
                    order.direction.after_operator(),
                    table = self.table,
                );
                self.clauses.push(clause);
                self.params.push(Box::new(after.clone()));
                self.params.push(Box::new(after.clone()));
                tail_params.push(Box::new(checked_limit(*limit)?));
                " LIMIT ?"
            }
            Pagination::All => "",
        };

        let direction = order.direction.keyword();
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {sort_column} {direction}, {key} {direction}{limit_sql}",
            self.columns,
            self.table,
            self.where_sql(),
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(self.params.iter().chain(tail_params.iter())),
                map_row,
            )?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default)]
    struct ByName;

    impl SortField for ByName {
        fn column(&self) -> &'static str {
            "name"
        }
    }

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE things (id TEXT PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO things VALUES ('a', 'pear'), ('b', 'apple'), ('c', 'fig'), ('d', 'apple');",
        )
        .unwrap();
        conn
    }

    fn ids(conn: &Connection, query: &Query<ByName>) -> Vec<String> {
        Select::new("things", "things.id")
            .fetch(conn, query, |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_order_breaks_ties_by_id() {
        let conn = fixture();
        let query = Query::new().order_by(ByName, SortDirection::Asc);
        assert_eq!(ids(&conn, &query), vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn test_cursor_walks_every_row_once() {
        let conn = fixture();
        let mut seen = Vec::new();
        let mut query = Query::new().order_by(ByName, SortDirection::Desc).offset(0, 2);
        loop {
            let page = ids(&conn, &query);
            if page.is_empty() {
                break;
            }
            let last = page.last().cloned().unwrap();
            seen.extend(page);
            query = query.after(last, 2);
        }
        assert_eq!(seen, vec!["a", "c", "d", "b"]);
    }

    #[test]
    fn test_unknown_cursor_is_rejected() {
        let conn = fixture();
        let query = Query::<ByName>::new().after("zzz", 10);
        let err = Select::new("things", "things.id")
            .fetch(&conn, &query, |row| row.get::<_, String>(0))
            .unwrap_err();
        assert_eq!(err, DbError::validation("cursor", "unknown cursor zzz"));
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let conn = fixture();
        let query = Query::<ByName>::new().offset(0, 0);
        let err = Select::new("things", "things.id")
            .fetch(&conn, &query, |row| row.get::<_, String>(0))
            .unwrap_err();
        assert!(matches!(err, DbError::ValidationError { .. }));
    }

    #[test]
    fn test_offset_beyond_range_is_rejected() {
        let conn = fixture();
        let query = Query::<ByName>::new().offset(u64::MAX, 10);
        let err = Select::new("things", "things.id")
            .fetch(&conn, &query, |row| row.get::<_, String>(0))
            .unwrap_err();
        assert!(matches!(err, DbError::ValidationError { ref field, .. } if field == "offset"));

        let past_end = Query::<ByName>::new().offset(10, 10);
        assert!(ids(&conn, &past_end).is_empty());
    }

    #[test]
    fn test_filters_and_count() {
        let conn = fixture();
        let mut select = Select::new("things", "things.id");
        select.contains("name", Some("PP"));
        assert_eq!(select.count(&conn).unwrap(), 2);
    }
}
