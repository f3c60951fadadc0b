//! Category database repository

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::books::BookRecord;
use crate::db::error::RepoError;
use crate::db::sqlite_helpers::{
    bool_to_int, datetime_to_str, int_to_bool, str_to_datetime, str_to_datetime_opt, str_to_uuid,
    uuid_to_str,
};

/// Category record from database
///
/// `books` is populated by by-id reads only; listings leave it empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: Uuid,
    pub name: String,
    pub is_deleted: bool,
    pub created_date: DateTime<Utc>,
    pub modified_date: Option<DateTime<Utc>>,
    pub books: Vec<BookRecord>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for CategoryRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let is_deleted: i32 = row.try_get("is_deleted")?;
        let created_str: String = row.try_get("created_date")?;
        let modified_str: Option<String> = row.try_get("modified_date")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
            name: row.try_get("name")?,
            is_deleted: int_to_bool(is_deleted),
            created_date: str_to_datetime(&created_str)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            modified_date: str_to_datetime_opt(modified_str.as_deref())
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            books: Vec::new(),
        })
    }
}

/// Input for creating a new category
#[derive(Debug, Clone)]
pub struct CreateCategory {
    pub name: String,
}

/// Input for updating a category; absent fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub is_deleted: Option<bool>,
}

/// Filter options for listing categories
///
/// Category listings are ordered by name and take no offset; `limit` is
/// optional.
#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    /// Case-insensitive substring match on the category name
    pub name: Option<String>,
    /// Match only one deletion state; absent matches both
    pub is_deleted: Option<bool>,
    pub limit: Option<i64>,
}

pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List categories matching the filter, ordered by name
    pub async fn list(&self, filter: &CategoryFilter) -> Result<Vec<CategoryRecord>, RepoError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_idx = 1;

        if filter.name.is_some() {
            conditions.push(format!("LOWER(name) LIKE ?{}", param_idx));
            param_idx += 1;
        }
        if filter.is_deleted.is_some() {
            conditions.push(format!("is_deleted = ?{}", param_idx));
        }
        let _ = param_idx;

        let where_clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let limit = filter.limit.unwrap_or(-1);

        let data_query = format!(
            r#"
            SELECT id, name, is_deleted, created_date, modified_date
            FROM categories
            WHERE {}
            ORDER BY name
            LIMIT {}
            "#,
            where_clause, limit
        );

        let mut data_builder = sqlx::query_as::<_, CategoryRecord>(&data_query);
        if let Some(name) = &filter.name {
            data_builder = data_builder.bind(format!("%{}%", name.to_lowercase()));
        }
        if let Some(is_deleted) = filter.is_deleted {
            data_builder = data_builder.bind(bool_to_int(is_deleted));
        }

        let records = data_builder.fetch_all(&self.pool).await?;

        Ok(records)
    }

    /// Get a category by ID, with the books linked to it
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
        let mut conn = self.pool.acquire().await?;

        let record = sqlx::query_as::<_, CategoryRecord>(
            r#"
            SELECT id, name, is_deleted, created_date, modified_date
            FROM categories
            WHERE id = ?1
            "#,
        )
        .bind(uuid_to_str(id))
        .fetch_optional(&mut *conn)
        .await?;

        let Some(mut record) = record else {
            return Ok(None);
        };

        record.books = sqlx::query_as::<_, BookRecord>(
            r#"
            SELECT b.id, b.title, b.author_id, a.name AS author_name,
                   b.published_date, b.genre, b.is_deleted, b.created_date, b.modified_date
            FROM books b
            JOIN book_categories bc ON bc.book_id = b.id
            JOIN authors a ON a.id = b.author_id
            WHERE bc.category_id = ?1
            ORDER BY b.rowid
            "#,
        )
        .bind(uuid_to_str(id))
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(record))
    }

    /// Create a new category
    pub async fn create(&self, input: CreateCategory) -> Result<CategoryRecord, RepoError> {
        let name = input.name.trim().to_string();

        if let Some((existing_id, existing_name)) = self.find_by_name(&name, None).await? {
            return Err(RepoError::conflict(format!(
                "the category '{}' already exists with the id {}",
                existing_name, existing_id
            )));
        }

        let id = Uuid::new_v4();
        let created_date = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO categories (id, name, is_deleted, created_date)
            VALUES (?1, ?2, 0, ?3)
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(&name)
        .bind(datetime_to_str(created_date))
        .execute(&self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Store(sqlx::Error::RowNotFound))
    }

    /// Apply a partial update to a category
    ///
    /// `modified_date` is stamped only when a stored value actually
    /// changes.
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateCategory,
    ) -> Result<CategoryRecord, RepoError> {
        let current = self.get_by_id(id).await?.ok_or_else(|| {
            RepoError::not_found(format!("attempted to update non-existing category {}", id))
        })?;

        let mut changed = false;

        let mut name = current.name.clone();
        if let Some(new_name) = input.name.as_deref() {
            let trimmed = new_name.trim();
            if let Some((existing_id, _)) = self.find_by_name(trimmed, Some(id)).await? {
                return Err(RepoError::conflict(format!(
                    "the category name '{}' already exists with the id {}",
                    trimmed, existing_id
                )));
            }
            if trimmed != current.name {
                name = trimmed.to_string();
                changed = true;
            }
        }

        let mut is_deleted = current.is_deleted;
        if let Some(new_is_deleted) = input.is_deleted {
            if new_is_deleted != current.is_deleted {
                is_deleted = new_is_deleted;
                changed = true;
            }
        }

        if changed {
            sqlx::query(
                r#"
                UPDATE categories
                SET name = ?2, is_deleted = ?3, modified_date = ?4
                WHERE id = ?1
                "#,
            )
            .bind(uuid_to_str(id))
            .bind(&name)
            .bind(bool_to_int(is_deleted))
            .bind(datetime_to_str(Utc::now()))
            .execute(&self.pool)
            .await?;
        }

        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Store(sqlx::Error::RowNotFound))
    }

    /// Soft-delete a category
    ///
    /// Idempotent: deleting an already-deleted category succeeds and
    /// re-stamps `modified_date`.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, RepoError> {
        self.get_by_id(id).await?.ok_or_else(|| {
            RepoError::not_found(format!("attempted to delete non-existing category {}", id))
        })?;

        sqlx::query(
            r#"
            UPDATE categories
            SET is_deleted = 1, modified_date = ?2
            WHERE id = ?1
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(datetime_to_str(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    /// Find a category whose trimmed name matches case-insensitively,
    /// optionally excluding one id. Soft-deleted rows count.
    async fn find_by_name(
        &self,
        name: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<Option<(String, String)>, RepoError> {
        let existing: Option<(String, String)> = match exclude_id {
            Some(exclude_id) => {
                sqlx::query_as(
                    "SELECT id, name FROM categories WHERE LOWER(name) = LOWER(?1) AND id != ?2",
                )
                .bind(name.trim())
                .bind(uuid_to_str(exclude_id))
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT id, name FROM categories WHERE LOWER(name) = LOWER(?1)")
                    .bind(name.trim())
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        Ok(existing)
    }
}
