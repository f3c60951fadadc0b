//! Author database repository

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::error::RepoError;
use crate::db::sqlite_helpers::{
    bool_to_int, date_to_str, datetime_to_str, int_to_bool, str_to_date_opt, str_to_datetime,
    str_to_datetime_opt, str_to_uuid, uuid_to_str,
};

/// Author record from database
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRecord {
    pub id: Uuid,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub is_deleted: bool,
    pub created_date: DateTime<Utc>,
    pub modified_date: Option<DateTime<Utc>>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for AuthorRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let date_of_birth_str: Option<String> = row.try_get("date_of_birth")?;
        let is_deleted: i32 = row.try_get("is_deleted")?;
        let created_str: String = row.try_get("created_date")?;
        let modified_str: Option<String> = row.try_get("modified_date")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
            name: row.try_get("name")?,
            date_of_birth: str_to_date_opt(date_of_birth_str.as_deref())
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            is_deleted: int_to_bool(is_deleted),
            created_date: str_to_datetime(&created_str)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            modified_date: str_to_datetime_opt(modified_str.as_deref())
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
        })
    }
}

/// Input for creating a new author
#[derive(Debug, Clone)]
pub struct CreateAuthor {
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
}

/// Input for updating an author; absent fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateAuthor {
    pub name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub is_deleted: Option<bool>,
}

/// Filter options for listing authors
///
/// `offset` and `limit` are validated by the service layer; the repository
/// assumes they hold valid values when present.
#[derive(Debug, Clone, Default)]
pub struct AuthorFilter {
    /// Case-insensitive substring match on the author name
    pub name: Option<String>,
    /// Match only one deletion state; absent matches both
    pub is_deleted: Option<bool>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Result for paginated author queries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedAuthors {
    pub authors: Vec<AuthorRecord>,
    pub total_count: i64,
    pub has_more: bool,
}

pub struct AuthorRepository {
    pool: SqlitePool,
}

impl AuthorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List authors matching the filter, with the total count under the
    /// same predicates
    pub async fn list(&self, filter: &AuthorFilter) -> Result<PaginatedAuthors, RepoError> {
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

        let offset = filter.offset.unwrap_or(0);
        // SQLite treats a negative limit as "no limit"
        let limit = filter.limit.unwrap_or(-1);

        let count_query = format!("SELECT COUNT(*) FROM authors WHERE {}", where_clause);
        let data_query = format!(
            r#"
            SELECT id, name, date_of_birth, is_deleted, created_date, modified_date
            FROM authors
            WHERE {}
            ORDER BY rowid
            LIMIT {} OFFSET {}
            "#,
            where_clause, limit, offset
        );

        let mut conn = self.pool.acquire().await?;

        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(name) = &filter.name {
            count_builder = count_builder.bind(format!("%{}%", name.to_lowercase()));
        }
        if let Some(is_deleted) = filter.is_deleted {
            count_builder = count_builder.bind(bool_to_int(is_deleted));
        }

        let total_count: i64 = count_builder.fetch_one(&mut *conn).await?;

        let mut data_builder = sqlx::query_as::<_, AuthorRecord>(&data_query);
        if let Some(name) = &filter.name {
            data_builder = data_builder.bind(format!("%{}%", name.to_lowercase()));
        }
        if let Some(is_deleted) = filter.is_deleted {
            data_builder = data_builder.bind(bool_to_int(is_deleted));
        }

        let authors = data_builder.fetch_all(&mut *conn).await?;

        let has_more = offset + (authors.len() as i64) < total_count;

        Ok(PaginatedAuthors {
            authors,
            total_count,
            has_more,
        })
    }

    /// Get an author by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<AuthorRecord>, RepoError> {
        let record = sqlx::query_as::<_, AuthorRecord>(
            r#"
            SELECT id, name, date_of_birth, is_deleted, created_date, modified_date
            FROM authors
            WHERE id = ?1
            "#,
        )
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Create a new author
    pub async fn create(&self, input: CreateAuthor) -> Result<AuthorRecord, RepoError> {
        let name = input.name.trim().to_string();

        if let Some((existing_id, existing_name)) = self.find_by_name(&name, None).await? {
            return Err(RepoError::conflict(format!(
                "the author '{}' already exists with the id {}",
                existing_name, existing_id
            )));
        }

        let id = Uuid::new_v4();
        let created_date = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO authors (id, name, date_of_birth, is_deleted, created_date)
            VALUES (?1, ?2, ?3, 0, ?4)
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(&name)
        .bind(input.date_of_birth.map(date_to_str))
        .bind(datetime_to_str(created_date))
        .execute(&self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Store(sqlx::Error::RowNotFound))
    }

    /// Apply a partial update to an author
    ///
    /// `modified_date` is stamped only when at least one stored value
    /// actually changes; re-submitting the current values is a no-op.
    pub async fn update(&self, id: Uuid, input: UpdateAuthor) -> Result<AuthorRecord, RepoError> {
        let current = self.get_by_id(id).await?.ok_or_else(|| {
            RepoError::not_found(format!("attempted to update non-existing author {}", id))
        })?;

        let mut changed = false;

        let mut name = current.name.clone();
        if let Some(new_name) = input.name.as_deref() {
            let trimmed = new_name.trim();
            if let Some((existing_id, _)) = self.find_by_name(trimmed, Some(id)).await? {
                return Err(RepoError::conflict(format!(
                    "the author name '{}' already exists with the id {}",
                    trimmed, existing_id
                )));
            }
            if trimmed != current.name {
                name = trimmed.to_string();
                changed = true;
            }
        }

        let mut date_of_birth = current.date_of_birth;
        if let Some(new_date_of_birth) = input.date_of_birth {
            if Some(new_date_of_birth) != current.date_of_birth {
                date_of_birth = Some(new_date_of_birth);
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
                UPDATE authors
                SET name = ?2, date_of_birth = ?3, is_deleted = ?4, modified_date = ?5
                WHERE id = ?1
                "#,
            )
            .bind(uuid_to_str(id))
            .bind(&name)
            .bind(date_of_birth.map(date_to_str))
            .bind(bool_to_int(is_deleted))
            .bind(datetime_to_str(Utc::now()))
            .execute(&self.pool)
            .await?;
        }

        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Store(sqlx::Error::RowNotFound))
    }

    /// Soft-delete an author
    ///
    /// Idempotent: deleting an already-deleted author succeeds and
    /// re-stamps `modified_date`.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, RepoError> {
        self.get_by_id(id).await?.ok_or_else(|| {
            RepoError::not_found(format!("attempted to delete non-existing author {}", id))
        })?;

        sqlx::query(
            r#"
            UPDATE authors
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

    /// Find an author whose trimmed name matches case-insensitively,
    /// optionally excluding one id. Soft-deleted rows count.
    async fn find_by_name(
        &self,
        name: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<Option<(String, String)>, RepoError> {
        let existing: Option<(String, String)> = match exclude_id {
            Some(exclude_id) => {
                sqlx::query_as(
                    "SELECT id, name FROM authors WHERE LOWER(name) = LOWER(?1) AND id != ?2",
                )
                .bind(name.trim())
                .bind(uuid_to_str(exclude_id))
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT id, name FROM authors WHERE LOWER(name) = LOWER(?1)")
                    .bind(name.trim())
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        Ok(existing)
    }
}
