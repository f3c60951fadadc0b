//! Book database repository
//!
//! Books carry their category links. Every read path fetches the flat
//! `(book_id, category_id, category_name)` rows for the returned books and
//! stitches them on through [`attach_categories`], so there is a single
//! code path turning flat link rows into nested records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::error::RepoError;
use crate::db::sqlite_helpers::{
    bool_to_int, date_to_str, datetime_to_str, int_to_bool, str_to_date_opt, str_to_datetime,
    str_to_datetime_opt, str_to_uuid, uuid_to_str,
};

/// Book record from database
///
/// `author_name` comes from the joined author row; `categories` is filled
/// by the stitching pass and is empty for a book with no links.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: Uuid,
    pub title: String,
    pub author_id: Uuid,
    pub author_name: String,
    pub published_date: Option<NaiveDate>,
    pub genre: Option<String>,
    pub categories: Vec<CategoryRef>,
    pub is_deleted: bool,
    pub created_date: DateTime<Utc>,
    pub modified_date: Option<DateTime<Utc>>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for BookRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let author_id_str: String = row.try_get("author_id")?;
        let published_date_str: Option<String> = row.try_get("published_date")?;
        let is_deleted: i32 = row.try_get("is_deleted")?;
        let created_str: String = row.try_get("created_date")?;
        let modified_str: Option<String> = row.try_get("modified_date")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
            title: row.try_get("title")?,
            author_id: str_to_uuid(&author_id_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
            author_name: row.try_get("author_name")?,
            published_date: str_to_date_opt(published_date_str.as_deref())
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            genre: row.try_get("genre")?,
            categories: Vec::new(),
            is_deleted: int_to_bool(is_deleted),
            created_date: str_to_datetime(&created_str)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            modified_date: str_to_datetime_opt(modified_str.as_deref())
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
        })
    }
}

/// A category as carried on a book record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
}

/// Flat link row as returned by the link queries
#[derive(Debug, Clone)]
struct BookCategoryRow {
    book_id: Uuid,
    category_id: Uuid,
    category_name: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for BookCategoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let book_id_str: String = row.try_get("book_id")?;
        let category_id_str: String = row.try_get("category_id")?;

        Ok(Self {
            book_id: str_to_uuid(&book_id_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
            category_id: str_to_uuid(&category_id_str)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            category_name: row.try_get("category_name")?,
        })
    }
}

/// Input for creating a new book
///
/// `categories` lists category ids to link together with the insert; the
/// whole creation fails if any of them does not exist.
#[derive(Debug, Clone)]
pub struct CreateBook {
    pub title: String,
    pub author_id: Uuid,
    pub published_date: Option<NaiveDate>,
    pub genre: Option<String>,
    pub categories: Vec<Uuid>,
}

/// Input for updating a book; absent fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author_id: Option<Uuid>,
    pub published_date: Option<NaiveDate>,
    pub genre: Option<String>,
    pub is_deleted: Option<bool>,
}

/// Filter options for listing books
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    /// Case-insensitive substring match on the book title
    pub title: Option<String>,
    /// Case-insensitive substring match on the owning author's name
    pub author: Option<String>,
    /// Case-insensitive substring match on a linked category's name
    pub category: Option<String>,
    /// Match only one deletion state; absent matches both
    pub is_deleted: Option<bool>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Result for paginated book queries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedBooks {
    pub books: Vec<BookRecord>,
    pub total_count: i64,
    pub has_more: bool,
}

const BOOK_COLUMNS: &str = r#"b.id, b.title, b.author_id, a.name AS author_name,
       b.published_date, b.genre, b.is_deleted, b.created_date, b.modified_date"#;

pub struct BookRepository {
    pool: SqlitePool,
}

impl BookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List books matching the filter, with categories stitched on and the
    /// total count under the same predicates
    pub async fn list(&self, filter: &BookFilter) -> Result<PaginatedBooks, RepoError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_idx = 1;

        if filter.title.is_some() {
            conditions.push(format!("LOWER(b.title) LIKE ?{}", param_idx));
            param_idx += 1;
        }
        if filter.author.is_some() {
            conditions.push(format!("LOWER(a.name) LIKE ?{}", param_idx));
            param_idx += 1;
        }
        if filter.category.is_some() {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM book_categories bc \
                 JOIN categories c ON c.id = bc.category_id \
                 WHERE bc.book_id = b.id AND LOWER(c.name) LIKE ?{})",
                param_idx
            ));
            param_idx += 1;
        }
        if filter.is_deleted.is_some() {
            conditions.push(format!("b.is_deleted = ?{}", param_idx));
        }
        let _ = param_idx;

        let where_clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(-1);

        let count_query = format!(
            "SELECT COUNT(*) FROM books b JOIN authors a ON a.id = b.author_id WHERE {}",
            where_clause
        );
        let data_query = format!(
            r#"
            SELECT {}
            FROM books b
            JOIN authors a ON a.id = b.author_id
            WHERE {}
            ORDER BY b.rowid
            LIMIT {} OFFSET {}
            "#,
            BOOK_COLUMNS, where_clause, limit, offset
        );

        let mut conn = self.pool.acquire().await?;

        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for pattern in [&filter.title, &filter.author, &filter.category]
            .into_iter()
            .flatten()
        {
            count_builder = count_builder.bind(format!("%{}%", pattern.to_lowercase()));
        }
        if let Some(is_deleted) = filter.is_deleted {
            count_builder = count_builder.bind(bool_to_int(is_deleted));
        }

        let total_count: i64 = count_builder.fetch_one(&mut *conn).await?;

        let mut data_builder = sqlx::query_as::<_, BookRecord>(&data_query);
        for pattern in [&filter.title, &filter.author, &filter.category]
            .into_iter()
            .flatten()
        {
            data_builder = data_builder.bind(format!("%{}%", pattern.to_lowercase()));
        }
        if let Some(is_deleted) = filter.is_deleted {
            data_builder = data_builder.bind(bool_to_int(is_deleted));
        }

        let mut books = data_builder.fetch_all(&mut *conn).await?;

        let has_more = offset + (books.len() as i64) < total_count;

        let ids: Vec<Uuid> = books.iter().map(|b| b.id).collect();
        let links = Self::category_links(&mut conn, &ids).await?;
        attach_categories(&mut books, links);

        Ok(PaginatedBooks {
            books,
            total_count,
            has_more,
        })
    }

    /// Get a book by ID, with categories stitched on
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<BookRecord>, RepoError> {
        let mut conn = self.pool.acquire().await?;

        let record = sqlx::query_as::<_, BookRecord>(&format!(
            r#"
            SELECT {}
            FROM books b
            JOIN authors a ON a.id = b.author_id
            WHERE b.id = ?1
            "#,
            BOOK_COLUMNS
        ))
        .bind(uuid_to_str(id))
        .fetch_optional(&mut *conn)
        .await?;

        let Some(mut record) = record else {
            return Ok(None);
        };

        let links = Self::category_links(&mut conn, &[record.id]).await?;
        attach_categories(std::slice::from_mut(&mut record), links);

        Ok(Some(record))
    }

    /// List all books owned by an author, with categories stitched on
    pub async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<BookRecord>, RepoError> {
        let mut conn = self.pool.acquire().await?;

        let mut books = sqlx::query_as::<_, BookRecord>(&format!(
            r#"
            SELECT {}
            FROM books b
            JOIN authors a ON a.id = b.author_id
            WHERE b.author_id = ?1
            ORDER BY b.rowid
            "#,
            BOOK_COLUMNS
        ))
        .bind(uuid_to_str(author_id))
        .fetch_all(&mut *conn)
        .await?;

        let ids: Vec<Uuid> = books.iter().map(|b| b.id).collect();
        let links = Self::category_links(&mut conn, &ids).await?;
        attach_categories(&mut books, links);

        Ok(books)
    }

    /// Create a new book together with its initial category links
    ///
    /// The row and the links go through one transaction: if any referenced
    /// category does not exist, nothing is persisted.
    pub async fn create(&self, input: CreateBook) -> Result<BookRecord, RepoError> {
        let title = input.title.trim().to_string();
        let author_id_str = uuid_to_str(input.author_id);

        let author: Option<(String,)> = sqlx::query_as("SELECT id FROM authors WHERE id = ?1")
            .bind(&author_id_str)
            .fetch_optional(&self.pool)
            .await?;
        if author.is_none() {
            return Err(RepoError::invalid(format!(
                "the author with id {} does not exist",
                input.author_id
            )));
        }

        if let Some((existing_id, existing_title)) =
            self.find_by_title(&title, input.author_id, None).await?
        {
            return Err(RepoError::conflict(format!(
                "the book '{}' already exists with the id {}",
                existing_title, existing_id
            )));
        }

        let id = Uuid::new_v4();
        let created_date = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO books (id, title, author_id, published_date, genre, is_deleted, created_date)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(&title)
        .bind(&author_id_str)
        .bind(input.published_date.map(date_to_str))
        .bind(input.genre.as_deref().map(str::trim))
        .bind(datetime_to_str(created_date))
        .execute(&mut *tx)
        .await?;

        let mut seen: HashSet<Uuid> = HashSet::new();
        for category_id in &input.categories {
            if !seen.insert(*category_id) {
                continue;
            }

            let category: Option<(String,)> =
                sqlx::query_as("SELECT id FROM categories WHERE id = ?1")
                    .bind(uuid_to_str(*category_id))
                    .fetch_optional(&mut *tx)
                    .await?;
            if category.is_none() {
                // Dropping the transaction rolls the book row back
                return Err(RepoError::invalid(format!(
                    "the category with id {} does not exist",
                    category_id
                )));
            }

            sqlx::query("INSERT INTO book_categories (book_id, category_id) VALUES (?1, ?2)")
                .bind(uuid_to_str(id))
                .bind(uuid_to_str(*category_id))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Store(sqlx::Error::RowNotFound))
    }

    /// Apply a partial update to a book
    ///
    /// Title uniqueness is checked against the author the book belongs to
    /// after the update: the supplied `author_id` when present, the current
    /// one otherwise. `modified_date` is stamped only when a stored value
    /// actually changes.
    pub async fn update(&self, id: Uuid, input: UpdateBook) -> Result<BookRecord, RepoError> {
        let current = self.get_by_id(id).await?.ok_or_else(|| {
            RepoError::not_found(format!("attempted to update non-existing book {}", id))
        })?;

        let mut changed = false;

        let mut author_id = current.author_id;
        if let Some(new_author_id) = input.author_id {
            if new_author_id != current.author_id {
                author_id = new_author_id;
                changed = true;
            }
        }

        if input.title.is_some() || input.author_id.is_some() {
            let candidate_title = input
                .title
                .as_deref()
                .map(str::trim)
                .unwrap_or(&current.title);
            if let Some((existing_id, _)) = self
                .find_by_title(candidate_title, author_id, Some(id))
                .await?
            {
                return Err(RepoError::conflict(format!(
                    "the book title '{}' already exists with the id {}",
                    candidate_title, existing_id
                )));
            }
        }

        let mut title = current.title.clone();
        if let Some(new_title) = input.title.as_deref() {
            let trimmed = new_title.trim();
            if trimmed != current.title {
                title = trimmed.to_string();
                changed = true;
            }
        }

        let mut published_date = current.published_date;
        if let Some(new_published_date) = input.published_date {
            if Some(new_published_date) != current.published_date {
                published_date = Some(new_published_date);
                changed = true;
            }
        }

        let mut genre = current.genre.clone();
        if let Some(new_genre) = input.genre.as_deref() {
            let trimmed = new_genre.trim();
            if Some(trimmed) != current.genre.as_deref() {
                genre = Some(trimmed.to_string());
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
                UPDATE books
                SET title = ?2, author_id = ?3, published_date = ?4, genre = ?5,
                    is_deleted = ?6, modified_date = ?7
                WHERE id = ?1
                "#,
            )
            .bind(uuid_to_str(id))
            .bind(&title)
            .bind(uuid_to_str(author_id))
            .bind(published_date.map(date_to_str))
            .bind(&genre)
            .bind(bool_to_int(is_deleted))
            .bind(datetime_to_str(Utc::now()))
            .execute(&self.pool)
            .await?;
        }

        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Store(sqlx::Error::RowNotFound))
    }

    /// Soft-delete a book
    ///
    /// Idempotent: deleting an already-deleted book succeeds and re-stamps
    /// `modified_date`.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, RepoError> {
        self.get_by_id(id).await?.ok_or_else(|| {
            RepoError::not_found(format!("attempted to delete non-existing book {}", id))
        })?;

        sqlx::query(
            r#"
            UPDATE books
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

    /// Link a category to a book
    ///
    /// The book must exist and not be soft-deleted; the category must
    /// exist. Linking an already-linked pair is a conflict.
    pub async fn add_category(
        &self,
        book_id: Uuid,
        category_id: Uuid,
    ) -> Result<CategoryRef, RepoError> {
        let mut conn = self.pool.acquire().await?;

        let name = self
            .require_link_endpoints(&mut conn, book_id, category_id)
            .await?;

        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT book_id FROM book_categories WHERE book_id = ?1 AND category_id = ?2",
        )
        .bind(uuid_to_str(book_id))
        .bind(uuid_to_str(category_id))
        .fetch_optional(&mut *conn)
        .await?;
        if existing.is_some() {
            return Err(RepoError::conflict(format!(
                "the book {} is already linked to the category {}",
                book_id, category_id
            )));
        }

        sqlx::query("INSERT INTO book_categories (book_id, category_id) VALUES (?1, ?2)")
            .bind(uuid_to_str(book_id))
            .bind(uuid_to_str(category_id))
            .execute(&mut *conn)
            .await?;

        Ok(CategoryRef {
            id: category_id,
            name,
        })
    }

    /// Unlink a category from a book
    ///
    /// Removing a link that does not exist succeeds; the book and category
    /// themselves must exist (and the book must not be soft-deleted).
    pub async fn remove_category(
        &self,
        book_id: Uuid,
        category_id: Uuid,
    ) -> Result<bool, RepoError> {
        let mut conn = self.pool.acquire().await?;

        self.require_link_endpoints(&mut conn, book_id, category_id)
            .await?;

        sqlx::query("DELETE FROM book_categories WHERE book_id = ?1 AND category_id = ?2")
            .bind(uuid_to_str(book_id))
            .bind(uuid_to_str(category_id))
            .execute(&mut *conn)
            .await?;

        Ok(true)
    }

    /// Validate the endpoints of a link operation; returns the category name
    async fn require_link_endpoints(
        &self,
        conn: &mut SqliteConnection,
        book_id: Uuid,
        category_id: Uuid,
    ) -> Result<String, RepoError> {
        let book: Option<(String,)> =
            sqlx::query_as("SELECT id FROM books WHERE id = ?1 AND is_deleted = 0")
                .bind(uuid_to_str(book_id))
                .fetch_optional(&mut *conn)
                .await?;
        if book.is_none() {
            return Err(RepoError::not_found(format!(
                "the book with id {} does not exist",
                book_id
            )));
        }

        let category: Option<(String, String)> =
            sqlx::query_as("SELECT id, name FROM categories WHERE id = ?1")
                .bind(uuid_to_str(category_id))
                .fetch_optional(&mut *conn)
                .await?;
        let Some((_, name)) = category else {
            return Err(RepoError::not_found(format!(
                "the category with id {} does not exist",
                category_id
            )));
        };

        Ok(name)
    }

    /// Find a book of the given author whose trimmed title matches
    /// case-insensitively, optionally excluding one id. Soft-deleted rows
    /// count.
    async fn find_by_title(
        &self,
        title: &str,
        author_id: Uuid,
        exclude_id: Option<Uuid>,
    ) -> Result<Option<(String, String)>, RepoError> {
        let existing: Option<(String, String)> = match exclude_id {
            Some(exclude_id) => {
                sqlx::query_as(
                    "SELECT id, title FROM books \
                     WHERE LOWER(title) = LOWER(?1) AND author_id = ?2 AND id != ?3",
                )
                .bind(title.trim())
                .bind(uuid_to_str(author_id))
                .bind(uuid_to_str(exclude_id))
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, title FROM books \
                     WHERE LOWER(title) = LOWER(?1) AND author_id = ?2",
                )
                .bind(title.trim())
                .bind(uuid_to_str(author_id))
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(existing)
    }

    /// Fetch the flat link rows for a set of books, ordered by category name
    async fn category_links(
        conn: &mut SqliteConnection,
        book_ids: &[Uuid],
    ) -> Result<Vec<BookCategoryRow>, RepoError> {
        if book_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=book_ids.len()).map(|i| format!("?{}", i)).collect();
        let query = format!(
            r#"
            SELECT bc.book_id, c.id AS category_id, c.name AS category_name
            FROM book_categories bc
            JOIN categories c ON c.id = bc.category_id
            WHERE bc.book_id IN ({})
            ORDER BY c.name
            "#,
            placeholders.join(", ")
        );

        let mut builder = sqlx::query_as::<_, BookCategoryRow>(&query);
        for book_id in book_ids {
            builder = builder.bind(uuid_to_str(*book_id));
        }

        Ok(builder.fetch_all(&mut *conn).await?)
    }
}

/// Stitch flat link rows onto their parent books
///
/// Every book is first given an empty list, so a book without links ends up
/// with `categories = []` rather than a missing field; the link rows are
/// then folded in with a single pass. Runs in O(books + links).
fn attach_categories(books: &mut [BookRecord], links: Vec<BookCategoryRow>) {
    let mut by_book: HashMap<Uuid, Vec<CategoryRef>> =
        books.iter().map(|b| (b.id, Vec::new())).collect();

    for link in links {
        if let Some(categories) = by_book.get_mut(&link.book_id) {
            categories.push(CategoryRef {
                id: link.category_id,
                name: link.category_name,
            });
        }
    }

    for book in books {
        if let Some(categories) = by_book.remove(&book.id) {
            book.categories = categories;
        }
    }
}
