//! Schema bootstrap for the catalog tables
//!
//! Every statement is `IF NOT EXISTS`, so this can run on every startup.
//! Name/title uniqueness is enforced at the store level through NOCASE
//! unique indexes (values are stored trimmed, so the indexes cover the
//! trim-insensitive rule as well); the repositories run their own lookup
//! first so the error can name the conflicting row's id.

use sqlx::SqlitePool;
use tracing::debug;

const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS authors (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL COLLATE NOCASE,
        date_of_birth TEXT,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_date TEXT NOT NULL,
        modified_date TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_authors_name ON authors (name)",
    r#"
    CREATE TABLE IF NOT EXISTS books (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL COLLATE NOCASE,
        author_id TEXT NOT NULL REFERENCES authors(id),
        published_date TEXT,
        genre TEXT,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_date TEXT NOT NULL,
        modified_date TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_books_author_title ON books (author_id, title)",
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL COLLATE NOCASE,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_date TEXT NOT NULL,
        modified_date TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_name ON categories (name)",
    r#"
    CREATE TABLE IF NOT EXISTS book_categories (
        book_id TEXT NOT NULL REFERENCES books(id),
        category_id TEXT NOT NULL REFERENCES categories(id),
        PRIMARY KEY (book_id, category_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_book_categories_category ON book_categories (category_id)",
];

/// Create the catalog tables and indexes if they are missing
pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA_STATEMENTS {
        debug!("Applying schema statement: {}", statement.trim());
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
