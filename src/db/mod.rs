//! Database connection and repositories
//!
//! Re-exports are provided for convenience, even if not all are used within the crate.

#![allow(unused_imports)]

pub mod authors;
pub mod books;
pub mod categories;
pub mod error;
pub mod schema;
pub mod sqlite_helpers;

use std::str::FromStr;

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use authors::{AuthorFilter, AuthorRecord, AuthorRepository, CreateAuthor, PaginatedAuthors, UpdateAuthor};
pub use books::{
    BookFilter, BookRecord, BookRepository, CategoryRef, CreateBook, PaginatedBooks, UpdateBook,
};
pub use categories::{
    CategoryFilter, CategoryRecord, CategoryRepository, CreateCategory, UpdateCategory,
};
pub use error::RepoError;

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10)
    }

    /// Create a new database connection pool and bootstrap the schema
    ///
    /// Accepts a plain path, `sqlite://` URL or `sqlite::memory:`. The
    /// database file is created when missing; foreign keys are enforced on
    /// every connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await?;

        schema::init(&pool).await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get an author repository
    pub fn authors(&self) -> AuthorRepository {
        AuthorRepository::new(self.pool.clone())
    }

    /// Get a book repository
    pub fn books(&self) -> BookRepository {
        BookRepository::new(self.pool.clone())
    }

    /// Get a category repository
    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.pool.clone())
    }
}
