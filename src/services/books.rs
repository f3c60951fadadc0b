//! Book business service

use tracing::error;

use crate::db::Database;
use crate::db::books::{
    BookFilter, BookRecord, CategoryRef, CreateBook, PaginatedBooks, UpdateBook,
};
use crate::db::error::RepoError;

use super::{parse_id, validate_paging};

pub struct BookService {
    db: Database,
}

impl BookService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(&self, filter: BookFilter) -> Result<PaginatedBooks, RepoError> {
        validate_paging(filter.offset, filter.limit)?;

        self.db
            .books()
            .list(&filter)
            .await
            .inspect_err(|error| error!(%error, "an error occurred while listing books"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<BookRecord>, RepoError> {
        let id = parse_id(id)?;

        self.db
            .books()
            .get_by_id(id)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while fetching a book"))
    }

    pub async fn create(&self, input: CreateBook) -> Result<BookRecord, RepoError> {
        if input.author_id.is_nil() {
            return Err(RepoError::invalid("the author id property cannot be empty"));
        }

        self.db
            .books()
            .create(input)
            .await
            .inspect_err(|error| error!(%error, "an error occurred while creating a book"))
    }

    pub async fn update(&self, id: &str, input: UpdateBook) -> Result<BookRecord, RepoError> {
        let id = parse_id(id)?;

        self.db
            .books()
            .update(id, input)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while updating a book"))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, RepoError> {
        let id = parse_id(id)?;

        self.db
            .books()
            .soft_delete(id)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while deleting a book"))
    }

    pub async fn add_category(
        &self,
        id: &str,
        category_id: &str,
    ) -> Result<CategoryRef, RepoError> {
        let book_id = parse_id(id)?;
        let category_id = parse_id(category_id)?;

        self.db
            .books()
            .add_category(book_id, category_id)
            .await
            .inspect_err(|error| {
                error!(%error, %book_id, %category_id, "an error occurred while linking a category")
            })
    }

    pub async fn remove_category(&self, id: &str, category_id: &str) -> Result<bool, RepoError> {
        let book_id = parse_id(id)?;
        let category_id = parse_id(category_id)?;

        self.db
            .books()
            .remove_category(book_id, category_id)
            .await
            .inspect_err(|error| {
                error!(%error, %book_id, %category_id, "an error occurred while unlinking a category")
            })
    }
}
