//! Author business service

use tracing::error;

use crate::db::Database;
use crate::db::authors::{AuthorFilter, AuthorRecord, CreateAuthor, PaginatedAuthors, UpdateAuthor};
use crate::db::books::BookRecord;
use crate::db::error::RepoError;

use super::{parse_id, validate_paging};

pub struct AuthorService {
    db: Database,
}

impl AuthorService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(&self, filter: AuthorFilter) -> Result<PaginatedAuthors, RepoError> {
        validate_paging(filter.offset, filter.limit)?;

        self.db
            .authors()
            .list(&filter)
            .await
            .inspect_err(|error| error!(%error, "an error occurred while listing authors"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<AuthorRecord>, RepoError> {
        let id = parse_id(id)?;

        self.db
            .authors()
            .get_by_id(id)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while fetching an author"))
    }

    /// List the books owned by an author
    pub async fn get_books(&self, id: &str) -> Result<Vec<BookRecord>, RepoError> {
        let id = parse_id(id)?;

        self.db
            .books()
            .list_by_author(id)
            .await
            .inspect_err(|error| {
                error!(%error, %id, "an error occurred while listing an author's books")
            })
    }

    pub async fn create(&self, input: CreateAuthor) -> Result<AuthorRecord, RepoError> {
        self.db
            .authors()
            .create(input)
            .await
            .inspect_err(|error| error!(%error, "an error occurred while creating an author"))
    }

    pub async fn update(&self, id: &str, input: UpdateAuthor) -> Result<AuthorRecord, RepoError> {
        let id = parse_id(id)?;

        self.db
            .authors()
            .update(id, input)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while updating an author"))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, RepoError> {
        let id = parse_id(id)?;

        self.db
            .authors()
            .soft_delete(id)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while deleting an author"))
    }
}
