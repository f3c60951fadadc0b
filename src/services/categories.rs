//! Category business service

use tracing::error;

use crate::db::Database;
use crate::db::categories::{CategoryFilter, CategoryRecord, CreateCategory, UpdateCategory};
use crate::db::error::RepoError;

use super::parse_id;

pub struct CategoryService {
    db: Database,
}

impl CategoryService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Category listings take no paging envelope; `limit` is optional and
    /// only validated when supplied.
    pub async fn list(&self, filter: CategoryFilter) -> Result<Vec<CategoryRecord>, RepoError> {
        if let Some(limit) = filter.limit {
            if limit <= 0 {
                return Err(RepoError::invalid(
                    "the limit parameter must have a valid value greater than 0",
                ));
            }
        }

        self.db
            .categories()
            .list(&filter)
            .await
            .inspect_err(|error| error!(%error, "an error occurred while listing categories"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<CategoryRecord>, RepoError> {
        let id = parse_id(id)?;

        self.db
            .categories()
            .get_by_id(id)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while fetching a category"))
    }

    pub async fn create(&self, input: CreateCategory) -> Result<CategoryRecord, RepoError> {
        self.db
            .categories()
            .create(input)
            .await
            .inspect_err(|error| error!(%error, "an error occurred while creating a category"))
    }

    pub async fn update(
        &self,
        id: &str,
        input: UpdateCategory,
    ) -> Result<CategoryRecord, RepoError> {
        let id = parse_id(id)?;

        self.db
            .categories()
            .update(id, input)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while updating a category"))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, RepoError> {
        let id = parse_id(id)?;

        self.db
            .categories()
            .soft_delete(id)
            .await
            .inspect_err(|error| error!(%error, %id, "an error occurred while deleting a category"))
    }
}
