//! Business validation services
//!
//! Thin wrappers over the repositories: they parse raw string identifiers,
//! bound-check paging parameters and log failures with operation context
//! before handing the typed values down. All domain rules (uniqueness,
//! existence, timestamps) live in the repositories.

pub mod authors;
pub mod books;
pub mod categories;

pub use authors::AuthorService;
pub use books::BookService;
pub use categories::CategoryService;

use uuid::Uuid;

use crate::db::error::RepoError;

/// Parse a raw identifier supplied by the caller
pub(crate) fn parse_id(id: &str) -> Result<Uuid, RepoError> {
    Uuid::try_parse(id.trim())
        .map_err(|_| RepoError::invalid(format!("the id '{}' must be a valid UUID", id)))
}

/// Validate the paging parameters of a list request
///
/// Both values are required: a missing offset or limit fails the same way
/// an out-of-range one does.
pub(crate) fn validate_paging(offset: Option<i64>, limit: Option<i64>) -> Result<(), RepoError> {
    match offset {
        Some(offset) if offset >= 0 => {}
        _ => {
            return Err(RepoError::invalid(
                "the offset parameter must have a valid value greater than or equal to 0",
            ));
        }
    }

    match limit {
        Some(limit) if limit > 0 => {}
        _ => {
            return Err(RepoError::invalid(
                "the limit parameter must have a valid value greater than 0",
            ));
        }
    }

    Ok(())
}
