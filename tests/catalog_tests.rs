//! Integration tests for the catalog data-access layer
//!
//! Every test runs against its own in-memory SQLite database with the
//! schema bootstrapped, exercising the repositories (and the validation
//! services) end to end: write pipeline, filtered paginated reads,
//! category stitching and the error taxonomy.

use std::str::FromStr;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use uuid::Uuid;

use libris::Database;
use libris::db::authors::{AuthorFilter, AuthorRecord, CreateAuthor, UpdateAuthor};
use libris::db::books::{BookFilter, CreateBook, UpdateBook};
use libris::db::categories::{CategoryFilter, CreateCategory, UpdateCategory};
use libris::db::error::RepoError;
use libris::db::schema;
use libris::services::{AuthorService, BookService, CategoryService};

/// A fresh in-memory database.
///
/// The pool is capped at one connection: each SQLite `:memory:` connection
/// is its own database, so a larger pool would hand out empty databases.
async fn test_db() -> Database {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    schema::init(&pool).await.unwrap();

    Database::new(pool)
}

async fn create_author(db: &Database, name: &str) -> AuthorRecord {
    db.authors()
        .create(CreateAuthor {
            name: name.to_string(),
            date_of_birth: None,
        })
        .await
        .unwrap()
}

async fn create_category(db: &Database, name: &str) -> Uuid {
    db.categories()
        .create(CreateCategory {
            name: name.to_string(),
        })
        .await
        .unwrap()
        .id
}

async fn create_book(db: &Database, author_id: Uuid, title: &str, categories: Vec<Uuid>) -> Uuid {
    db.books()
        .create(CreateBook {
            title: title.to_string(),
            author_id,
            published_date: None,
            genre: None,
            categories,
        })
        .await
        .unwrap()
        .id
}

// ============================================================================
// Write pipeline
// ============================================================================

#[tokio::test]
async fn test_create_then_get_returns_trimmed_input() {
    let db = test_db().await;

    let created = db
        .authors()
        .create(CreateAuthor {
            name: "  J.R.R. Tolkien  ".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1892, 1, 3),
        })
        .await
        .unwrap();

    let fetched = db.authors().get_by_id(created.id).await.unwrap().unwrap();

    assert_eq!(fetched.name, "J.R.R. Tolkien");
    assert_eq!(fetched.date_of_birth, NaiveDate::from_ymd_opt(1892, 1, 3));
    assert!(!fetched.is_deleted);
    assert_eq!(fetched.created_date, created.created_date);
    assert_eq!(fetched.modified_date, None);
}

#[tokio::test]
async fn test_create_duplicate_name_conflicts_despite_case_and_whitespace() {
    let db = test_db().await;

    create_author(&db, "J.K. Rowling").await;

    let result = db
        .authors()
        .create(CreateAuthor {
            name: " j.k. rowling ".to_string(),
            date_of_birth: None,
        })
        .await;

    assert_matches!(result, Err(RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_noop_update_does_not_stamp_modified_date() {
    let db = test_db().await;

    let author = create_author(&db, "Ursula K. Le Guin").await;

    // Re-submitting the stored values changes nothing
    let updated = db
        .authors()
        .update(
            author.id,
            UpdateAuthor {
                name: Some("Ursula K. Le Guin".to_string()),
                date_of_birth: None,
                is_deleted: Some(false),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.modified_date, None);
}

#[tokio::test]
async fn test_update_applies_only_supplied_fields() {
    let db = test_db().await;

    let author = db
        .authors()
        .create(CreateAuthor {
            name: "Terry Pratchet".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1948, 4, 28),
        })
        .await
        .unwrap();

    let updated = db
        .authors()
        .update(
            author.id,
            UpdateAuthor {
                name: Some("  Terry Pratchett  ".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Terry Pratchett");
    assert_eq!(updated.date_of_birth, NaiveDate::from_ymd_opt(1948, 4, 28));
    assert_eq!(updated.created_date, author.created_date);
    assert!(updated.modified_date.is_some());
}

#[tokio::test]
async fn test_update_missing_author_is_not_found() {
    let db = test_db().await;

    let result = db
        .authors()
        .update(
            Uuid::new_v4(),
            UpdateAuthor {
                name: Some("Nobody".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert_matches!(result, Err(RepoError::NotFound(_)));
}

#[tokio::test]
async fn test_update_to_existing_name_conflicts() {
    let db = test_db().await;

    create_author(&db, "Ann Leckie").await;
    let other = create_author(&db, "Becky Chambers").await;

    let result = db
        .authors()
        .update(
            other.id,
            UpdateAuthor {
                name: Some("ANN LECKIE".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert_matches!(result, Err(RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_soft_delete_is_idempotent_with_non_decreasing_modified_date() {
    let db = test_db().await;

    let author = create_author(&db, "Iain M. Banks").await;

    assert!(db.authors().soft_delete(author.id).await.unwrap());
    let first = db.authors().get_by_id(author.id).await.unwrap().unwrap();
    assert!(first.is_deleted);
    let first_stamp = first.modified_date.unwrap();

    assert!(db.authors().soft_delete(author.id).await.unwrap());
    let second = db.authors().get_by_id(author.id).await.unwrap().unwrap();
    let second_stamp = second.modified_date.unwrap();

    assert!(second_stamp >= first_stamp);

    // Still readable by id after deletion
    assert!(db.authors().get_by_id(author.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_soft_delete_missing_row_is_not_found() {
    let db = test_db().await;

    let result = db.authors().soft_delete(Uuid::new_v4()).await;

    assert_matches!(result, Err(RepoError::NotFound(_)));
}

// ============================================================================
// Book write pipeline
// ============================================================================

#[tokio::test]
async fn test_book_title_unique_per_author_not_globally() {
    let db = test_db().await;

    let first = create_author(&db, "Frank Herbert").await;
    let second = create_author(&db, "Brian Herbert").await;

    create_book(&db, first.id, "Dune", Vec::new()).await;

    // Another author may reuse the title
    create_book(&db, second.id, "Dune", Vec::new()).await;

    // The same author may not, even with different case
    let result = db
        .books()
        .create(CreateBook {
            title: " DUNE ".to_string(),
            author_id: first.id,
            published_date: None,
            genre: None,
            categories: Vec::new(),
        })
        .await;

    assert_matches!(result, Err(RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_book_create_requires_existing_author() {
    let db = test_db().await;

    let result = db
        .books()
        .create(CreateBook {
            title: "Orphaned".to_string(),
            author_id: Uuid::new_v4(),
            published_date: None,
            genre: None,
            categories: Vec::new(),
        })
        .await;

    assert_matches!(result, Err(RepoError::Invalid(_)));
}

#[tokio::test]
async fn test_book_create_with_unknown_category_rolls_back() {
    let db = test_db().await;

    let author = create_author(&db, "N.K. Jemisin").await;
    let known = create_category(&db, "Fantasy").await;

    let result = db
        .books()
        .create(CreateBook {
            title: "The Fifth Season".to_string(),
            author_id: author.id,
            published_date: None,
            genre: None,
            categories: vec![known, Uuid::new_v4()],
        })
        .await;

    assert_matches!(result, Err(RepoError::Invalid(_)));

    // All-or-nothing: the book row must not have been persisted
    let listing = db
        .books()
        .list(&BookFilter {
            offset: Some(0),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listing.total_count, 0);
    assert!(listing.books.is_empty());
}

#[tokio::test]
async fn test_book_update_conflicts_against_new_author_scope() {
    let db = test_db().await;

    let first = create_author(&db, "Frank Herbert").await;
    let second = create_author(&db, "Brian Herbert").await;

    create_book(&db, first.id, "Dune", Vec::new()).await;
    let moved = create_book(&db, second.id, "Dune", Vec::new()).await;

    // Moving the book under the first author would collide on the title
    let result = db
        .books()
        .update(
            moved,
            UpdateBook {
                author_id: Some(first.id),
                ..Default::default()
            },
        )
        .await;

    assert_matches!(result, Err(RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_book_noop_update_does_not_stamp_modified_date() {
    let db = test_db().await;

    let author = create_author(&db, "Mary Shelley").await;
    let book = create_book(&db, author.id, "Frankenstein", Vec::new()).await;

    let updated = db
        .books()
        .update(
            book,
            UpdateBook {
                title: Some("Frankenstein".to_string()),
                author_id: Some(author.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.modified_date, None);
}

// ============================================================================
// Category links
// ============================================================================

#[tokio::test]
async fn test_duplicate_link_conflicts_and_missing_link_removal_succeeds() {
    let db = test_db().await;

    let author = create_author(&db, "Octavia Butler").await;
    let category = create_category(&db, "Science Fiction").await;
    let other_category = create_category(&db, "Horror").await;
    let book = create_book(&db, author.id, "Kindred", Vec::new()).await;

    let linked = db.books().add_category(book, category).await.unwrap();
    assert_eq!(linked.id, category);
    assert_eq!(linked.name, "Science Fiction");

    let duplicate = db.books().add_category(book, category).await;
    assert_matches!(duplicate, Err(RepoError::Conflict(_)));

    // Removing a link that was never made is not an error
    assert!(db.books().remove_category(book, other_category).await.unwrap());

    // Removing twice is fine too
    assert!(db.books().remove_category(book, category).await.unwrap());
    assert!(db.books().remove_category(book, category).await.unwrap());
}

#[tokio::test]
async fn test_link_operations_validate_book_and_category() {
    let db = test_db().await;

    let author = create_author(&db, "Ted Chiang").await;
    let category = create_category(&db, "Short Stories").await;
    let book = create_book(&db, author.id, "Exhalation", Vec::new()).await;

    let missing_book = db.books().add_category(Uuid::new_v4(), category).await;
    assert_matches!(missing_book, Err(RepoError::NotFound(_)));

    let missing_category = db.books().add_category(book, Uuid::new_v4()).await;
    assert_matches!(missing_category, Err(RepoError::NotFound(_)));

    // A soft-deleted book cannot take links
    db.books().soft_delete(book).await.unwrap();
    let deleted_book = db.books().add_category(book, category).await;
    assert_matches!(deleted_book, Err(RepoError::NotFound(_)));
}

#[tokio::test]
async fn test_linking_does_not_touch_book_fields() {
    let db = test_db().await;

    let author = create_author(&db, "Susanna Clarke").await;
    let category = create_category(&db, "Fantasy").await;
    let book = create_book(&db, author.id, "Piranesi", Vec::new()).await;

    db.books().add_category(book, category).await.unwrap();

    let fetched = db.books().get_by_id(book).await.unwrap().unwrap();
    assert_eq!(fetched.modified_date, None);
}

// ============================================================================
// Stitching
// ============================================================================

#[tokio::test]
async fn test_book_without_links_stitches_to_empty_list() {
    let db = test_db().await;

    let author = create_author(&db, "Ken Liu").await;
    let book = create_book(&db, author.id, "The Paper Menagerie", Vec::new()).await;

    let fetched = db.books().get_by_id(book).await.unwrap().unwrap();
    assert!(fetched.categories.is_empty());
}

#[tokio::test]
async fn test_book_with_two_links_stitches_both() {
    let db = test_db().await;

    let author = create_author(&db, "Umberto Eco").await;
    let mystery = create_category(&db, "Mystery").await;
    let historical = create_category(&db, "Historical").await;
    let book = create_book(
        &db,
        author.id,
        "The Name of the Rose",
        vec![mystery, historical],
    )
    .await;

    let fetched = db.books().get_by_id(book).await.unwrap().unwrap();
    assert_eq!(fetched.categories.len(), 2);
    assert_eq!(fetched.author_name, "Umberto Eco");

    let mut names: Vec<&str> = fetched.categories.iter().map(|c| c.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Historical", "Mystery"]);
    assert!(fetched.categories.iter().any(|c| c.id == mystery));
    assert!(fetched.categories.iter().any(|c| c.id == historical));
}

#[tokio::test]
async fn test_list_by_author_stitches_each_book() {
    let db = test_db().await;

    let author = create_author(&db, "Ursula K. Le Guin").await;
    let fantasy = create_category(&db, "Fantasy").await;

    create_book(&db, author.id, "A Wizard of Earthsea", vec![fantasy]).await;
    create_book(&db, author.id, "The Dispossessed", Vec::new()).await;

    let books = db.books().list_by_author(author.id).await.unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].title, "A Wizard of Earthsea");
    assert_eq!(books[0].categories.len(), 1);
    assert_eq!(books[0].categories[0].name, "Fantasy");
    assert!(books[1].categories.is_empty());
}

#[tokio::test]
async fn test_category_get_includes_linked_books() {
    let db = test_db().await;

    let author = create_author(&db, "Italo Calvino").await;
    let category = create_category(&db, "Postmodern").await;
    create_book(&db, author.id, "Invisible Cities", vec![category]).await;
    create_book(&db, author.id, "The Baron in the Trees", Vec::new()).await;

    let fetched = db.categories().get_by_id(category).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Postmodern");
    assert_eq!(fetched.books.len(), 1);
    assert_eq!(fetched.books[0].title, "Invisible Cities");
    assert_eq!(fetched.books[0].author_name, "Italo Calvino");
}

// ============================================================================
// Filtering and pagination
// ============================================================================

#[tokio::test]
async fn test_pagination_pages_share_the_total_count() {
    let db = test_db().await;

    let author = create_author(&db, "Agatha Christie").await;
    for i in 1..=7 {
        create_book(&db, author.id, &format!("Mystery No. {}", i), Vec::new()).await;
    }

    let first_page = db
        .books()
        .list(&BookFilter {
            offset: Some(0),
            limit: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first_page.books.len(), 5);
    assert_eq!(first_page.total_count, 7);
    assert!(first_page.has_more);
    assert_eq!(first_page.books[0].title, "Mystery No. 1");

    let second_page = db
        .books()
        .list(&BookFilter {
            offset: Some(5),
            limit: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second_page.books.len(), 2);
    assert_eq!(second_page.total_count, 7);
    assert!(!second_page.has_more);
    assert_eq!(second_page.books[0].title, "Mystery No. 6");
}

#[tokio::test]
async fn test_deleted_flag_filter() {
    let db = test_db().await;

    let kept = create_author(&db, "Kept Author").await;
    let deleted = create_author(&db, "Deleted Author").await;
    db.authors().soft_delete(deleted.id).await.unwrap();

    let only_deleted = db
        .authors()
        .list(&AuthorFilter {
            is_deleted: Some(true),
            offset: Some(0),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(only_deleted.total_count, 1);
    assert_eq!(only_deleted.authors[0].id, deleted.id);

    let both = db
        .authors()
        .list(&AuthorFilter {
            offset: Some(0),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(both.total_count, 2);
    assert!(both.authors.iter().any(|a| a.id == kept.id));
    assert!(both.authors.iter().any(|a| a.id == deleted.id));
}

#[tokio::test]
async fn test_book_filter_matches_author_and_category_names() {
    let db = test_db().await;

    let tolkien = create_author(&db, "J.R.R. Tolkien").await;
    let herbert = create_author(&db, "Frank Herbert").await;
    let fantasy = create_category(&db, "Epic Fantasy").await;

    create_book(&db, tolkien.id, "The Hobbit", vec![fantasy]).await;
    create_book(&db, herbert.id, "Dune", Vec::new()).await;

    let by_author = db
        .books()
        .list(&BookFilter {
            author: Some("tolk".to_string()),
            offset: Some(0),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_author.total_count, 1);
    assert_eq!(by_author.books[0].title, "The Hobbit");

    let by_category = db
        .books()
        .list(&BookFilter {
            category: Some("fantasy".to_string()),
            offset: Some(0),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_category.total_count, 1);
    assert_eq!(by_category.books[0].title, "The Hobbit");

    let by_title = db
        .books()
        .list(&BookFilter {
            title: Some("dune".to_string()),
            offset: Some(0),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_title.total_count, 1);
    assert_eq!(by_title.books[0].author_name, "Frank Herbert");
}

#[tokio::test]
async fn test_categories_list_ordered_by_name_with_optional_limit() {
    let db = test_db().await;

    create_category(&db, "Western").await;
    create_category(&db, "adventure").await;
    create_category(&db, "Mystery").await;

    let all = db
        .categories()
        .list(&CategoryFilter::default())
        .await
        .unwrap();
    let names: Vec<&str> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["adventure", "Mystery", "Western"]);

    let limited = db
        .categories()
        .list(&CategoryFilter {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

// ============================================================================
// Services
// ============================================================================

#[tokio::test]
async fn test_services_reject_malformed_ids_and_paging() {
    let db = test_db().await;

    let authors = AuthorService::new(db.clone());
    let books = BookService::new(db.clone());
    let categories = CategoryService::new(db.clone());

    assert_matches!(authors.get("not-a-uuid").await, Err(RepoError::Invalid(_)));
    assert_matches!(books.delete("42").await, Err(RepoError::Invalid(_)));
    assert_matches!(
        categories.get("almost-a-uuid-0000").await,
        Err(RepoError::Invalid(_))
    );

    // Offset and limit are both required for author/book listings
    let missing_limit = authors
        .list(AuthorFilter {
            offset: Some(0),
            ..Default::default()
        })
        .await;
    assert_matches!(missing_limit, Err(RepoError::Invalid(_)));

    let zero_limit = books
        .list(BookFilter {
            offset: Some(0),
            limit: Some(0),
            ..Default::default()
        })
        .await;
    assert_matches!(zero_limit, Err(RepoError::Invalid(_)));

    let negative_offset = books
        .list(BookFilter {
            offset: Some(-1),
            limit: Some(5),
            ..Default::default()
        })
        .await;
    assert_matches!(negative_offset, Err(RepoError::Invalid(_)));
}

#[tokio::test]
async fn test_services_round_trip() {
    let db = test_db().await;

    let authors = AuthorService::new(db.clone());
    let books = BookService::new(db.clone());

    let author = authors
        .create(CreateAuthor {
            name: "Stanislaw Lem".to_string(),
            date_of_birth: None,
        })
        .await
        .unwrap();

    let book = books
        .create(CreateBook {
            title: "Solaris".to_string(),
            author_id: author.id,
            published_date: NaiveDate::from_ymd_opt(1961, 6, 1),
            genre: Some(" Science Fiction ".to_string()),
            categories: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(book.genre.as_deref(), Some("Science Fiction"));

    let fetched = books.get(&book.id.to_string()).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Solaris");

    let owned = authors.get_books(&author.id.to_string()).await.unwrap();
    assert_eq!(owned.len(), 1);

    assert!(books.delete(&book.id.to_string()).await.unwrap());
    let after_delete = books.get(&book.id.to_string()).await.unwrap().unwrap();
    assert!(after_delete.is_deleted);
}

#[tokio::test]
async fn test_book_service_rejects_nil_author_id() {
    let db = test_db().await;

    let books = BookService::new(db);
    let result = books
        .create(CreateBook {
            title: "No Author".to_string(),
            author_id: Uuid::nil(),
            published_date: None,
            genre: None,
            categories: Vec::new(),
        })
        .await;

    assert_matches!(result, Err(RepoError::Invalid(_)));
}

// ============================================================================
// Wire shape and storage
// ============================================================================

#[tokio::test]
async fn test_records_serialize_with_camel_case_keys() {
    let db = test_db().await;

    let author = create_author(&db, "Jorge Luis Borges").await;
    let value = serde_json::to_value(&author).unwrap();

    assert!(value.get("createdDate").is_some());
    assert!(value.get("modifiedDate").is_some());
    assert!(value.get("isDeleted").is_some());
    assert!(value.get("dateOfBirth").is_some());

    let book = db
        .books()
        .create(CreateBook {
            title: "Ficciones".to_string(),
            author_id: author.id,
            published_date: None,
            genre: None,
            categories: Vec::new(),
        })
        .await
        .unwrap();
    let value = serde_json::to_value(&book).unwrap();

    assert!(value.get("authorId").is_some());
    assert!(value.get("authorName").is_some());
    assert_eq!(value.get("categories").unwrap().as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_connect_creates_database_file_and_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");

    let db = Database::connect(path.to_str().unwrap()).await.unwrap();
    let author = create_author(&db, "Pu Songling").await;

    let fetched = db.authors().get_by_id(author.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Pu Songling");
    assert!(path.exists());
}

#[tokio::test]
async fn test_category_update_and_delete() {
    let db = test_db().await;

    let category = db
        .categories()
        .create(CreateCategory {
            name: "  Gothic  ".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(category.name, "Gothic");
    assert_eq!(category.modified_date, None);

    let renamed = db
        .categories()
        .update(
            category.id,
            UpdateCategory {
                name: Some("Gothic Fiction".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Gothic Fiction");
    assert!(renamed.modified_date.is_some());

    create_category(&db, "Romantic").await;
    let conflict = db
        .categories()
        .update(
            category.id,
            UpdateCategory {
                name: Some(" ROMANTIC ".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(conflict, Err(RepoError::Conflict(_)));

    assert!(db.categories().soft_delete(category.id).await.unwrap());
    let fetched = db.categories().get_by_id(category.id).await.unwrap().unwrap();
    assert!(fetched.is_deleted);
}
