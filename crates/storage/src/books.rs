use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use bookrack_core::types::Book;

use crate::{parse_uuid, to_rfc3339};

/// Repository for the book catalog.
#[derive(Clone)]
pub struct BookRepository {
    pool: SqlitePool,
}

impl BookRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a new catalog entry.
    pub async fn create(&self, book: &NewBook<'_>) -> Result<(), BookError> {
        let authors = serde_json::to_string(book.authors)?;
        sqlx::query(
            "INSERT INTO books \
             (id, isbn, title, authors, publication_date, publisher, description, \
              page_count, cover_image_id, language, genre, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(book.id.to_string())
        .bind(book.isbn)
        .bind(book.title)
        .bind(authors)
        .bind(book.publication_date)
        .bind(book.publisher)
        .bind(book.description)
        .bind(book.page_count.map(i64::from))
        .bind(book.cover_image_id.map(|id| id.to_string()))
        .bind(book.language)
        .bind(book.genre)
        .bind(to_rfc3339(book.created_at))
        .bind(to_rfc3339(book.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrites the catalog fields of an existing entry.
    pub async fn update(&self, id: Uuid, changes: &UpdateBook<'_>) -> Result<(), BookError> {
        let authors = serde_json::to_string(changes.authors)?;
        let result = sqlx::query(
            "UPDATE books SET \
                 isbn = ?, title = ?, authors = ?, publication_date = ?, publisher = ?, \
                 description = ?, page_count = ?, cover_image_id = ?, language = ?, \
                 genre = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(changes.isbn)
        .bind(changes.title)
        .bind(authors)
        .bind(changes.publication_date)
        .bind(changes.publisher)
        .bind(changes.description)
        .bind(changes.page_count.map(i64::from))
        .bind(changes.cover_image_id.map(|id| id.to_string()))
        .bind(changes.language)
        .bind(changes.genre)
        .bind(to_rfc3339(changes.updated_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BookError::NotFound);
        }
        Ok(())
    }

    /// Loads a single book.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Book, BookError> {
        let row = sqlx::query_as::<_, BookRow>(&select_sql("WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BookError::NotFound)?;

        Ok(row.into_domain()?)
    }

    /// Loads the books matching the provided ids. Used to validate stub
    /// references when a caller needs the full aggregate; missing ids are
    /// simply absent from the result.
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Book>, BookError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = select_sql(&format!("WHERE id IN ({placeholders}) ORDER BY title ASC, id ASC"));
        let mut query = sqlx::query_as::<_, BookRow>(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(BookError::from))
            .collect()
    }

    /// Returns the materialized, title-sorted collection matching the
    /// filters. Shaping into a page happens in the caller.
    pub async fn search(&self, filter: &BookSearch<'_>) -> Result<Vec<Book>, BookError> {
        let sql = select_sql(
            "WHERE (? IS NULL OR instr(lower(title), lower(?)) > 0) \
               AND (? IS NULL OR genre = ?) \
             ORDER BY title ASC, id ASC",
        );
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(filter.title)
            .bind(filter.title)
            .bind(filter.genre)
            .bind(filter.genre)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(BookError::from))
            .collect()
    }

    /// Removes a catalog entry. Reviews and list memberships cascade.
    pub async fn delete(&self, id: Uuid) -> Result<(), BookError> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BookError::NotFound);
        }
        Ok(())
    }
}

fn select_sql(suffix: &str) -> String {
    format!(
        "SELECT id, isbn, title, authors, publication_date, publisher, description, \
                page_count, cover_image_id, language, genre \
         FROM books {suffix}"
    )
}

/// Data required to persist a new book.
pub struct NewBook<'a> {
    pub id: Uuid,
    pub isbn: &'a str,
    pub title: &'a str,
    pub authors: &'a [String],
    pub publication_date: Option<NaiveDate>,
    pub publisher: Option<&'a str>,
    pub description: Option<&'a str>,
    pub page_count: Option<u32>,
    pub cover_image_id: Option<Uuid>,
    pub language: Option<&'a str>,
    pub genre: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Replacement catalog fields for an update.
pub struct UpdateBook<'a> {
    pub isbn: &'a str,
    pub title: &'a str,
    pub authors: &'a [String],
    pub publication_date: Option<NaiveDate>,
    pub publisher: Option<&'a str>,
    pub description: Option<&'a str>,
    pub page_count: Option<u32>,
    pub cover_image_id: Option<Uuid>,
    pub language: Option<&'a str>,
    pub genre: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

/// Optional repository-side filters for a catalog search.
#[derive(Debug, Default, Clone, Copy)]
pub struct BookSearch<'a> {
    pub title: Option<&'a str>,
    pub genre: Option<&'a str>,
}

/// Errors raised by the book repository.
#[derive(Debug, Error)]
pub enum BookError {
    #[error("book not found")]
    NotFound,
    #[error("failed to encode authors column: {0}")]
    Authors(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    id: String,
    isbn: String,
    title: String,
    authors: String,
    publication_date: Option<NaiveDate>,
    publisher: Option<String>,
    description: Option<String>,
    page_count: Option<i64>,
    cover_image_id: Option<String>,
    language: Option<String>,
    genre: Option<String>,
}

impl BookRow {
    fn into_domain(self) -> Result<Book, sqlx::Error> {
        let authors: Vec<String> = serde_json::from_str(&self.authors)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let cover_image_id = match self.cover_image_id {
            Some(raw) => Some(parse_uuid(&raw)?),
            None => None,
        };
        Ok(Book {
            id: parse_uuid(&self.id)?,
            isbn: self.isbn,
            title: self.title,
            authors,
            publication_date: self.publication_date,
            publisher: self.publisher,
            description: self.description,
            page_count: self.page_count.and_then(|count| u32::try_from(count).ok()),
            cover_image_id,
            language: self.language,
            genre: self.genre,
        })
    }
}
