use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use bookrack_core::refs::EntityRef;
use bookrack_core::types::ReadingList;

use crate::{is_sqlite_error, parse_uuid, to_rfc3339, SQLITE_CONSTRAINT_FOREIGN_KEY};

/// Repository for reading lists and their book memberships.
///
/// Book references are stored as bare foreign keys and rehydrated as stubs;
/// callers that need full book data fetch it from the catalog and resolve
/// the stubs themselves.
#[derive(Clone)]
pub struct ReadingListRepository {
    pool: SqlitePool,
}

impl ReadingListRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a new reading list for its owning user.
    pub async fn create(&self, list: &NewReadingList<'_>) -> Result<(), ReadingListError> {
        sqlx::query(
            "INSERT INTO reading_lists (id, user_id, name, description, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(list.id.to_string())
        .bind(list.user_id.to_string())
        .bind(list.name)
        .bind(list.description)
        .bind(to_rfc3339(list.created_at))
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_sqlite_error(&err, SQLITE_CONSTRAINT_FOREIGN_KEY) {
                ReadingListError::UnknownUser
            } else {
                ReadingListError::Database(err)
            }
        })?;

        Ok(())
    }

    /// Loads a reading list with its book references rehydrated as stubs.
    pub async fn find_by_id(&self, id: Uuid) -> Result<ReadingList, ReadingListError> {
        let row = sqlx::query_as::<_, ReadingListRow>(
            "SELECT id, user_id, name, description, created_at \
             FROM reading_lists WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ReadingListError::NotFound)?;

        let book_ids = self.book_ids(id).await?;
        Ok(row.into_domain(book_ids)?)
    }

    /// Loads every list owned by the user, oldest first.
    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<ReadingList>, ReadingListError> {
        let rows = sqlx::query_as::<_, ReadingListRow>(
            "SELECT id, user_id, name, description, created_at \
             FROM reading_lists WHERE user_id = ? \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; rows.len()].join(", ");
        let sql = format!(
            "SELECT list_id, book_id FROM reading_list_books WHERE list_id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, MembershipRow>(&sql);
        for row in &rows {
            query = query.bind(row.id.clone());
        }
        let memberships = query.fetch_all(&self.pool).await?;

        let mut by_list: HashMap<String, Vec<Uuid>> = HashMap::new();
        for membership in memberships {
            by_list
                .entry(membership.list_id)
                .or_default()
                .push(parse_uuid(&membership.book_id)?);
        }

        rows.into_iter()
            .map(|row| {
                let book_ids = by_list.remove(&row.id).unwrap_or_default();
                row.into_domain(book_ids).map_err(ReadingListError::from)
            })
            .collect()
    }

    /// Adds a book reference to the list. Membership is a set: adding an
    /// already-present book is a no-op.
    pub async fn add_book(
        &self,
        list_id: Uuid,
        book_id: Uuid,
        added_at: DateTime<Utc>,
    ) -> Result<(), ReadingListError> {
        self.ensure_list_exists(list_id).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO reading_list_books (list_id, book_id, added_at) \
             VALUES (?, ?, ?)",
        )
        .bind(list_id.to_string())
        .bind(book_id.to_string())
        .bind(to_rfc3339(added_at))
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_sqlite_error(&err, SQLITE_CONSTRAINT_FOREIGN_KEY) {
                ReadingListError::UnknownBook
            } else {
                ReadingListError::Database(err)
            }
        })?;

        Ok(())
    }

    /// Drops a book reference from the list. Removing an absent book is a
    /// no-op.
    pub async fn remove_book(&self, list_id: Uuid, book_id: Uuid) -> Result<(), ReadingListError> {
        self.ensure_list_exists(list_id).await?;

        sqlx::query("DELETE FROM reading_list_books WHERE list_id = ? AND book_id = ?")
            .bind(list_id.to_string())
            .bind(book_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Removes a list. Memberships cascade.
    pub async fn delete(&self, id: Uuid) -> Result<(), ReadingListError> {
        let result = sqlx::query("DELETE FROM reading_lists WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ReadingListError::NotFound);
        }
        Ok(())
    }

    async fn ensure_list_exists(&self, list_id: Uuid) -> Result<(), ReadingListError> {
        sqlx::query("SELECT 1 FROM reading_lists WHERE id = ?")
            .bind(list_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ReadingListError::NotFound)?;
        Ok(())
    }

    async fn book_ids(&self, list_id: Uuid) -> Result<Vec<Uuid>, ReadingListError> {
        let memberships = sqlx::query_as::<_, MembershipRow>(
            "SELECT list_id, book_id FROM reading_list_books WHERE list_id = ? \
             ORDER BY added_at ASC, book_id ASC",
        )
        .bind(list_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        memberships
            .into_iter()
            .map(|row| parse_uuid(&row.book_id).map_err(ReadingListError::from))
            .collect()
    }
}

/// Data required to persist a new reading list.
pub struct NewReadingList<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Errors raised by the reading list repository.
#[derive(Debug, Error)]
pub enum ReadingListError {
    #[error("reading list not found")]
    NotFound,
    #[error("owning user does not exist")]
    UnknownUser,
    #[error("referenced book does not exist")]
    UnknownBook,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct ReadingListRow {
    id: String,
    user_id: String,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl ReadingListRow {
    fn into_domain(self, book_ids: Vec<Uuid>) -> Result<ReadingList, sqlx::Error> {
        Ok(ReadingList {
            id: parse_uuid(&self.id)?,
            user: EntityRef::Stub(parse_uuid(&self.user_id)?),
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            books: book_ids.into_iter().map(EntityRef::Stub).collect(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    list_id: String,
    book_id: String,
}
