use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use bookrack_core::types::{ThemePreference, User};

use crate::{parse_uuid, to_rfc3339};

/// Repository for user profiles.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a user keyed by its external identity id.
    ///
    /// Registration events are delivered at least once, so an existing row
    /// is refreshed rather than treated as a conflict; the identity id
    /// itself is never rewritten.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<(), UserError> {
        sqlx::query(
            "INSERT INTO users \
             (id, username, email, first_name, last_name, theme, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 username = excluded.username, \
                 email = excluded.email, \
                 first_name = excluded.first_name, \
                 last_name = excluded.last_name, \
                 theme = excluded.theme, \
                 updated_at = excluded.updated_at",
        )
        .bind(user.id.to_string())
        .bind(user.username)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.theme.as_str())
        .bind(to_rfc3339(user.created_at))
        .bind(to_rfc3339(user.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates the mutable profile fields of an existing user.
    pub async fn update(&self, id: Uuid, changes: &UpdateUser<'_>) -> Result<(), UserError> {
        let result = sqlx::query(
            "UPDATE users SET \
                 username = ?, email = ?, first_name = ?, last_name = ?, theme = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.theme.as_str())
        .bind(to_rfc3339(changes.updated_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    /// Loads a single user by identity id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<User, UserError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, first_name, last_name, theme \
             FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(UserError::NotFound)?;

        Ok(row.into_domain()?)
    }

    /// Loads the users matching the provided ids; missing ids are simply
    /// absent from the result.
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, UserError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, username, email, first_name, last_name, theme \
             FROM users WHERE id IN ({placeholders}) ORDER BY created_at ASC, id ASC"
        );
        let mut query = sqlx::query_as::<_, UserRow>(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(UserError::from))
            .collect()
    }

    /// Lists every user in registration order.
    pub async fn list(&self) -> Result<Vec<User>, UserError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, first_name, last_name, theme \
             FROM users ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(UserError::from))
            .collect()
    }

    /// Removes a user. Owned reading lists cascade.
    pub async fn delete(&self, id: Uuid) -> Result<(), UserError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }
}

/// Data required to persist a new user.
pub struct NewUser<'a> {
    pub id: Uuid,
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub theme: ThemePreference,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewUser<'a> {
    /// Borrows the persistable fields off a canonical user.
    pub fn from_domain(user: &'a User, created_at: DateTime<Utc>) -> Self {
        Self {
            id: user.id,
            username: user.username.as_deref(),
            email: user.email.as_deref(),
            first_name: user.first_name.as_deref(),
            last_name: user.last_name.as_deref(),
            theme: user.theme,
            created_at,
        }
    }
}

/// Mutable profile fields for an update.
pub struct UpdateUser<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub theme: ThemePreference,
    pub updated_at: DateTime<Utc>,
}

/// Errors raised by the user repository.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    username: Option<String>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    theme: String,
}

impl UserRow {
    fn into_domain(self) -> Result<User, sqlx::Error> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            theme: self.theme.parse().unwrap_or_default(),
        })
    }
}
