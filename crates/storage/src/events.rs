use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::{is_sqlite_error, to_rfc3339, SQLITE_CONSTRAINT_UNIQUE};

/// Append-only log of raw registration payloads, keyed by the transport
/// message id. The unique index is what makes at-least-once delivery safe
/// to acknowledge: redelivered messages are detected here and skipped.
#[derive(Clone)]
pub struct RegistrationEventRepository {
    pool: SqlitePool,
}

impl RegistrationEventRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records an inbound registration payload.
    pub async fn insert(
        &self,
        record: &NewRegistrationEvent<'_>,
    ) -> Result<RegistrationEventOutcome, RegistrationEventError> {
        let result = sqlx::query(
            "INSERT INTO registration_events (id, msg_id, payload_json, received_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.msg_id)
        .bind(record.payload_json)
        .bind(to_rfc3339(record.received_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(RegistrationEventOutcome::Recorded),
            Err(err) if is_sqlite_error(&err, SQLITE_CONSTRAINT_UNIQUE) => {
                Ok(RegistrationEventOutcome::Duplicate)
            }
            Err(err) => Err(RegistrationEventError::Database(err)),
        }
    }
}

/// Result of attempting to record an inbound registration payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEventOutcome {
    Recorded,
    Duplicate,
}

impl RegistrationEventOutcome {
    pub fn is_duplicate(self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Data required to record a registration payload.
pub struct NewRegistrationEvent<'a> {
    pub id: Uuid,
    pub msg_id: &'a str,
    pub payload_json: &'a str,
    pub received_at: DateTime<Utc>,
}

/// Errors raised by the registration event log.
#[derive(Debug, Error)]
pub enum RegistrationEventError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
}
