use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use bookrack_core::refs::EntityRef;
use bookrack_core::types::Review;

use crate::{is_sqlite_error, parse_uuid, to_rfc3339, SQLITE_CONSTRAINT_FOREIGN_KEY};

/// Repository for book reviews.
#[derive(Clone)]
pub struct ReviewRepository {
    pool: SqlitePool,
}

impl ReviewRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a new review. The book and user references are stored as
    /// bare foreign keys; nothing enforces one review per (user, book).
    pub async fn create(&self, review: &NewReview) -> Result<(), ReviewError> {
        self.ensure_user_exists(review.user_id).await?;

        sqlx::query(
            "INSERT INTO reviews (id, book_id, user_id, body, rating, published_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(review.id.to_string())
        .bind(review.book_id.to_string())
        .bind(review.user_id.to_string())
        .bind(&review.body)
        .bind(i64::from(review.rating))
        .bind(to_rfc3339(review.published_at))
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_sqlite_error(&err, SQLITE_CONSTRAINT_FOREIGN_KEY) {
                ReviewError::UnknownBook
            } else {
                ReviewError::Database(err)
            }
        })?;

        Ok(())
    }

    /// Loads a single review.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Review, ReviewError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, book_id, user_id, body, rating, published_at \
             FROM reviews WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ReviewError::NotFound)?;

        Ok(row.into_domain()?)
    }

    /// Lists the reviews of a book, newest first.
    pub async fn list_for_book(&self, book_id: Uuid) -> Result<Vec<Review>, ReviewError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, book_id, user_id, body, rating, published_at \
             FROM reviews WHERE book_id = ? \
             ORDER BY published_at DESC, id ASC",
        )
        .bind(book_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_domain().map_err(ReviewError::from))
            .collect()
    }

    /// Composite-key convenience lookup: the most recently published review
    /// the user wrote for the book, if any. Uniqueness is not enforced.
    pub async fn find_by_user_and_book(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<Review>, ReviewError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, book_id, user_id, body, rating, published_at \
             FROM reviews WHERE user_id = ? AND book_id = ? \
             ORDER BY published_at DESC, id ASC LIMIT 1",
        )
        .bind(user_id.to_string())
        .bind(book_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_domain().map_err(ReviewError::from))
            .transpose()
    }

    /// Removes a review.
    pub async fn delete(&self, id: Uuid) -> Result<(), ReviewError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ReviewError::NotFound);
        }
        Ok(())
    }

    async fn ensure_user_exists(&self, user_id: Uuid) -> Result<(), ReviewError> {
        sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ReviewError::UnknownUser)?;
        Ok(())
    }
}

/// Data required to persist a new review.
pub struct NewReview {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub body: String,
    pub rating: u8,
    pub published_at: DateTime<Utc>,
}

/// Errors raised by the review repository.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review not found")]
    NotFound,
    #[error("reviewing user does not exist")]
    UnknownUser,
    #[error("reviewed book does not exist")]
    UnknownBook,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: String,
    book_id: String,
    user_id: String,
    body: String,
    rating: i64,
    published_at: DateTime<Utc>,
}

impl ReviewRow {
    fn into_domain(self) -> Result<Review, sqlx::Error> {
        Ok(Review {
            id: parse_uuid(&self.id)?,
            book: EntityRef::Stub(parse_uuid(&self.book_id)?),
            user: EntityRef::Stub(parse_uuid(&self.user_id)?),
            body: self.body,
            rating: u8::try_from(self.rating)
                .map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
            published_at: self.published_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, NewBook, NewUser};
    use bookrack_core::types::ThemePreference;
    use chrono::Duration;

    async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    async fn insert_user(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        db.users()
            .create(&NewUser {
                id,
                username: Some("drossi"),
                email: None,
                first_name: None,
                last_name: None,
                theme: ThemePreference::Light,
                created_at: Utc::now(),
            })
            .await
            .expect("user");
        id
    }

    async fn insert_book(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        db.books()
            .create(&NewBook {
                id,
                isbn: "9780441172719",
                title: "Dune",
                authors: &[],
                publication_date: None,
                publisher: None,
                description: None,
                page_count: None,
                cover_image_id: None,
                language: None,
                genre: None,
                created_at: Utc::now(),
            })
            .await
            .expect("book");
        id
    }

    fn new_review(user_id: Uuid, book_id: Uuid, published_at: DateTime<Utc>) -> NewReview {
        NewReview {
            id: Uuid::new_v4(),
            book_id,
            user_id,
            body: "A classic.".to_string(),
            rating: 5,
            published_at,
        }
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let db = setup_db().await;
        let repo = db.reviews();
        let user_id = insert_user(&db).await;
        let book_id = insert_book(&db).await;
        let record = new_review(user_id, book_id, Utc::now());
        let review_id = record.id;

        repo.create(&record).await.expect("create");

        let review = repo.find_by_id(review_id).await.expect("find");
        assert_eq!(review.rating, 5);
        assert_eq!(review.book.id(), book_id);
        assert_eq!(review.user.id(), user_id);
        assert!(review.book.is_stub());
    }

    #[tokio::test]
    async fn create_rejects_dangling_references() {
        let db = setup_db().await;
        let repo = db.reviews();
        let user_id = insert_user(&db).await;

        let err = repo
            .create(&new_review(Uuid::new_v4(), Uuid::new_v4(), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::UnknownUser));

        let err = repo
            .create(&new_review(user_id, Uuid::new_v4(), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::UnknownBook));
    }

    #[tokio::test]
    async fn composite_lookup_returns_most_recent_match() {
        let db = setup_db().await;
        let repo = db.reviews();
        let user_id = insert_user(&db).await;
        let book_id = insert_book(&db).await;
        let now = Utc::now();

        let older = new_review(user_id, book_id, now - Duration::days(1));
        let newer = new_review(user_id, book_id, now);
        repo.create(&older).await.expect("older");
        repo.create(&newer).await.expect("newer");

        let found = repo
            .find_by_user_and_book(user_id, book_id)
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found.id, newer.id);

        let absent = repo
            .find_by_user_and_book(user_id, Uuid::new_v4())
            .await
            .expect("lookup");
        assert!(absent.is_none());
    }

    #[tokio::test]
    async fn list_for_book_is_newest_first() {
        let db = setup_db().await;
        let repo = db.reviews();
        let user_id = insert_user(&db).await;
        let book_id = insert_book(&db).await;
        let now = Utc::now();

        let older = new_review(user_id, book_id, now - Duration::days(1));
        let newer = new_review(user_id, book_id, now);
        repo.create(&older).await.expect("older");
        repo.create(&newer).await.expect("newer");

        let reviews = repo.list_for_book(book_id).await.expect("list");
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].id, newer.id);
        assert_eq!(reviews[1].id, older.id);
    }

    #[tokio::test]
    async fn delete_requires_existing_review() {
        let db = setup_db().await;
        let repo = db.reviews();

        let err = repo.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotFound));
    }
}
