use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::refs::{EntityRef, HasId};

/// Maximum length of a reading list name, in characters.
pub const LIST_NAME_MAX: usize = 30;
/// Maximum length of a reading list description, in characters.
pub const LIST_DESCRIPTION_MAX: usize = 200;
/// Maximum length of a review body, in characters.
pub const REVIEW_BODY_MAX: usize = 200;
/// Inclusive lower bound for a review rating.
pub const RATING_MIN: u8 = 1;
/// Inclusive upper bound for a review rating.
pub const RATING_MAX: u8 = 5;

/// Field-level invariant violations, raised before any persistence attempt.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("reading list name must not be empty")]
    EmptyListName,
    #[error("reading list name must be at most {LIST_NAME_MAX} characters")]
    ListNameTooLong,
    #[error("reading list description must be at most {LIST_DESCRIPTION_MAX} characters")]
    ListDescriptionTooLong,
    #[error("review body must be at most {REVIEW_BODY_MAX} characters")]
    ReviewBodyTooLong,
    #[error("rating must be between {RATING_MIN} and {RATING_MAX}")]
    RatingOutOfRange,
}

/// UI theme preference stored on a user profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemePreference {
    #[default]
    Light,
    Dark,
}

impl ThemePreference {
    /// Returns the canonical database representation for the preference.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl FromStr for ThemePreference {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical user profile.
///
/// The identifier is the external identity id and is immutable once the
/// user exists; the profile fields may change. Fields absent from the
/// originating registration event stay unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub theme: ThemePreference,
}

impl HasId for User {
    fn ref_id(&self) -> Uuid {
        self.id
    }
}

/// Catalog book aggregate. Owned by the catalog module; other modules refer
/// to it only through [`EntityRef<Book>`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl HasId for Book {
    fn ref_id(&self) -> Uuid {
        self.id
    }
}

/// A user's reading list. The owning user reference is set at creation and
/// never reassigned; book membership is an unordered set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingList {
    pub id: Uuid,
    pub user: EntityRef<User>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub books: Vec<EntityRef<Book>>,
}

impl ReadingList {
    /// Builds a reading list after validating the name and description
    /// length invariants.
    pub fn new(
        id: Uuid,
        user_id: Uuid,
        name: String,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_list_name(&name)?;
        if let Some(text) = description.as_deref() {
            validate_list_description(text)?;
        }
        Ok(Self {
            id,
            user: EntityRef::Stub(user_id),
            name,
            description,
            created_at,
            books: Vec::new(),
        })
    }
}

impl HasId for ReadingList {
    fn ref_id(&self) -> Uuid {
        self.id
    }
}

/// A user's review of a book. Nothing enforces one review per (user, book);
/// the composite lookup on the repository is a convenience, not a constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub book: EntityRef<Book>,
    pub user: EntityRef<User>,
    pub body: String,
    pub rating: u8,
    pub published_at: DateTime<Utc>,
}

impl Review {
    /// Builds a review after validating the body length and rating range.
    pub fn new(
        id: Uuid,
        book_id: Uuid,
        user_id: Uuid,
        body: String,
        rating: u8,
        published_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_review_body(&body)?;
        validate_rating(rating)?;
        Ok(Self {
            id,
            book: EntityRef::Stub(book_id),
            user: EntityRef::Stub(user_id),
            body,
            rating,
            published_at,
        })
    }
}

impl HasId for Review {
    fn ref_id(&self) -> Uuid {
        self.id
    }
}

/// Checks the reading list name invariant (non-empty, ≤ 30 characters).
pub fn validate_list_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyListName);
    }
    if name.chars().count() > LIST_NAME_MAX {
        return Err(ValidationError::ListNameTooLong);
    }
    Ok(())
}

/// Checks the reading list description invariant (≤ 200 characters).
pub fn validate_list_description(description: &str) -> Result<(), ValidationError> {
    if description.chars().count() > LIST_DESCRIPTION_MAX {
        return Err(ValidationError::ListDescriptionTooLong);
    }
    Ok(())
}

/// Checks the review body invariant (≤ 200 characters).
pub fn validate_review_body(body: &str) -> Result<(), ValidationError> {
    if body.chars().count() > REVIEW_BODY_MAX {
        return Err(ValidationError::ReviewBodyTooLong);
    }
    Ok(())
}

/// Checks the review rating invariant (1 to 5 inclusive).
pub fn validate_rating(rating: u8) -> Result<(), ValidationError> {
    if !(RATING_MIN..=RATING_MAX).contains(&rating) {
        return Err(ValidationError::RatingOutOfRange);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_defaults_to_light() {
        assert_eq!(ThemePreference::default(), ThemePreference::Light);
        assert_eq!("dark".parse::<ThemePreference>(), Ok(ThemePreference::Dark));
        assert!("solarized".parse::<ThemePreference>().is_err());
    }

    #[test]
    fn reading_list_rejects_long_name() {
        let err = ReadingList::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "x".repeat(LIST_NAME_MAX + 1),
            None,
            Utc::now(),
        )
        .expect_err("name too long");
        assert_eq!(err, ValidationError::ListNameTooLong);
    }

    #[test]
    fn reading_list_rejects_empty_name() {
        let err = ReadingList::new(Uuid::new_v4(), Uuid::new_v4(), "  ".to_string(), None, Utc::now())
            .expect_err("empty name");
        assert_eq!(err, ValidationError::EmptyListName);
    }

    #[test]
    fn reading_list_rejects_long_description() {
        let err = ReadingList::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "To Read".to_string(),
            Some("d".repeat(LIST_DESCRIPTION_MAX + 1)),
            Utc::now(),
        )
        .expect_err("description too long");
        assert_eq!(err, ValidationError::ListDescriptionTooLong);
    }

    #[test]
    fn reading_list_keeps_owner_as_stub() {
        let user_id = Uuid::new_v4();
        let list = ReadingList::new(
            Uuid::new_v4(),
            user_id,
            "To Read".to_string(),
            Some("Books I plan to read.".to_string()),
            Utc::now(),
        )
        .expect("valid list");
        assert!(list.user.is_stub());
        assert_eq!(list.user.id(), user_id);
        assert!(list.books.is_empty());
    }

    #[test]
    fn review_rejects_out_of_range_rating() {
        for rating in [0u8, 6] {
            let err = Review::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                "fine".to_string(),
                rating,
                Utc::now(),
            )
            .expect_err("rating out of range");
            assert_eq!(err, ValidationError::RatingOutOfRange);
        }
    }

    #[test]
    fn review_rejects_long_body() {
        let err = Review::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "b".repeat(REVIEW_BODY_MAX + 1),
            4,
            Utc::now(),
        )
        .expect_err("body too long");
        assert_eq!(err, ValidationError::ReviewBodyTooLong);
    }

    #[test]
    fn review_accepts_boundary_values() {
        let review = Review::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "b".repeat(REVIEW_BODY_MAX),
            RATING_MAX,
            Utc::now(),
        )
        .expect("valid review");
        assert_eq!(review.rating, RATING_MAX);
        assert!(review.book.is_stub());
        assert!(review.user.is_stub());
    }
}
