use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use bookrack_core::refs::EntityRef;
use bookrack_core::types::{Book, ReadingList};
use bookrack_storage::{BookError, NewReadingList, ReadingListError};

use crate::books::BookResponse;
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateReadingListRequest {
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A reading list as exposed over the API. Book references are either bare
/// identifiers (the stored stubs) or, when expansion was requested, the full
/// catalog entries.
#[derive(Debug, Serialize)]
pub(crate) struct ReadingListResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub books: Vec<BookRefResponse>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum BookRefResponse {
    Id(Uuid),
    Expanded(BookResponse),
}

impl ReadingListResponse {
    pub(crate) fn from_domain(list: ReadingList) -> Self {
        let books = list
            .books
            .into_iter()
            .map(|book| match book {
                EntityRef::Stub(id) => BookRefResponse::Id(id),
                EntityRef::Loaded(full) => BookRefResponse::Expanded(BookResponse::from_domain(full)),
            })
            .collect();
        Self {
            id: list.id,
            user_id: list.user.id(),
            name: list.name,
            description: list.description,
            created_at: list.created_at,
            books,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadingListGetQuery {
    #[serde(default)]
    expand: Option<String>,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateReadingListRequest>,
) -> Result<(StatusCode, Json<ReadingListResponse>), ProblemResponse> {
    counter!("api_requests_total", "resource" => "reading_lists", "op" => "create").increment(1);

    // Length invariants are checked before any persistence attempt.
    let list = ReadingList::new(
        Uuid::new_v4(),
        payload.user_id,
        payload.name,
        payload.description,
        state.now(),
    )
    .map_err(|err| {
        ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_reading_list", err.to_string())
    })?;

    let record = NewReadingList {
        id: list.id,
        user_id: payload.user_id,
        name: &list.name,
        description: list.description.as_deref(),
        created_at: list.created_at,
    };
    state
        .storage()
        .reading_lists()
        .create(&record)
        .await
        .map_err(problem_from)?;

    Ok((
        StatusCode::CREATED,
        Json(ReadingListResponse::from_domain(list)),
    ))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReadingListGetQuery>,
) -> Result<Json<ReadingListResponse>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reading_lists", "op" => "get").increment(1);

    let mut list = state
        .storage()
        .reading_lists()
        .find_by_id(id)
        .await
        .map_err(problem_from)?;

    if query.expand.as_deref() == Some("books") {
        list = expand_books(&state, list).await?;
    }

    Ok(Json(ReadingListResponse::from_domain(list)))
}

pub(crate) async fn list_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ReadingListResponse>>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reading_lists", "op" => "list").increment(1);

    let lists = state
        .storage()
        .reading_lists()
        .find_by_user(user_id)
        .await
        .map_err(problem_from)?;

    Ok(Json(
        lists
            .into_iter()
            .map(ReadingListResponse::from_domain)
            .collect(),
    ))
}

pub(crate) async fn add_book(
    State(state): State<AppState>,
    Path((id, book_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reading_lists", "op" => "add_book").increment(1);

    state
        .storage()
        .reading_lists()
        .add_book(id, book_id, state.now())
        .await
        .map_err(problem_from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn remove_book(
    State(state): State<AppState>,
    Path((id, book_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reading_lists", "op" => "remove_book")
        .increment(1);

    state
        .storage()
        .reading_lists()
        .remove_book(id, book_id)
        .await
        .map_err(problem_from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reading_lists", "op" => "delete").increment(1);

    state
        .storage()
        .reading_lists()
        .delete(id)
        .await
        .map_err(problem_from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resolves the list's book stubs through the owning catalog repository,
/// verifying each fetched aggregate matches the stub it stands in for.
async fn expand_books(
    state: &AppState,
    mut list: ReadingList,
) -> Result<ReadingList, ProblemResponse> {
    let ids: Vec<Uuid> = list.books.iter().map(EntityRef::id).collect();
    let books = state
        .storage()
        .books()
        .find_by_ids(&ids)
        .await
        .map_err(|err: BookError| {
            error!(stage = "api", resource = "reading_lists", error = %err, "failed to expand book stubs");
            ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "failed to expand book references",
            )
        })?;

    let mut by_id: HashMap<Uuid, Book> = books.into_iter().map(|book| (book.id, book)).collect();
    list.books = list
        .books
        .into_iter()
        .map(|reference| match by_id.remove(&reference.id()) {
            Some(book) => reference.resolve(book).map_err(|err| {
                error!(stage = "api", resource = "reading_lists", error = %err, "stub mismatch");
                ProblemResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "stub_mismatch",
                    err.to_string(),
                )
            }),
            // The catalog no longer has the book; keep the bare reference.
            None => Ok(reference),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(list)
}

fn problem_from(err: ReadingListError) -> ProblemResponse {
    match err {
        ReadingListError::NotFound => ProblemResponse::new(
            StatusCode::NOT_FOUND,
            "reading_list_not_found",
            "reading list does not exist",
        ),
        ReadingListError::UnknownUser => ProblemResponse::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unknown_user",
            "owning user does not exist",
        ),
        ReadingListError::UnknownBook => ProblemResponse::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unknown_book",
            "referenced book does not exist",
        ),
        other => {
            error!(stage = "api", resource = "reading_lists", error = %other, "storage failure");
            ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "failed to access reading lists",
            )
        }
    }
}
