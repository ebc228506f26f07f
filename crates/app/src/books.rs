use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use bookrack_core::pagination::{paginate, Page};
use bookrack_core::types::Book;
use bookrack_storage::{BookError, BookSearch, NewBook, UpdateBook};

use crate::problem::ProblemResponse;
use crate::router::{pagination_problem, AppState, DEFAULT_PAGE_SIZE};

/// Request body shared by create and update.
#[derive(Debug, Deserialize)]
pub(crate) struct BookPayload {
    pub isbn: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub cover_image_id: Option<Uuid>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BookResponse {
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

impl BookResponse {
    pub(crate) fn from_domain(book: Book) -> Self {
        Self {
            id: book.id,
            isbn: book.isbn,
            title: book.title,
            authors: book.authors,
            publication_date: book.publication_date,
            publisher: book.publisher,
            description: book.description,
            page_count: book.page_count,
            cover_image_id: book.cover_image_id,
            language: book.language,
            genre: book.genre,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookListQuery {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    size: Option<usize>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    genre: Option<String>,
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<BookListQuery>,
) -> Result<Json<Page<BookResponse>>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "books", "op" => "list").increment(1);

    let filter = BookSearch {
        title: query.title.as_deref(),
        genre: query.genre.as_deref(),
    };
    let books = state
        .storage()
        .books()
        .search(&filter)
        .await
        .map_err(problem_from)?;

    let content: Vec<BookResponse> = books.into_iter().map(BookResponse::from_domain).collect();
    let page = paginate(
        content,
        query.page.unwrap_or(0),
        query.size.unwrap_or(DEFAULT_PAGE_SIZE),
    )
    .map_err(pagination_problem)?;
    Ok(Json(page))
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Json(payload): Json<BookPayload>,
) -> Result<(StatusCode, Json<BookResponse>), ProblemResponse> {
    counter!("api_requests_total", "resource" => "books", "op" => "create").increment(1);
    validate(&payload)?;

    let id = Uuid::new_v4();
    let record = NewBook {
        id,
        isbn: &payload.isbn,
        title: &payload.title,
        authors: &payload.authors,
        publication_date: payload.publication_date,
        publisher: payload.publisher.as_deref(),
        description: payload.description.as_deref(),
        page_count: payload.page_count,
        cover_image_id: payload.cover_image_id,
        language: payload.language.as_deref(),
        genre: payload.genre.as_deref(),
        created_at: state.now(),
    };
    state
        .storage()
        .books()
        .create(&record)
        .await
        .map_err(problem_from)?;

    let book = state
        .storage()
        .books()
        .find_by_id(id)
        .await
        .map_err(problem_from)?;
    Ok((StatusCode::CREATED, Json(BookResponse::from_domain(book))))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookResponse>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "books", "op" => "get").increment(1);

    let book = state
        .storage()
        .books()
        .find_by_id(id)
        .await
        .map_err(problem_from)?;
    Ok(Json(BookResponse::from_domain(book)))
}

pub(crate) async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BookPayload>,
) -> Result<Json<BookResponse>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "books", "op" => "update").increment(1);
    validate(&payload)?;

    let changes = UpdateBook {
        isbn: &payload.isbn,
        title: &payload.title,
        authors: &payload.authors,
        publication_date: payload.publication_date,
        publisher: payload.publisher.as_deref(),
        description: payload.description.as_deref(),
        page_count: payload.page_count,
        cover_image_id: payload.cover_image_id,
        language: payload.language.as_deref(),
        genre: payload.genre.as_deref(),
        updated_at: state.now(),
    };
    state
        .storage()
        .books()
        .update(id, &changes)
        .await
        .map_err(problem_from)?;

    let book = state
        .storage()
        .books()
        .find_by_id(id)
        .await
        .map_err(problem_from)?;
    Ok(Json(BookResponse::from_domain(book)))
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ProblemResponse> {
    counter!("api_requests_total", "resource" => "books", "op" => "delete").increment(1);

    state
        .storage()
        .books()
        .delete(id)
        .await
        .map_err(problem_from)?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate(payload: &BookPayload) -> Result<(), ProblemResponse> {
    if payload.title.trim().is_empty() {
        return Err(ProblemResponse::new(
            StatusCode::BAD_REQUEST,
            "invalid_book",
            "title must not be empty",
        ));
    }
    if payload.isbn.trim().is_empty() {
        return Err(ProblemResponse::new(
            StatusCode::BAD_REQUEST,
            "invalid_book",
            "isbn must not be empty",
        ));
    }
    Ok(())
}

fn problem_from(err: BookError) -> ProblemResponse {
    match err {
        BookError::NotFound => ProblemResponse::new(
            StatusCode::NOT_FOUND,
            "book_not_found",
            "book does not exist",
        ),
        other => {
            error!(stage = "api", resource = "books", error = %other, "storage failure");
            ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "failed to access the catalog",
            )
        }
    }
}
