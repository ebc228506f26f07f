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

use bookrack_core::pagination::{paginate, Page};
use bookrack_core::types::Review;
use bookrack_storage::{NewReview, ReviewError};

use crate::problem::ProblemResponse;
use crate::router::{pagination_problem, AppState, PageQuery};

#[derive(Debug, Deserialize)]
pub(crate) struct CreateReviewRequest {
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub body: String,
    pub rating: u8,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewResponse {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub body: String,
    pub rating: u8,
    pub published_at: DateTime<Utc>,
}

impl ReviewResponse {
    pub(crate) fn from_domain(review: Review) -> Self {
        Self {
            id: review.id,
            book_id: review.book.id(),
            user_id: review.user.id(),
            body: review.body,
            rating: review.rating,
            published_at: review.published_at,
        }
    }
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), ProblemResponse> {
    counter!("api_requests_total", "resource" => "reviews", "op" => "create").increment(1);

    // Body length and rating range are validated before persistence.
    let review = Review::new(
        Uuid::new_v4(),
        payload.book_id,
        payload.user_id,
        payload.body,
        payload.rating,
        state.now(),
    )
    .map_err(|err| {
        ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_review", err.to_string())
    })?;

    let record = NewReview {
        id: review.id,
        book_id: payload.book_id,
        user_id: payload.user_id,
        body: review.body.clone(),
        rating: review.rating,
        published_at: review.published_at,
    };
    state
        .storage()
        .reviews()
        .create(&record)
        .await
        .map_err(problem_from)?;

    Ok((StatusCode::CREATED, Json(ReviewResponse::from_domain(review))))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewResponse>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reviews", "op" => "get").increment(1);

    let review = state
        .storage()
        .reviews()
        .find_by_id(id)
        .await
        .map_err(problem_from)?;
    Ok(Json(ReviewResponse::from_domain(review)))
}

pub(crate) async fn list_for_book(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ReviewResponse>>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reviews", "op" => "list").increment(1);

    let reviews = state
        .storage()
        .reviews()
        .list_for_book(book_id)
        .await
        .map_err(problem_from)?;

    let content: Vec<ReviewResponse> = reviews
        .into_iter()
        .map(ReviewResponse::from_domain)
        .collect();
    let page = paginate(content, query.page(), query.size()).map_err(pagination_problem)?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewLookupQuery {
    user: Uuid,
    book: Uuid,
}

/// Composite-key convenience lookup: the user's review of a book.
pub(crate) async fn find_by_user_and_book(
    State(state): State<AppState>,
    Query(query): Query<ReviewLookupQuery>,
) -> Result<Json<ReviewResponse>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reviews", "op" => "lookup").increment(1);

    let review = state
        .storage()
        .reviews()
        .find_by_user_and_book(query.user, query.book)
        .await
        .map_err(problem_from)?
        .ok_or_else(|| {
            ProblemResponse::new(
                StatusCode::NOT_FOUND,
                "review_not_found",
                "no review by this user for this book",
            )
        })?;

    Ok(Json(ReviewResponse::from_domain(review)))
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ProblemResponse> {
    counter!("api_requests_total", "resource" => "reviews", "op" => "delete").increment(1);

    state
        .storage()
        .reviews()
        .delete(id)
        .await
        .map_err(problem_from)?;
    Ok(StatusCode::NO_CONTENT)
}

fn problem_from(err: ReviewError) -> ProblemResponse {
    match err {
        ReviewError::NotFound => ProblemResponse::new(
            StatusCode::NOT_FOUND,
            "review_not_found",
            "review does not exist",
        ),
        ReviewError::UnknownUser => ProblemResponse::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unknown_user",
            "reviewing user does not exist",
        ),
        ReviewError::UnknownBook => ProblemResponse::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unknown_book",
            "reviewed book does not exist",
        ),
        other => {
            error!(stage = "api", resource = "reviews", error = %other, "storage failure");
            ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "failed to access reviews",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::router::{app_router, test_support::setup_state, AppState};

    async fn send(state: AppState, request: Request<Body>) -> Response {
        app_router(state).oneshot(request).await.expect("response")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn create_user(state: &AppState) -> Uuid {
        let id = Uuid::new_v4();
        let payload = json!({ "id": id.to_string(), "username": "reviewer" });
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/users")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request");
        let response = send(state.clone(), request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        id
    }

    async fn create_book(state: &AppState) -> Uuid {
        let payload = json!({ "isbn": "9780441172719", "title": "Dune" });
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/books")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request");
        let response = send(state.clone(), request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"]
            .as_str()
            .expect("id")
            .parse()
            .expect("uuid")
    }

    fn review_request(user_id: Uuid, book_id: Uuid, rating: u8, body: &str) -> Request<Body> {
        let payload = json!({
            "book_id": book_id.to_string(),
            "user_id": user_id.to_string(),
            "body": body,
            "rating": rating,
        });
        Request::builder()
            .method(Method::POST)
            .uri("/api/reviews")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn create_then_composite_lookup_round_trips() {
        let state = setup_state().await;
        let user_id = create_user(&state).await;
        let book_id = create_book(&state).await;

        let response = send(state.clone(), review_request(user_id, book_id, 5, "A classic.")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["rating"], 5);

        let request = Request::builder()
            .uri(format!("/api/reviews?user={user_id}&book={book_id}"))
            .body(Body::empty())
            .expect("request");
        let response = send(state, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let found = body_json(response).await;
        assert_eq!(found["id"], created["id"]);
        assert_eq!(found["body"], "A classic.");
    }

    #[tokio::test]
    async fn composite_lookup_without_a_match_is_not_found() {
        let state = setup_state().await;
        let user_id = create_user(&state).await;
        let book_id = create_book(&state).await;

        let request = Request::builder()
            .uri(format!("/api/reviews?user={user_id}&book={book_id}"))
            .body(Body::empty())
            .expect("request");
        let response = send(state, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rating_out_of_range_is_rejected_before_persistence() {
        let state = setup_state().await;
        let user_id = create_user(&state).await;
        let book_id = create_book(&state).await;

        let response = send(state.clone(), review_request(user_id, book_id, 6, "too good")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .uri(format!("/api/reviews?user={user_id}&book={book_id}"))
            .body(Body::empty())
            .expect("request");
        let response = send(state, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn overlong_body_is_rejected() {
        let state = setup_state().await;
        let user_id = create_user(&state).await;
        let book_id = create_book(&state).await;

        let body = "b".repeat(201);
        let response = send(state, review_request(user_id, book_id, 3, &body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_references_are_unprocessable() {
        let state = setup_state().await;
        let user_id = create_user(&state).await;

        let response = send(
            state.clone(),
            review_request(user_id, Uuid::new_v4(), 4, "ghost book"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let book_id = create_book(&state).await;
        let response = send(
            state,
            review_request(Uuid::new_v4(), book_id, 4, "ghost user"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn book_reviews_are_paginated() {
        let state = setup_state().await;
        let user_id = create_user(&state).await;
        let book_id = create_book(&state).await;

        for (rating, body) in [(3, "first"), (4, "second"), (5, "third")] {
            let response = send(state.clone(), review_request(user_id, book_id, rating, body)).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let request = Request::builder()
            .uri(format!("/api/books/{book_id}/reviews?page=0&size=2"))
            .body(Body::empty())
            .expect("request");
        let response = send(state, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_json(response).await;
        assert_eq!(page["total_elements"], 3);
        assert_eq!(page["total_pages"], 2);
        assert_eq!(page["content"].as_array().expect("content").len(), 2);
    }
}
