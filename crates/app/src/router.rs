use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

use bookrack_core::pagination::PaginationError;
use bookrack_storage::Database;

use crate::problem::ProblemResponse;
use crate::provisioner::ListProvisioner;
use crate::{books, ingest, reading_lists, reviews, telemetry, users};

/// Default page size applied when a listing request does not specify one.
pub(crate) const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    provisioner: ListProvisioner,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database) -> Self {
        let clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> = Arc::new(Utc::now);
        let provisioner = ListProvisioner::new(storage.clone(), clock.clone());
        Self {
            metrics,
            storage,
            clock,
            provisioner,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn provisioner(&self) -> &ListProvisioner {
        &self.provisioner
    }
}

/// Pagination query parameters shared by the listing endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub size: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(0)
    }

    pub fn size(&self) -> usize {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

/// Maps a pagination failure onto the 400 the listing endpoints return.
pub(crate) fn pagination_problem(err: PaginationError) -> ProblemResponse {
    ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_page_size", err.to_string())
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/ingest/registrations", post(ingest::handle))
        .route("/api/books", get(books::list).post(books::create))
        .route(
            "/api/books/:id",
            get(books::get).put(books::update).delete(books::remove),
        )
        .route("/api/books/:id/reviews", get(reviews::list_for_book))
        .route("/api/users", get(users::list).post(users::create))
        .route(
            "/api/users/:id",
            get(users::get).put(users::update).delete(users::remove),
        )
        .route(
            "/api/users/:id/reading-lists",
            get(reading_lists::list_for_user),
        )
        .route("/api/reading-lists", post(reading_lists::create))
        .route(
            "/api/reading-lists/:id",
            get(reading_lists::get).delete(reading_lists::remove),
        )
        .route(
            "/api/reading-lists/:id/books/:book_id",
            axum::routing::put(reading_lists::add_book).delete(reading_lists::remove_book),
        )
        .route("/api/reviews", get(reviews::find_by_user_and_book).post(reviews::create))
        .route(
            "/api/reviews/:id",
            get(reviews::get).delete(reviews::remove),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap()
}
