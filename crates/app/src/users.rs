use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use bookrack_core::pagination::{paginate, Page};
use bookrack_core::types::{ThemePreference, User};
use bookrack_storage::{NewUser, UpdateUser, UserError};

use crate::problem::ProblemResponse;
use crate::router::{pagination_problem, AppState, DEFAULT_PAGE_SIZE};

/// Direct registration request. The identity id is assigned by the caller
/// when the user originates in an external identity provider; otherwise a
/// fresh one is generated.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateUserRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub theme: Option<ThemePreference>,
}

/// Profile update request. Present fields replace the stored value; absent
/// fields are left untouched. The identity id is immutable.
#[derive(Debug, Deserialize)]
pub(crate) struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub theme: Option<ThemePreference>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub theme: ThemePreference,
}

impl UserResponse {
    pub(crate) fn from_domain(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            theme: user.theme,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserListQuery {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    size: Option<usize>,
    /// Comma-separated identity ids restricting the listing.
    #[serde(default)]
    ids: Option<String>,
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Page<UserResponse>>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "users", "op" => "list").increment(1);

    let users = match query.ids.as_deref() {
        Some(raw) => {
            let ids = parse_ids(raw)?;
            state
                .storage()
                .users()
                .find_by_ids(&ids)
                .await
                .map_err(problem_from)?
        }
        None => state.storage().users().list().await.map_err(problem_from)?,
    };

    let content: Vec<UserResponse> = users.into_iter().map(UserResponse::from_domain).collect();
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
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ProblemResponse> {
    counter!("api_requests_total", "resource" => "users", "op" => "create").increment(1);

    let user = User {
        id: payload.id.unwrap_or_else(Uuid::new_v4),
        username: payload.username,
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        theme: payload.theme.unwrap_or_default(),
    };
    state
        .storage()
        .users()
        .create(&NewUser::from_domain(&user, state.now()))
        .await
        .map_err(problem_from)?;

    Ok((StatusCode::CREATED, Json(UserResponse::from_domain(user))))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "users", "op" => "get").increment(1);

    let user = state
        .storage()
        .users()
        .find_by_id(id)
        .await
        .map_err(problem_from)?;
    Ok(Json(UserResponse::from_domain(user)))
}

pub(crate) async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ProblemResponse> {
    counter!("api_requests_total", "resource" => "users", "op" => "update").increment(1);

    let current = state
        .storage()
        .users()
        .find_by_id(id)
        .await
        .map_err(problem_from)?;

    let merged = User {
        id: current.id,
        username: payload.username.or(current.username),
        email: payload.email.or(current.email),
        first_name: payload.first_name.or(current.first_name),
        last_name: payload.last_name.or(current.last_name),
        theme: payload.theme.unwrap_or(current.theme),
    };
    let changes = UpdateUser {
        username: merged.username.as_deref(),
        email: merged.email.as_deref(),
        first_name: merged.first_name.as_deref(),
        last_name: merged.last_name.as_deref(),
        theme: merged.theme,
        updated_at: state.now(),
    };
    state
        .storage()
        .users()
        .update(id, &changes)
        .await
        .map_err(problem_from)?;

    Ok(Json(UserResponse::from_domain(merged)))
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ProblemResponse> {
    counter!("api_requests_total", "resource" => "users", "op" => "delete").increment(1);

    state
        .storage()
        .users()
        .delete(id)
        .await
        .map_err(problem_from)?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_ids(raw: &str) -> Result<Vec<Uuid>, ProblemResponse> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse().map_err(|_| {
                ProblemResponse::new(
                    StatusCode::BAD_REQUEST,
                    "invalid_ids",
                    format!("{item} is not a valid identifier"),
                )
            })
        })
        .collect()
}

fn problem_from(err: UserError) -> ProblemResponse {
    match err {
        UserError::NotFound => ProblemResponse::new(
            StatusCode::NOT_FOUND,
            "user_not_found",
            "user does not exist",
        ),
        other => {
            error!(stage = "api", resource = "users", error = %other, "storage failure");
            ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "failed to access users",
            )
        }
    }
}
