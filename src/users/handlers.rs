use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::{CreateUserRequest, CreatedUserResponse, ListUsersQuery},
        filter::UserFilters,
        repo_types::User,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CreatedUserResponse>)> {
    let Json(payload) = payload?;
    let user = state.users.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(CreatedUserResponse { user })))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let not_found = || AppError::NotFound(format!("User {} not found", id));
    let uuid = Uuid::parse_str(&id).map_err(|_| not_found())?;
    let user = state.users.find_one(uuid).await?.ok_or_else(not_found)?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<Json<Vec<User>>> {
    let filters = UserFilters::from_query(query.filter.as_deref(), query.created_at.as_deref())?;
    let users = state.users.find_all_by_filters(&filters).await?;
    if users.is_empty() {
        return Err(AppError::NotFound(
            "No users found with the provided filters".into(),
        ));
    }
    Ok(Json(users))
}
