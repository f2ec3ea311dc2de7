use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use engine::accounts::{self, AccountUpdate, NewAccount};
use engine::identity::require_elevated;
use engine::{DeskError, Role};
use model::entities::user;
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

use super::sorted;
use crate::auth::CurrentIdentity;
use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse, ListQuery};

fn default_active() -> bool {
    true
}

/// Request body for creating a login account
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    /// Username (must be unique)
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    /// regular, employee, manager or superadmin
    #[schema(value_type = String, example = "employee")]
    pub role: Role,
    /// Linked customer; required for the regular role
    pub customer_id: Option<i32>,
    /// Linked employee; required for every other role
    pub employee_id: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Request body replacing a login account's editable fields
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    /// New password; the current one is kept when omitted
    #[validate(length(max = 128))]
    pub password: Option<String>,
    #[schema(value_type = String, example = "manager")]
    pub role: Role,
    pub customer_id: Option<i32>,
    pub employee_id: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Login account as returned by the API. The password hash never leaves the
/// server.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    #[schema(value_type = String)]
    pub role: Role,
    pub customer_id: Option<i32>,
    pub employee_id: Option<i32>,
    pub is_active: bool,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            role: model.role,
            customer_id: model.customer_id,
            employee_id: model.employee_id,
            is_active: model.is_active,
        }
    }
}

/// List login accounts
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(ListQuery),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Users retrieved successfully", body = ApiResponse<Vec<UserResponse>>),
        (status = 401, description = "Login required", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn get_users(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Query(query)): Valid<Query<ListQuery>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<UserResponse>>>), ApiError> {
    trace!("Entering get_users function");
    require_elevated(&identity, "listing accounts")?;

    let columns: &[user::Column] = match query.sort_key() {
        "username" => &[user::Column::Username],
        "role" => &[user::Column::Role],
        _ => &[],
    };
    let users = sorted(user::Entity::find(), columns, user::Column::Id, query.descending())
        .all(&state.db)
        .await?;
    debug!("Retrieved {} users", users.len());

    let data = users.into_iter().map(UserResponse::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(data, "Users retrieved successfully"))))
}

/// Create a login account
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = CreateUserRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 201, description = "User created successfully", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn create_user(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<CreateUserRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    trace!("Entering create_user function");
    debug!("Creating user with username: {}", request.username);

    let account = NewAccount {
        username: request.username,
        password: request.password,
        role: request.role,
        customer_id: request.customer_id,
        employee_id: request.employee_id,
        is_active: request.is_active,
    };
    let user = accounts::create_account(&state.db, &identity, account).await?;

    info!("User created successfully with ID: {}, username: {}", user.id, user.username);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UserResponse::from(user), "User created successfully")),
    ))
}

/// Get a login account by ID
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = i32, Path, description = "User ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "User retrieved successfully", body = ApiResponse<UserResponse>),
        (status = 403, description = "Elevated role required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(actor = identity.user_id))]
pub async fn get_user(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    trace!("Entering get_user function for user_id: {}", user_id);
    require_elevated(&identity, "viewing accounts")?;

    let user = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| DeskError::not_found(format!("User {user_id}")))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(UserResponse::from(user), "User retrieved successfully")),
    ))
}

/// Update a login account
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "User updated successfully", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Elevated role required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, request), fields(actor = identity.user_id))]
pub async fn update_user(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Valid(Json(request)): Valid<Json<UpdateUserRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    trace!("Entering update_user function for user_id: {}", user_id);

    let update = AccountUpdate {
        username: request.username,
        role: request.role,
        is_active: request.is_active,
        password: request.password,
        customer_id: request.customer_id,
        employee_id: request.employee_id,
    };
    let user = accounts::update_account(&state.db, &identity, user_id, update).await?;

    info!("User {} updated, role now {}", user.id, user.role.as_str());
    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(UserResponse::from(user), "User updated successfully")),
    ))
}

/// Delete a login account
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = i32, Path, description = "User ID")),
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "User deleted successfully"),
        (status = 403, description = "Elevated role required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity), fields(actor = identity.user_id))]
pub async fn delete_user(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<()>>), ApiError> {
    trace!("Entering delete_user function for user_id: {}", user_id);
    accounts::delete_account(&state.db, &identity, user_id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::ok((), "User deleted successfully"))))
}
