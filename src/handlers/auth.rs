use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::Json,
};
use axum_valid::Valid;
use chrono::{DateTime, Utc};
use engine::accounts::{self, SignupRequest as AccountSignup};
use engine::{EntityKind, EntityRef, PrivilegeTier, Role};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};
use utoipa::ToSchema;
use validator::Validate;

use super::users::UserResponse;
use crate::auth::{CurrentIdentity, cleared_session_cookie, session_cookie, session_token};
use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Self-service registration for an existing customer or employee
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    pub password_confirm: String,
    /// `customer` or `employee`
    #[schema(value_type = String, example = "customer")]
    pub entity_type: EntityKind,
    pub entity_id: i32,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token; also set as the `session` cookie
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

/// Who the current session belongs to
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IdentityResponse {
    pub user_id: i32,
    pub username: String,
    #[schema(value_type = String)]
    pub role: Role,
    #[schema(value_type = String)]
    pub tier: PrivilegeTier,
    #[schema(value_type = String)]
    pub entity_type: EntityKind,
    pub entity_id: i32,
}

/// Register a login account
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid signup", body = ErrorResponse)
    )
)]
#[instrument(skip(state, request), fields(username = %request.username))]
pub async fn signup(
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<SignupRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    trace!("Entering signup function");
    let entity = EntityRef {
        kind: request.entity_type,
        id: request.entity_id,
    };
    let user = accounts::signup(
        &state.db,
        AccountSignup {
            username: request.username,
            password: request.password,
            password_confirm: request.password_confirm,
            entity,
        },
    )
    .await?;

    info!("Signed up user {} for {}", user.id, entity);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UserResponse::from(user), "Account created successfully")),
    ))
}

/// Start a session
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; the token is also set as a cookie", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid username or password", body = ErrorResponse)
    )
)]
#[instrument(skip(state, request), fields(username = %request.username))]
pub async fn login(
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<LoginRequest>>,
) -> Result<(StatusCode, [(axum::http::HeaderName, String); 1], Json<ApiResponse<LoginResponse>>), ApiError> {
    trace!("Entering login function");
    let Some(user) = accounts::authenticate(&state.db, &request.username, &request.password).await? else {
        return Err(ApiError::InvalidCredentials);
    };

    let session = state.sessions.issue(user.id, &user.username)?;
    let max_age = state.sessions.ttl().num_seconds();
    info!("User {} logged in", user.id);

    let response = LoginResponse {
        token: session.token.clone(),
        expires_at: session.expires_at,
        user: UserResponse::from(user),
    };
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, session_cookie(&session.token, max_age))],
        Json(ApiResponse::ok(response, "Logged in successfully")),
    ))
}

/// End the current session
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "Login required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, identity, headers), fields(user_id = identity.user_id))]
pub async fn logout(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    headers: HeaderMap,
) -> Result<(StatusCode, [(axum::http::HeaderName, String); 1], Json<ApiResponse<()>>), ApiError> {
    trace!("Entering logout function");
    if let Some(token) = session_token(&headers) {
        let revoked = state.sessions.revoke(&token).await;
        debug!(revoked, "Session revocation");
    }
    info!("User {} logged out", identity.user_id);

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cleared_session_cookie())],
        Json(ApiResponse::ok((), "Logged out successfully")),
    ))
}

/// Describe the current session's identity
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    security(("bearer" = []), ("session_cookie" = [])),
    responses(
        (status = 200, description = "Current identity", body = ApiResponse<IdentityResponse>),
        (status = 401, description = "Login required", body = ErrorResponse)
    )
)]
#[instrument(skip(identity), fields(user_id = identity.user_id))]
pub async fn me(
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<(StatusCode, Json<ApiResponse<IdentityResponse>>), ApiError> {
    let response = IdentityResponse {
        user_id: identity.user_id,
        username: identity.username.clone(),
        role: identity.role,
        tier: identity.tier(),
        entity_type: identity.owned.kind,
        entity_id: identity.owned.id,
    };
    Ok((StatusCode::OK, Json(ApiResponse::ok(response, "Identity retrieved successfully"))))
}
