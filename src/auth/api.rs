//! Authentication API Endpoints
//! Mission: Expose login, refresh, logout and user management over HTTP

use crate::auth::{
    jwt::DecodedToken,
    middleware::auth_middleware,
    models::{CreateUserRequest, LoginRequest, RefreshRequest, TokenResponse, UserResponse},
    service::AuthService,
};
use crate::error::AuthError;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
}

impl AuthState {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }
}

/// All auth routes. `/api/auth/me` and `/api/admin/*` sit behind the bearer
/// middleware; the rest are public.
pub fn router(state: AuthState) -> Router {
    let protected_routes = Router::new()
        .route("/api/auth/me", get(get_current_user))
        .route("/api/admin/users", post(create_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/health", get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    info!("Login attempt: {}", payload.username);

    let response = state
        .service
        .login(&payload.username, &payload.password)
        .await?;

    Ok(Json(response))
}

/// Refresh endpoint - POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let response = state.service.refresh(&payload.refresh_token).await?;
    Ok(Json(response))
}

/// Logout endpoint - POST /api/auth/logout
pub async fn logout(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AuthError> {
    state.service.logout(&payload.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get current user info - GET /api/auth/me
pub async fn get_current_user(
    State(state): State<AuthState>,
    Extension(caller): Extension<DecodedToken>,
) -> Result<Json<UserResponse>, AuthError> {
    let user = state.service.current_user_of(&caller).await?;
    Ok(Json(UserResponse::from_user(&user)))
}

/// Create user - POST /api/admin/users (Admin only)
pub async fn create_user(
    State(state): State<AuthState>,
    Extension(caller): Extension<DecodedToken>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AuthError> {
    let user = state
        .service
        .add_user_as(
            &caller,
            &payload.username,
            &payload.password,
            &payload.role,
            payload.profile(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from_user(&user))))
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::BadInput(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Storage(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Storage(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Backend detail stays in the logs
        let message = match &self {
            AuthError::Storage(e) if e.is_retryable() => {
                warn!("Storage timeout: {}", e);
                "Service temporarily unavailable".to_string()
            }
            AuthError::Storage(_) | AuthError::Internal(_) => {
                error!("Auth request failed: {}", self);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "retryable": self.is_retryable(),
        });

        (status, Json(body)).into_response()
    }
}
