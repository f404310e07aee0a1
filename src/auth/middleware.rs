//! Authentication Middleware
//! Mission: Protect API endpoints with access token validation

use crate::auth::api::AuthState;
use crate::error::AuthError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

/// Requires a valid, unexpired bearer token. Role checks are left to the
/// handlers; this only establishes identity.
///
/// The verified token is added to the request extensions as a
/// [`DecodedToken`](crate::auth::jwt::DecodedToken).
pub async fn auth_middleware(
    State(state): State<AuthState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::InvalidToken)?;

    let decoded = state.service.tokens().jwt().parse_jwt(bearer.token())?;
    if !decoded.is_valid() {
        return Err(AuthError::InvalidToken);
    }

    req.extensions_mut().insert(decoded);
    Ok(next.run(req).await)
}
