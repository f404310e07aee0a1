//! Role-based authorization gate.
//!
//! Pure decision over already-verified claims: no I/O, no storage.

use crate::auth::jwt::DecodedToken;
use crate::error::{AuthError, AuthResult};

/// Allows the request when the token's role slug equals `required_role`.
///
/// An invalid or expired token is `InvalidToken` ("who are you"); a valid
/// token with another role is `Forbidden` ("you may not do this").
pub fn authorize(token: &DecodedToken, required_role: &str) -> AuthResult<()> {
    if !token.is_valid() {
        return Err(AuthError::InvalidToken);
    }
    if token.claims.role_slug == required_role {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}
