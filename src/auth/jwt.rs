//! JWT Token Handler
//! Mission: Issue and verify short-lived HS256 access tokens carrying role claims

use crate::auth::models::{Claims, User};
use crate::error::{AuthError, AuthResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Lifetime of an access token.
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;

/// Signature or structure check failed. Expiry alone never produces this;
/// an expired but well-formed token decodes with its validity flag unset.
#[derive(Debug, Error)]
#[error("failed to decode access token: {0}")]
pub struct DecodeError(#[from] jsonwebtoken::errors::Error);

impl From<DecodeError> for AuthError {
    fn from(_: DecodeError) -> Self {
        AuthError::InvalidToken
    }
}

/// Signature-verified token claims plus the validity flag computed at parse
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub claims: Claims,
    valid: bool,
}

impl DecodedToken {
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// JWT Handler for token operations
pub struct JwtHandler {
    secret: String,
    ttl: Duration,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            ttl: Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
        }
    }

    /// Override the token lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sign an access token for a user with a resolved role.
    ///
    /// Refuses anonymous or role-less users: nothing is signed unless id,
    /// username, role id, role slug and role label are all present.
    pub fn generate_jwt(&self, user: &User) -> AuthResult<String> {
        if user.id.is_nil() {
            return Err(AuthError::BadInput("user id"));
        }
        if user.username.is_empty() {
            return Err(AuthError::BadInput("username"));
        }
        let role = user.role.as_ref().ok_or(AuthError::BadInput("role"))?;
        if role.id.is_nil() || role.slug.is_empty() || role.label.is_empty() {
            return Err(AuthError::BadInput("role"));
        }

        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            iss: user.id.to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
            role_slug: role.slug.clone(),
            role_label: role.label.clone(),
            username: user.username.clone(),
        };

        debug!(
            "Generating JWT for user {} ({}), role {}",
            user.username, user.id, role.slug
        );

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("failed to sign JWT: {}", e)))
    }

    /// Verify the signature and decode the claims.
    pub fn parse_jwt(&self, raw: &str) -> Result<DecodedToken, DecodeError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is reported through the validity flag, not as a decode failure
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let decoded = decode::<Claims>(
            raw,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;

        let claims = decoded.claims;
        let well_formed = !claims.iss.is_empty() && !claims.role_slug.is_empty();
        let valid = well_formed && claims.exp > Utc::now().timestamp();

        Ok(DecodedToken { claims, valid })
    }

    pub fn is_jwt_valid(&self, decoded: &DecodedToken) -> bool {
        decoded.is_valid()
    }

    /// User id from the issuer claim of a valid token.
    pub fn user_id_from_token(&self, decoded: &DecodedToken) -> AuthResult<Uuid> {
        if !self.is_jwt_valid(decoded) {
            return Err(AuthError::InvalidToken);
        }
        Uuid::parse_str(&decoded.claims.iss).map_err(|_| AuthError::InvalidToken)
    }

    /// Role slug of a valid token.
    pub fn role_from_token<'a>(&self, decoded: &'a DecodedToken) -> AuthResult<&'a str> {
        if !self.is_jwt_valid(decoded) {
            return Err(AuthError::InvalidToken);
        }
        Ok(decoded.claims.role_slug.as_str())
    }
}
