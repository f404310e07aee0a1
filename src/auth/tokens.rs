//! Token manager
//! Pairs access tokens with refresh tokens on login, refresh and logout

use crate::auth::jwt::JwtHandler;
use crate::auth::models::{RefreshToken, TokenPair, User};
use crate::auth::session::SessionManager;
use crate::auth::store::{with_deadline, RoleDirectory};
use crate::error::{AuthError, AuthResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct TokenManager {
    jwt: Arc<JwtHandler>,
    sessions: Arc<SessionManager>,
    roles: Arc<dyn RoleDirectory>,
    timeout: Duration,
}

impl TokenManager {
    pub fn new(
        jwt: Arc<JwtHandler>,
        sessions: Arc<SessionManager>,
        roles: Arc<dyn RoleDirectory>,
        timeout: Duration,
    ) -> Self {
        Self {
            jwt,
            sessions,
            roles,
            timeout,
        }
    }

    pub fn jwt(&self) -> &JwtHandler {
        &self.jwt
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Access token plus a freshly rotated refresh token. Either step failing
    /// aborts the whole call.
    pub async fn generate_tokens(&self, user: &User) -> AuthResult<TokenPair> {
        let access_token = self.jwt.generate_jwt(user)?;
        let refresh = self.sessions.generate_refresh_token(user).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
        })
    }

    /// Exchanges a live refresh token for a new pair. The presented token is
    /// superseded; the session's absolute expiry carries over.
    ///
    /// Returns the owning user (with role attached) alongside the pair.
    pub async fn refresh_all_tokens(&self, presented: &str) -> AuthResult<(TokenPair, User)> {
        let token = match self.sessions.get_token_from_repo(presented).await {
            Ok(token) => token,
            Err(AuthError::NotFound(_)) => return Err(AuthError::InvalidToken),
            Err(e) => return Err(e),
        };

        if !self.sessions.is_token_valid(&token) {
            self.sessions.delete_token(&token).await?;
            info!(token_id = %token.id, "Removed expired refresh token");
            return Err(AuthError::InvalidToken);
        }

        let user = self.sessions.get_user_by_token(&token).await.map_err(|e| {
            warn!(token_id = %token.id, error = %e, "No owner for refresh token");
            AuthError::InvalidToken
        })?;

        let role = with_deadline(self.timeout, "roles.get_by_id", self.roles.get_by_id(user.role_id))
            .await?
            .ok_or(AuthError::NotFound("role"))?;
        let user = user.with_role(role);

        // Signing has no side effects, so do it before the old token is consumed
        let access_token = self.jwt.generate_jwt(&user)?;
        let refresh = self.sessions.rotate_presented(user.id, &token).await?;

        debug!(user_id = %user.id, "Refreshed token pair");

        let user = User {
            refresh_token_id: Some(refresh.id),
            ..user
        };
        Ok((
            TokenPair {
                access_token,
                refresh_token: refresh.token,
            },
            user,
        ))
    }

    /// Deletes the refresh token with value `presented`. Returns whether a
    /// token was actually removed.
    pub async fn delete_refresh_token(&self, presented: &str) -> AuthResult<bool> {
        let token: RefreshToken = match self.sessions.get_token_from_repo(presented).await {
            Ok(token) => token,
            Err(AuthError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        self.sessions.delete_token(&token).await?;
        info!(token_id = %token.id, "Refresh token deleted");
        Ok(true)
    }
}
