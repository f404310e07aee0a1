//! Refresh-token session manager.
//!
//! Owns the single active refresh token per user: issuing, rotating (with the
//! absolute session expiry carried over), and keeping the user's
//! back-reference consistent with the token store.
//!
//! Rotation is a sequence of independent store calls, not a transaction:
//! fetch old, delete old, insert new, link user, and on a failed link a
//! compensating delete of the new row. Rotations for the same user are
//! serialized through a per-user async lock so two requests never race on
//! the fetch/delete step.

use crate::auth::models::{RefreshToken, User};
use crate::auth::store::{with_deadline, RefreshTokenStore, UserDirectory};
use crate::error::{AuthError, AuthResult, StorageError};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Absolute session window granted when a user has no prior refresh token.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Bytes of OS randomness behind every refresh token value.
const TOKEN_VALUE_BYTES: usize = 32;

pub struct SessionManager {
    tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserDirectory>,
    timeout: std::time::Duration,
    session_ttl: Duration,
    rotation_locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl SessionManager {
    pub fn new(
        tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserDirectory>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            tokens,
            users,
            timeout,
            session_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
            rotation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    async fn guarded<T, F>(&self, operation: &'static str, fut: F) -> AuthResult<T>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        Ok(with_deadline(self.timeout, operation, fut).await?)
    }

    /// Acquires the rotation lock of one user. Idle entries are pruned on
    /// every acquisition so the map only holds users with rotations in flight.
    async fn lock_user(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.rotation_locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(user_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Issues a new refresh token for `user`, superseding the current one.
    ///
    /// The user row is re-read under the rotation lock, so a stale
    /// back-reference in the caller's copy is harmless.
    pub async fn generate_refresh_token(&self, user: &User) -> AuthResult<RefreshToken> {
        if user.id.is_nil() {
            return Err(AuthError::BadInput("user"));
        }

        let _guard = self.lock_user(user.id).await;
        let current = self
            .guarded("users.get_by_id", self.users.get_by_id(user.id))
            .await?
            .ok_or(AuthError::NotFound("user"))?;

        self.rotate_locked(&current, true).await
    }

    /// Rotates on behalf of a presented refresh token. Fails with
    /// `InvalidToken` when, by the time the lock is held, `presented` is no
    /// longer the user's active token (a concurrent refresh won) or has
    /// reached its expiry. The new token always inherits the presented
    /// token's expiry; this path never opens a new session window.
    pub async fn rotate_presented(
        &self,
        user_id: Uuid,
        presented: &RefreshToken,
    ) -> AuthResult<RefreshToken> {
        let _guard = self.lock_user(user_id).await;
        let current = self
            .guarded("users.get_by_id", self.users.get_by_id(user_id))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if current.refresh_token_id != Some(presented.id) {
            debug!(user_id = %user_id, "Refresh token superseded before rotation");
            return Err(AuthError::InvalidToken);
        }

        // Expiry may have passed while waiting for the lock
        if !self.is_token_valid(presented) {
            self.guarded("tokens.delete", self.tokens.delete(presented.id))
                .await?;
            info!(user_id = %user_id, token_id = %presented.id, "Refresh token expired before rotation");
            return Err(AuthError::InvalidToken);
        }

        self.rotate_locked(&current, false).await
    }

    /// Caller must hold the user's rotation lock.
    ///
    /// `renew_expired` decides what an expired previous token means: a new
    /// session window (login) or `InvalidToken` (refresh).
    async fn rotate_locked(&self, user: &User, renew_expired: bool) -> AuthResult<RefreshToken> {
        let now = Utc::now();
        let valid_until = match user.refresh_token_id {
            None => now + self.session_ttl,
            Some(old_id) => {
                let old = self
                    .guarded("tokens.get_by_id", self.tokens.get_by_id(old_id))
                    .await?
                    .ok_or(AuthError::NotFound("refresh token"))?;

                self.guarded("tokens.delete", self.tokens.delete(old.id))
                    .await?;

                if old.valid_until > now {
                    old.valid_until
                } else if renew_expired {
                    // The previous session hit its ceiling; this is a new session.
                    now + self.session_ttl
                } else {
                    debug!(user_id = %user.id, "Previous refresh token expired during rotation");
                    return Err(AuthError::InvalidToken);
                }
            }
        };

        let token = RefreshToken::new(generate_token_value(), valid_until);
        let token_id = token.id;
        // A timed-out insert may still land, so it gets the same cleanup as a failed link
        let token = match self
            .guarded("tokens.insert", self.tokens.insert(token))
            .await
        {
            Ok(token) => token,
            Err(insert_err) => {
                return Err(self.discard_new_token(user.id, token_id, insert_err).await)
            }
        };

        let linked = self
            .guarded(
                "users.set_refresh_token_ref",
                self.users.set_refresh_token_ref(user.id, token.id),
            )
            .await;

        if let Err(link_err) = linked {
            return Err(self.discard_new_token(user.id, token.id, link_err).await);
        }

        info!(
            user_id = %user.id,
            rotated = user.refresh_token_id.is_some(),
            valid_until = %token.valid_until,
            "Issued refresh token"
        );

        Ok(token)
    }

    /// Compensating delete of a token row that was (or may have been) written
    /// but never linked. Returns the error to surface: the cleanup failure if
    /// there is one, otherwise `cause`.
    async fn discard_new_token(&self, user_id: Uuid, token_id: Uuid, cause: AuthError) -> AuthError {
        warn!(
            user_id = %user_id,
            token_id = %token_id,
            error = %cause,
            "Refresh token rotation failed, removing the new token"
        );
        match self
            .guarded("tokens.delete", self.tokens.delete(token_id))
            .await
        {
            Ok(()) => cause,
            Err(cleanup_err) => {
                error!(
                    user_id = %user_id,
                    token_id = %token_id,
                    error = %cleanup_err,
                    "Rollback of orphaned refresh token failed"
                );
                cleanup_err
            }
        }
    }

    /// `valid_until` is strictly in the future.
    pub fn is_token_valid(&self, token: &RefreshToken) -> bool {
        token.valid_until > Utc::now()
    }

    pub async fn get_token_from_repo(&self, value: &str) -> AuthResult<RefreshToken> {
        self.guarded("tokens.get_by_value", self.tokens.get_by_value(value))
            .await?
            .ok_or(AuthError::NotFound("refresh token"))
    }

    pub async fn delete_token(&self, token: &RefreshToken) -> AuthResult<()> {
        self.guarded("tokens.delete", self.tokens.delete(token.id))
            .await
    }

    /// The user whose back-reference points at `token`.
    pub async fn get_user_by_token(&self, token: &RefreshToken) -> AuthResult<User> {
        self.guarded(
            "users.get_by_refresh_token_ref",
            self.users.get_by_refresh_token_ref(token.id),
        )
        .await?
        .ok_or(AuthError::NotFound("user"))
    }
}

fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_VALUE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
