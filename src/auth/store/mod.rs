//! Storage collaborators for the session core.
//!
//! The session manager only ever talks to these traits. Lookups return
//! `Ok(None)` for absent rows so that "not found" and "the backend failed"
//! stay distinguishable.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::auth::models::{RefreshToken, Role, User};
use crate::error::StorageError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StorageError>;

/// Identity records and their refresh-token back-reference.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Points `user_id` at `token_id` as its active refresh token.
    async fn set_refresh_token_ref(&self, user_id: Uuid, token_id: Uuid) -> StoreResult<()>;

    async fn get_by_refresh_token_ref(&self, token_id: Uuid) -> StoreResult<Option<User>>;

    async fn insert(&self, user: User) -> StoreResult<User>;
}

/// Role definitions.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Role>>;

    async fn get_by_slug(&self, slug: &str) -> StoreResult<Option<Role>>;
}

/// Persisted refresh tokens.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<RefreshToken>>;

    async fn get_by_value(&self, value: &str) -> StoreResult<Option<RefreshToken>>;

    async fn insert(&self, token: RefreshToken) -> StoreResult<RefreshToken>;

    /// Deleting an id that is already gone is not an error.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
}

/// Runs a storage call under a fixed deadline. Expiry is a retryable
/// `StorageError::Timeout`, never an empty result.
pub async fn with_deadline<T, F>(
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout { operation, timeout }),
    }
}
