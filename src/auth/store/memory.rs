//! In-memory storage backend.
//!
//! Mirrors the SQLite schema semantics (unique usernames and token values,
//! `ON DELETE SET NULL` on the user back-reference). With `cfg(test)` or the
//! `test-util` feature it also exposes fault injection so the rotation
//! rollback paths can be exercised.

use super::{RefreshTokenStore, RoleDirectory, StoreResult, UserDirectory};
use crate::auth::models::{RefreshToken, Role, User};
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    tokens: HashMap<Uuid, RefreshToken>,
}

/// Shared in-memory users/roles/tokens tables
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    calls: AtomicUsize,
    fail_link_update: AtomicBool,
    fail_token_delete: AtomicBool,
    fail_reverse_lookup: AtomicBool,
    latency: Mutex<Option<Duration>>,
    insert_latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the `admin` and `user` roles.
    pub fn with_default_roles() -> Self {
        let store = Self::new();
        for role in Role::defaults() {
            store.add_role(role);
        }
        store
    }

    pub fn add_role(&self, role: Role) {
        self.tables.write().roles.insert(role.id, role);
    }

    pub fn role_by_slug(&self, slug: &str) -> Option<Role> {
        self.tables
            .read()
            .roles
            .values()
            .find(|r| r.slug == slug)
            .cloned()
    }

    /// Number of refresh-token rows currently stored.
    pub fn token_count(&self) -> usize {
        self.tables.read().tokens.len()
    }

    /// Number of trait calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every `set_refresh_token_ref` fail until cleared.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_link_updates(&self, fail: bool) {
        self.fail_link_update.store(fail, Ordering::SeqCst);
    }

    /// Makes every refresh-token delete fail until cleared.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_token_deletes(&self, fail: bool) {
        self.fail_token_delete.store(fail, Ordering::SeqCst);
    }

    /// Makes every `get_by_refresh_token_ref` fail until cleared.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_reverse_lookups(&self, fail: bool) {
        self.fail_reverse_lookup.store(fail, Ordering::SeqCst);
    }

    /// Delays every call, to exercise deadlines.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Delays the reply of refresh-token inserts *after* the row is written,
    /// like a database write that commits while the caller has given up.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_insert_latency(&self, latency: Option<Duration>) {
        *self.insert_latency.lock() = latency;
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.enter().await;
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.enter().await;
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn set_refresh_token_ref(&self, user_id: Uuid, token_id: Uuid) -> StoreResult<()> {
        self.enter().await;
        if self.fail_link_update.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("link update rejected".to_string()));
        }

        let mut tables = self.tables.write();
        if !tables.tokens.contains_key(&token_id) {
            return Err(StorageError::Backend(format!(
                "refresh token {} does not exist",
                token_id
            )));
        }
        match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.refresh_token_id = Some(token_id);
                Ok(())
            }
            None => Err(StorageError::Backend(format!("user {} does not exist", user_id))),
        }
    }

    async fn get_by_refresh_token_ref(&self, token_id: Uuid) -> StoreResult<Option<User>> {
        self.enter().await;
        if self.fail_reverse_lookup.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("reverse lookup rejected".to_string()));
        }
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.refresh_token_id == Some(token_id))
            .cloned())
    }

    async fn insert(&self, user: User) -> StoreResult<User> {
        self.enter().await;
        let mut tables = self.tables.write();
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::Backend(format!(
                "username {} already exists",
                user.username
            )));
        }
        if !tables.roles.contains_key(&user.role_id) {
            return Err(StorageError::Backend(format!("role {} does not exist", user.role_id)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl RoleDirectory for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        self.enter().await;
        Ok(self.tables.read().roles.get(&id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> StoreResult<Option<Role>> {
        self.enter().await;
        Ok(self.role_by_slug(slug))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<RefreshToken>> {
        self.enter().await;
        Ok(self.tables.read().tokens.get(&id).cloned())
    }

    async fn get_by_value(&self, value: &str) -> StoreResult<Option<RefreshToken>> {
        self.enter().await;
        Ok(self
            .tables
            .read()
            .tokens
            .values()
            .find(|t| t.token == value)
            .cloned())
    }

    async fn insert(&self, token: RefreshToken) -> StoreResult<RefreshToken> {
        self.enter().await;
        {
            let mut tables = self.tables.write();
            if tables.tokens.values().any(|t| t.token == token.token) {
                return Err(StorageError::Backend("duplicate refresh token value".to_string()));
            }
            tables.tokens.insert(token.id, token.clone());
        }

        let reply_delay = *self.insert_latency.lock();
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(token)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.enter().await;
        if self.fail_token_delete.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("token delete rejected".to_string()));
        }

        let mut tables = self.tables.write();
        tables.tokens.remove(&id);
        for user in tables.users.values_mut() {
            if user.refresh_token_id == Some(id) {
                user.refresh_token_id = None;
            }
        }
        Ok(())
    }
}
