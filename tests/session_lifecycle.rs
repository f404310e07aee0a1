//! End-to-end session lifecycle against the SQLite backend.

use std::sync::Arc;
use tempfile::TempDir;
use users_auth::auth::store::{RefreshTokenStore, UserDirectory};
use users_auth::auth::{AuthOptions, AuthService, JwtHandler, SqliteStore};
use users_auth::error::AuthError;

struct Harness {
    _dir: TempDir,
    store: Arc<SqliteStore>,
    service: AuthService,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("auth.db");
    let store = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());

    let options = AuthOptions {
        bcrypt_cost: 4,
        ..AuthOptions::default()
    };
    let service = AuthService::new(
        store.clone(),
        JwtHandler::new("lifecycle-secret".to_string()),
        options,
    );
    service.ensure_default_admin("u1", "u1-password").await.unwrap();

    Harness {
        _dir: dir,
        store,
        service,
    }
}

#[tokio::test]
async fn test_login_then_refresh_carries_expiry() {
    let h = harness().await;

    let login = h.service.login("u1", "u1-password").await.unwrap();
    let first = h
        .store
        .get_by_value(&login.refresh_token)
        .await
        .unwrap()
        .unwrap();

    let refreshed = h.service.refresh(&login.refresh_token).await.unwrap();
    assert_ne!(refreshed.refresh_token, login.refresh_token);

    let second = h
        .store
        .get_by_value(&refreshed.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.valid_until, first.valid_until);

    // User points at the newest row only
    let user = h.store.get_by_username("u1").await.unwrap().unwrap();
    assert_eq!(user.refresh_token_id, Some(second.id));
    assert!(RefreshTokenStore::get_by_id(&*h.store, first.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_superseded_refresh_token_is_rejected() {
    let h = harness().await;
    let login = h.service.login("u1", "u1-password").await.unwrap();
    h.service.refresh(&login.refresh_token).await.unwrap();

    assert!(matches!(
        h.service.refresh(&login.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_repeated_rotation_leaves_one_row() {
    let h = harness().await;
    let mut current = h.service.login("u1", "u1-password").await.unwrap().refresh_token;
    let mut seen = vec![current.clone()];

    for _ in 0..5 {
        current = h.service.refresh(&current).await.unwrap().refresh_token;
        assert!(!seen.contains(&current));
        seen.push(current.clone());
    }

    for stale in &seen[..seen.len() - 1] {
        assert!(h.store.get_by_value(stale).await.unwrap().is_none());
    }
    assert!(h.store.get_by_value(&current).await.unwrap().is_some());
}

#[tokio::test]
async fn test_access_token_gates_admin_operations() {
    let h = harness().await;
    let admin = h.service.login("u1", "u1-password").await.unwrap();

    let claims = h.service.authorize(&admin.access_token, "admin").unwrap();
    assert_eq!(claims.username, "u1");
    assert_eq!(claims.role_label, "Administrator");

    h.service
        .add_user(&admin.access_token, "u2", "u2-password", "user")
        .await
        .unwrap();
    let plain = h.service.login("u2", "u2-password").await.unwrap();

    assert!(matches!(
        h.service.authorize(&plain.access_token, "admin"),
        Err(AuthError::Forbidden)
    ));
    assert!(h.service.authorize(&plain.access_token, "user").is_ok());
}

#[tokio::test]
async fn test_logout_detaches_user() {
    let h = harness().await;
    let login = h.service.login("u1", "u1-password").await.unwrap();

    h.service.logout(&login.refresh_token).await.unwrap();

    let user = h.store.get_by_username("u1").await.unwrap().unwrap();
    assert!(user.refresh_token_id.is_none());
    assert!(matches!(
        h.service.refresh(&login.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));

    // A new login starts a new session
    assert!(h.service.login("u1", "u1-password").await.is_ok());
}

#[tokio::test]
async fn test_sessions_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("auth.db");
    let options = AuthOptions {
        bcrypt_cost: 4,
        ..AuthOptions::default()
    };

    let refresh_token = {
        let store = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());
        let service = AuthService::new(store, JwtHandler::new("s".to_string()), options.clone());
        service.ensure_default_admin("u1", "u1-password").await.unwrap();
        service.login("u1", "u1-password").await.unwrap().refresh_token
    };

    let store = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());
    let service = AuthService::new(store, JwtHandler::new("s".to_string()), options);

    assert!(!service.ensure_default_admin("u1", "u1-password").await.unwrap());
    assert!(service.refresh(&refresh_token).await.is_ok());
}
