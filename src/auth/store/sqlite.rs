//! SQLite storage backend
//! Users, roles and refresh tokens in one database file

use super::{RefreshTokenStore, RoleDirectory, StoreResult, UserDirectory};
use crate::auth::models::{RefreshToken, Role, User};
use crate::error::StorageError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS roles (
    id TEXT PRIMARY KEY,
    role_slug TEXT NOT NULL UNIQUE,
    role_label TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    id TEXT PRIMARY KEY,
    token TEXT NOT NULL UNIQUE,
    valid_until INTEGER NOT NULL
);

-- Deleting a refresh token detaches it from its user; it never removes the user.
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    first_name TEXT DEFAULT NULL,
    last_name TEXT DEFAULT NULL,
    password_hash TEXT NOT NULL,
    role_id TEXT NOT NULL REFERENCES roles(id),
    refresh_token_id TEXT DEFAULT NULL REFERENCES refresh_tokens(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_refresh_token ON users(refresh_token_id);
"#;

const USER_COLUMNS: &str =
    "id, username, password_hash, role_id, refresh_token_id, created_at, first_name, last_name";

/// SQLite-backed user, role and refresh-token storage
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database, apply the schema and seed default roles
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open auth database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize auth schema")?;

        for role in Role::defaults() {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO roles (id, role_slug, role_label) VALUES (?1, ?2, ?3)",
                    params![role.id.to_string(), role.slug, role.label],
                )
                .context("Failed to seed default roles")?;
            if inserted > 0 {
                info!(role = %role.slug, "Seeded default role");
            }
        }

        info!("Auth database initialized at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs a query on the blocking pool while holding the connection.
    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await?
    }
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn micros_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {}", micros).into(),
        )
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let refresh_token_id = match row.get::<_, Option<String>>(4)? {
        Some(raw) => Some(Uuid::parse_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(User {
        id: uuid_column(row, 0)?,
        username: row.get(1)?,
        first_name: row.get(6)?,
        last_name: row.get(7)?,
        password_hash: row.get(2)?,
        role_id: uuid_column(row, 3)?,
        role: None,
        refresh_token_id,
        created_at: micros_column(row, 5)?,
    })
}

fn role_from_row(row: &Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: uuid_column(row, 0)?,
        slug: row.get(1)?,
        label: row.get(2)?,
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<RefreshToken> {
    Ok(RefreshToken {
        id: uuid_column(row, 0)?,
        token: row.get(1)?,
        valid_until: micros_column(row, 2)?,
    })
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.run(move |conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
            Ok(conn
                .query_row(&sql, params![id.to_string()], user_from_row)
                .optional()?)
        })
        .await
    }

    async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let username = username.to_string();
        self.run(move |conn| {
            let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
            Ok(conn
                .query_row(&sql, params![username], user_from_row)
                .optional()?)
        })
        .await
    }

    async fn set_refresh_token_ref(&self, user_id: Uuid, token_id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE users SET refresh_token_id = ?1 WHERE id = ?2",
                params![token_id.to_string(), user_id.to_string()],
            )?;
            if updated == 0 {
                return Err(StorageError::Backend(format!("user {} does not exist", user_id)));
            }
            debug!(user_id = %user_id, token_id = %token_id, "Linked refresh token");
            Ok(())
        })
        .await
    }

    async fn get_by_refresh_token_ref(&self, token_id: Uuid) -> StoreResult<Option<User>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE refresh_token_id = ?1 LIMIT 1",
                USER_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![token_id.to_string()], user_from_row)
                .optional()?)
        })
        .await
    }

    async fn insert(&self, user: User) -> StoreResult<User> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users (id, username, password_hash, role_id, refresh_token_id, created_at, first_name, last_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.password_hash,
                    user.role_id.to_string(),
                    user.refresh_token_id.map(|id| id.to_string()),
                    user.created_at.timestamp_micros(),
                    user.first_name,
                    user.last_name,
                ],
            )?;
            Ok(user)
        })
        .await
    }
}

#[async_trait]
impl RoleDirectory for SqliteStore {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, role_slug, role_label FROM roles WHERE id = ?1",
                    params![id.to_string()],
                    role_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn get_by_slug(&self, slug: &str) -> StoreResult<Option<Role>> {
        let slug = slug.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, role_slug, role_label FROM roles WHERE role_slug = ?1",
                    params![slug],
                    role_from_row,
                )
                .optional()?)
        })
        .await
    }
}

#[async_trait]
impl RefreshTokenStore for SqliteStore {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<RefreshToken>> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, token, valid_until FROM refresh_tokens WHERE id = ?1",
                    params![id.to_string()],
                    token_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn get_by_value(&self, value: &str) -> StoreResult<Option<RefreshToken>> {
        let value = value.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, token, valid_until FROM refresh_tokens WHERE token = ?1",
                    params![value],
                    token_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn insert(&self, token: RefreshToken) -> StoreResult<RefreshToken> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO refresh_tokens (id, token, valid_until) VALUES (?1, ?2, ?3)",
                params![
                    token.id.to_string(),
                    token.token,
                    token.valid_until.timestamp_micros(),
                ],
            )?;
            Ok(token)
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM refresh_tokens WHERE id = ?1",
                params![id.to_string()],
            )?;
            Ok(())
        })
        .await
    }
}
