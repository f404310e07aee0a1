//! Authentication Models
//! Users, roles, refresh tokens, access-token claims and the request/response
//! bodies built from them.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Slug of the role allowed to manage users.
pub const ADMIN_ROLE_SLUG: &str = "admin";
/// Slug of the role given to ordinary accounts.
pub const USER_ROLE_SLUG: &str = "user";

/// Role definition used for authorization decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    #[serde(rename = "roleSlug")]
    pub slug: String,
    #[serde(rename = "roleLabel")]
    pub label: String,
}

impl Role {
    pub fn new(slug: &str, label: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            label: label.to_string(),
        }
    }

    /// The roles every directory is seeded with.
    pub fn defaults() -> [Role; 2] {
        [
            Role::new(ADMIN_ROLE_SLUG, "Administrator"),
            Role::new(USER_ROLE_SLUG, "User"),
        ]
    }
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(rename = "firstName", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    #[serde(skip_serializing)]
    pub role_id: Uuid,
    /// Resolved role; only populated when the user is loaded for a session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing)]
    pub refresh_token_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: &str, password_hash: String, role: &Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            first_name: None,
            last_name: None,
            password_hash,
            role_id: role.id,
            role: Some(role.clone()),
            refresh_token_id: None,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Attach optional display names. Blank names are stored as absent.
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.first_name = profile.first_name.filter(|n| !n.trim().is_empty());
        self.last_name = profile.last_name.filter(|n| !n.trim().is_empty());
        self
    }
}

/// Optional personal details of an account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Opaque, storage-backed session secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    #[serde(skip_serializing)]
    pub id: Uuid,
    pub token: String,
    #[serde(skip_serializing)]
    pub valid_until: DateTime<Utc>,
}

impl RefreshToken {
    /// Builds a fresh row. Expiry is kept at microsecond precision so every
    /// store round-trips it exactly.
    pub fn new(token: String, valid_until: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            valid_until: valid_until.trunc_subsecs(6),
        }
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (user_id)
    pub iss: String, // issuer (user_id)
    pub exp: i64,    // expiration timestamp
    pub iat: i64,
    #[serde(rename = "roleSlug")]
    pub role_slug: String,
    #[serde(rename = "roleLabel")]
    pub role_label: String,
    pub username: String,
}

/// Access/refresh pair handed out on login and refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Refresh and logout request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Create user request (admin only)
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: String,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    pub last_name: Option<String>,
}

impl CreateUserRequest {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

/// Token response returned by login and refresh
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
}

/// User response (sanitized)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub role: Option<RoleResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub id: String,
    pub role_slug: String,
    pub role_label: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.as_ref().map(|role| RoleResponse {
                id: role.id.to_string(),
                role_slug: role.slug.clone(),
                role_label: role.label.clone(),
            }),
        }
    }
}
