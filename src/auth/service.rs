//! Authentication service
//! Mission: login, refresh, logout and role-gated user management on top of
//! the token manager

use crate::auth::gate;
use crate::auth::jwt::{DecodedToken, JwtHandler};
use crate::auth::models::{
    Claims, Role, TokenResponse, User, UserProfile, UserResponse, ADMIN_ROLE_SLUG,
};
use crate::auth::session::{SessionManager, REFRESH_TOKEN_TTL_DAYS};
use crate::auth::store::{with_deadline, RefreshTokenStore, RoleDirectory, UserDirectory};
use crate::auth::tokens::TokenManager;
use crate::error::{AuthError, AuthResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum accepted password length for new accounts.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Tunables for the session core
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Deadline applied to every individual storage call
    pub storage_timeout: Duration,
    pub bcrypt_cost: u32,
    pub session_ttl: chrono::Duration,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(2),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            session_ttl: chrono::Duration::days(REFRESH_TOKEN_TTL_DAYS),
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    roles: Arc<dyn RoleDirectory>,
    tokens: TokenManager,
    options: AuthOptions,
}

impl AuthService {
    /// Wires the session core over a store that serves users, roles and
    /// refresh tokens.
    pub fn new<S>(store: Arc<S>, jwt: JwtHandler, options: AuthOptions) -> Self
    where
        S: UserDirectory + RoleDirectory + RefreshTokenStore + 'static,
    {
        let sessions = SessionManager::new(store.clone(), store.clone(), options.storage_timeout)
            .with_session_ttl(options.session_ttl);
        let tokens = TokenManager::new(
            Arc::new(jwt),
            Arc::new(sessions),
            store.clone(),
            options.storage_timeout,
        );

        Self {
            users: store.clone(),
            roles: store,
            tokens,
            options,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown usernames and wrong passwords are both `NotFound`.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<TokenResponse> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::BadInput("username and password"));
        }

        let user = with_deadline(
            self.options.storage_timeout,
            "users.get_by_username",
            self.users.get_by_username(username),
        )
        .await?
        .ok_or(AuthError::NotFound("user"))?;

        if !verify_password(password, &user.password_hash).await? {
            warn!("Failed login attempt: {}", username);
            return Err(AuthError::NotFound("user"));
        }

        let role = self.role_by_id(&user).await?;
        let user = user.with_role(role);
        let pair = self.tokens.generate_tokens(&user).await?;

        info!("Login successful: {} ({})", user.username, user_role_slug(&user));

        Ok(TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: UserResponse::from_user(&user),
        })
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        if refresh_token.is_empty() {
            return Err(AuthError::BadInput("refresh token"));
        }

        let (pair, user) = self.tokens.refresh_all_tokens(refresh_token).await?;

        Ok(TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: UserResponse::from_user(&user),
        })
    }

    /// End the session owning `refresh_token`. Unknown values are accepted.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        if refresh_token.is_empty() {
            return Err(AuthError::BadInput("refresh token"));
        }

        if !self.tokens.delete_refresh_token(refresh_token).await? {
            debug!("Logout with unknown refresh token");
        }
        Ok(())
    }

    /// Verify an access token and require `required_role`.
    pub fn authorize(&self, access_token: &str, required_role: &str) -> AuthResult<Claims> {
        let decoded = self.tokens.jwt().parse_jwt(access_token)?;
        gate::authorize(&decoded, required_role)?;
        Ok(decoded.claims)
    }

    /// The user an access token was issued to, with role attached
    pub async fn current_user(&self, access_token: &str) -> AuthResult<User> {
        let decoded = self.tokens.jwt().parse_jwt(access_token)?;
        self.current_user_of(&decoded).await
    }

    /// Same as [`current_user`](Self::current_user) for an already verified token.
    pub async fn current_user_of(&self, caller: &DecodedToken) -> AuthResult<User> {
        if !caller.is_valid() {
            return Err(AuthError::InvalidToken);
        }
        let user_id = self.tokens.jwt().user_id_from_token(caller)?;

        let user = with_deadline(
            self.options.storage_timeout,
            "users.get_by_id",
            self.users.get_by_id(user_id),
        )
        .await?
        .ok_or(AuthError::NotFound("user"))?;

        let role = self.role_by_id(&user).await?;
        Ok(user.with_role(role))
    }

    /// Create an account. The caller's access token must carry the admin role.
    pub async fn add_user(
        &self,
        access_token: &str,
        username: &str,
        password: &str,
        role_slug: &str,
    ) -> AuthResult<User> {
        let caller = self.tokens.jwt().parse_jwt(access_token)?;
        self.add_user_as(&caller, username, password, role_slug, UserProfile::default())
            .await
    }

    /// Create an account on behalf of an already verified admin token.
    pub async fn add_user_as(
        &self,
        caller: &DecodedToken,
        username: &str,
        password: &str,
        role_slug: &str,
        profile: UserProfile,
    ) -> AuthResult<User> {
        gate::authorize(caller, ADMIN_ROLE_SLUG)?;

        if username.is_empty() || role_slug.is_empty() {
            return Err(AuthError::BadInput("username and role"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::BadInput("password must be at least 8 characters"));
        }

        let user = self
            .create_user(username, password, role_slug, profile)
            .await?;
        info!("Created user: {} ({})", user.username, role_slug);
        Ok(user)
    }

    /// Seed an admin account unless the username is already taken.
    /// Returns whether a user was created.
    pub async fn ensure_default_admin(&self, username: &str, password: &str) -> AuthResult<bool> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::BadInput("default user credentials"));
        }

        let existing = with_deadline(
            self.options.storage_timeout,
            "users.get_by_username",
            self.users.get_by_username(username),
        )
        .await?;
        if existing.is_some() {
            info!("User {} already exists, skipping default admin seed", username);
            return Ok(false);
        }

        self.create_user(username, password, ADMIN_ROLE_SLUG, UserProfile::default())
            .await?;
        info!("Default admin user created (username: {})", username);
        Ok(true)
    }

    async fn create_user(
        &self,
        username: &str,
        password: &str,
        role_slug: &str,
        profile: UserProfile,
    ) -> AuthResult<User> {
        let role = with_deadline(
            self.options.storage_timeout,
            "roles.get_by_slug",
            self.roles.get_by_slug(role_slug),
        )
        .await?
        .ok_or(AuthError::NotFound("role"))?;

        let taken = with_deadline(
            self.options.storage_timeout,
            "users.get_by_username",
            self.users.get_by_username(username),
        )
        .await?;
        if taken.is_some() {
            return Err(AuthError::BadInput("username already exists"));
        }

        let password_hash = hash_password(password, self.options.bcrypt_cost).await?;
        let user = with_deadline(
            self.options.storage_timeout,
            "users.insert",
            self.users
                .insert(User::new(username, password_hash, &role).with_profile(profile)),
        )
        .await?;

        Ok(user.with_role(role))
    }

    async fn role_by_id(&self, user: &User) -> AuthResult<Role> {
        with_deadline(
            self.options.storage_timeout,
            "roles.get_by_id",
            self.roles.get_by_id(user.role_id),
        )
        .await?
        .ok_or(AuthError::NotFound("role"))
    }
}

fn user_role_slug(user: &User) -> &str {
    user.role.as_ref().map(|r| r.slug.as_str()).unwrap_or("-")
}

async fn hash_password(password: &str, cost: u32) -> AuthResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| AuthError::Internal(format!("failed to hash password: {}", e)))
}

async fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("password check task failed: {}", e)))?
        .map_err(|e| AuthError::Internal(format!("failed to verify password: {}", e)))
}
