//! Runtime configuration, from flags or environment (`.env` is loaded first
//! by the binary).

use crate::auth::service::AuthOptions;
use crate::auth::session::REFRESH_TOKEN_TTL_DAYS;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Fallback signing secret for local runs only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

#[derive(Parser, Debug, Clone)]
#[command(name = "users-auth")]
#[command(about = "User session service - rotating refresh tokens and role-gated access tokens")]
pub struct AuthConfig {
    /// HMAC secret for signing access tokens
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// SQLite database path (relative paths resolve against the crate dir)
    #[arg(long, env = "AUTH_DB_PATH", default_value = "users_auth.db")]
    pub auth_db_path: String,

    /// HTTP listen port
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Deadline for each storage call, in milliseconds
    #[arg(long, env = "STORAGE_TIMEOUT_MS", default_value = "2000")]
    pub storage_timeout_ms: u64,

    /// bcrypt work factor for new password hashes
    #[arg(long, env = "BCRYPT_COST", default_value = "12")]
    pub bcrypt_cost: u32,

    /// Refresh session lifetime in days
    #[arg(long, env = "SESSION_TTL_DAYS", default_value_t = REFRESH_TOKEN_TTL_DAYS)]
    pub session_ttl_days: i64,

    /// Admin account seeded at startup when both are set
    #[arg(long, env = "DEFAULT_USER_USERNAME")]
    pub default_user_username: Option<String>,

    #[arg(long, env = "DEFAULT_USER_PASSWORD", hide_env_values = true)]
    pub default_user_password: Option<String>,
}

impl AuthConfig {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn auth_options(&self) -> AuthOptions {
        AuthOptions {
            storage_timeout: self.storage_timeout(),
            bcrypt_cost: self.bcrypt_cost,
            session_ttl: chrono::Duration::days(self.session_ttl_days),
        }
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    /// Credentials for the seeded admin, when both halves are configured.
    pub fn default_admin(&self) -> Option<(&str, &str)> {
        match (&self.default_user_username, &self.default_user_password) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => {
                Some((u.as_str(), p.as_str()))
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!("DEFAULT_USER_USERNAME and DEFAULT_USER_PASSWORD must both be set");
                None
            }
            _ => None,
        }
    }

    /// `:memory:` and absolute paths pass through; relative paths anchor to
    /// the crate directory, not the caller's cwd.
    pub fn resolved_db_path(&self) -> String {
        let raw = self.auth_db_path.trim();
        if raw == ":memory:" {
            return raw.to_string();
        }

        let p = PathBuf::from(raw);
        if p.is_absolute() {
            return p.to_string_lossy().to_string();
        }

        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join(p)
            .to_string_lossy()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::parse_from(["users-auth", "--port", "9000"]);
        assert_eq!(config.port, 9000);
        if std::env::var("STORAGE_TIMEOUT_MS").is_err() {
            assert_eq!(config.storage_timeout(), Duration::from_secs(2));
        }
        if std::env::var("JWT_SECRET").is_err() {
            assert!(config.uses_dev_secret());
        }
    }

    #[test]
    fn test_flags_override() {
        let config = AuthConfig::parse_from([
            "users-auth",
            "--jwt-secret",
            "s3cret",
            "--storage-timeout-ms",
            "250",
            "--auth-db-path",
            ":memory:",
            "--default-user-username",
            "root",
            "--default-user-password",
            "rootpass1",
        ]);

        assert!(!config.uses_dev_secret());
        assert_eq!(config.auth_options().storage_timeout, Duration::from_millis(250));
        assert_eq!(config.resolved_db_path(), ":memory:");
        assert_eq!(config.default_admin(), Some(("root", "rootpass1")));
    }

    #[test]
    fn test_relative_db_path_anchors_to_crate_dir() {
        let config = AuthConfig::parse_from(["users-auth", "--auth-db-path", "data/auth.db"]);
        let resolved = config.resolved_db_path();
        assert!(resolved.starts_with(env!("CARGO_MANIFEST_DIR")));
        assert!(resolved.ends_with("auth.db"));
    }
}
