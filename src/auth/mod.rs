//! Authentication Module
//! Mission: Session lifecycle with rotating refresh tokens, signed access
//! tokens and a role gate

pub mod api;
pub mod gate;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod service;
pub mod session;
pub mod store;
pub mod tokens;

pub use api::{router, AuthState};
pub use jwt::JwtHandler;
pub use middleware::auth_middleware;
pub use service::{AuthOptions, AuthService};
pub use session::SessionManager;
pub use store::{MemoryStore, SqliteStore};
pub use tokens::TokenManager;
