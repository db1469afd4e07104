//! Authentication: argon2 password hashing, JWT access/refresh tokens and
//! the request extractors built on them.

mod extract;
mod password;
mod tokens;

pub use extract::{AdminUser, AuthUser, OptionalAuthUser};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
pub use tokens::{Claims, TokenKeys, TokenPair, TokenType};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Malformed, expired or wrong-type token.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("missing credentials")]
    MissingCredentials,

    #[error("staff privileges required")]
    NotStaff,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}
