/// User Store
///
/// Persistence contract the authentication core depends on. Every method is
/// atomic for the user it touches: registry mutations are single
/// read-modify-write units, durable once the call returns, and serialized
/// against each other per user.
///
/// Registry mutations on an unknown user fail with `DatabaseError::NotFound`.

mod memory;
mod postgres;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::registry::RefreshTokenRecord;
use crate::error::AppError;
use crate::model::{NewUser, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load a user without the password hash
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Case-insensitive lookup without the password hash
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Case-insensitive lookup that includes the password hash
    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Insert a new account; a taken email is a `UniqueConstraintViolation`
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;

    /// Flip the account-active flag; `false` when the user does not exist
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, AppError>;

    /// Append to the registry, evicting the oldest record when at capacity
    async fn push_refresh_token(&self, id: Uuid, record: RefreshTokenRecord)
        -> Result<(), AppError>;

    /// Remove `token` if registered; `false` when it was absent
    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> Result<bool, AppError>;

    /// Exchange `old` for `new` as one unit; `false` (and no change) when
    /// `old` is not registered
    async fn replace_refresh_token(
        &self,
        id: Uuid,
        old: &str,
        new: RefreshTokenRecord,
    ) -> Result<bool, AppError>;

    /// Empty the registry, including any record a concurrent rotation adds
    async fn clear_refresh_tokens(&self, id: Uuid) -> Result<(), AppError>;
}

/// Emails are stored and compared lowercase
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
