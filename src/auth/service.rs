/// Account call sites of the session core
///
/// Registration, login, password reset and account activation. Each one
/// leans on the session manager for issuing or revoking sessions.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::gate::{AuthGate, Identity};
use crate::auth::password::{check_credentials, hash_password};
use crate::auth::session::{SessionManager, TokenPair};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::model::{AuthProvider, NewUser, User};
use crate::validators::{is_valid_email, is_valid_name, is_valid_signup_role};

/// Hands a password-reset token to whatever delivers it to the user
#[async_trait]
pub trait ResetTokenSink: Send + Sync {
    async fn deliver(&self, user: &User, token: &str) -> Result<(), AppError>;
}

/// Sink used when no delivery channel is configured; the token is dropped
pub struct LogResetSink;

#[async_trait]
impl ResetTokenSink for LogResetSink {
    async fn deliver(&self, user: &User, _token: &str) -> Result<(), AppError> {
        tracing::warn!(
            user_id = %user.id,
            "Password reset token issued but no delivery channel is configured"
        );
        Ok(())
    }
}

pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Clone)]
pub struct AuthService {
    sessions: SessionManager,
    gate: AuthGate,
    reset_sink: Arc<dyn ResetTokenSink>,
}

impl AuthService {
    pub fn new(sessions: SessionManager, reset_sink: Arc<dyn ResetTokenSink>) -> Self {
        let gate = AuthGate::new(sessions.store().clone(), sessions.codec().clone());
        Self {
            sessions,
            gate,
            reset_sink,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Stamp the login time on the user and the returned copy
    async fn start_session(&self, mut user: User) -> Result<(User, TokenPair), AppError> {
        let pair = self.sessions.issue_session(&user).await?;
        let now = Utc::now();
        self.sessions.store().touch_last_login(user.id, now).await?;
        user.last_login = Some(now);
        Ok((user, pair))
    }

    pub async fn register(&self, form: Registration) -> Result<(User, TokenPair), AppError> {
        let name = is_valid_name(&form.name)?;
        let email = is_valid_email(&form.email)?;
        let role = is_valid_signup_role(&form.role)?;
        let password_hash = hash_password(&form.password)?;

        let user = self
            .sessions
            .store()
            .create(NewUser {
                name,
                email,
                password_hash: Some(password_hash),
                auth_provider: AuthProvider::Local,
                role,
            })
            .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        self.start_session(user).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), AppError> {
        let email = is_valid_email(email)?;

        let user = self
            .sessions
            .store()
            .find_by_email_with_password(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::AccountDeactivated.into());
        }

        check_credentials(password, user.password_hash.as_deref())?;

        tracing::info!(user_id = %user.id, "User logged in");
        self.start_session(user.without_password()).await
    }

    /// Issue a password-reset token for an active account.
    ///
    /// Unknown or inactive emails succeed silently so callers cannot learn
    /// which accounts exist.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = is_valid_email(email)?;

        let user = match self.sessions.store().find_by_email(&email).await? {
            Some(user) if user.is_active => user,
            _ => {
                tracing::debug!("Password reset requested for unknown or inactive account");
                return Ok(());
            }
        };

        let token = self.sessions.codec().sign_password_reset(user.id)?;
        self.reset_sink.deliver(&user, &token).await?;

        tracing::info!(user_id = %user.id, "Password reset token issued");
        Ok(())
    }

    /// Set a new password and revoke every session of the account
    pub async fn change_password(
        &self,
        identity: &Identity,
        new_password: &str,
    ) -> Result<(), AppError> {
        let password_hash = hash_password(new_password)?;
        self.sessions
            .store()
            .set_password(identity.user_id, &password_hash)
            .await?;
        self.sessions.logout_all(identity.user_id).await?;

        tracing::info!(user_id = %identity.user_id, "Password changed, all sessions revoked");
        Ok(())
    }

    /// Flip the active flag; deactivation also revokes every session
    pub async fn set_account_active(&self, user_id: Uuid, active: bool) -> Result<User, AppError> {
        let store = self.sessions.store();
        if !store.set_active(user_id, active).await? {
            return Err(AppError::Database(DatabaseError::NotFound(format!(
                "user {}",
                user_id
            ))));
        }

        if !active {
            self.sessions.logout_all(user_id).await?;
        }

        tracing::info!(user_id = %user_id, active = active, "Account state changed");
        store.find_by_id(user_id).await?.ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound(format!("user {}", user_id)))
        })
    }
}
