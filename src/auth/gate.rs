/// Authentication Gate
///
/// Turns a presented credential into an authenticated identity or a
/// terminal rejection: verify the token, load the subject, then enforce
/// account state. Three variants share that shape:
/// - `authenticate`: access token, rejection on any failure
/// - `authenticate_optional`: access token, failures fall back to anonymous
/// - `authenticate_password_reset`: password-reset token from a request body

use std::sync::Arc;
use uuid::Uuid;

use crate::auth::claims::TokenClaims;
use crate::auth::codec::TokenCodec;
use crate::error::{AppError, AuthError};
use crate::model::User;
use crate::store::UserStore;

/// The caller, as seen by downstream handlers
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthGate {
    store: Arc<dyn UserStore>,
    codec: Arc<TokenCodec>,
}

impl AuthGate {
    pub fn new(store: Arc<dyn UserStore>, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    pub async fn authenticate(&self, access_token: Option<&str>) -> Result<Identity, AppError> {
        let token = access_token.ok_or(AuthError::MissingToken)?;
        let claims = self.codec.verify_access(token).map_err(AuthError::from)?;
        self.load_subject(claims.user_id()?).await
    }

    /// Same checks as `authenticate`, but the request proceeds anonymously
    /// when any of them fail.
    pub async fn authenticate_optional(&self, access_token: Option<&str>) -> Option<Identity> {
        match self.authenticate(access_token).await {
            Ok(identity) => Some(identity),
            Err(AppError::Auth(reason)) => {
                tracing::debug!(code = reason.code(), "Continuing anonymously");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Optional authentication failed, continuing anonymously");
                None
            }
        }
    }

    /// Authorize the change-password-by-reset-token operation
    pub async fn authenticate_password_reset(
        &self,
        reset_token: Option<&str>,
    ) -> Result<Identity, AppError> {
        let token = reset_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let claims = self
            .codec
            .verify_password_reset(token)
            .map_err(AuthError::from)?;
        self.load_subject(claims.user_id()?).await
    }

    async fn load_subject(&self, user_id: Uuid) -> Result<Identity, AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            tracing::warn!(user_id = %user_id, "Deactivated account presented a valid token");
            return Err(AuthError::AccountDeactivated.into());
        }

        Ok(Identity { user_id, user })
    }
}
