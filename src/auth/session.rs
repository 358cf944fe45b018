/// Session lifecycle: issuing, rotating and revoking token pairs
///
/// A session exists once its refresh token is durably registered on the
/// user. Rotation exchanges a registered refresh token for a new pair as
/// one store operation, so a token is honoured at most once.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::claims::TokenClaims;
use crate::auth::codec::TokenCodec;
use crate::auth::registry::RefreshTokenRecord;
use crate::error::{AppError, AuthError};
use crate::model::User;
use crate::store::UserStore;

/// A freshly issued access + refresh pair
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn UserStore>,
    codec: Arc<TokenCodec>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn UserStore>, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    fn mint(&self, user: &User) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.codec.sign_access(user.id, &user.email)?,
            refresh_token: self.codec.sign_refresh(user.id)?,
        })
    }

    /// Sign a new pair and register its refresh token.
    ///
    /// Nothing is returned until the registry write has completed.
    pub async fn issue_session(&self, user: &User) -> Result<TokenPair, AppError> {
        let pair = self.mint(user)?;
        self.store
            .push_refresh_token(user.id, RefreshTokenRecord::new(&pair.refresh_token))
            .await?;

        tracing::info!(user_id = %user.id, "Session issued");
        Ok(pair)
    }

    /// Exchange a presented refresh token for a new pair.
    ///
    /// Checks run in order: presence, signature/expiry, subject, registry
    /// membership, account state. The old record is swapped for the new one
    /// in a single conditional store write.
    pub async fn rotate(&self, presented: Option<&str>) -> Result<(User, TokenPair), AppError> {
        let presented = presented.ok_or(AuthError::MissingToken)?;

        let claims = self
            .codec
            .verify_refresh(presented)
            .map_err(AuthError::from)?;
        let user_id = claims.user_id()?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.refresh_tokens.contains(presented) {
            tracing::warn!(user_id = %user.id, "Refresh token reuse or revoked token presented");
            return Err(AuthError::TokenRevoked.into());
        }

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Refresh attempted on deactivated account");
            return Err(AuthError::AccountDeactivated.into());
        }

        let pair = self.mint(&user)?;
        let swapped = self
            .store
            .replace_refresh_token(
                user.id,
                presented,
                RefreshTokenRecord::new(&pair.refresh_token),
            )
            .await?;

        // Lost a race with a concurrent rotation or logout of the same token
        if !swapped {
            tracing::warn!(user_id = %user.id, "Refresh token consumed concurrently");
            return Err(AuthError::TokenRevoked.into());
        }

        tracing::info!(user_id = %user.id, "Refresh token rotated");
        Ok((user, pair))
    }

    /// Drop exactly the presented refresh token, leaving other devices alone
    pub async fn logout(&self, user_id: Uuid, presented: Option<&str>) -> Result<bool, AppError> {
        let removed = match presented {
            Some(token) => self.store.remove_refresh_token(user_id, token).await?,
            None => false,
        };

        tracing::info!(user_id = %user_id, removed = removed, "Session ended");
        Ok(removed)
    }

    /// Empty the user's registry (logout everywhere, forced invalidation)
    pub async fn logout_all(&self, user_id: Uuid) -> Result<(), AppError> {
        self.store.clear_refresh_tokens(user_id).await?;

        tracing::info!(user_id = %user_id, "All sessions revoked");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::claims::{RegisteredClaims, SubjectClaims};
    use crate::auth::codec::tests::test_jwt_settings;
    use crate::auth::codec::TokenKind;
    use crate::configuration::SessionSettings;
    use crate::model::{AuthProvider, NewUser, Role};
    use crate::store::InMemoryUserStore;

    pub(crate) async fn manager_with_user() -> (SessionManager, User) {
        let store: Arc<dyn UserStore> =
            Arc::new(InMemoryUserStore::new(SessionSettings::default()));
        let codec = Arc::new(TokenCodec::new(&test_jwt_settings()));
        let user = store
            .create(NewUser {
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                password_hash: None,
                auth_provider: AuthProvider::Local,
                role: Role::Doctor,
            })
            .await
            .unwrap();
        (SessionManager::new(store, codec), user)
    }

    async fn registry_len(manager: &SessionManager, user_id: Uuid) -> usize {
        manager
            .store()
            .find_by_id(user_id)
            .await
            .unwrap()
            .unwrap()
            .refresh_tokens
            .len()
    }

    fn auth_err(result: Result<(User, TokenPair), AppError>) -> Option<AuthError> {
        result.err().and_then(|e| e.as_auth())
    }

    #[tokio::test]
    async fn test_issued_access_token_names_the_user() {
        let (manager, user) = manager_with_user().await;
        let pair = manager.issue_session(&user).await.unwrap();

        let claims = manager.codec().verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(registry_len(&manager, user.id).await, 1);
    }

    #[tokio::test]
    async fn test_rotated_token_cannot_be_reused() {
        let (manager, user) = manager_with_user().await;
        let first = manager.issue_session(&user).await.unwrap();

        let (_, second) = manager.rotate(Some(&first.refresh_token)).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let reuse = manager.rotate(Some(&first.refresh_token)).await;
        assert_eq!(auth_err(reuse), Some(AuthError::TokenRevoked));

        assert!(manager.rotate(Some(&second.refresh_token)).await.is_ok());
        assert_eq!(registry_len(&manager, user.id).await, 1);
    }

    #[tokio::test]
    async fn test_rotation_failures() {
        let (manager, _) = manager_with_user().await;

        assert_eq!(auth_err(manager.rotate(None).await), Some(AuthError::MissingToken));
        assert_eq!(
            auth_err(manager.rotate(Some("not-a-jwt")).await),
            Some(AuthError::TokenInvalid)
        );

        let stranger = manager.codec().sign_refresh(Uuid::new_v4()).unwrap();
        assert_eq!(
            auth_err(manager.rotate(Some(&stranger)).await),
            Some(AuthError::UserNotFound)
        );
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_not_rotated() {
        let (manager, user) = manager_with_user().await;
        let mut registered = RegisteredClaims::new(user.id, 0, "auth-api", "auth-client");
        registered.exp -= 60;
        let expired = manager
            .codec()
            .sign(TokenKind::Refresh, &SubjectClaims { registered })
            .unwrap();
        manager
            .store()
            .push_refresh_token(user.id, RefreshTokenRecord::new(&expired))
            .await
            .unwrap();

        assert_eq!(
            auth_err(manager.rotate(Some(&expired)).await),
            Some(AuthError::TokenExpired)
        );
        // Rejected before the registry is touched
        assert_eq!(registry_len(&manager, user.id).await, 1);
    }

    #[tokio::test]
    async fn test_signed_but_unregistered_token_is_revoked() {
        let (manager, user) = manager_with_user().await;
        let forged = manager.codec().sign_refresh(user.id).unwrap();

        assert_eq!(
            auth_err(manager.rotate(Some(&forged)).await),
            Some(AuthError::TokenRevoked)
        );
    }

    #[tokio::test]
    async fn test_deactivated_account_cannot_rotate() {
        let (manager, user) = manager_with_user().await;
        let pair = manager.issue_session(&user).await.unwrap();
        manager.store().set_active(user.id, false).await.unwrap();

        assert_eq!(
            auth_err(manager.rotate(Some(&pair.refresh_token)).await),
            Some(AuthError::AccountDeactivated)
        );
        // Record survives so reactivation restores the session
        assert_eq!(registry_len(&manager, user.id).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_rotation_honours_token_once() {
        let (manager, user) = manager_with_user().await;
        let pair = manager.issue_session(&user).await.unwrap();

        let a = {
            let manager = manager.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { manager.rotate(Some(&token)).await.is_ok() })
        };
        let b = {
            let manager = manager.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { manager.rotate(Some(&token)).await.is_ok() })
        };

        let successes = [a.await.unwrap(), b.await.unwrap()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(registry_len(&manager, user.id).await, 1);
    }

    #[tokio::test]
    async fn test_sixth_login_evicts_oldest() {
        let (manager, user) = manager_with_user().await;
        let mut pairs = Vec::new();
        for _ in 0..6 {
            pairs.push(manager.issue_session(&user).await.unwrap());
        }

        assert_eq!(registry_len(&manager, user.id).await, 5);
        assert_eq!(
            auth_err(manager.rotate(Some(&pairs[0].refresh_token)).await),
            Some(AuthError::TokenRevoked)
        );
        assert!(manager.rotate(Some(&pairs[5].refresh_token)).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_is_per_device() {
        let (manager, user) = manager_with_user().await;
        let phone = manager.issue_session(&user).await.unwrap();
        let laptop = manager.issue_session(&user).await.unwrap();

        assert!(manager
            .logout(user.id, Some(&phone.refresh_token))
            .await
            .unwrap());
        assert!(!manager
            .logout(user.id, Some(&phone.refresh_token))
            .await
            .unwrap());
        assert!(!manager.logout(user.id, None).await.unwrap());

        assert_eq!(
            auth_err(manager.rotate(Some(&phone.refresh_token)).await),
            Some(AuthError::TokenRevoked)
        );
        assert!(manager.rotate(Some(&laptop.refresh_token)).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_all_racing_rotation_leaves_nothing_behind() {
        for _ in 0..20 {
            let (manager, user) = manager_with_user().await;
            let pair = manager.issue_session(&user).await.unwrap();

            let rotation = {
                let manager = manager.clone();
                let token = pair.refresh_token.clone();
                tokio::spawn(async move { manager.rotate(Some(&token)).await })
            };
            let revocation = {
                let manager = manager.clone();
                tokio::spawn(async move { manager.logout_all(user.id).await })
            };

            let rotated = rotation.await.unwrap();
            revocation.await.unwrap().unwrap();

            assert_eq!(registry_len(&manager, user.id).await, 0);
            if let Ok((_, fresh)) = rotated {
                assert_eq!(
                    auth_err(manager.rotate(Some(&fresh.refresh_token)).await),
                    Some(AuthError::TokenRevoked)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_logout_all_revokes_every_device() {
        let (manager, user) = manager_with_user().await;
        let phone = manager.issue_session(&user).await.unwrap();
        let laptop = manager.issue_session(&user).await.unwrap();

        manager.logout_all(user.id).await.unwrap();

        assert_eq!(registry_len(&manager, user.id).await, 0);
        for pair in [phone, laptop] {
            assert_eq!(
                auth_err(manager.rotate(Some(&pair.refresh_token)).await),
                Some(AuthError::TokenRevoked)
            );
        }
    }
}
