/// In-memory user store
///
/// Every operation holds the write lock for its whole read-modify-write,
/// which gives the per-user atomicity the registry relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{normalize_email, UserStore};
use crate::auth::registry::{RefreshTokenRecord, TokenRegistry};
use crate::configuration::SessionSettings;
use crate::error::{AppError, DatabaseError};
use crate::model::{NewUser, User};

pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
    policy: SessionSettings,
}

impl InMemoryUserStore {
    pub fn new(policy: SessionSettings) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            policy,
        }
    }

    fn not_found(id: Uuid) -> AppError {
        AppError::Database(DatabaseError::NotFound(format!("user {}", id)))
    }

    /// Read projection with retention applied
    fn project(&self, user: &User, with_password: bool) -> User {
        let mut user = if with_password {
            user.clone()
        } else {
            user.without_password()
        };
        user.refresh_tokens
            .prune_expired(Utc::now(), self.policy.retention());
        user
    }

    async fn with_registry<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut TokenRegistry) -> T + Send,
    ) -> Result<T, AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        user.refresh_tokens
            .prune_expired(Utc::now(), self.policy.retention());
        let out = f(&mut user.refresh_tokens);
        user.updated_at = Utc::now();
        Ok(out)
    }

    async fn find_email(&self, email: &str, with_password: bool) -> Option<User> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        users
            .values()
            .find(|u| u.email == email)
            .map(|u| self.project(u, with_password))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.get(&id).map(|u| self.project(u, false)))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_email(email, false).await)
    }

    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_email(email, true).await)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let email = normalize_email(&new_user.email);
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == email) {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "Email already registered".to_string(),
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email,
            password_hash: new_user.password_hash,
            auth_provider: new_user.auth_provider,
            role: new_user.role,
            is_active: true,
            last_login: None,
            refresh_tokens: TokenRegistry::new(self.policy.max_refresh_tokens),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());

        Ok(user.without_password())
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        user.last_login = Some(at);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        user.password_hash = Some(password_hash.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) => {
                user.is_active = active;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn push_refresh_token(
        &self,
        id: Uuid,
        record: RefreshTokenRecord,
    ) -> Result<(), AppError> {
        self.with_registry(id, move |registry| {
            registry.insert(record);
        })
        .await
    }

    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> Result<bool, AppError> {
        self.with_registry(id, |registry| registry.remove(token)).await
    }

    async fn replace_refresh_token(
        &self,
        id: Uuid,
        old: &str,
        new: RefreshTokenRecord,
    ) -> Result<bool, AppError> {
        self.with_registry(id, move |registry| registry.replace(old, new))
            .await
    }

    async fn clear_refresh_tokens(&self, id: Uuid) -> Result<(), AppError> {
        self.with_registry(id, |registry| registry.clear()).await
    }
}
