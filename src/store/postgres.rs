/// Postgres user store
///
/// Users live in `users`; registry records live in `refresh_tokens`, ordered
/// by their serial id (insertion order). Registry mutations lock the owning
/// user row for the length of one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{normalize_email, UserStore};
use crate::auth::registry::{hash_token, RefreshTokenRecord, TokenRegistry};
use crate::configuration::SessionSettings;
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::model::{NewUser, User};

type UserRow = (
    Uuid,
    String,
    String,
    Option<String>,
    String,
    String,
    bool,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const USER_COLUMNS: &str = "id, name, email, password_hash, auth_provider, role, is_active, \
                            last_login, created_at, updated_at";

pub struct PgUserStore {
    pool: PgPool,
    policy: SessionSettings,
}

impl PgUserStore {
    pub fn new(pool: PgPool, policy: SessionSettings) -> Self {
        Self { pool, policy }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::UnexpectedError(e.to_string())))
    }

    fn cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.policy.retention()
    }

    fn build_user(
        &self,
        row: UserRow,
        tokens: Vec<RefreshTokenRecord>,
        with_password: bool,
    ) -> Result<User, AppError> {
        let (id, name, email, password_hash, provider, role, is_active, last_login, created_at, updated_at) =
            row;
        Ok(User {
            id,
            name,
            email,
            password_hash: if with_password { password_hash } else { None },
            auth_provider: provider.parse().map_err(|e: ValidationError| {
                AppError::Database(DatabaseError::UnexpectedError(e.to_string()))
            })?,
            role: role.parse().map_err(|e: ValidationError| {
                AppError::Database(DatabaseError::UnexpectedError(e.to_string()))
            })?,
            is_active,
            last_login,
            refresh_tokens: TokenRegistry::from_records(self.policy.max_refresh_tokens, tokens),
            created_at,
            updated_at,
        })
    }

    async fn load_tokens(&self, id: Uuid) -> Result<Vec<RefreshTokenRecord>, AppError> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            r#"
            SELECT token_hash, created_at
            FROM refresh_tokens
            WHERE user_id = $1 AND created_at > $2
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .bind(self.cutoff())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(token_hash, created_at)| RefreshTokenRecord {
                token_hash,
                created_at,
            })
            .collect())
    }

    async fn load(
        &self,
        row: Option<UserRow>,
        with_password: bool,
    ) -> Result<Option<User>, AppError> {
        match row {
            Some(row) => {
                let tokens = self.load_tokens(row.0).await?;
                Ok(Some(self.build_user(row, tokens, with_password)?))
            }
            None => Ok(None),
        }
    }

    async fn find_email(
        &self,
        email: &str,
        with_password: bool,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        self.load(row, with_password).await
    }

    /// Open a transaction holding the user's row lock, with stale records pruned
    async fn lock_registry(&self, id: Uuid) -> Result<Transaction<'static, Postgres>, AppError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::Database(DatabaseError::NotFound(format!("user {}", id))));
        }

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND created_at <= $2")
            .bind(id)
            .bind(self.cutoff())
            .execute(&mut tx)
            .await?;

        Ok(tx)
    }

    async fn insert_record(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
        record: &RefreshTokenRecord,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, created_at) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(&record.token_hash)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        // Keep only the newest N by insertion order
        sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1 AND id NOT IN (
                SELECT id FROM refresh_tokens
                WHERE user_id = $1
                ORDER BY id DESC
                LIMIT $2
            )
            "#,
        )
        .bind(id)
        .bind(self.policy.max_refresh_tokens.max(1) as i64)
        .execute(&mut *tx)
        .await?;

        Ok(())
    }

    async fn touch(&self, tx: &mut Transaction<'static, Postgres>, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.load(row, false).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_email(email, false).await
    }

    async fn find_by_email_with_password(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_email(email, true).await
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, auth_provider, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, true, $7, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.name)
        .bind(normalize_email(&new_user.email))
        .bind(&new_user.password_hash)
        .bind(new_user.auth_provider.as_str())
        .bind(new_user.role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.build_user(row, Vec::new(), false)
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(at)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(format!("user {}", id))));
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn push_refresh_token(
        &self,
        id: Uuid,
        record: RefreshTokenRecord,
    ) -> Result<(), AppError> {
        let mut tx = self.lock_registry(id).await?;
        self.insert_record(&mut tx, id, &record).await?;
        self.touch(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> Result<bool, AppError> {
        let mut tx = self.lock_registry(id).await?;

        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND token_hash = $2")
            .bind(id)
            .bind(hash_token(token))
            .execute(&mut tx)
            .await?;

        self.touch(&mut tx, id).await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_refresh_token(
        &self,
        id: Uuid,
        old: &str,
        new: RefreshTokenRecord,
    ) -> Result<bool, AppError> {
        let mut tx = self.lock_registry(id).await?;

        let removed = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND token_hash = $2")
            .bind(id)
            .bind(hash_token(old))
            .execute(&mut tx)
            .await?;

        if removed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        self.insert_record(&mut tx, id, &new).await?;
        self.touch(&mut tx, id).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn clear_refresh_tokens(&self, id: Uuid) -> Result<(), AppError> {
        // Same row lock as rotation, so a rotation in flight is cleared too
        let mut tx = self.lock_registry(id).await?;

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;

        self.touch(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }
}
