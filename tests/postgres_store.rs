//! Postgres user store tests. These need a running database reachable with
//! the `APP_DATABASE__*` settings, so they are ignored by default:
//! `cargo test --test postgres_store -- --ignored`

use clinic_auth::auth::registry::RefreshTokenRecord;
use clinic_auth::configuration::{get_configuration, DatabaseSettings, SessionSettings};
use clinic_auth::error::{AppError, DatabaseError};
use clinic_auth::model::{AuthProvider, NewUser, Role, User};
use clinic_auth::store::{PgUserStore, UserStore};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::sync::Arc;

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.")
}

async fn spawn_store() -> Arc<PgUserStore> {
    spawn_store_with_pool().await.0
}

async fn spawn_store_with_pool() -> (Arc<PgUserStore>, PgPool) {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let pool = configure_database(&configuration.database).await;

    let store = PgUserStore::new(pool.clone(), SessionSettings::default());
    store.migrate().await.expect("Failed to migrate the database.");
    (Arc::new(store), pool)
}

async fn seed_user(store: &PgUserStore) -> User {
    store
        .create(NewUser {
            name: "Grace Hopper".to_string(),
            email: "Grace@Example.com".to_string(),
            password_hash: Some("$2b$12$placeholderhashvalue".to_string()),
            auth_provider: AuthProvider::Local,
            role: Role::Doctor,
        })
        .await
        .expect("Failed to create user")
}

#[tokio::test]
#[ignore]
async fn create_and_lookup_are_case_insensitive() {
    let store = spawn_store().await;
    let user = seed_user(&store).await;

    assert_eq!(user.email, "grace@example.com");
    assert!(user.password_hash.is_none());

    let found = store.find_by_email("GRACE@example.com").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(found.password_hash.is_none());

    let with_password = store
        .find_by_email_with_password("grace@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(with_password.password_hash.is_some());

    assert!(store
        .create(NewUser {
            name: "Duplicate".to_string(),
            email: "grace@example.com".to_string(),
            password_hash: None,
            auth_provider: AuthProvider::Google,
            role: Role::Patient,
        })
        .await
        .is_err());
}

#[tokio::test]
#[ignore]
async fn registry_is_capped_at_five_oldest_first() {
    let store = spawn_store().await;
    let user = seed_user(&store).await;

    let tokens: Vec<String> = (0..6).map(|i| format!("token-{}", i)).collect();
    for token in &tokens {
        store
            .push_refresh_token(user.id, RefreshTokenRecord::new(token))
            .await
            .unwrap();
    }

    let loaded = store.find_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(loaded.refresh_tokens.len(), 5);
    assert!(!loaded.refresh_tokens.contains(&tokens[0]));
    assert!(loaded.refresh_tokens.contains(&tokens[5]));
}

#[tokio::test]
#[ignore]
async fn replace_honours_a_token_once_under_contention() {
    let store = spawn_store().await;
    let user = seed_user(&store).await;
    store
        .push_refresh_token(user.id, RefreshTokenRecord::new("old"))
        .await
        .unwrap();

    let a = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .replace_refresh_token(user.id, "old", RefreshTokenRecord::new("new-a"))
                .await
                .unwrap()
        })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .replace_refresh_token(user.id, "old", RefreshTokenRecord::new("new-b"))
                .await
                .unwrap()
        })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(outcomes.iter().filter(|swapped| **swapped).count(), 1);

    let loaded = store.find_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(loaded.refresh_tokens.len(), 1);
    assert!(!loaded.refresh_tokens.contains("old"));
}

#[tokio::test]
#[ignore]
async fn deactivate_and_clear() {
    let store = spawn_store().await;
    let user = seed_user(&store).await;
    store
        .push_refresh_token(user.id, RefreshTokenRecord::new("device"))
        .await
        .unwrap();

    assert!(store.set_active(user.id, false).await.unwrap());
    assert!(!store.set_active(uuid::Uuid::new_v4(), false).await.unwrap());

    store.clear_refresh_tokens(user.id).await.unwrap();
    let loaded = store.find_by_id(user.id).await.unwrap().unwrap();
    assert!(!loaded.is_active);
    assert!(loaded.refresh_tokens.is_empty());
    assert!(!store.remove_refresh_token(user.id, "device").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn clear_waits_for_an_in_flight_rotation() {
    let (store, pool) = spawn_store_with_pool().await;
    let user = seed_user(&store).await;
    store
        .push_refresh_token(user.id, RefreshTokenRecord::new("old"))
        .await
        .unwrap();

    // Hold the rotation transaction open after its insert
    pool.execute(
        r#"
        CREATE FUNCTION slow_insert() RETURNS trigger AS $$
        BEGIN
            PERFORM pg_sleep(1);
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;
        CREATE TRIGGER slow_refresh_tokens AFTER INSERT ON refresh_tokens
            FOR EACH ROW EXECUTE FUNCTION slow_insert();
        "#,
    )
    .await
    .expect("Failed to install trigger");

    let rotation = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .replace_refresh_token(user.id, "old", RefreshTokenRecord::new("new"))
                .await
                .unwrap()
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    store.clear_refresh_tokens(user.id).await.unwrap();

    assert!(rotation.await.unwrap());
    let loaded = store.find_by_id(user.id).await.unwrap().unwrap();
    assert!(loaded.refresh_tokens.is_empty());
    assert!(!loaded.refresh_tokens.contains("new"));
}

#[tokio::test]
#[ignore]
async fn registry_mutations_on_unknown_user_are_not_found() {
    let store = spawn_store().await;
    let ghost = uuid::Uuid::new_v4();

    assert!(matches!(
        store.clear_refresh_tokens(ghost).await,
        Err(AppError::Database(DatabaseError::NotFound(_)))
    ));
    assert!(matches!(
        store.remove_refresh_token(ghost, "t").await,
        Err(AppError::Database(DatabaseError::NotFound(_)))
    ));
}
