//! Integration tests for the health check and response headers

use clinic_auth::auth::service::LogResetSink;
use clinic_auth::configuration::{
    ApplicationSettings, DatabaseSettings, Environment, JwtSettings, SessionSettings, Settings,
    StoreBackend,
};
use clinic_auth::startup::{run, AppState};
use clinic_auth::store::InMemoryUserStore;
use std::net::TcpListener;
use std::sync::Arc;

fn settings(environment: Environment) -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "clinic".to_string(),
            store: StoreBackend::Memory,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment,
        },
        jwt: JwtSettings {
            access_secret: "health-access-secret-0123456789abcdefgh".to_string(),
            refresh_secret: "health-refresh-secret-0123456789abcdefgh".to_string(),
            password_reset_secret: "health-reset-secret-0123456789abcdefgh".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            password_reset_expiry: 3600,
            issuer: "auth-api".to_string(),
            audience: "auth-client".to_string(),
        },
        sessions: SessionSettings::default(),
    }
}

fn spawn_app(environment: Environment) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let settings = settings(environment);
    let store = Arc::new(InMemoryUserStore::new(settings.sessions.clone()));
    let state = AppState::new(&settings, store, Arc::new(LogResetSink));
    let server = run(listener, state).expect("Failed to create server");

    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app(Environment::Development);

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let addr = spawn_app(Environment::Development);

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert!(headers.get("strict-transport-security").is_none());
}

#[tokio::test]
async fn production_adds_hsts_and_strict_cookies() {
    let addr = spawn_app(Environment::Production);
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(
        response.headers()["strict-transport-security"],
        "max-age=31536000; includeSubDomains"
    );

    let response = client
        .post(&format!("{}/api/auth/register", addr))
        .json(&serde_json::json!({
            "name": "Grace Hopper",
            "email": "grace@example.com",
            "password": "SecurePass123",
            "role": "doctor"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(201, response.status().as_u16());

    for cookie in response.headers().get_all(reqwest::header::SET_COOKIE) {
        let line = cookie.to_str().unwrap();
        assert!(line.contains("Secure"), "{}", line);
        assert!(line.contains("SameSite=Strict"), "{}", line);
    }
}
