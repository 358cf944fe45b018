use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::codec::TokenCodec;
use crate::auth::cookies::CarrierSettings;
use crate::auth::service::{AuthService, ResetTokenSink};
use crate::auth::session::SessionManager;
use crate::configuration::{Environment, Settings, StoreBackend};
use crate::error::{AppError, DatabaseError};
use crate::logger::LoggerMiddleware;
use crate::middleware::AuthGateMiddleware;
use crate::routes::{
    change_password, deactivate_user, forgot_password, get_current_user, health_check, login,
    logout, logout_all, reactivate_user, refresh, register, session_status,
};
use crate::security::SecurityHeaders;
use crate::store::{InMemoryUserStore, PgUserStore, UserStore};

/// Everything the HTTP layer shares across workers
#[derive(Clone)]
pub struct AppState {
    pub service: AuthService,
    pub carriers: CarrierSettings,
    pub environment: Environment,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn UserStore>,
        reset_sink: Arc<dyn ResetTokenSink>,
    ) -> Self {
        let codec = Arc::new(TokenCodec::new(&settings.jwt));
        Self {
            service: AuthService::new(SessionManager::new(store, codec), reset_sink),
            carriers: CarrierSettings::from_settings(settings),
            environment: settings.application.environment,
        }
    }
}

/// Build the configured user store, running migrations for Postgres
pub async fn connect_store(settings: &Settings) -> Result<Arc<dyn UserStore>, AppError> {
    match settings.database.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; data is lost on restart");
            Ok(Arc::new(InMemoryUserStore::new(settings.sessions.clone())))
        }
        StoreBackend::Postgres => {
            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&settings.database.connection_string())
                .await
                .map_err(|e| AppError::Database(DatabaseError::ConnectionPool(e.to_string())))?;

            let store = PgUserStore::new(pool, settings.sessions.clone());
            store.migrate().await?;
            tracing::info!("Database connection pool created and migrated");
            Ok(Arc::new(store))
        }
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let gate = state.service.gate().clone();
    let environment = state.environment;
    let service = web::Data::new(state.service);
    let carriers = web::Data::new(state.carriers);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(SecurityHeaders::middleware(environment))
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(service.clone())
            .app_data(carriers.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/forgot-password", web::post().to(forgot_password))
                    .route("/change-password", web::put().to(change_password))
                    .service(
                        web::resource("/session")
                            .wrap(AuthGateMiddleware::optional(gate.clone()))
                            .route(web::get().to(session_status)),
                    )
                    .route("/logout", web::post().to(logout))
                    .route("/logout-all", web::post().to(logout_all))
                    .service(
                        web::resource("/me")
                            .wrap(AuthGateMiddleware::required(gate.clone()))
                            .route(web::get().to(get_current_user)),
                    ),
            )
            .service(
                web::scope("/api/admin")
                    .wrap(AuthGateMiddleware::required(gate.clone()))
                    .route("/users/{id}/deactivate", web::post().to(deactivate_user))
                    .route("/users/{id}/reactivate", web::post().to(reactivate_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
