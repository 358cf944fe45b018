use std::net::TcpListener;
use std::sync::Arc;

use clinic_auth::auth::service::LogResetSink;
use clinic_auth::configuration::get_configuration;
use clinic_auth::startup::{connect_store, run, AppState};
use clinic_auth::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // Refuse to start with weak or shared signing secrets
    if let Err(e) = configuration.jwt.validate() {
        tracing::error!(error = %e, "Invalid JWT configuration");
        return Err(startup_error(
            std::io::ErrorKind::InvalidInput,
            "JWT configuration error",
        ));
    }

    let store = connect_store(&configuration).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to initialise user store");
        startup_error(std::io::ErrorKind::ConnectionRefused, "User store error")
    })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let state = AppState::new(&configuration, store, Arc::new(LogResetSink));
    run(listener, state)?.await
}
