use config::ConfigError;

use crate::error::ConfigError as SettingsError;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub sessions: SessionSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Deployment environment. Production turns on secure cookies and HSTS.
#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Which user store backs the registry.
#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default)]
    pub store: StoreBackend,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT signing settings, one secret per token class
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub password_reset_secret: String,
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry: i64, // seconds (900 = 15 minutes)
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry: i64, // seconds (604800 = 7 days)
    #[serde(default = "default_reset_expiry")]
    pub password_reset_expiry: i64, // seconds (3600 = 1 hour)
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_access_expiry() -> i64 {
    15 * 60
}

fn default_refresh_expiry() -> i64 {
    7 * 24 * 60 * 60
}

fn default_reset_expiry() -> i64 {
    60 * 60
}

fn default_issuer() -> String {
    "auth-api".to_string()
}

fn default_audience() -> String {
    "auth-client".to_string()
}

impl JwtSettings {
    /// Reject weak or shared signing secrets before the codec is built.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let secrets = [
            ("jwt.access_secret", &self.access_secret),
            ("jwt.refresh_secret", &self.refresh_secret),
            ("jwt.password_reset_secret", &self.password_reset_secret),
        ];

        for (name, secret) in secrets.iter() {
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(SettingsError::InvalidValue(format!(
                    "{} must be at least {} bytes",
                    name, MIN_SECRET_LENGTH
                )));
            }
        }

        if self.access_secret == self.refresh_secret
            || self.access_secret == self.password_reset_secret
            || self.refresh_secret == self.password_reset_secret
        {
            return Err(SettingsError::InvalidValue(
                "each token class needs its own signing secret".to_string(),
            ));
        }

        for (name, expiry) in [
            ("jwt.access_token_expiry", self.access_token_expiry),
            ("jwt.refresh_token_expiry", self.refresh_token_expiry),
            ("jwt.password_reset_expiry", self.password_reset_expiry),
        ] {
            if expiry <= 0 {
                return Err(SettingsError::InvalidValue(format!(
                    "{} must be positive",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Refresh-token registry policy
#[derive(serde::Deserialize, Clone, Debug)]
pub struct SessionSettings {
    #[serde(default = "default_max_refresh_tokens")]
    pub max_refresh_tokens: usize,
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_retention: i64, // seconds
}

fn default_max_refresh_tokens() -> usize {
    5
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_refresh_tokens: default_max_refresh_tokens(),
            refresh_token_retention: default_refresh_expiry(),
        }
    }
}

impl SessionSettings {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_retention)
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
