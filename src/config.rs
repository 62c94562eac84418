use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, File};
use secrecy::{ExposeSecret, Secret};
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};

use crate::domain::subscriber_email::SubscriberEmail;

#[derive(Debug)]
pub enum Environment {
    Development,
    Production,
}

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub email_client: EmailClientSettings,
    pub tokens: TokenSettings,
    pub compliance: ComplianceSettings,
    pub admin: AdminSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    /// Prefix of every link sent by email.
    pub base_url: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    pub api_key: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    // secrecy protects secret information and prevents them to be exposed (eg: via logs)
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub name: String,
    pub require_ssl: bool,
    /// Keeps every table in process memory instead of Postgres. Nothing survives a restart.
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(serde::Deserialize, Clone)]
pub struct TokenSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub email_verification_hours: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub dsr_verification_days: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub export_link_hours: i64,
}

#[derive(serde::Deserialize, Clone)]
pub struct ComplianceSettings {
    pub consent_version: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub audit_retention_days: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub retention_interval_hours: u64,
    pub export_storage_path: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct AdminSettings {
    pub jwt_secret: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub jwt_expiry_hours: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_failed_logins: i32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub lockout_minutes: i64,
}

impl Settings {
    pub fn get_address(&self) -> String {
        format!(
            "{}:{}",
            self.application.get_host(),
            self.application.get_port()
        )
    }

    pub fn get_app_base_url(&self) -> String {
        self.application.get_base_url()
    }

    pub fn get_db_options(&self) -> PgConnectOptions {
        self.database.get_db_options()
    }

    pub fn get_email_client_sender(&self) -> Result<SubscriberEmail, String> {
        self.email_client.get_sender_email()
    }

    pub fn get_email_client_base_url(&self) -> String {
        self.email_client.get_base_url()
    }

    pub fn get_email_client_api(&self) -> Secret<String> {
        self.email_client.get_api_key()
    }

    pub fn get_email_client_timeout(&self) -> Duration {
        self.email_client.get_timeout()
    }

    pub fn set_email_client_base_url(&mut self, new_base_url: String) {
        self.email_client.set_base_url(new_base_url)
    }

    pub fn set_app_port(&mut self, port: u16) {
        self.application.port = port;
    }

    pub fn set_app_base_url(&mut self, base_url: String) {
        self.application.base_url = base_url;
    }

    pub fn set_export_storage_path(&mut self, path: String) {
        self.compliance.export_storage_path = path;
    }

    pub fn use_in_memory_storage(&self) -> bool {
        self.database.in_memory
    }
}

impl DatabaseSettings {
    pub fn get_db_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let mut db_options = PgConnectOptions::new()
            .host(&self.host)
            .password(self.password.expose_secret())
            .username(&self.username)
            .port(self.port)
            .database(&self.name)
            .ssl_mode(ssl_mode);

        db_options.log_statements(log::LevelFilter::Trace);

        db_options
    }
}

impl ApplicationSettings {
    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_host(&self) -> String {
        self.host.clone()
    }

    pub fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}

impl EmailClientSettings {
    pub fn get_sender_email(&self) -> Result<SubscriberEmail, String> {
        SubscriberEmail::parse(self.sender_email.clone())
    }

    pub fn get_base_url(&self) -> String {
        self.base_url.clone()
    }

    pub fn get_api_key(&self) -> Secret<String> {
        self.api_key.clone()
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn set_base_url(&mut self, new_base_url: String) {
        self.base_url = new_base_url
    }
}

impl TokenSettings {
    pub fn email_verification_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.email_verification_hours)
    }

    pub fn dsr_verification_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.dsr_verification_days)
    }

    pub fn export_link_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.export_link_hours)
    }
}

impl ComplianceSettings {
    pub fn get_export_storage_path(&self) -> PathBuf {
        PathBuf::from(&self.export_storage_path)
    }

    pub fn get_retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_hours * 60 * 60)
    }

    /// The retention task ticks on this interval, so it cannot be zero.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_interval_hours == 0 {
            return Err(ConfigError::Message(
                "compliance.retention_interval_hours must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl AdminSettings {
    pub fn get_lockout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lockout_minutes)
    }

    pub fn get_jwt_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.jwt_expiry_hours)
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            unknown_env => Err(format!(
                "{} is not supported environment. Use either 'development' or 'production'.",
                unknown_env
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let root_path = std::env::current_dir()
        .map_err(|e| ConfigError::Message(format!("cannot read current directory: {}", e)))?;
    let config_directory = root_path.join("config");
    // Uses development environment by default
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "development".into())
        .try_into()
        .map_err(ConfigError::Message)?;
    let config_base_filepath = config_directory.join("base");
    let config_env_filepath = config_directory.join(environment.as_str());

    // It merges the base configuration file with the one from the specific environment (development or production)
    let settings = Config::builder()
        .add_source(File::from(config_base_filepath).required(true))
        .add_source(File::from(config_env_filepath).required(true))
        // Merge settings from environment variables with a prefix of APP and "__" separator
        // E.g APP_APPLICATION__PORT would set Settings.application.port
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    tracing::info!("Application environment = {:?}", environment);

    let settings: Settings = settings.try_deserialize()?;
    settings.compliance.validate()?;

    Ok(settings)
}
