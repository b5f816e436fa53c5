use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const CATEGORY_URL: &str = "https://www.dns-shop.ru/catalog/17a8a69116404e77/myshi/";
pub const TABLE_NAME: &str = "test_DNS";
pub const SCHEDULE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const PG_HOST: &str = "172.18.0.2";
const PG_PORT: u16 = 5432;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    MissingCredential(&'static str),
    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
}

/// Postgres credentials read from the environment. Nothing is validated
/// until a connection URL is requested.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub hostname: String,
    pub port: u16,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            username: std::env::var("POSTGRES_USER").ok(),
            password: std::env::var("POSTGRES_PASSWORD").ok(),
            database: std::env::var("POSTGRES_DB").ok(),
            hostname: PG_HOST.to_string(),
            port: PG_PORT,
        }
    }

    pub fn connection_url(&self) -> Result<String, ConfigError> {
        let user = require(&self.username, "POSTGRES_USER")?;
        let password = require(&self.password, "POSTGRES_PASSWORD")?;
        let database = require(&self.database, "POSTGRES_DB")?;
        Ok(format!(
            "postgresql://{}:{}@{}:{}/{}",
            user, password, self.hostname, self.port, database
        ))
    }

    /// Connection target with the credentials masked, for logs.
    pub fn redacted(&self) -> String {
        format!(
            "postgresql://***:***@{}:{}/{}",
            self.hostname,
            self.port,
            self.database.as_deref().unwrap_or("")
        )
    }
}

fn require<'a>(value: &'a Option<String>, var: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingCredential(var))
}

/// Where the Loader writes.
#[derive(Debug, Clone)]
pub enum Destination {
    Postgres(DbConfig),
    Sqlite(PathBuf),
}

impl Destination {
    pub fn from_args(sqlite: Option<PathBuf>) -> Self {
        match sqlite {
            Some(path) => Destination::Sqlite(path),
            None => Destination::Postgres(DbConfig::from_env()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Destination::Postgres(cfg) => cfg.redacted(),
            Destination::Sqlite(path) => format!("sqlite:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

/// Everything one run needs, built once from the command line.
#[derive(Debug, Clone)]
pub struct Settings {
    pub category_url: String,
    pub table: String,
    pub destination: Destination,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn new(destination: Destination, retry: RetryPolicy) -> Self {
        Self {
            category_url: CATEGORY_URL.to_string(),
            table: TABLE_NAME.to_string(),
            destination,
            retry,
        }
    }
}
