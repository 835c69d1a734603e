//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_INVOICE_NUMBER_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Postgres connection string; in-memory stores are used when absent.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub invoice_number_max_attempts: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            invoice_number_max_attempts: DEFAULT_INVOICE_NUMBER_MAX_ATTEMPTS,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr =
            parse_var::<_, SocketAddr>(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let db_max_connections =
            parse_var(&lookup, "DB_MAX_CONNECTIONS", Some(DEFAULT_DB_MAX_CONNECTIONS))?;
        let invoice_number_max_attempts = parse_var(
            &lookup,
            "INVOICE_NUMBER_MAX_ATTEMPTS",
            Some(DEFAULT_INVOICE_NUMBER_MAX_ATTEMPTS),
        )?;

        let defaults = Self::default();
        Ok(Self {
            bind_addr: bind_addr.unwrap_or(defaults.bind_addr),
            database_url,
            db_max_connections: db_max_connections.unwrap_or(defaults.db_max_connections),
            invoice_number_max_attempts: invoice_number_max_attempts
                .filter(|n| *n > 0)
                .unwrap_or(defaults.invoice_number_max_attempts),
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: Option<T>) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
