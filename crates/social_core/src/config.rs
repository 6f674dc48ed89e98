//! Environment-driven settings.
//!
//! # Responsibility
//! - Read server, database and logging settings from environment variables.
//! - Derive values that depend on other settings (domain URL, database path).
//!
//! # Invariants
//! - Empty or whitespace-only variables are treated as unset.
//! - The database location is always resolved: `DATABASE_PATH`, or
//!   `DB_DIR` + `DB_NAME`.

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_API_PREFIX: &str = "api";
const DEFAULT_PROJECT_DOMAIN: &str = "localhost";
const DEFAULT_DB_POOL_SIZE: u32 = 10;
const DB_FILE_EXTENSION: &str = "sqlite3";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required setting `{key}`"),
            Self::Invalid { key, value, reason } => {
                write!(f, "invalid value `{value}` for `{key}`: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Resolved process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_port: u16,
    pub ui_port: Option<u16>,
    pub api_prefix: String,
    pub server_tls: bool,
    pub project_domain: String,
    /// `https://domain` with TLS, otherwise `http://domain[:ui_port]`.
    pub project_domain_url: String,
    pub backend_cors_origins: Vec<String>,
    pub database_path: PathBuf,
    pub db_pool_size: u32,
    pub log_level: String,
    /// `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which returns the raw value of a key.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let server_port = match get("SERVER_PORT") {
            Some(raw) => parse_port("SERVER_PORT", &raw)?,
            None => DEFAULT_SERVER_PORT,
        };
        let ui_port = get("UI_PORT")
            .map(|raw| parse_port("UI_PORT", &raw))
            .transpose()?;
        let server_tls = match get("SERVER_TLS") {
            Some(raw) => parse_bool("SERVER_TLS", &raw)?,
            None => false,
        };
        let project_domain =
            get("PROJECT_DOMAIN").unwrap_or_else(|| DEFAULT_PROJECT_DOMAIN.to_string());
        let project_domain_url = domain_url(&project_domain, server_tls, ui_port);

        let backend_cors_origins = match get("BACKEND_CORS_ORIGINS") {
            Some(raw) => parse_cors_origins(&raw)?,
            None => Vec::new(),
        };

        let database_path = match get("DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let dir = get("DB_DIR").ok_or(ConfigError::Missing("DB_DIR"))?;
                let name = get("DB_NAME").ok_or(ConfigError::Missing("DB_NAME"))?;
                PathBuf::from(dir).join(format!("{name}.{DB_FILE_EXTENSION}"))
            }
        };

        let db_pool_size = match get("DB_POOL_SIZE") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "DB_POOL_SIZE",
                        value: raw,
                        reason: "expected a positive integer".to_string(),
                    });
                }
            },
            None => DEFAULT_DB_POOL_SIZE,
        };

        Ok(Self {
            server_port,
            ui_port,
            api_prefix: get("API_PREFIX")
                .map(|prefix| prefix.trim_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string()),
            server_tls,
            project_domain,
            project_domain_url,
            backend_cors_origins,
            database_path,
            db_pool_size,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| default_log_level().to_string()),
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }
}

fn domain_url(domain: &str, tls: bool, ui_port: Option<u16>) -> String {
    if tls {
        return format!("https://{domain}");
    }
    match ui_port {
        Some(port) => format!("http://{domain}:{port}"),
        None => format!("http://{domain}"),
    }
}

fn parse_port(key: &'static str, raw: &str) -> ConfigResult<u16> {
    raw.parse::<u16>().map_err(|err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected true|false".to_string(),
        }),
    }
}

/// Accepts a comma-separated list or a JSON array of http(s) origins.
fn parse_cors_origins(raw: &str) -> ConfigResult<Vec<String>> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "BACKEND_CORS_ORIGINS",
        value: raw.to_string(),
        reason,
    };

    let origins: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|err| invalid(err.to_string()))?
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    };

    if let Some(bad) = origins
        .iter()
        .find(|origin| !(origin.starts_with("http://") || origin.starts_with("https://")))
    {
        return Err(invalid(format!("`{bad}` is not an http(s) origin")));
    }
    Ok(origins)
}
