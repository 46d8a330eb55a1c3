//! Server configuration, read from the environment at startup

use std::net::SocketAddr;

use thiserror::Error;
use watchparty_core::{CoordinatorConfig, JoinPolicy};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3050;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Create unknown sessions on join instead of rejecting
    pub auto_create: bool,
    /// Control events kept per session (0 = last event only)
    pub history_limit: usize,
    /// Origin allowed by CORS; `*` allows any
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auto_create: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            host: lookup("WATCHPARTY_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "WATCHPARTY_PORT")?.unwrap_or(defaults.port),
            auto_create: match lookup("WATCHPARTY_AUTO_CREATE") {
                None => defaults.auto_create,
                Some(value) => parse_bool("WATCHPARTY_AUTO_CREATE", &value)?,
            },
            history_limit: parse_var(&lookup, "WATCHPARTY_HISTORY_LIMIT")?
                .unwrap_or(defaults.history_limit),
            cors_origin: lookup("WATCHPARTY_CORS_ORIGIN").unwrap_or(defaults.cors_origin),
        })
    }

    /// Resolve the listen address. The host may be an IP literal or a name.
    pub async fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            name: "WATCHPARTY_HOST",
            value: self.host.clone(),
        };
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            join_policy: if self.auto_create {
                JoinPolicy::AutoCreate
            } else {
                JoinPolicy::RequireExisting
            },
            history_limit: self.history_limit,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
