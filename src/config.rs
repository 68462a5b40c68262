//! Service configuration.
//!
//! Read from the environment (after `.env`, if present). Every key has a
//! default except `DATABASE_URL`; without it the in-memory store is used.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::events::{DispatcherConfig, DEFAULT_HUB_CAPACITY};
use crate::workflow::TransitionPolicy;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// PostgreSQL connection string; `None` selects the in-memory store
    pub database_url: Option<String>,
    pub bind_addr: IpAddr,
    pub port: u16,

    /// Directory uploaded images are written to
    pub image_dir: PathBuf,
    /// Base URL images are served from
    pub public_image_base_url: String,

    /// Per-subscriber notification buffer
    pub notification_buffer: usize,
    pub dispatcher: DispatcherConfig,
    pub status_policy: TransitionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            image_dir: PathBuf::from("./uploads"),
            public_image_base_url: "http://localhost:3000/images".to_string(),
            notification_buffer: DEFAULT_HUB_CAPACITY,
            dispatcher: DispatcherConfig::default(),
            status_policy: TransitionPolicy::default(),
        }
    }
}

fn parse<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off" | "") => Ok(false),
        Some(_) => Err(ConfigError::Invalid {
            key,
            value: raw.unwrap_or_default(),
        }),
    }
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let port: u16 = parse("PORT", lookup("PORT"), defaults.port)?;
        let notification_buffer: usize = parse(
            "NOTIFICATION_BUFFER",
            lookup("NOTIFICATION_BUFFER"),
            defaults.notification_buffer,
        )?;
        if notification_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "NOTIFICATION_BUFFER",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            bind_addr: parse("BIND_ADDR", lookup("BIND_ADDR"), defaults.bind_addr)?,
            port,
            image_dir: lookup("IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.image_dir),
            public_image_base_url: lookup("PUBLIC_IMAGE_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}/images", port)),
            notification_buffer,
            dispatcher: DispatcherConfig {
                notify_self_comments: parse_bool(
                    "NOTIFY_SELF_COMMENTS",
                    lookup("NOTIFY_SELF_COMMENTS"),
                )?,
            },
            status_policy: parse(
                "STATUS_POLICY",
                lookup("STATUS_POLICY"),
                defaults.status_policy,
            )?,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/civic"),
            ("NOTIFY_SELF_COMMENTS", "true"),
            ("STATUS_POLICY", "lifecycle"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_image_base_url, "http://localhost:8080/images");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/civic"));
        assert!(config.dispatcher.notify_self_comments);
        assert_eq!(config.status_policy, TransitionPolicy::Lifecycle);
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            Config::from_lookup(lookup(&[("PORT", "eighty")])),
            Err(ConfigError::Invalid {
                key: "PORT",
                value: "eighty".to_string()
            })
        );
        assert!(Config::from_lookup(lookup(&[("STATUS_POLICY", "strict")])).is_err());
        assert!(Config::from_lookup(lookup(&[("NOTIFY_SELF_COMMENTS", "maybe")])).is_err());
        assert!(Config::from_lookup(lookup(&[("NOTIFICATION_BUFFER", "0")])).is_err());
    }
}
