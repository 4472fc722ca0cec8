//! Relay configuration loaded from environment variables.

use std::net::SocketAddr;

/// Errors raised while reading the relay environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Parse failure.
        reason: String,
    },
}

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// NATS server URL.
    pub nats_url: String,
    /// Interface to bind.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_owned(),
            host: "0.0.0.0".to_owned(),
            port: 8090,
        }
    }
}

impl RelayConfig {
    /// Load configuration from the environment.
    ///
    /// Optional variables:
    /// - `NATS_URL` -- NATS server (default `nats://localhost:4222`)
    /// - `RELAY_HOST` -- bind interface (default `0.0.0.0`)
    /// - `RELAY_PORT` -- listen port (default `8090`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `RELAY_PORT` is not a port.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let port = match lookup("RELAY_PORT") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                name: "RELAY_PORT",
                reason: format!("{raw:?}: {e}"),
            })?,
            None => defaults.port,
        };
        Ok(Self {
            nats_url: lookup("NATS_URL").unwrap_or(defaults.nats_url),
            host: lookup("RELAY_HOST").unwrap_or(defaults.host),
            port,
        })
    }

    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the host is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid {
                name: "RELAY_HOST",
                reason: format!("{}: {e}", self.host),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = RelayConfig::from_lookup(lookup(&[])).ok();
        assert_eq!(config, Some(RelayConfig::default()));
    }

    #[test]
    fn overrides_from_environment() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("NATS_URL", "nats://broker:4222"),
            ("RELAY_HOST", "127.0.0.1"),
            ("RELAY_PORT", "9001"),
        ]))
        .ok();
        let config = config.unwrap_or_default();
        assert_eq!(config.nats_url, "nats://broker:4222");
        assert_eq!(config.port, 9001);
        assert_eq!(config.bind_addr().ok().map(|a| a.port()), Some(9001));
    }

    #[test]
    fn bad_port_is_rejected() {
        let result = RelayConfig::from_lookup(lookup(&[("RELAY_PORT", "http")]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "RELAY_PORT",
                ..
            })
        ));
    }
}
