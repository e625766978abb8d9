//! Proxy Configuration Settings
//!
//! Configuration types for the proxy, loaded from environment variables.

use std::time::Duration;

use crate::application::services::{DEFAULT_GRACE_PERIOD, SupervisorConfig};

/// Default address publishers connect to.
pub const DEFAULT_UPSTREAM_ADDRESS: &str = "tcp://*:5557";

/// Default address subscribers connect to.
pub const DEFAULT_DOWNSTREAM_ADDRESS: &str = "tcp://*:5558";

/// Socket pairing used for the two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyTopology {
    /// XSUB upstream for publishers, XPUB downstream for subscribers.
    #[default]
    PubSub,
    /// ROUTER upstream for requesters, DEALER downstream for repliers.
    RequestReply,
}

impl ProxyTopology {
    /// Parse topology from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "reqrep" | "req_rep" | "router_dealer" => Self::RequestReply,
            _ => Self::PubSub,
        }
    }

    /// Get the topology name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PubSub => "pubsub",
            Self::RequestReply => "reqrep",
        }
    }
}

/// Endpoint addresses.
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    /// Address publishers connect to.
    pub upstream_address: String,
    /// Address subscribers connect to.
    pub downstream_address: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            upstream_address: DEFAULT_UPSTREAM_ADDRESS.to_string(),
            downstream_address: DEFAULT_DOWNSTREAM_ADDRESS.to_string(),
        }
    }
}

/// Transport socket settings.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Socket pairing.
    pub topology: ProxyTopology,
    /// Send and receive high-water mark, in messages.
    pub high_water_mark: i32,
    /// Pass every subscription upstream, including duplicates.
    pub xpub_verbose: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            topology: ProxyTopology::PubSub,
            high_water_mark: 1000,
            xpub_verbose: false,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Shutdown settings.
#[derive(Debug, Clone)]
pub struct ShutdownSettings {
    /// How long pumps get to stop before endpoints are closed.
    pub grace_period: Duration,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Complete proxy configuration.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Endpoint addresses.
    pub endpoints: EndpointSettings,
    /// Transport socket settings.
    pub transport: TransportSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Shutdown settings.
    pub shutdown: ShutdownSettings,
}

impl ProxyConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an address variable has no `transport://` prefix.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if an address variable has no `transport://` prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoints = EndpointSettings {
            upstream_address: parse_address(&lookup, "XSUB_ADDR", DEFAULT_UPSTREAM_ADDRESS)?,
            downstream_address: parse_address(&lookup, "XPUB_ADDR", DEFAULT_DOWNSTREAM_ADDRESS)?,
        };

        let defaults = TransportSettings::default();
        let transport = TransportSettings {
            topology: lookup("PROXY_TOPOLOGY")
                .map(|s| ProxyTopology::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            high_water_mark: parse_or(&lookup, "PROXY_HIGH_WATER_MARK", defaults.high_water_mark),
            xpub_verbose: parse_bool(&lookup, "PROXY_XPUB_VERBOSE", defaults.xpub_verbose),
        };

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "PROXY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let shutdown = ShutdownSettings {
            grace_period: parse_duration_millis(
                &lookup,
                "PROXY_SHUTDOWN_GRACE_MS",
                ShutdownSettings::default().grace_period,
            ),
        };

        Ok(Self {
            endpoints,
            transport,
            server,
            shutdown,
        })
    }

    /// Settings for the proxy supervisor.
    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::new(
            self.endpoints.upstream_address.clone(),
            self.endpoints.downstream_address.clone(),
        )
        .with_grace_period(self.shutdown.grace_period)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Address variable is not of the form `transport://endpoint`.
    #[error("environment variable {key} is not a transport address: {value}")]
    InvalidAddress {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

fn parse_address<F>(lookup: &F, key: &str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Unset and blank both mean the default.
    let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(default.to_string());
    };
    let value = value.trim();
    if !value.contains("://") {
        return Err(ConfigError::InvalidAddress {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(default, |v| {
        matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = ProxyConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.endpoints.upstream_address, "tcp://*:5557");
        assert_eq!(config.endpoints.downstream_address, "tcp://*:5558");
        assert_eq!(config.transport.topology, ProxyTopology::PubSub);
        assert_eq!(config.transport.high_water_mark, 1000);
        assert!(!config.transport.xpub_verbose);
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.shutdown.grace_period, Duration::from_millis(200));
    }

    #[test]
    fn addresses_from_environment() {
        let config = ProxyConfig::from_lookup(lookup_from(&[
            ("XSUB_ADDR", "tcp://127.0.0.1:6000"),
            ("XPUB_ADDR", " ipc:///tmp/sub.ipc "),
        ]))
        .unwrap();
        assert_eq!(config.endpoints.upstream_address, "tcp://127.0.0.1:6000");
        assert_eq!(config.endpoints.downstream_address, "ipc:///tmp/sub.ipc");
    }

    #[test_case("XSUB_ADDR", "" ; "upstream empty")]
    #[test_case("XSUB_ADDR", "   " ; "upstream blank")]
    #[test_case("XPUB_ADDR", "" ; "downstream empty")]
    fn blank_address_uses_default(key: &str, value: &str) {
        let config = ProxyConfig::from_lookup(lookup_from(&[(key, value)])).unwrap();
        assert_eq!(config.endpoints.upstream_address, DEFAULT_UPSTREAM_ADDRESS);
        assert_eq!(config.endpoints.downstream_address, DEFAULT_DOWNSTREAM_ADDRESS);
    }

    #[test]
    fn address_without_transport_rejected() {
        let err = ProxyConfig::from_lookup(lookup_from(&[("XPUB_ADDR", "localhost:5558")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "environment variable XPUB_ADDR is not a transport address: localhost:5558"
        );
    }

    #[test]
    fn grace_period_and_ports_parsed() {
        let config = ProxyConfig::from_lookup(lookup_from(&[
            ("PROXY_SHUTDOWN_GRACE_MS", "750"),
            ("PROXY_HEALTH_PORT", "0"),
            ("PROXY_HIGH_WATER_MARK", "50"),
            ("PROXY_XPUB_VERBOSE", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(config.shutdown.grace_period, Duration::from_millis(750));
        assert_eq!(config.server.health_port, 0);
        assert_eq!(config.transport.high_water_mark, 50);
        assert!(config.transport.xpub_verbose);

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.grace_period, Duration::from_millis(750));
        assert_eq!(supervisor.upstream_address, "tcp://*:5557");
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = ProxyConfig::from_lookup(lookup_from(&[
            ("PROXY_SHUTDOWN_GRACE_MS", "soon"),
            ("PROXY_HEALTH_PORT", "99999"),
        ]))
        .unwrap();
        assert_eq!(config.shutdown.grace_period, DEFAULT_GRACE_PERIOD);
        assert_eq!(config.server.health_port, 8083);
    }

    #[test_case("pubsub", ProxyTopology::PubSub)]
    #[test_case("PUBSUB", ProxyTopology::PubSub)]
    #[test_case("reqrep", ProxyTopology::RequestReply)]
    #[test_case("Router_Dealer", ProxyTopology::RequestReply)]
    #[test_case("unknown", ProxyTopology::PubSub)]
    fn topology_parsing(input: &str, expected: ProxyTopology) {
        assert_eq!(ProxyTopology::from_str_case_insensitive(input), expected);
    }
}
