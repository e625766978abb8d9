//! Configuration Module
//!
//! Configuration loading for the proxy service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_DOWNSTREAM_ADDRESS, DEFAULT_UPSTREAM_ADDRESS, EndpointSettings,
    ProxyConfig, ProxyTopology, ServerSettings, ShutdownSettings, TransportSettings,
};
