//! Application Layer - Relay services and port definitions.
//!
//! This layer contains the forwarding engine (pumps and supervisor) and
//! the endpoint port that transport adapters implement.

/// Port interfaces for external systems (transport endpoints).
pub mod ports;

/// Application services: forward pump, supervisor, status tracking.
pub mod services;
