//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `EndpointPort`: a bound listening socket the pumps receive from and send to

mod endpoint_port;

pub use endpoint_port::{BindError, EndpointPort, SharedEndpoint, TransportError};

#[cfg(test)]
pub use endpoint_port::MockEndpointPort;
