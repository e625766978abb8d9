#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Pub/Sub Proxy - Message Forwarding Intermediary
//!
//! Sits between publishers and subscribers so neither side needs to know
//! the other's address. Publishers connect to the upstream endpoint,
//! subscribers to the downstream endpoint, and the proxy forwards in both
//! directions: data downstream, subscription control upstream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Transport-agnostic relay types
//!   - `message`: Multipart messages forwarded as opaque frames
//!   - `relay`: Directions, endpoint roles, supervisor states
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The `EndpointPort` transport seam
//!   - `services`: Forward pumps, proxy supervisor, shared status
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `zeromq`: XSUB/XPUB and ROUTER/DEALER sockets
//!   - `memory`: Channel-backed endpoints
//!   - `config`: Environment configuration
//!   - `health`: Health check and metrics HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────── upstream_to_downstream ───────┐
//! Publisher ──► Upstream (XSUB)                     Downstream (XPUB) ──► Subscriber
//!                    └──────── downstream_to_upstream ◄──────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Relay types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::message::{Frame, Message, MessageError};
pub use domain::relay::{Direction, EndpointRole, RelayOperation, SupervisorState};

// Ports and services
pub use application::ports::{BindError, EndpointPort, SharedEndpoint, TransportError};
pub use application::services::{
    ForwardPump, ProxyError, ProxyStatus, ProxySupervisor, PumpFailure, PumpOutcome,
    StartupError, SupervisorConfig,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ProxyConfig, ProxyTopology};

// Endpoint adapters
pub use infrastructure::memory::{MemoryEndpoint, MemoryNetwork, MemoryPeer};
pub use infrastructure::zeromq::{SocketOptions, ZmqEndpoint};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
