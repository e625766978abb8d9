//! Relay Vocabulary
//!
//! Directions, endpoint roles, relay operations and the supervisor
//! lifecycle state machine.

use std::fmt;

use serde::Serialize;

// =============================================================================
// Endpoint Roles
// =============================================================================

/// Which side of the proxy an endpoint faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    /// Publishers connect here.
    Upstream,
    /// Subscribers connect here.
    Downstream,
}

impl EndpointRole {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Directions
// =============================================================================

/// Relay direction of a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Publisher data flowing to subscribers.
    UpstreamToDownstream,
    /// Subscription control flowing back to publishers.
    DownstreamToUpstream,
}

impl Direction {
    /// Both directions, data first.
    pub const ALL: [Self; 2] = [Self::UpstreamToDownstream, Self::DownstreamToUpstream];

    /// Endpoint the pump receives from.
    #[must_use]
    pub const fn source(self) -> EndpointRole {
        match self {
            Self::UpstreamToDownstream => EndpointRole::Upstream,
            Self::DownstreamToUpstream => EndpointRole::Downstream,
        }
    }

    /// Endpoint the pump sends to.
    #[must_use]
    pub const fn destination(self) -> EndpointRole {
        match self {
            Self::UpstreamToDownstream => EndpointRole::Downstream,
            Self::DownstreamToUpstream => EndpointRole::Upstream,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamToDownstream => "upstream_to_downstream",
            Self::DownstreamToUpstream => "downstream_to_upstream",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The endpoint call a pump was making when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayOperation {
    /// `receive()` on the source endpoint.
    Receive,
    /// `send()` on the destination endpoint.
    Send,
}

impl RelayOperation {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Send => "send",
        }
    }
}

impl fmt::Display for RelayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Supervisor Lifecycle
// =============================================================================

/// Lifecycle state of the proxy supervisor.
///
/// ```text
/// Starting ──► Running ──► Draining ──► Stopped
///     └──────────────────────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    /// Binding endpoints.
    #[default]
    Starting,
    /// Both pumps relaying.
    Running,
    /// Shutdown requested, waiting for pumps to stop.
    Draining,
    /// Endpoints closed. Terminal.
    Stopped,
}

impl SupervisorState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Running | Self::Stopped)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Stopped)
        )
    }

    /// Whether this is the terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Numeric code exported as a gauge.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Running => 1,
            Self::Draining => 2,
            Self::Stopped => 3,
        }
    }

    /// State name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
