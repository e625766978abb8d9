//! Proxy Status Tracking
//!
//! Shared, lock-light view of the supervisor lifecycle and per-direction
//! relay counters. Written by the supervisor and pumps, read by the health
//! endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::relay::{Direction, EndpointRole, SupervisorState};
use crate::infrastructure::metrics;

/// Relay counters for one direction.
#[derive(Debug, Default)]
pub struct DirectionStats {
    messages: AtomicU64,
    frames: AtomicU64,
    bytes: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl DirectionStats {
    /// Messages relayed so far.
    #[must_use]
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Frames relayed so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Payload bytes relayed so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Terminal error reported by the pump, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn snapshot(&self) -> DirectionSnapshot {
        DirectionSnapshot {
            messages: self.messages(),
            frames: self.frames(),
            bytes: self.bytes(),
            last_error: self.last_error(),
        }
    }
}

/// Shared proxy status.
#[derive(Debug)]
pub struct ProxyStatus {
    started_at: Instant,
    state: RwLock<SupervisorState>,
    upstream_address: RwLock<Option<String>>,
    downstream_address: RwLock<Option<String>>,
    upstream_to_downstream: DirectionStats,
    downstream_to_upstream: DirectionStats,
}

impl Default for ProxyStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyStatus {
    /// Create status in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            state: RwLock::new(SupervisorState::Starting),
            upstream_address: RwLock::new(None),
            downstream_address: RwLock::new(None),
            upstream_to_downstream: DirectionStats::default(),
            downstream_to_upstream: DirectionStats::default(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.read()
    }

    /// Move to `next` if it is a legal successor.
    ///
    /// Returns `false` and leaves the state untouched otherwise.
    pub fn transition(&self, next: SupervisorState) -> bool {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            tracing::warn!(from = %*state, to = %next, "Rejected supervisor state transition");
            return false;
        }
        tracing::debug!(from = %*state, to = %next, "Supervisor state transition");
        *state = next;
        drop(state);
        metrics::set_proxy_state(next);
        true
    }

    /// Record the address an endpoint actually bound.
    pub fn set_bound_address(&self, role: EndpointRole, address: String) {
        let slot = match role {
            EndpointRole::Upstream => &self.upstream_address,
            EndpointRole::Downstream => &self.downstream_address,
        };
        *slot.write() = Some(address);
    }

    /// Address bound by an endpoint, if it got that far.
    #[must_use]
    pub fn bound_address(&self, role: EndpointRole) -> Option<String> {
        match role {
            EndpointRole::Upstream => self.upstream_address.read().clone(),
            EndpointRole::Downstream => self.downstream_address.read().clone(),
        }
    }

    /// Counters for one direction.
    #[must_use]
    pub const fn direction(&self, direction: Direction) -> &DirectionStats {
        match direction {
            Direction::UpstreamToDownstream => &self.upstream_to_downstream,
            Direction::DownstreamToUpstream => &self.downstream_to_upstream,
        }
    }

    /// Count one relayed message.
    pub fn record_relay(&self, direction: Direction, frames: usize, bytes: usize) {
        let stats = self.direction(direction);
        stats.messages.fetch_add(1, Ordering::Relaxed);
        stats.frames.fetch_add(frames as u64, Ordering::Relaxed);
        stats.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        metrics::record_message_relayed(direction, frames, bytes);
    }

    /// Remember a pump's terminal error.
    pub fn record_failure(&self, direction: Direction, error: String) {
        *self.direction(direction).last_error.write() = Some(error);
    }

    /// Seconds since the status was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Serializable point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            upstream_address: self.bound_address(EndpointRole::Upstream),
            downstream_address: self.bound_address(EndpointRole::Downstream),
            upstream_to_downstream: self.upstream_to_downstream.snapshot(),
            downstream_to_upstream: self.downstream_to_upstream.snapshot(),
        }
    }
}

/// Point-in-time status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Lifecycle state.
    pub state: SupervisorState,
    /// Bound upstream address.
    pub upstream_address: Option<String>,
    /// Bound downstream address.
    pub downstream_address: Option<String>,
    /// Data direction counters.
    pub upstream_to_downstream: DirectionSnapshot,
    /// Subscription direction counters.
    pub downstream_to_upstream: DirectionSnapshot,
}

/// Point-in-time counters for one direction.
#[derive(Debug, Clone, Serialize)]
pub struct DirectionSnapshot {
    /// Messages relayed.
    pub messages: u64,
    /// Frames relayed.
    pub frames: u64,
    /// Payload bytes relayed.
    pub bytes: u64,
    /// Terminal pump error.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_starting_state() {
        let status = ProxyStatus::new();
        assert_eq!(status.state(), SupervisorState::Starting);
    }

    #[test]
    fn illegal_transition_is_ignored() {
        let status = ProxyStatus::new();
        assert!(!status.transition(SupervisorState::Draining));
        assert_eq!(status.state(), SupervisorState::Starting);

        assert!(status.transition(SupervisorState::Running));
        assert!(status.transition(SupervisorState::Draining));
        assert!(status.transition(SupervisorState::Stopped));
        assert!(!status.transition(SupervisorState::Running));
        assert_eq!(status.state(), SupervisorState::Stopped);
    }

    #[test]
    fn relay_counters_are_per_direction() {
        let status = ProxyStatus::new();
        status.record_relay(Direction::UpstreamToDownstream, 2, 10);
        status.record_relay(Direction::UpstreamToDownstream, 1, 5);
        status.record_relay(Direction::DownstreamToUpstream, 1, 6);

        let data = status.direction(Direction::UpstreamToDownstream);
        assert_eq!(data.messages(), 2);
        assert_eq!(data.frames(), 3);
        assert_eq!(data.bytes(), 15);

        let control = status.direction(Direction::DownstreamToUpstream);
        assert_eq!(control.messages(), 1);
        assert_eq!(control.bytes(), 6);
    }

    #[test]
    fn snapshot_serializes_state_and_addresses() {
        let status = ProxyStatus::new();
        status.set_bound_address(EndpointRole::Upstream, "tcp://0.0.0.0:5557".to_string());
        status.record_failure(Direction::DownstreamToUpstream, "endpoint closed".to_string());

        let json = serde_json::to_value(status.snapshot()).unwrap();
        assert_eq!(json["state"], "starting");
        assert_eq!(json["upstream_address"], "tcp://0.0.0.0:5557");
        assert!(json["downstream_address"].is_null());
        assert_eq!(
            json["downstream_to_upstream"]["last_error"],
            "endpoint closed"
        );
    }
}
