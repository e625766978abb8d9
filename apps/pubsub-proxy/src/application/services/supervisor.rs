//! Proxy Supervisor
//!
//! Owns both endpoints and drives the proxy lifecycle:
//!
//! ```text
//! Starting ──bind upstream, bind downstream──► Running
//!    │                                           │ first of: shutdown, pump A ends, pump B ends
//!    │ bind failed                               ▼
//!    │                                        Draining ── cancel, wait ≤ grace period
//!    ▼                                           ▼
//! Stopped ◄──────── close upstream, close downstream
//! ```
//!
//! A pump failure is fatal for the whole proxy; a one-directional relay is
//! not a useful degraded mode for publish/subscribe.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::pump::{ForwardPump, PumpFailure, PumpOutcome};
use super::status::ProxyStatus;
use crate::application::ports::{BindError, SharedEndpoint};
use crate::domain::relay::{Direction, EndpointRole, SupervisorState};

/// Default time pumps get to stop after shutdown is requested.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(200);

// =============================================================================
// Configuration
// =============================================================================

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Address publishers connect to.
    pub upstream_address: String,
    /// Address subscribers connect to.
    pub downstream_address: String,
    /// Upper bound on waiting for pumps during `Draining`.
    pub grace_period: Duration,
}

impl SupervisorConfig {
    /// Create a configuration with the default grace period.
    #[must_use]
    pub fn new(upstream_address: impl Into<String>, downstream_address: impl Into<String>) -> Self {
        Self {
            upstream_address: upstream_address.into(),
            downstream_address: downstream_address.into(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Override the grace period.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

/// An endpoint could not be bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to bind {role} endpoint: {source}")]
pub struct StartupError {
    /// Endpoint that failed to bind.
    pub role: EndpointRole,
    /// Transport bind error.
    #[source]
    pub source: BindError,
}

/// Why the proxy stopped abnormally.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Binding failed; no pumps ran.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// A pump failed while running.
    #[error(transparent)]
    Pump(#[from] PumpFailure),

    /// A pump task panicked or was aborted.
    #[error("{direction} pump terminated abnormally: {reason}")]
    PumpPanicked {
        /// Direction of the failed pump.
        direction: Direction,
        /// Join error description.
        reason: String,
    },
}

impl ProxyError {
    /// Process exit status for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Startup(_) => 1,
            Self::Pump(_) | Self::PumpPanicked { .. } => 2,
        }
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Running pump task.
struct PumpTask {
    direction: Direction,
    handle: JoinHandle<PumpOutcome>,
    finished: bool,
}

impl PumpTask {
    fn spawn(pump: ForwardPump) -> Self {
        Self {
            direction: pump.direction(),
            handle: tokio::spawn(pump.run()),
            finished: false,
        }
    }

    /// Wait for the task if it has not been collected yet.
    async fn join(&mut self) -> Option<Result<PumpOutcome, JoinError>> {
        if self.finished {
            return None;
        }
        let joined = (&mut self.handle).await;
        self.finished = true;
        Some(joined)
    }
}

/// Owns the endpoints and runs the proxy lifecycle once.
pub struct ProxySupervisor {
    config: SupervisorConfig,
    upstream: SharedEndpoint,
    downstream: SharedEndpoint,
    shutdown: CancellationToken,
    status: Arc<ProxyStatus>,
}

impl ProxySupervisor {
    /// Create a supervisor over two unbound endpoints.
    ///
    /// Cancelling `shutdown` from anywhere requests a graceful stop.
    #[must_use]
    pub fn new(
        config: SupervisorConfig,
        upstream: SharedEndpoint,
        downstream: SharedEndpoint,
        shutdown: CancellationToken,
        status: Arc<ProxyStatus>,
    ) -> Self {
        Self {
            config,
            upstream,
            downstream,
            shutdown,
            status,
        }
    }

    /// Shared status handle.
    #[must_use]
    pub fn status(&self) -> Arc<ProxyStatus> {
        Arc::clone(&self.status)
    }

    /// Run until shutdown or the first pump failure, then tear down.
    ///
    /// Both endpoints are closed on every path.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Startup` if either endpoint fails to bind and
    /// `ProxyError::Pump` / `ProxyError::PumpPanicked` if a pump ends while
    /// the proxy is running.
    pub async fn run(self) -> Result<(), ProxyError> {
        if let Err(error) = self.bind_endpoints().await {
            self.status.transition(SupervisorState::Stopped);
            self.close_endpoints().await;
            return Err(error.into());
        }

        self.status.transition(SupervisorState::Running);
        tracing::info!(
            upstream = %self.display_address(EndpointRole::Upstream),
            downstream = %self.display_address(EndpointRole::Downstream),
            "Proxy listening"
        );

        let mut pumps = Direction::ALL.map(|direction| PumpTask::spawn(self.pump(direction)));

        let result = self.wait_for_trigger(&mut pumps).await;

        self.status.transition(SupervisorState::Draining);
        self.shutdown.cancel();
        tracing::info!("Shutting down proxy");

        self.drain(&mut pumps).await;

        self.status.transition(SupervisorState::Stopped);
        self.close_endpoints().await;
        for pump in &pumps {
            pump.handle.abort();
        }

        match &result {
            Ok(()) => tracing::info!("Proxy stopped"),
            Err(error) => tracing::error!(error = %error, "Proxy stopped on pump failure"),
        }
        result
    }

    async fn bind_endpoints(&self) -> Result<(), StartupError> {
        for (role, endpoint, address) in [
            (
                EndpointRole::Upstream,
                &self.upstream,
                &self.config.upstream_address,
            ),
            (
                EndpointRole::Downstream,
                &self.downstream,
                &self.config.downstream_address,
            ),
        ] {
            endpoint
                .listen(address)
                .await
                .map_err(|source| StartupError { role, source })?;
            let bound = endpoint.bound_address().unwrap_or_else(|| address.clone());
            tracing::debug!(%role, address = %bound, "Endpoint bound");
            self.status.set_bound_address(role, bound);
        }
        Ok(())
    }

    fn pump(&self, direction: Direction) -> ForwardPump {
        let (source, destination) = match direction {
            Direction::UpstreamToDownstream => (&self.upstream, &self.downstream),
            Direction::DownstreamToUpstream => (&self.downstream, &self.upstream),
        };
        ForwardPump::new(
            direction,
            Arc::clone(source),
            Arc::clone(destination),
            self.shutdown.clone(),
            Arc::clone(&self.status),
        )
    }

    /// Block until the shutdown token fires or either pump ends.
    async fn wait_for_trigger(&self, pumps: &mut [PumpTask; 2]) -> Result<(), ProxyError> {
        let [upstream_pump, downstream_pump] = pumps;

        let (direction, joined) = tokio::select! {
            () = self.shutdown.cancelled() => {
                tracing::debug!("Shutdown requested");
                return Ok(());
            }
            joined = &mut upstream_pump.handle => {
                upstream_pump.finished = true;
                (upstream_pump.direction, joined)
            }
            joined = &mut downstream_pump.handle => {
                downstream_pump.finished = true;
                (downstream_pump.direction, joined)
            }
        };

        match joined {
            Ok(PumpOutcome::Failed(failure)) => Err(ProxyError::Pump(failure)),
            // Only reachable if the token fired in the same poll.
            Ok(PumpOutcome::Stopped) => Ok(()),
            Err(join_error) => Err(ProxyError::PumpPanicked {
                direction,
                reason: join_error.to_string(),
            }),
        }
    }

    /// Give remaining pumps the grace period to observe cancellation.
    async fn drain(&self, pumps: &mut [PumpTask; 2]) {
        let grace_period = self.config.grace_period;
        let wait_all = async {
            for pump in pumps.iter_mut() {
                let direction = pump.direction;
                match pump.join().await {
                    Some(Ok(PumpOutcome::Stopped)) | None => {}
                    Some(Ok(PumpOutcome::Failed(failure))) => {
                        tracing::warn!(%direction, error = %failure, "Pump failed while draining");
                    }
                    Some(Err(join_error)) => {
                        tracing::warn!(%direction, error = %join_error, "Pump terminated abnormally while draining");
                    }
                }
            }
        };

        if tokio::time::timeout(grace_period, wait_all).await.is_err() {
            tracing::warn!(
                grace_ms = u64::try_from(grace_period.as_millis()).unwrap_or(u64::MAX),
                "Pumps still busy after grace period, closing endpoints anyway"
            );
        }
    }

    /// Close upstream then downstream; a failure on one does not skip the other.
    async fn close_endpoints(&self) {
        for (role, endpoint) in [
            (EndpointRole::Upstream, &self.upstream),
            (EndpointRole::Downstream, &self.downstream),
        ] {
            if let Err(error) = endpoint.close().await {
                tracing::warn!(%role, error = %error, "Failed to close endpoint");
            }
        }
    }

    fn display_address(&self, role: EndpointRole) -> String {
        self.status.bound_address(role).unwrap_or_else(|| match role {
            EndpointRole::Upstream => self.config.upstream_address.clone(),
            EndpointRole::Downstream => self.config.downstream_address.clone(),
        })
    }
}
