//! Forward Pump
//!
//! A unidirectional relay loop: receive a message from the source endpoint,
//! send it unmodified to the destination endpoint, repeat. The same pump
//! runs in both directions; only the endpoint assignment differs.
//!
//! # Contract
//!
//! - One message in flight: a received message is sent before the next
//!   `receive()` starts.
//! - The first error from either call ends the pump. No retry.
//! - Shutdown is honored only between relays. A message that was already
//!   received is always offered to the destination first.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::status::ProxyStatus;
use crate::application::ports::{SharedEndpoint, TransportError};
use crate::domain::relay::{Direction, EndpointRole, RelayOperation};
use crate::infrastructure::metrics;

/// How a pump ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Shutdown was observed between relays.
    Stopped,
    /// A receive or send failed.
    Failed(PumpFailure),
}

/// Terminal failure of a pump.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{direction} pump failed to {operation} on {endpoint} endpoint ({address}): {error}")]
pub struct PumpFailure {
    /// Direction of the failed pump.
    pub direction: Direction,
    /// Call that failed.
    pub operation: RelayOperation,
    /// Endpoint the call was made on.
    pub endpoint: EndpointRole,
    /// Address of that endpoint.
    pub address: String,
    /// Transport error.
    #[source]
    pub error: TransportError,
}

/// Relay loop for one direction.
pub struct ForwardPump {
    direction: Direction,
    source: SharedEndpoint,
    destination: SharedEndpoint,
    shutdown: CancellationToken,
    status: Arc<ProxyStatus>,
}

impl ForwardPump {
    /// Create a pump relaying `source` into `destination`.
    #[must_use]
    pub fn new(
        direction: Direction,
        source: SharedEndpoint,
        destination: SharedEndpoint,
        shutdown: CancellationToken,
        status: Arc<ProxyStatus>,
    ) -> Self {
        Self {
            direction,
            source,
            destination,
            shutdown,
            status,
        }
    }

    /// Direction this pump relays.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Relay until shutdown or the first failure.
    #[tracing::instrument(name = "pump", skip_all, fields(direction = %self.direction))]
    pub async fn run(self) -> PumpOutcome {
        tracing::debug!("Pump started");

        loop {
            let received = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    tracing::debug!("Pump observed shutdown");
                    return PumpOutcome::Stopped;
                }
                received = self.source.receive() => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(error) => return self.fail(RelayOperation::Receive, error),
            };

            let frames = message.frame_count();
            let bytes = message.byte_len();

            // Not raced against shutdown: a received message is always sent.
            if let Err(error) = self.destination.send(message).await {
                return self.fail(RelayOperation::Send, error);
            }

            self.status.record_relay(self.direction, frames, bytes);
            tracing::trace!(frames, bytes, "Relayed message");
        }
    }

    fn fail(&self, operation: RelayOperation, error: TransportError) -> PumpOutcome {
        let (endpoint, handle) = match operation {
            RelayOperation::Receive => (self.direction.source(), &self.source),
            RelayOperation::Send => (self.direction.destination(), &self.destination),
        };

        let failure = PumpFailure {
            direction: self.direction,
            operation,
            endpoint,
            address: handle
                .bound_address()
                .unwrap_or_else(|| "unbound".to_string()),
            error,
        };

        metrics::record_pump_failure(self.direction, operation);
        self.status.record_failure(self.direction, failure.to_string());
        tracing::debug!(%operation, %endpoint, error = %failure.error, "Pump stopped on error");

        PumpOutcome::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::ports::EndpointPort;
    use crate::domain::message::Message;
    use crate::infrastructure::memory::MemoryNetwork;

    async fn bound_pair(network: &MemoryNetwork) -> (SharedEndpoint, SharedEndpoint) {
        let source = network.endpoint();
        let destination = network.endpoint();
        source.listen("mem://source").await.unwrap();
        destination.listen("mem://destination").await.unwrap();
        (Arc::new(source), Arc::new(destination))
    }

    #[tokio::test]
    async fn relays_frames_unchanged_and_in_order() {
        let network = MemoryNetwork::new();
        let (source, destination) = bound_pair(&network).await;
        let publisher = network.peer("mem://source").unwrap();
        let subscriber = network.peer("mem://destination").unwrap();
        let shutdown = CancellationToken::new();
        let status = Arc::new(ProxyStatus::new());

        let pump = ForwardPump::new(
            Direction::UpstreamToDownstream,
            source,
            destination,
            shutdown.clone(),
            Arc::clone(&status),
        );
        let handle = tokio::spawn(pump.run());

        let first = Message::from_frames(vec![b"weather".to_vec(), b"sunny".to_vec()]).unwrap();
        let second = Message::from_frames(vec![b"news".to_vec(), vec![], vec![0xff; 64]]).unwrap();
        publisher.inject(first.clone());
        publisher.inject(second.clone());

        assert_eq!(subscriber.next_delivered().await, Some(first));
        assert_eq!(subscriber.next_delivered().await, Some(second));

        shutdown.cancel();
        assert_eq!(handle.await.unwrap(), PumpOutcome::Stopped);

        let stats = status.direction(Direction::UpstreamToDownstream);
        assert_eq!(stats.messages(), 2);
        assert_eq!(stats.frames(), 5);
    }

    #[tokio::test]
    async fn receive_failure_names_source_endpoint() {
        let network = MemoryNetwork::new();
        let (source, destination) = bound_pair(&network).await;
        let subscriber = network.peer("mem://source").unwrap();

        let pump = ForwardPump::new(
            Direction::DownstreamToUpstream,
            source,
            destination,
            CancellationToken::new(),
            Arc::new(ProxyStatus::new()),
        );

        subscriber.break_link("connection reset");

        let outcome = tokio::time::timeout(Duration::from_secs(1), pump.run())
            .await
            .unwrap();
        let PumpOutcome::Failed(failure) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failure.operation, RelayOperation::Receive);
        assert_eq!(failure.endpoint, EndpointRole::Downstream);
        assert_eq!(failure.address, "mem://source");
        assert_eq!(failure.error, TransportError::broken("connection reset"));
    }

    #[tokio::test]
    async fn send_failure_names_destination_endpoint() {
        let network = MemoryNetwork::new();
        let (source, destination) = bound_pair(&network).await;
        let publisher = network.peer("mem://source").unwrap();
        destination.close().await.unwrap();

        let status = Arc::new(ProxyStatus::new());
        let pump = ForwardPump::new(
            Direction::UpstreamToDownstream,
            source,
            destination,
            CancellationToken::new(),
            Arc::clone(&status),
        );

        publisher.inject(Message::single(b"tick".to_vec()));

        let outcome = tokio::time::timeout(Duration::from_secs(1), pump.run())
            .await
            .unwrap();
        let PumpOutcome::Failed(failure) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failure.operation, RelayOperation::Send);
        assert_eq!(failure.endpoint, EndpointRole::Downstream);
        assert_eq!(failure.error, TransportError::Closed);
        assert!(
            status
                .direction(Direction::UpstreamToDownstream)
                .last_error()
                .unwrap()
                .contains("send")
        );
    }

    #[tokio::test]
    async fn cancelled_before_receive_stops_without_error() {
        let network = MemoryNetwork::new();
        let (source, destination) = bound_pair(&network).await;
        let publisher = network.peer("mem://source").unwrap();
        let subscriber = network.peer("mem://destination").unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        publisher.inject(Message::single(b"late".to_vec()));

        let pump = ForwardPump::new(
            Direction::UpstreamToDownstream,
            source,
            destination,
            shutdown,
            Arc::new(ProxyStatus::new()),
        );

        assert_eq!(pump.run().await, PumpOutcome::Stopped);
        assert_eq!(subscriber.delivered_count(), 0);
    }
}
