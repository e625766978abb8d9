//! In-Memory Endpoint Adapter
//!
//! Channel-backed endpoints living on a shared in-process network. Each bound
//! address has a peer handle standing in for the remote side: the peer injects
//! messages the endpoint will receive and collects what the endpoint sends.
//!
//! # Example
//!
//! ```rust
//! use pubsub_proxy::application::ports::EndpointPort;
//! use pubsub_proxy::domain::message::Message;
//! use pubsub_proxy::infrastructure::memory::MemoryNetwork;
//!
//! # tokio_test::block_on(async {
//! let network = MemoryNetwork::new();
//! let endpoint = network.endpoint();
//! endpoint.listen("mem://events").await.unwrap();
//!
//! let peer = network.peer("mem://events").unwrap();
//! peer.inject(Message::single(b"hello".to_vec()));
//! assert_eq!(endpoint.receive().await.unwrap(), Message::single(b"hello".to_vec()));
//! # });
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BindError, EndpointPort, TransportError};
use crate::domain::message::Message;

type Inbound = Result<Message, TransportError>;

/// In-process address registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    links: Arc<Mutex<HashMap<String, MemoryPeer>>>,
}

impl MemoryNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unbound endpoint on this network.
    #[must_use]
    pub fn endpoint(&self) -> MemoryEndpoint {
        MemoryEndpoint {
            network: self.clone(),
            bound: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Remote-side handle for a bound address.
    #[must_use]
    pub fn peer(&self, address: &str) -> Option<MemoryPeer> {
        self.links.lock().get(address).cloned()
    }

    /// Whether an endpoint currently listens on `address`.
    #[must_use]
    pub fn is_bound(&self, address: &str) -> bool {
        self.links.lock().contains_key(address)
    }

    fn release(&self, address: &str) {
        self.links.lock().remove(address);
    }
}

/// The remote side of a bound in-memory endpoint.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    outbound_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Message>>>,
    delivered: Arc<AtomicUsize>,
}

impl MemoryPeer {
    /// Queue a message for the endpoint to receive.
    pub fn inject(&self, message: Message) {
        let _ = self.inbound_tx.send(Ok(message));
    }

    /// Make the endpoint's next receive fail.
    pub fn break_link(&self, reason: &str) {
        let _ = self.inbound_tx.send(Err(TransportError::broken(reason)));
    }

    /// Next message the endpoint sent, in order.
    ///
    /// Returns `None` once the endpoint is gone and everything was read.
    pub async fn next_delivered(&self) -> Option<Message> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Messages the endpoint has sent so far.
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Bound {
    address: String,
    inbound_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Inbound>>>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    delivered: Arc<AtomicUsize>,
}

/// Channel-backed endpoint.
#[derive(Debug)]
pub struct MemoryEndpoint {
    network: MemoryNetwork,
    bound: Mutex<Option<Bound>>,
    closed: CancellationToken,
}

#[async_trait]
impl EndpointPort for MemoryEndpoint {
    async fn listen(&self, address: &str) -> Result<(), BindError> {
        let mut bound = self.bound.lock();
        if let Some(existing) = bound.as_ref() {
            return Err(BindError::AlreadyListening {
                address: existing.address.clone(),
            });
        }
        if address.is_empty() {
            return Err(BindError::InvalidAddress {
                address: address.to_string(),
                reason: "empty address".to_string(),
            });
        }

        let mut links = self.network.links.lock();
        if links.contains_key(address) {
            return Err(BindError::AddressInUse {
                address: address.to_string(),
            });
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let delivered = Arc::new(AtomicUsize::new(0));

        links.insert(
            address.to_string(),
            MemoryPeer {
                inbound_tx,
                outbound_rx: Arc::new(AsyncMutex::new(outbound_rx)),
                delivered: Arc::clone(&delivered),
            },
        );
        *bound = Some(Bound {
            address: address.to_string(),
            inbound_rx: Arc::new(AsyncMutex::new(inbound_rx)),
            outbound_tx,
            delivered,
        });
        Ok(())
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let inbound = self
            .bound
            .lock()
            .as_ref()
            .map(|bound| Arc::clone(&bound.inbound_rx))
            .ok_or(TransportError::NotBound)?;

        let mut rx = tokio::select! {
            () = self.closed.cancelled() => return Err(TransportError::Closed),
            rx = inbound.lock() => rx,
        };

        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(TransportError::Closed),
            next = rx.recv() => next.unwrap_or(Err(TransportError::Closed)),
        }
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let bound = self.bound.lock();
        let bound = bound.as_ref().ok_or(TransportError::NotBound)?;
        bound
            .outbound_tx
            .send(message)
            .map_err(|_| TransportError::Closed)?;
        bound.delivered.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();
        if let Some(bound) = self.bound.lock().as_ref() {
            self.network.release(&bound.address);
        }
        Ok(())
    }

    fn bound_address(&self) -> Option<String> {
        self.bound
            .lock()
            .as_ref()
            .map(|bound| bound.address.clone())
    }
}
