//! ZeroMQ Endpoint Adapter
//!
//! Implements `EndpointPort` over libzmq sockets: XSUB facing publishers and
//! XPUB facing subscribers, or ROUTER/DEALER for the request/reply broker.
//!
//! # Threading
//!
//! A zmq socket must never be used from two threads at once, but the proxy
//! receives on an endpoint from one pump while the other pump sends on it.
//! Each bound socket is therefore owned by a dedicated I/O thread:
//!
//! ```text
//!  receive() ◄── inbound channel (capacity 1) ◄──┐
//!                                                ├── I/O thread ◄──► zmq socket
//!  send() ──► outbound queue ──► wake (inproc) ──┘
//! ```
//!
//! The I/O thread only reads from the socket while the inbound channel has
//! room, so it never blocks on a slow pump and keeps servicing sends.

use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{BindError, EndpointPort, TransportError};
use crate::domain::message::Message;
use crate::domain::relay::EndpointRole;
use crate::infrastructure::config::{ProxyTopology, TransportSettings};

/// How long the I/O thread sleeps in `poll` before rechecking for close.
const POLL_TIMEOUT_MS: i64 = 100;

type Inbound = Result<Message, TransportError>;

/// Socket options applied before binding.
#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    /// Send and receive high-water mark.
    pub high_water_mark: i32,
    /// Forward every subscription on XPUB sockets.
    pub xpub_verbose: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            high_water_mark: 1000,
            xpub_verbose: false,
        }
    }
}

impl From<&TransportSettings> for SocketOptions {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            high_water_mark: settings.high_water_mark,
            xpub_verbose: settings.xpub_verbose,
        }
    }
}

/// Socket type used for an endpoint role in a topology.
#[must_use]
pub const fn socket_type(topology: ProxyTopology, role: EndpointRole) -> zmq::SocketType {
    match (topology, role) {
        (ProxyTopology::PubSub, EndpointRole::Upstream) => zmq::XSUB,
        (ProxyTopology::PubSub, EndpointRole::Downstream) => zmq::XPUB,
        (ProxyTopology::RequestReply, EndpointRole::Upstream) => zmq::ROUTER,
        (ProxyTopology::RequestReply, EndpointRole::Downstream) => zmq::DEALER,
    }
}

// =============================================================================
// Endpoint
// =============================================================================

/// A send request waiting for the I/O thread.
struct Outbound {
    message: Message,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

/// Wakes the I/O thread out of `poll`.
struct Waker {
    socket: Mutex<zmq::Socket>,
}

impl Waker {
    fn wake(&self) {
        // A full pipe already holds a pending wake-up.
        let _ = self.socket.lock().send("", zmq::DONTWAIT);
    }
}

/// State created by a successful `listen`.
struct Connection {
    address: String,
    inbound: Arc<AsyncMutex<mpsc::Receiver<Inbound>>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    waker: Arc<Waker>,
    io_thread: Option<JoinHandle<()>>,
}

/// ZeroMQ-backed endpoint.
pub struct ZmqEndpoint {
    context: zmq::Context,
    socket_type: zmq::SocketType,
    options: SocketOptions,
    connection: Mutex<Option<Connection>>,
    closed: CancellationToken,
}

impl std::fmt::Debug for ZmqEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZmqEndpoint")
            .field("socket_type", &self.socket_type)
            .field("address", &self.bound_address())
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ZmqEndpoint {
    /// Create an unbound endpoint of the given socket type.
    #[must_use]
    pub fn new(context: zmq::Context, socket_type: zmq::SocketType, options: SocketOptions) -> Self {
        Self {
            context,
            socket_type,
            options,
            connection: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Create the endpoint for one side of a topology.
    #[must_use]
    pub fn for_role(
        context: zmq::Context,
        topology: ProxyTopology,
        role: EndpointRole,
        options: SocketOptions,
    ) -> Self {
        Self::new(context, socket_type(topology, role), options)
    }

    fn open_socket(&self) -> Result<zmq::Socket, zmq::Error> {
        let socket = self.context.socket(self.socket_type)?;
        socket.set_linger(0)?;
        socket.set_sndhwm(self.options.high_water_mark)?;
        socket.set_rcvhwm(self.options.high_water_mark)?;
        if self.socket_type == zmq::XPUB && self.options.xpub_verbose {
            socket.set_xpub_verbose(true)?;
        }
        Ok(socket)
    }

    /// Inproc PAIR sockets: the bound end goes to the I/O thread.
    fn open_wake_pair(&self) -> Result<(zmq::Socket, zmq::Socket), zmq::Error> {
        let address = format!("inproc://pubsub-proxy-wake-{}", Uuid::new_v4());
        let receiver = self.context.socket(zmq::PAIR)?;
        receiver.set_linger(0)?;
        receiver.bind(&address)?;
        let sender = self.context.socket(zmq::PAIR)?;
        sender.set_linger(0)?;
        sender.connect(&address)?;
        Ok((receiver, sender))
    }

    fn handles(&self) -> Result<(Arc<AsyncMutex<mpsc::Receiver<Inbound>>>, Arc<Waker>), TransportError> {
        self.connection
            .lock()
            .as_ref()
            .map(|conn| (Arc::clone(&conn.inbound), Arc::clone(&conn.waker)))
            .ok_or(TransportError::NotBound)
    }
}

#[async_trait]
impl EndpointPort for ZmqEndpoint {
    async fn listen(&self, address: &str) -> Result<(), BindError> {
        let mut connection = self.connection.lock();
        if let Some(existing) = connection.as_ref() {
            return Err(BindError::AlreadyListening {
                address: existing.address.clone(),
            });
        }
        let failed = |error: zmq::Error| BindError::Failed {
            address: address.to_string(),
            reason: error.to_string(),
        };
        if self.closed.is_cancelled() {
            return Err(BindError::Failed {
                address: address.to_string(),
                reason: "endpoint closed".to_string(),
            });
        }

        let socket = self.open_socket().map_err(failed)?;
        socket
            .bind(address)
            .map_err(|error| bind_error(address, error))?;
        let resolved = socket
            .get_last_endpoint()
            .ok()
            .and_then(Result::ok)
            .unwrap_or_else(|| address.to_string());

        let (wake_rx, wake_tx) = self.open_wake_pair().map_err(failed)?;
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let io_loop = IoLoop {
            socket,
            wake: wake_rx,
            inbound: inbound_tx,
            outbound: outbound_rx,
            closed: self.closed.clone(),
        };
        let io_thread = std::thread::Builder::new()
            .name(format!("zmq-io-{:?}", self.socket_type).to_lowercase())
            .spawn(move || io_loop.run())
            .map_err(|error| BindError::Failed {
                address: address.to_string(),
                reason: error.to_string(),
            })?;

        tracing::debug!(address = %resolved, socket_type = ?self.socket_type, "ZeroMQ endpoint bound");
        *connection = Some(Connection {
            address: resolved,
            inbound: Arc::new(AsyncMutex::new(inbound_rx)),
            outbound: outbound_tx,
            waker: Arc::new(Waker {
                socket: Mutex::new(wake_tx),
            }),
            io_thread: Some(io_thread),
        });
        Ok(())
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let (inbound, waker) = self.handles()?;

        let mut rx = tokio::select! {
            () = self.closed.cancelled() => return Err(TransportError::Closed),
            rx = inbound.lock() => rx,
        };
        let next = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(TransportError::Closed),
            next = rx.recv() => next,
        };
        drop(rx);

        // Room in the inbound channel again: let the I/O thread read more.
        waker.wake();
        next.unwrap_or(Err(TransportError::Closed))
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let connection = self.connection.lock();
            let conn = connection.as_ref().ok_or(TransportError::NotBound)?;
            conn.outbound
                .send(Outbound {
                    message,
                    ack: ack_tx,
                })
                .map_err(|_| TransportError::Closed)?;
            conn.waker.wake();
        }
        ack_rx.await.unwrap_or(Err(TransportError::Closed))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();

        let io_thread = self.connection.lock().as_mut().and_then(|conn| {
            conn.waker.wake();
            conn.io_thread.take()
        });
        let Some(io_thread) = io_thread else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || io_thread.join())
            .await
            .map_err(TransportError::broken)?
            .map_err(|_| TransportError::broken("zmq I/O thread panicked"))
    }

    fn bound_address(&self) -> Option<String> {
        self.connection
            .lock()
            .as_ref()
            .map(|conn| conn.address.clone())
    }
}

fn bind_error(address: &str, error: zmq::Error) -> BindError {
    match error {
        zmq::Error::EADDRINUSE => BindError::AddressInUse {
            address: address.to_string(),
        },
        zmq::Error::EINVAL
        | zmq::Error::EPROTONOSUPPORT
        | zmq::Error::ENOCOMPATPROTO
        | zmq::Error::EADDRNOTAVAIL
        | zmq::Error::ENODEV => BindError::InvalidAddress {
            address: address.to_string(),
            reason: error.to_string(),
        },
        _ => BindError::Failed {
            address: address.to_string(),
            reason: error.to_string(),
        },
    }
}

// =============================================================================
// I/O Thread
// =============================================================================

/// Owns the zmq socket for its whole life.
struct IoLoop {
    socket: zmq::Socket,
    wake: zmq::Socket,
    inbound: mpsc::Sender<Inbound>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    closed: CancellationToken,
}

impl IoLoop {
    fn run(mut self) {
        let mut pending: Option<Outbound> = None;

        while !self.closed.is_cancelled() {
            if pending.is_none() {
                pending = self.outbound.try_recv().ok();
            }

            let mut events = zmq::PollEvents::empty();
            if self.inbound.capacity() > 0 {
                events |= zmq::POLLIN;
            }
            if pending.is_some() {
                events |= zmq::POLLOUT;
            }

            let mut items = [
                self.socket.as_poll_item(events),
                self.wake.as_poll_item(zmq::POLLIN),
            ];
            if let Err(error) = zmq::poll(&mut items, POLL_TIMEOUT_MS) {
                self.fail(error);
                break;
            }
            let readable = items[0].is_readable();
            let writable = items[0].is_writable();
            let woken = items[1].is_readable();

            if woken {
                while self.wake.recv_bytes(zmq::DONTWAIT).is_ok() {}
            }

            if writable && let Some(out) = pending.take() {
                let frames = out.message.frames().iter().map(Vec::as_slice);
                match self.socket.send_multipart(frames, zmq::DONTWAIT) {
                    Ok(()) => {
                        let _ = out.ack.send(Ok(()));
                    }
                    Err(zmq::Error::EAGAIN) => pending = Some(out),
                    Err(error) => {
                        let _ = out.ack.send(Err(TransportError::broken(error)));
                    }
                }
            }

            if readable {
                match self.socket.recv_multipart(zmq::DONTWAIT) {
                    Ok(frames) => {
                        if let Ok(message) = Message::from_frames(frames) {
                            let _ = self.inbound.try_send(Ok(message));
                        }
                    }
                    Err(zmq::Error::EAGAIN) => {}
                    Err(error) => {
                        self.fail(error);
                        break;
                    }
                }
            }
        }

        if let Some(out) = pending {
            let _ = out.ack.send(Err(TransportError::Closed));
        }
        self.outbound.close();
        while let Ok(out) = self.outbound.try_recv() {
            let _ = out.ack.send(Err(TransportError::Closed));
        }
        tracing::debug!("ZeroMQ I/O thread exiting");
    }

    fn fail(&self, error: zmq::Error) {
        tracing::debug!(error = %error, "ZeroMQ socket failed");
        let _ = self.inbound.try_send(Err(TransportError::broken(error)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_socket_types() {
        assert_eq!(
            socket_type(ProxyTopology::PubSub, EndpointRole::Upstream),
            zmq::XSUB
        );
        assert_eq!(
            socket_type(ProxyTopology::PubSub, EndpointRole::Downstream),
            zmq::XPUB
        );
        assert_eq!(
            socket_type(ProxyTopology::RequestReply, EndpointRole::Upstream),
            zmq::ROUTER
        );
        assert_eq!(
            socket_type(ProxyTopology::RequestReply, EndpointRole::Downstream),
            zmq::DEALER
        );
    }

    #[test]
    fn bind_errors_classified() {
        assert_eq!(
            bind_error("tcp://*:1", zmq::Error::EADDRINUSE),
            BindError::AddressInUse {
                address: "tcp://*:1".to_string()
            }
        );
        assert!(matches!(
            bind_error("nope", zmq::Error::EPROTONOSUPPORT),
            BindError::InvalidAddress { .. }
        ));
        assert!(matches!(
            bind_error("tcp://*:1", zmq::Error::EMFILE),
            BindError::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn duplicate_inproc_bind_is_address_in_use() {
        let context = zmq::Context::new();
        let first = ZmqEndpoint::new(context.clone(), zmq::XSUB, SocketOptions::default());
        let second = ZmqEndpoint::new(context, zmq::XSUB, SocketOptions::default());

        first.listen("inproc://dup-bind").await.unwrap();
        assert_eq!(
            second.listen("inproc://dup-bind").await,
            Err(BindError::AddressInUse {
                address: "inproc://dup-bind".to_string()
            })
        );

        first.close().await.unwrap();
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn unbound_endpoint_rejects_io_and_closes_cleanly() {
        let endpoint = ZmqEndpoint::new(zmq::Context::new(), zmq::XPUB, SocketOptions::default());
        assert_eq!(endpoint.receive().await, Err(TransportError::NotBound));
        endpoint.close().await.unwrap();
        endpoint.close().await.unwrap();
        assert_eq!(endpoint.receive().await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn close_unblocks_pending_receive() {
        let endpoint = Arc::new(ZmqEndpoint::new(
            zmq::Context::new(),
            zmq::XSUB,
            SocketOptions::default(),
        ));
        endpoint.listen("inproc://close-unblocks").await.unwrap();

        let waiter = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move { endpoint.receive().await })
        };
        tokio::task::yield_now().await;

        endpoint.close().await.unwrap();
        assert_eq!(waiter.await.unwrap(), Err(TransportError::Closed));
        assert_eq!(
            endpoint.send(Message::single(b"\x01".to_vec())).await,
            Err(TransportError::Closed)
        );
    }
}
