//! Endpoint Port (Driven Port)
//!
//! Interface for a bound listening socket. The proxy holds two of these,
//! one facing publishers and one facing subscribers, and never looks at
//! the transport underneath.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::message::Message;

/// A listening endpoint the pumps receive from and send to.
///
/// Implementations are shared between the two pumps: one pump only ever
/// calls `receive`, the other only ever calls `send`, so the two methods
/// must be callable concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EndpointPort: Send + Sync {
    /// Bind the endpoint for incoming connections.
    ///
    /// Must be called exactly once, before any `receive` or `send`.
    async fn listen(&self, address: &str) -> Result<(), BindError>;

    /// Wait for the next message.
    ///
    /// Must be cancel safe: dropping the future before it completes never
    /// loses a message.
    async fn receive(&self) -> Result<Message, TransportError>;

    /// Hand a message to the transport, preserving frame order and count.
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Release the endpoint.
    ///
    /// Idempotent. Pending and later `receive`/`send` calls complete with
    /// `TransportError::Closed`.
    async fn close(&self) -> Result<(), TransportError>;

    /// The address actually bound, once `listen` succeeded.
    fn bound_address(&self) -> Option<String>;
}

/// Endpoint shared between the supervisor and the pumps.
pub type SharedEndpoint = Arc<dyn EndpointPort>;

/// Failure to bind an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// Another socket already listens on the address.
    #[error("address already in use: {address}")]
    AddressInUse {
        /// Requested address.
        address: String,
    },

    /// The transport cannot parse or use the address.
    #[error("invalid address {address}: {reason}")]
    InvalidAddress {
        /// Requested address.
        address: String,
        /// Transport explanation.
        reason: String,
    },

    /// `listen` was called a second time.
    #[error("endpoint already listening on {address}")]
    AlreadyListening {
        /// Address bound by the first call.
        address: String,
    },

    /// Any other transport failure while binding.
    #[error("failed to bind {address}: {reason}")]
    Failed {
        /// Requested address.
        address: String,
        /// Transport explanation.
        reason: String,
    },
}

/// Failure of `receive`, `send` or `close` on a bound endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint was closed.
    #[error("endpoint closed")]
    Closed,

    /// The endpoint was used before `listen` succeeded.
    #[error("endpoint not bound")]
    NotBound,

    /// The transport reported a failure.
    #[error("transport failure: {reason}")]
    Broken {
        /// Transport explanation.
        reason: String,
    },
}

impl TransportError {
    /// Build a `Broken` error from any displayable cause.
    pub fn broken(reason: impl std::fmt::Display) -> Self {
        Self::Broken {
            reason: reason.to_string(),
        }
    }
}
