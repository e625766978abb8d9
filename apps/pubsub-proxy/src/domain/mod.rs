//! Domain Layer - Core relay types and state machine.
//!
//! This layer contains the message model and the relay vocabulary
//! (directions, pump outcomes, supervisor states) with no transport
//! dependencies.

/// Multi-frame message model.
pub mod message;

/// Relay directions, pump outcomes and supervisor lifecycle states.
pub mod relay;
