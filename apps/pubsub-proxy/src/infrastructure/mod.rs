//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process plumbing around them.

/// ZeroMQ socket adapters (XSUB/XPUB, ROUTER/DEALER).
pub mod zeromq;

/// Channel-backed endpoints for tests and embedding.
pub mod memory;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
