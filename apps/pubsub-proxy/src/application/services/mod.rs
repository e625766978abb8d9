//! Application Services
//!
//! Services that orchestrate the relay over the endpoint port.
//!
//! - `ForwardPump`: one-direction receive→send loop
//! - `ProxySupervisor`: binds endpoints, runs both pumps, tears down
//! - `ProxyStatus`: shared lifecycle state and relay counters

pub mod pump;
pub mod status;
pub mod supervisor;

pub use pump::{ForwardPump, PumpFailure, PumpOutcome};
pub use status::{DirectionSnapshot, DirectionStats, ProxyStatus, StatusSnapshot};
pub use supervisor::{
    DEFAULT_GRACE_PERIOD, ProxyError, ProxySupervisor, StartupError, SupervisorConfig,
};
