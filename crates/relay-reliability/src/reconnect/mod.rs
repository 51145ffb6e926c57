//! Exponential-backoff reconnection per connection, with a global
//! registry across connections.

pub mod backoff;
pub mod manager;
pub mod registry;
pub mod types;

pub use manager::ReconnectionManager;
pub use registry::{GlobalReconnectionManager, GlobalReconnectionStatus};
pub use types::{
    ReconnectObserver, ReconnectState, ReconnectionAttempt, ReconnectionMetrics,
    ReconnectionStatus,
};
