//! # relay-core
//!
//! Core crate for AgentRelay. Contains the capability traits the
//! reliability layer consumes (send / connect / lookup), configuration
//! schemas, the typed connection identifier, and the unified error system.
//!
//! This crate has **no** internal dependencies on other AgentRelay crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod result;
pub mod traits;
pub mod types;

pub use error::RelayError;
pub use result::RelayResult;
pub use types::id::ConnectionId;
