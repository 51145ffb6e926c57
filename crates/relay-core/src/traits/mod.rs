//! Capability traits injected by the surrounding system.
//!
//! The reliability layer never owns the transport socket; it consumes an
//! already-open logical connection through these seams.

pub mod connector;
pub mod lookup;
pub mod sink;

pub use connector::Connector;
pub use lookup::{ConnectionLookup, TransportInfo};
pub use sink::EnvelopeSink;
