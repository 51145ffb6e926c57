//! Detection of drift between the transport's authoritative connection
//! state and this subsystem's cached belief.

pub mod checkpoint;
pub mod synchronizer;

pub use checkpoint::{StateCheckpoint, SyncEvent, SyncEventHandler, SyncStats, SyncStatus};
pub use synchronizer::StateSynchronizer;
