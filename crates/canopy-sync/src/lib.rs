//! Bidirectional synchronization between a canopy [`Document`] and a `yrs`
//! CRDT document.
//!
//! The CRDT side stores the graph flattened: a top-level map holds `root`
//! (a node pointer) and `types` (one record per reachable node, keyed by
//! id). Node references inside records are `{"$$typeId": id}` maps.
//!
//! [`Document`]: canopy_types::Document

pub mod convert;
mod error;
mod inbound;
mod options;
mod outbound;
mod provider;
pub mod snapshot;

pub use error::SyncError;
pub use options::SyncOptions;
pub use provider::{SyncPhase, SyncProvider};
