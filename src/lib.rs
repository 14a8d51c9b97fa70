//! netlens: an in-memory network activity capture engine.
//!
//! Three independently-timed event sources (request lifecycle notifications,
//! late full transfer records, socket frames) are merged into one
//! deduplicated, causally-ordered list of calls, partitioned into sessions
//! at navigation boundaries. Consumers read immutable snapshots that never
//! observe a partially-applied merge.

pub mod configuration;
pub mod correlator;
pub mod engine;
pub mod error_handling;
pub mod events;
pub mod ledger;
pub mod session_management;
pub mod snapshot;
pub mod web_interface;

pub use configuration::Config;
pub use engine::{CaptureEngine, EngineHandle};
pub use snapshot::{MonitorView, SnapshotReader};
