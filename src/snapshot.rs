//! Immutable, consumer-facing snapshots of the capture state.

pub mod publisher;
pub mod view;

pub use publisher::{channel, SnapshotPublisher, SnapshotReader};
pub use view::{CaptureStats, MonitorView, SessionView};
