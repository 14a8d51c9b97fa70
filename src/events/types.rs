use crate::ledger::{Direction, FullRecord};
use chrono::{DateTime, Utc};

/// A validated internal event, ready for routing.
///
/// Each variant carries the stable key its source reports (request id,
/// socket id, or nothing) and a UTC timestamp. Timestamps are payload
/// metadata: routing decisions are made by processing order, never by
/// comparing timestamps, except inside the URL+time proximity match.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    LifecycleStarted {
        request_id: String,
        url: String,
        method: String,
        at: DateTime<Utc>,
    },
    LifecycleCompleted {
        request_id: String,
        status: u16,
        at: DateTime<Utc>,
    },
    LifecycleFailed {
        request_id: String,
        error: String,
        at: DateTime<Utc>,
    },
    FullRecord(FullRecord),
    SocketConnect {
        socket_id: String,
        url: String,
        at: DateTime<Utc>,
    },
    SocketFrame {
        socket_id: String,
        direction: Direction,
        payload: String,
        at: DateTime<Utc>,
    },
    SocketClose {
        socket_id: String,
        at: DateTime<Utc>,
    },
    Navigation {
        at: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// The event's own timestamp, used for orphan-buffer expiry sweeps.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            MonitorEvent::LifecycleStarted { at, .. }
            | MonitorEvent::LifecycleCompleted { at, .. }
            | MonitorEvent::LifecycleFailed { at, .. }
            | MonitorEvent::SocketConnect { at, .. }
            | MonitorEvent::SocketFrame { at, .. }
            | MonitorEvent::SocketClose { at, .. }
            | MonitorEvent::Navigation { at } => *at,
            MonitorEvent::FullRecord(record) => record.started_at,
        }
    }
}
