use crate::ledger::Call;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Engine health counters surfaced to consumers.
///
/// These count conditions the engine absorbs rather than raises: undecodable
/// events, queue overflow, expired orphan frames, proximity-match tie-breaks,
/// and sessions evicted by the retention cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub decode_errors: u64,
    pub events_dropped: u64,
    pub orphan_frames_dropped: u64,
    pub ambiguous_matches: u64,
    pub sessions_evicted: u64,
}

/// One session as seen by consumers: calls newest first, shared with the
/// ledger via `Arc` so the snapshot stays cheap to build and immutable once
/// handed out.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub is_open: bool,
    pub calls: Vec<Arc<Call>>,
}

/// The full consumer view: sessions newest first.
///
/// Every mutation the engine applies is visible here in its entirety or not
/// at all; a view never contains a call with fields from two interleaved
/// merges.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorView {
    pub generated_at: DateTime<Utc>,
    pub sessions: Vec<SessionView>,
    pub stats: CaptureStats,
}

impl MonitorView {
    pub fn empty() -> MonitorView {
        MonitorView {
            generated_at: Utc::now(),
            sessions: Vec::new(),
            stats: CaptureStats::default(),
        }
    }

    pub fn total_calls(&self) -> usize {
        self.sessions.iter().map(|s| s.calls.len()).sum()
    }

    pub fn session(&self, session_id: Uuid) -> Option<&SessionView> {
        self.sessions.iter().find(|s| s.id == session_id)
    }
}
