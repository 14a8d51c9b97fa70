//! Routes normalized events into the ledger and session timeline.
//!
//! ```text
//! ┌──────────────┐    ┌────────────────┐    ┌─────────────────┐
//! │ MonitorEvent │───▶│ Correlator     │───▶│ CallLedger      │
//! │ (normalized) │    │                │    │ SessionManager  │
//! └──────────────┘    │ - key matching │    └─────────────────┘
//!                     │ - proximity    │
//!                     │ - nav fencing  │
//!                     └────────────────┘
//! ```
//!
//! The correlator owns the ledger, the session manager, and the health
//! counters, and is the only writer of all three. Every mutation goes
//! through [`Correlator::apply`] (or the consumer commands `toggle_open` /
//! `reset`), which the engine serializes under one lock.

use crate::configuration::EngineSettings;
use crate::events::MonitorEvent;
use crate::ledger::{Call, CallLedger, CallStatus, LedgerKey};
use crate::session_management::SessionManager;
use crate::snapshot::{CaptureStats, MonitorView, SessionView};
use chrono::{Duration, Utc};
use log::{debug, trace};
use uuid::Uuid;

pub struct Correlator {
    ledger: CallLedger,
    sessions: SessionManager,
    stats: CaptureStats,
    orphan_grace: Duration,
}

impl Correlator {
    pub fn new(settings: &EngineSettings) -> Correlator {
        Correlator {
            ledger: CallLedger::new(Duration::milliseconds(settings.proximity_window_ms as i64)),
            sessions: SessionManager::new(settings.max_sessions, Utc::now()),
            stats: CaptureStats::default(),
            orphan_grace: Duration::milliseconds(settings.orphan_grace_ms as i64),
        }
    }

    /// Applies one event. Never fails: malformed input was already rejected
    /// by the normalizer, and every remaining anomaly (unknown ids, ambiguous
    /// matches, orphan frames) degrades into counters or minimal calls.
    pub fn apply(&mut self, event: MonitorEvent) {
        self.ledger
            .sweep_orphans(event.at(), self.orphan_grace, &mut self.stats);

        match event {
            MonitorEvent::LifecycleStarted {
                request_id,
                url,
                method,
                at,
            } => {
                let (call_id, created) = self.ledger.upsert_by_key(
                    LedgerKey::Request(&request_id),
                    || Call::pending_http(url.clone(), method.clone(), at),
                    |call| {
                        // Backfill a minimal call created by an out-of-order
                        // Completed/Failed for the same request id.
                        if call.url.is_empty() {
                            call.url = url.clone();
                            call.method = method.clone();
                            call.started_at = at;
                        }
                    },
                );
                if created {
                    trace!("request {} started: {} {}", request_id, method, url);
                    let active = self.sessions.active_mut();
                    active.push_call(call_id);
                    active.index_url(&url, call_id);
                }
            }
            MonitorEvent::LifecycleCompleted {
                request_id,
                status,
                at,
            } => {
                let (call_id, created) = self.ledger.upsert_by_key(
                    LedgerKey::Request(&request_id),
                    // Completed raced ahead of its Started (or Started was
                    // dropped): record what we know instead of erroring.
                    || Call::pending_http(String::new(), String::new(), at),
                    |call| {
                        call.status = CallStatus::Done(status);
                        call.finished_at = Some(at);
                    },
                );
                if created {
                    debug!("completion for unseen request {}, minimal call created", request_id);
                    self.sessions.active_mut().push_call(call_id);
                }
            }
            MonitorEvent::LifecycleFailed {
                request_id,
                error,
                at,
            } => {
                let (call_id, created) = self.ledger.upsert_by_key(
                    LedgerKey::Request(&request_id),
                    || Call::pending_http(String::new(), String::new(), at),
                    |call| {
                        call.status = CallStatus::Failed;
                        call.error = Some(error.clone());
                        call.finished_at = Some(at);
                    },
                );
                if created {
                    debug!("failure for unseen request {}, minimal call created", request_id);
                    self.sessions.active_mut().push_call(call_id);
                }
            }
            MonitorEvent::FullRecord(record) => {
                self.ledger.merge_full_record(
                    record,
                    self.sessions.active_mut(),
                    &mut self.stats,
                );
            }
            MonitorEvent::SocketConnect { socket_id, url, at } => {
                if self.ledger.lookup(LedgerKey::Socket(&socket_id)).is_some() {
                    trace!("duplicate connect for socket {}", socket_id);
                    return;
                }
                let call_id = self.ledger.register_socket(&socket_id, Call::socket(url, at));
                self.sessions.active_mut().push_call(call_id);
            }
            MonitorEvent::SocketFrame {
                socket_id,
                direction,
                payload,
                at,
            } => {
                // Routed by socket id alone: a socket opened before a
                // navigation keeps collecting frames in its original session.
                self.ledger
                    .append_frame(&socket_id, direction, payload, at, &mut self.stats);
            }
            MonitorEvent::SocketClose { socket_id, at } => {
                self.ledger.close_socket(&socket_id, at, &mut self.stats);
            }
            MonitorEvent::Navigation { at } => {
                if let Some(evicted) = self.sessions.begin_session(at) {
                    self.ledger.remove_session_calls(&evicted);
                    self.stats.sessions_evicted += 1;
                }
            }
        }
    }

    /// Consumer command: flip a session's expand state.
    pub fn toggle_open(&mut self, session_id: Uuid) -> bool {
        self.sessions.toggle_open(session_id)
    }

    /// Consumer command: discard everything and start over with a single
    /// empty open session. Counters restart from zero.
    pub fn reset(&mut self) {
        self.ledger.reset();
        self.sessions.reset(Utc::now());
        self.stats = CaptureStats::default();
    }

    pub fn note_decode_error(&mut self) {
        self.stats.decode_errors += 1;
    }

    pub fn note_dropped(&mut self, count: u64) {
        self.stats.events_dropped += count;
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Builds the consumer view: sessions newest first, calls newest first,
    /// call data shared with the ledger by reference count.
    pub fn view(&self) -> MonitorView {
        let sessions = self
            .sessions
            .sessions()
            .iter()
            .map(|session| SessionView {
                id: session.id,
                started_at: session.started_at,
                is_open: session.is_open,
                calls: session
                    .call_ids()
                    .iter()
                    .filter_map(|call_id| self.ledger.get(call_id).cloned())
                    .collect(),
            })
            .collect();
        MonitorView {
            generated_at: Utc::now(),
            sessions,
            stats: self.stats,
        }
    }
}
