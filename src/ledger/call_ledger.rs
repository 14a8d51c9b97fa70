//! The in-memory call store and its merge operations.
//!
//! The ledger is the only authoritative copy of call data. It is mutated
//! exclusively through the operations below, all of which run under the
//! engine's single-writer lock. Calls are held as `Arc<Call>` and mutated
//! through `Arc::make_mut`: a call shared with a published snapshot is
//! copied before the write, so handed-out views stay immutable.

use crate::ledger::call::{Call, CallStatus, Direction, Frame, FullRecord, Transport};
use crate::session_management::Session;
use crate::snapshot::CaptureStats;
use chrono::{DateTime, Duration, Utc};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Orphan-buffer bounds: at most this many distinct unknown socket ids, each
/// with at most this many buffered events. Overflow drops the oldest entry.
const MAX_ORPHAN_SOCKETS: usize = 64;
const MAX_ORPHANS_PER_SOCKET: usize = 256;

/// Exact-match key spaces used by lifecycle and socket events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKey<'a> {
    Request(&'a str),
    Socket(&'a str),
}

/// A frame or close that arrived before its socket's connect event.
#[derive(Debug, Clone)]
enum OrphanEvent {
    Frame {
        direction: Direction,
        payload: String,
        at: DateTime<Utc>,
    },
    Close {
        at: DateTime<Utc>,
    },
}

impl OrphanEvent {
    fn at(&self) -> DateTime<Utc> {
        match self {
            OrphanEvent::Frame { at, .. } => *at,
            OrphanEvent::Close { at } => *at,
        }
    }
}

pub struct CallLedger {
    calls: HashMap<Uuid, Arc<Call>>,
    /// Instrumentation request id -> call id. Global across sessions: late
    /// lifecycle events update the original call wherever it lives.
    request_ids: HashMap<String, Uuid>,
    /// Instrumentation socket id -> call id. Also global across sessions.
    socket_ids: HashMap<String, Uuid>,
    /// Events for socket ids with no connect seen yet, buffered until the
    /// grace window expires.
    orphans: HashMap<String, Vec<OrphanEvent>>,
    proximity_window: Duration,
}

impl CallLedger {
    pub fn new(proximity_window: Duration) -> CallLedger {
        CallLedger {
            calls: HashMap::new(),
            request_ids: HashMap::new(),
            socket_ids: HashMap::new(),
            orphans: HashMap::new(),
            proximity_window,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn get(&self, call_id: &Uuid) -> Option<&Arc<Call>> {
        self.calls.get(call_id)
    }

    pub fn lookup(&self, key: LedgerKey) -> Option<Uuid> {
        match key {
            LedgerKey::Request(request_id) => self.request_ids.get(request_id).copied(),
            LedgerKey::Socket(socket_id) => self.socket_ids.get(socket_id).copied(),
        }
    }

    /// Locates a call by exact key or creates one, then applies `mutate`.
    ///
    /// Returns the call id and whether a call was created. The created
    /// call's identity is preserved: a later upsert with the same key mutates
    /// the same call in place.
    pub fn upsert_by_key<C, M>(&mut self, key: LedgerKey, create: C, mutate: M) -> (Uuid, bool)
    where
        C: FnOnce() -> Call,
        M: FnOnce(&mut Call),
    {
        if let Some(call_id) = self.lookup(key) {
            if let Some(call) = self.calls.get_mut(&call_id) {
                mutate(Arc::make_mut(call));
                return (call_id, false);
            }
        }

        let mut call = create();
        mutate(&mut call);
        let call_id = call.id;
        self.calls.insert(call_id, Arc::new(call));
        match key {
            LedgerKey::Request(request_id) => {
                self.request_ids.insert(request_id.to_string(), call_id);
            }
            LedgerKey::Socket(socket_id) => {
                self.socket_ids.insert(socket_id.to_string(), call_id);
            }
        }
        (call_id, true)
    }

    /// Joins a late full transfer record to an existing call of the active
    /// session by URL and start-time proximity, or inserts it as a new call.
    ///
    /// Candidate selection prefers calls that do not yet hold a record, then
    /// the smallest timestamp distance, then the most recently indexed.
    /// When the matched call already holds a record, the record with the
    /// later start time keeps the slot and the other is re-inserted as a new
    /// call, so no data is silently discarded.
    pub fn merge_full_record(
        &mut self,
        record: FullRecord,
        active: &mut Session,
        stats: &mut CaptureStats,
    ) -> Uuid {
        match self.find_candidate(&record, active) {
            None => {
                trace!("no proximity match for {} {}", record.method, record.url);
                self.insert_record(record, active)
            }
            Some(call_id) => {
                let call = self
                    .calls
                    .get_mut(&call_id)
                    .map(Arc::make_mut)
                    .expect("candidate looked up from live index");
                if !call.has_full_record() {
                    debug!("record for {} merged into call {}", record.url, call_id);
                    call.apply_record(record);
                    return call_id;
                }

                // Two records matched the same slot inside the window.
                stats.ambiguous_matches += 1;
                let existing_started = call
                    .record_started_at
                    .expect("slot holds a record");
                if record.started_at >= existing_started {
                    let displaced = call
                        .extract_record()
                        .expect("slot holds a record");
                    call.apply_record(record);
                    debug!(
                        "call {} record displaced by a later one, re-inserting",
                        call_id
                    );
                    self.insert_record(displaced, active);
                    call_id
                } else {
                    debug!("record for {} loses tie-break, inserted as new call", record.url);
                    self.insert_record(record, active)
                }
            }
        }
    }

    fn insert_record(&mut self, record: FullRecord, active: &mut Session) -> Uuid {
        let call = Call::from_record(record);
        let call_id = call.id;
        let url = call.url.clone();
        self.calls.insert(call_id, Arc::new(call));
        active.push_call(call_id);
        active.index_url(&url, call_id);
        call_id
    }

    fn find_candidate(&self, record: &FullRecord, active: &Session) -> Option<Uuid> {
        let window_ms = self.proximity_window.num_milliseconds();
        let mut best: Option<(bool, i64, usize, Uuid)> = None;
        for (order, call_id) in active.candidates_for(&record.url).iter().enumerate() {
            let Some(call) = self.calls.get(call_id) else {
                continue;
            };
            if call.transport != Transport::Http {
                continue;
            }
            let delta = (call.started_at - record.started_at)
                .num_milliseconds()
                .abs();
            if delta > window_ms {
                continue;
            }
            let candidate = (call.has_full_record(), delta, order, *call_id);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    // Prefer record-free slots, then closer start times, then
                    // the most recently indexed candidate.
                    let better = (candidate.0, candidate.1) < (current.0, current.1)
                        || ((candidate.0, candidate.1) == (current.0, current.1)
                            && candidate.2 > current.2);
                    if better {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
        best.map(|(_, _, _, call_id)| call_id)
    }

    /// Registers a socket call under its instrumentation id and replays any
    /// events buffered while the connect was in flight.
    pub fn register_socket(&mut self, socket_id: &str, call: Call) -> Uuid {
        let call_id = call.id;
        self.calls.insert(call_id, Arc::new(call));
        self.socket_ids.insert(socket_id.to_string(), call_id);

        if let Some(buffered) = self.orphans.remove(socket_id) {
            debug!(
                "socket {} connected, replaying {} buffered events",
                socket_id,
                buffered.len()
            );
            for event in buffered {
                match event {
                    OrphanEvent::Frame {
                        direction,
                        payload,
                        at,
                    } => self.push_frame(call_id, direction, payload, at),
                    OrphanEvent::Close { at } => self.apply_close(call_id, at),
                }
            }
        }
        call_id
    }

    /// Appends a frame to the call owning `socket_id`, preserving arrival
    /// order per socket. Frames for unknown sockets are buffered until the
    /// grace window expires.
    pub fn append_frame(
        &mut self,
        socket_id: &str,
        direction: Direction,
        payload: String,
        at: DateTime<Utc>,
        stats: &mut CaptureStats,
    ) {
        match self.socket_ids.get(socket_id).copied() {
            Some(call_id) => self.push_frame(call_id, direction, payload, at),
            None => self.buffer_orphan(
                socket_id,
                OrphanEvent::Frame {
                    direction,
                    payload,
                    at,
                },
                stats,
            ),
        }
    }

    /// Transitions the socket call to `Closed`. A close for an unknown
    /// socket id is buffered like an orphan frame; a duplicate close is a
    /// no-op (delivery is at-least-once).
    pub fn close_socket(&mut self, socket_id: &str, at: DateTime<Utc>, stats: &mut CaptureStats) {
        match self.socket_ids.get(socket_id).copied() {
            Some(call_id) => self.apply_close(call_id, at),
            None => self.buffer_orphan(socket_id, OrphanEvent::Close { at }, stats),
        }
    }

    fn push_frame(&mut self, call_id: Uuid, direction: Direction, payload: String, at: DateTime<Utc>) {
        if let Some(call) = self.calls.get_mut(&call_id) {
            let call = Arc::make_mut(call);
            call.frames.push(Frame::new(direction, payload, at));
        }
    }

    fn apply_close(&mut self, call_id: Uuid, at: DateTime<Utc>) {
        if let Some(call) = self.calls.get_mut(&call_id) {
            let call = Arc::make_mut(call);
            if call.status == CallStatus::Open {
                call.status = CallStatus::Closed;
                call.finished_at = Some(at);
            }
        }
    }

    fn buffer_orphan(&mut self, socket_id: &str, event: OrphanEvent, stats: &mut CaptureStats) {
        if !self.orphans.contains_key(socket_id) && self.orphans.len() >= MAX_ORPHAN_SOCKETS {
            warn!("orphan buffer full, dropping event for socket {}", socket_id);
            stats.orphan_frames_dropped += 1;
            return;
        }
        let buffered = self.orphans.entry(socket_id.to_string()).or_default();
        if buffered.len() >= MAX_ORPHANS_PER_SOCKET {
            buffered.remove(0);
            stats.orphan_frames_dropped += 1;
        }
        trace!("buffering orphan event for socket {}", socket_id);
        buffered.push(event);
    }

    /// Drops buffered orphan events older than the grace window, measured
    /// against event timestamps so behavior does not depend on wall-clock
    /// scheduling.
    pub fn sweep_orphans(&mut self, now: DateTime<Utc>, grace: Duration, stats: &mut CaptureStats) {
        let mut dropped = 0u64;
        self.orphans.retain(|socket_id, buffered| {
            let before = buffered.len();
            buffered.retain(|event| event.at() + grace >= now);
            let expired = before - buffered.len();
            if expired > 0 {
                debug!("dropped {} expired orphan events for socket {}", expired, socket_id);
                dropped += expired as u64;
            }
            !buffered.is_empty()
        });
        stats.orphan_frames_dropped += dropped;
    }

    /// Removes an evicted session's calls and their key-map entries.
    pub fn remove_session_calls(&mut self, session: &Session) {
        for call_id in session.call_ids() {
            self.calls.remove(call_id);
        }
        let live = |call_id: &Uuid| self.calls.contains_key(call_id);
        self.request_ids.retain(|_, call_id| live(call_id));
        self.socket_ids.retain(|_, call_id| live(call_id));
    }

    /// Discards every call, key mapping, and buffered orphan.
    pub fn reset(&mut self) {
        self.calls.clear();
        self.request_ids.clear();
        self.socket_ids.clear();
        self.orphans.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::call::{Body, ContentKind};
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn ledger() -> CallLedger {
        CallLedger::new(Duration::milliseconds(2_000))
    }

    fn record(url: &str, started_ms: i64, status: u16) -> FullRecord {
        FullRecord {
            url: url.to_string(),
            method: String::from("GET"),
            status: Some(status),
            started_at: at(started_ms),
            finished_at: at(started_ms + 30),
            request_headers: Vec::new(),
            response_headers: vec![(String::from("Content-Type"), String::from("application/json"))],
            request_body: Body::Empty,
            response_body: Body::from_text(Some("{\"n\":1}")),
            request_size: 0,
            response_size: 7,
            content_kind: ContentKind::Json,
        }
    }

    fn started(ledger: &mut CallLedger, session: &mut Session, request_id: &str, url: &str, ms: i64) -> Uuid {
        let (call_id, created) = ledger.upsert_by_key(
            LedgerKey::Request(request_id),
            || Call::pending_http(url.to_string(), String::from("GET"), at(ms)),
            |_| {},
        );
        assert!(created);
        session.push_call(call_id);
        session.index_url(url, call_id);
        call_id
    }

    #[test]
    fn upsert_creates_then_updates_in_place() {
        let mut ledger = ledger();
        let (call_id, created) = ledger.upsert_by_key(
            LedgerKey::Request("req-1"),
            || Call::pending_http(String::from("/x"), String::from("GET"), at(0)),
            |_| {},
        );
        assert!(created);

        let (same_id, created) = ledger.upsert_by_key(
            LedgerKey::Request("req-1"),
            || panic!("must not create twice"),
            |call| {
                call.status = CallStatus::Done(200);
                call.finished_at = Some(at(80));
            },
        );
        assert!(!created);
        assert_eq!(same_id, call_id);
        assert_eq!(ledger.len(), 1);
        let call = ledger.get(&call_id).unwrap();
        assert_eq!(call.status, CallStatus::Done(200));
        assert_eq!(call.duration(), Some(Duration::milliseconds(80)));
    }

    #[test]
    fn merge_joins_record_to_pending_call_in_window() {
        let mut ledger = ledger();
        let mut session = Session::new(at(0));
        let mut stats = CaptureStats::default();
        let call_id = started(&mut ledger, &mut session, "req-1", "/x", 0);

        let merged = ledger.merge_full_record(record("/x", 50, 200), &mut session, &mut stats);

        assert_eq!(merged, call_id);
        assert_eq!(ledger.len(), 1);
        assert_eq!(session.len(), 1);
        let call = ledger.get(&call_id).unwrap();
        assert_eq!(call.status, CallStatus::Done(200));
        assert_eq!(call.content_kind, ContentKind::Json);
        assert_eq!(stats.ambiguous_matches, 0);
    }

    #[test]
    fn merge_outside_window_inserts_new_call() {
        let mut ledger = ledger();
        let mut session = Session::new(at(0));
        let mut stats = CaptureStats::default();
        let call_id = started(&mut ledger, &mut session, "req-1", "/x", 0);

        let merged = ledger.merge_full_record(record("/x", 5_000, 200), &mut session, &mut stats);

        assert_ne!(merged, call_id);
        assert_eq!(ledger.len(), 2);
        assert_eq!(session.len(), 2);
        assert_eq!(ledger.get(&call_id).unwrap().status, CallStatus::Pending);
    }

    #[test]
    fn merge_with_different_url_never_matches() {
        let mut ledger = ledger();
        let mut session = Session::new(at(0));
        let mut stats = CaptureStats::default();
        started(&mut ledger, &mut session, "req-1", "/x", 0);

        ledger.merge_full_record(record("/y", 10, 200), &mut session, &mut stats);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn merge_prefers_call_without_record_then_closest() {
        let mut ledger = ledger();
        let mut session = Session::new(at(0));
        let mut stats = CaptureStats::default();
        let near = started(&mut ledger, &mut session, "req-1", "/x", 100);
        let far = started(&mut ledger, &mut session, "req-2", "/x", 900);

        // Closer to `near`; merges there.
        let first = ledger.merge_full_record(record("/x", 150, 200), &mut session, &mut stats);
        assert_eq!(first, near);

        // Still closer to `near`, but `near` already holds a record and
        // `far` does not, so the record-free slot wins.
        let second = ledger.merge_full_record(record("/x", 200, 201), &mut session, &mut stats);
        assert_eq!(second, far);
        assert_eq!(stats.ambiguous_matches, 0);
    }

    #[test]
    fn tie_break_later_record_keeps_slot_and_displaces_earlier() {
        let mut ledger = ledger();
        let mut session = Session::new(at(0));
        let mut stats = CaptureStats::default();
        let call_id = started(&mut ledger, &mut session, "req-1", "/x", 0);

        ledger.merge_full_record(record("/x", 100, 200), &mut session, &mut stats);
        ledger.merge_full_record(record("/x", 300, 204), &mut session, &mut stats);

        // The later record (t=300) occupies the original slot; the displaced
        // one (t=100) is re-inserted as a new call.
        assert_eq!(ledger.len(), 2);
        assert_eq!(session.len(), 2);
        assert_eq!(stats.ambiguous_matches, 1);
        let call = ledger.get(&call_id).unwrap();
        assert_eq!(call.status, CallStatus::Done(204));
        assert_eq!(call.started_at, at(300));

        let displaced_id = session
            .call_ids()
            .iter()
            .copied()
            .find(|id| *id != call_id)
            .unwrap();
        let displaced = ledger.get(&displaced_id).unwrap();
        assert_eq!(displaced.status, CallStatus::Done(200));
        assert_eq!(displaced.started_at, at(100));
    }

    #[test]
    fn tie_break_earlier_record_becomes_new_call() {
        let mut ledger = ledger();
        let mut session = Session::new(at(0));
        let mut stats = CaptureStats::default();
        let call_id = started(&mut ledger, &mut session, "req-1", "/x", 0);

        ledger.merge_full_record(record("/x", 300, 200), &mut session, &mut stats);
        let second = ledger.merge_full_record(record("/x", 100, 204), &mut session, &mut stats);

        assert_ne!(second, call_id);
        assert_eq!(stats.ambiguous_matches, 1);
        assert_eq!(ledger.get(&call_id).unwrap().status, CallStatus::Done(200));
        assert_eq!(ledger.get(&second).unwrap().status, CallStatus::Done(204));
    }

    #[test]
    fn frames_preserve_order_per_socket_across_interleaving() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();
        let s1 = ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(0)));
        let s2 = ledger.register_socket("sock-2", Call::socket(String::from("wss://b"), at(0)));

        ledger.append_frame("sock-1", Direction::Outbound, String::from("ping"), at(10), &mut stats);
        ledger.append_frame("sock-2", Direction::Outbound, String::from("other"), at(12), &mut stats);
        ledger.append_frame("sock-1", Direction::Inbound, String::from("pong"), at(20), &mut stats);

        let first = ledger.get(&s1).unwrap();
        let payloads: Vec<&str> = first.frames.iter().map(|f| f.payload.as_str()).collect();
        assert_eq!(payloads, vec!["ping", "pong"]);
        assert_eq!(ledger.get(&s2).unwrap().frames.len(), 1);
    }

    #[test]
    fn orphan_frames_replayed_in_order_on_connect() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();

        ledger.append_frame("sock-1", Direction::Outbound, String::from("early-1"), at(5), &mut stats);
        ledger.append_frame("sock-1", Direction::Inbound, String::from("early-2"), at(8), &mut stats);
        let call_id = ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(10)));

        let call = ledger.get(&call_id).unwrap();
        let payloads: Vec<&str> = call.frames.iter().map(|f| f.payload.as_str()).collect();
        assert_eq!(payloads, vec!["early-1", "early-2"]);
        assert_eq!(stats.orphan_frames_dropped, 0);
    }

    #[test]
    fn orphan_close_replayed_after_frames() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();

        ledger.append_frame("sock-1", Direction::Inbound, String::from("hello"), at(5), &mut stats);
        ledger.close_socket("sock-1", at(8), &mut stats);
        let call_id = ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(10)));

        let call = ledger.get(&call_id).unwrap();
        assert_eq!(call.frames.len(), 1);
        assert_eq!(call.status, CallStatus::Closed);
        assert_eq!(call.finished_at, Some(at(8)));
    }

    #[test]
    fn expired_orphans_are_dropped_and_counted() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();

        ledger.append_frame("sock-1", Direction::Inbound, String::from("stale"), at(0), &mut stats);
        ledger.sweep_orphans(at(600), Duration::milliseconds(500), &mut stats);
        assert_eq!(stats.orphan_frames_dropped, 1);

        // A connect after the sweep finds nothing to replay.
        let call_id = ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(700)));
        assert!(ledger.get(&call_id).unwrap().frames.is_empty());
    }

    #[test]
    fn orphans_inside_grace_survive_sweep() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();

        ledger.append_frame("sock-1", Direction::Inbound, String::from("fresh"), at(400), &mut stats);
        ledger.sweep_orphans(at(600), Duration::milliseconds(500), &mut stats);
        assert_eq!(stats.orphan_frames_dropped, 0);

        let call_id = ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(700)));
        assert_eq!(ledger.get(&call_id).unwrap().frames.len(), 1);
    }

    #[test]
    fn duplicate_close_is_idempotent() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();
        let call_id = ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(0)));

        ledger.close_socket("sock-1", at(30), &mut stats);
        ledger.close_socket("sock-1", at(99), &mut stats);

        let call = ledger.get(&call_id).unwrap();
        assert_eq!(call.status, CallStatus::Closed);
        assert_eq!(call.finished_at, Some(at(30)));
    }

    #[test]
    fn per_socket_orphan_cap_drops_oldest() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();
        for i in 0..(MAX_ORPHANS_PER_SOCKET + 3) {
            ledger.append_frame(
                "sock-1",
                Direction::Inbound,
                format!("frame-{}", i),
                at(i as i64),
                &mut stats,
            );
        }
        assert_eq!(stats.orphan_frames_dropped, 3);

        let call_id = ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(500)));
        let call = ledger.get(&call_id).unwrap();
        assert_eq!(call.frames.len(), MAX_ORPHANS_PER_SOCKET);
        assert_eq!(call.frames[0].payload, "frame-3");
    }

    #[test]
    fn snapshots_are_copy_on_write() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();
        let call_id = ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(0)));

        // Simulate a published snapshot holding the call.
        let snapshot = ledger.get(&call_id).unwrap().clone();
        ledger.append_frame("sock-1", Direction::Inbound, String::from("later"), at(10), &mut stats);

        assert!(snapshot.frames.is_empty());
        assert_eq!(ledger.get(&call_id).unwrap().frames.len(), 1);
    }

    #[test]
    fn remove_session_calls_cleans_key_maps() {
        let mut ledger = ledger();
        let mut session = Session::new(at(0));
        started(&mut ledger, &mut session, "req-1", "/x", 0);

        ledger.remove_session_calls(&session);
        assert!(ledger.is_empty());
        assert!(ledger.lookup(LedgerKey::Request("req-1")).is_none());
    }

    #[test]
    fn reset_discards_everything() {
        let mut ledger = ledger();
        let mut stats = CaptureStats::default();
        ledger.register_socket("sock-1", Call::socket(String::from("wss://a"), at(0)));
        ledger.append_frame("sock-2", Direction::Inbound, String::from("orphan"), at(0), &mut stats);

        ledger.reset();
        assert!(ledger.is_empty());
        assert!(ledger.lookup(LedgerKey::Socket("sock-1")).is_none());
    }
}
