//! The capture engine: one consuming task over the event queue.
//!
//! All ledger/session mutations are serialized behind a single mutex shared
//! by the engine task (event application) and consumer commands
//! (`toggle_open`, `reset`), giving the single-writer semantics the rest of
//! the crate assumes. The lock is never held across an await point.

use crate::configuration::EngineSettings;
use crate::correlator::Correlator;
use crate::engine::event_queue::EventQueue;
use crate::events::{normalizer, RawEvent};
use crate::snapshot::{self, MonitorView, SnapshotPublisher, SnapshotReader};
use log::{debug, info};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct CaptureEngine {
    queue: Arc<EventQueue>,
    state: Arc<Mutex<Correlator>>,
    publisher: Arc<SnapshotPublisher>,
}

impl CaptureEngine {
    /// Builds the engine and its handle. The engine itself must be driven by
    /// awaiting [`CaptureEngine::run`] (usually from a spawned task); the
    /// handle is the producer/consumer surface and can be cloned freely.
    pub fn new(settings: &EngineSettings) -> (CaptureEngine, EngineHandle) {
        let queue = Arc::new(EventQueue::new(settings.queue_capacity));
        let state = Arc::new(Mutex::new(Correlator::new(settings)));
        let initial = state.lock().unwrap().view();
        let (publisher, reader) = snapshot::channel(initial);
        let publisher = Arc::new(publisher);

        let handle = EngineHandle {
            queue: Arc::clone(&queue),
            state: Arc::clone(&state),
            publisher: Arc::clone(&publisher),
            reader,
        };
        let engine = CaptureEngine {
            queue,
            state,
            publisher,
        };
        (engine, handle)
    }

    /// Drains the queue until it is closed, applying each event and
    /// publishing a fresh view per mutation.
    pub async fn run(self) {
        info!("capture engine started");
        while let Some(raw) = self.queue.pop().await {
            let view = {
                let mut state = self.state.lock().unwrap();
                let dropped = self.queue.take_dropped();
                if dropped > 0 {
                    state.note_dropped(dropped);
                }
                match normalizer::normalize(raw) {
                    Ok(event) => state.apply(event),
                    Err(err) => {
                        debug!("dropping undecodable event: {}", err);
                        state.note_decode_error();
                    }
                }
                state.view()
            };
            self.publisher.publish(view);
        }
        info!("capture engine stopped");
    }
}

/// Producer/consumer surface of the engine.
///
/// Ingestion never blocks and never fails upward; consumer commands are
/// serialized with event application.
#[derive(Clone)]
pub struct EngineHandle {
    queue: Arc<EventQueue>,
    state: Arc<Mutex<Correlator>>,
    publisher: Arc<SnapshotPublisher>,
    reader: SnapshotReader,
}

impl EngineHandle {
    /// Enqueues a decoded wire event.
    pub fn ingest(&self, event: RawEvent) {
        self.queue.push(event);
    }

    /// Decodes and enqueues one NDJSON line. A decode failure is counted and
    /// dropped, never raised: the feed must survive malformed input. Returns
    /// whether the line was queued.
    pub fn ingest_json(&self, line: &str) -> bool {
        match serde_json::from_str::<RawEvent>(line) {
            Ok(event) => {
                self.queue.push(event);
                true
            }
            Err(err) => {
                debug!("dropping undecodable line: {}", err);
                self.count_decode_error();
                false
            }
        }
    }

    /// Decodes and enqueues an already-parsed JSON value. Returns whether
    /// the value was queued.
    pub fn ingest_value(&self, value: serde_json::Value) -> bool {
        match serde_json::from_value::<RawEvent>(value) {
            Ok(event) => {
                self.queue.push(event);
                true
            }
            Err(err) => {
                debug!("dropping undecodable event value: {}", err);
                self.count_decode_error();
                false
            }
        }
    }

    /// The latest complete view.
    pub fn snapshot(&self) -> Arc<MonitorView> {
        self.reader.current()
    }

    /// A reader for consumers that want change notifications.
    pub fn reader(&self) -> SnapshotReader {
        self.reader.clone()
    }

    /// Flips a session's expand state. Returns false for unknown ids.
    pub fn toggle_open(&self, session_id: Uuid) -> bool {
        let view = {
            let mut state = self.state.lock().unwrap();
            if !state.toggle_open(session_id) {
                return false;
            }
            state.view()
        };
        self.publisher.publish(view);
        true
    }

    /// Discards all capture state, returning to a single empty open session.
    ///
    /// The pending queue is cleared first, so no queued pre-reset event can
    /// resurrect a pre-reset call.
    pub fn reset(&self) {
        let cleared = self.queue.clear();
        if cleared > 0 {
            debug!("reset discarded {} queued events", cleared);
        }
        let view = {
            let mut state = self.state.lock().unwrap();
            state.reset();
            state.view()
        };
        self.publisher.publish(view);
    }

    /// Closes the queue; the engine task exits after draining it.
    pub fn shutdown(&self) {
        self.queue.close();
    }

    fn count_decode_error(&self) {
        let view = {
            let mut state = self.state.lock().unwrap();
            state.note_decode_error();
            state.view()
        };
        self.publisher.publish(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use std::time::Duration;

    fn settings() -> EngineSettings {
        EngineSettings::default()
    }

    async fn wait_until<F>(reader: &mut SnapshotReader, predicate: F) -> Arc<MonitorView>
    where
        F: Fn(&MonitorView) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let view = reader.current();
                if predicate(&view) {
                    return view;
                }
                reader.changed().await.expect("engine alive");
            }
        })
        .await
        .expect("condition within deadline")
    }

    #[tokio::test]
    async fn end_to_end_lifecycle_through_queue() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (engine, handle) = CaptureEngine::new(&settings());
        tokio::spawn(engine.run());
        let mut reader = handle.reader();

        handle.ingest_json(
            r#"{"type":"REQUEST_STARTED","payload":{"requestId":"r1","url":"/x","method":"GET","timestamp":0}}"#,
        );
        handle.ingest_json(
            r#"{"type":"REQUEST_COMPLETED","payload":{"requestId":"r1","statusCode":200,"timestamp":80}}"#,
        );

        let view = wait_until(&mut reader, |view| {
            view.total_calls() == 1 && view.sessions[0].calls[0].status.code() == 200
        })
        .await;
        assert_eq!(view.sessions.len(), 1);

        handle.shutdown();
    }

    #[tokio::test]
    async fn undecodable_lines_are_counted_not_fatal() {
        let (engine, handle) = CaptureEngine::new(&settings());
        tokio::spawn(engine.run());
        let mut reader = handle.reader();

        handle.ingest_json("garbage");
        handle.ingest_json(
            r#"{"type":"PAGE_NAVIGATED","payload":{"timestamp":10}}"#,
        );

        let view = wait_until(&mut reader, |view| view.sessions.len() == 2).await;
        assert_eq!(view.stats.decode_errors, 1);

        handle.shutdown();
    }

    #[tokio::test]
    async fn overflow_drops_surface_in_stats() {
        let (engine, handle) = CaptureEngine::new(&EngineSettings {
            queue_capacity: 2,
            ..EngineSettings::default()
        });

        // Fill past capacity before the engine starts draining.
        for ms in 0..3 {
            handle.ingest(RawEvent::PageNavigated { timestamp: ms });
        }
        tokio::spawn(engine.run());

        let mut reader = handle.reader();
        // One navigation was dropped; the surviving two still rolled sessions.
        let view = wait_until(&mut reader, |view| {
            view.stats.events_dropped == 1 && view.sessions.len() == 3
        })
        .await;
        assert_eq!(view.stats.events_dropped, 1);

        handle.shutdown();
    }

    #[tokio::test]
    async fn reset_discards_queued_events_and_state() {
        let (_engine, handle) = CaptureEngine::new(&settings());

        handle.ingest(RawEvent::PageNavigated { timestamp: 0 });
        handle.ingest(RawEvent::PageNavigated { timestamp: 1 });
        handle.reset();

        let view = handle.snapshot();
        assert_eq!(view.sessions.len(), 1);
        assert_eq!(view.total_calls(), 0);
    }

    #[tokio::test]
    async fn toggle_open_publishes_new_view() {
        let (engine, handle) = CaptureEngine::new(&settings());
        tokio::spawn(engine.run());
        let mut reader = handle.reader();

        handle.ingest(RawEvent::PageNavigated { timestamp: 10 });
        let view = wait_until(&mut reader, |view| view.sessions.len() == 2).await;
        let collapsed = view.sessions[1].id;

        assert!(handle.toggle_open(collapsed));
        let view = wait_until(&mut reader, |view| {
            view.session(collapsed).map(|s| s.is_open).unwrap_or(false)
        })
        .await;
        assert!(view.sessions[0].is_open);

        assert!(!handle.toggle_open(Uuid::new_v4()));
        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_engine_after_drain() {
        let (engine, handle) = CaptureEngine::new(&settings());
        let task = tokio::spawn(engine.run());

        handle.ingest(RawEvent::PageNavigated { timestamp: 0 });
        handle.shutdown();

        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_secs(2), task).await
        );
    }
}
