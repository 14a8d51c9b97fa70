use crate::error_handling::types::EngineError;
use crate::snapshot::view::MonitorView;
use std::sync::Arc;
use tokio::sync::watch;

/// Creates a connected publisher/reader pair seeded with `initial`.
pub fn channel(initial: MonitorView) -> (SnapshotPublisher, SnapshotReader) {
    let (tx, rx) = watch::channel(Arc::new(initial));
    (SnapshotPublisher { tx }, SnapshotReader { rx })
}

/// Write side: owned by the engine, publishes a fresh view after every
/// applied mutation. Publishing never blocks on readers.
pub struct SnapshotPublisher {
    tx: watch::Sender<Arc<MonitorView>>,
}

impl SnapshotPublisher {
    pub fn publish(&self, view: MonitorView) {
        // No receivers is fine; the next subscriber sees the latest view.
        let _ = self.tx.send(Arc::new(view));
    }

    pub fn subscribe(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side: hands out the latest complete view.
///
/// `current()` is wait-free for the writer; it clones an `Arc`, never the
/// underlying data, and can never observe a partially-applied merge.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<MonitorView>>,
}

impl SnapshotReader {
    pub fn current(&self) -> Arc<MonitorView> {
        self.rx.borrow().clone()
    }

    /// Waits until a view newer than the last one seen by this reader is
    /// published.
    pub async fn changed(&mut self) -> Result<(), EngineError> {
        self.rx.changed().await.map_err(|_| EngineError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn current_returns_latest_published_view() {
        let (publisher, reader) = channel(MonitorView::empty());
        assert_eq!(reader.current().total_calls(), 0);

        let mut view = MonitorView::empty();
        view.stats.decode_errors = 3;
        publisher.publish(view);
        assert_eq!(reader.current().stats.decode_errors, 3);
    }

    #[test]
    fn handed_out_views_are_stable() {
        let (publisher, reader) = channel(MonitorView::empty());
        let before = reader.current();

        let mut view = MonitorView::empty();
        view.stats.events_dropped = 9;
        publisher.publish(view);

        // The old snapshot is untouched by later publishes.
        assert_eq!(before.stats.events_dropped, 0);
        assert_eq!(reader.current().stats.events_dropped, 9);
    }

    #[tokio::test]
    async fn changed_wakes_on_publish() {
        let (publisher, mut reader) = channel(MonitorView::empty());
        publisher.publish(MonitorView::empty());
        tokio_test::assert_ok!(reader.changed().await);
    }
}
