use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// A navigation-bounded group of calls.
///
/// The session holds non-owning references (ids) into the ledger, newest
/// first. `is_open` is consumer-visible expand state only; it has no effect
/// on event routing. The URL index is private bookkeeping for the
/// URL+time-proximity merge, so matching stays bounded as call volume grows.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub is_open: bool,
    call_ids: Vec<Uuid>,
    url_index: HashMap<String, Vec<Uuid>>,
}

impl Session {
    pub fn new(at: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            started_at: at,
            is_open: true,
            call_ids: Vec::new(),
            url_index: HashMap::new(),
        }
    }

    /// Records a new call as the most recent member of this session.
    pub fn push_call(&mut self, call_id: Uuid) {
        self.call_ids.insert(0, call_id);
    }

    /// Registers an HTTP call as a merge candidate for its URL.
    pub fn index_url(&mut self, url: &str, call_id: Uuid) {
        self.url_index.entry(url.to_string()).or_default().push(call_id);
    }

    /// Merge candidates for a URL, in insertion order.
    pub fn candidates_for(&self, url: &str) -> &[Uuid] {
        self.url_index.get(url).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Call ids, newest first.
    pub fn call_ids(&self) -> &[Uuid] {
        &self.call_ids
    }

    pub fn len(&self) -> usize {
        self.call_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.call_ids.is_empty()
    }
}
