use serde::Deserialize;

/// Tuning knobs for the correlation engine.
///
/// - `proximity_window_ms`: maximum distance between a full record's start
///   time and a pending call's start time for the URL+time join to accept a
///   match.
/// - `orphan_grace_ms`: how long frames for a not-yet-seen socket id are
///   buffered before being dropped.
/// - `queue_capacity`: bound of the ingest queue; overflow drops the oldest
///   queued event.
/// - `max_sessions`: retained session cap; creating a session past the cap
///   evicts the oldest one together with its calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub proximity_window_ms: u64,
    pub orphan_grace_ms: u64,
    pub queue_capacity: usize,
    pub max_sessions: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            proximity_window_ms: 2_000,
            orphan_grace_ms: 500,
            queue_capacity: 1_024,
            max_sessions: 50,
        }
    }
}

/// Settings for the JSON API server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub enabled: bool,
    pub port: u16,
    pub bind_address: String,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9380,
            bind_address: String::from("127.0.0.1"),
        }
    }
}
