//! Wire shapes delivered by the instrumentation source.
//!
//! One JSON object per event, `{"type": TAG, "payload": {...}}`, payload
//! fields in camelCase. The envelope matches what the injected page hooks
//! and the request-lifecycle observer emit; the transport that carries these
//! objects (stdin feed, HTTP post) is interchangeable.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RawEvent {
    /// A request left the application; the response is still pending.
    #[serde(rename = "REQUEST_STARTED", rename_all = "camelCase")]
    RequestStarted {
        request_id: String,
        url: String,
        method: String,
        timestamp: i64,
    },
    /// The transport finished the request with a status code.
    #[serde(rename = "REQUEST_COMPLETED", rename_all = "camelCase")]
    RequestCompleted {
        request_id: String,
        status_code: u16,
        timestamp: i64,
    },
    /// The transport gave up on the request.
    #[serde(rename = "REQUEST_FAILED", rename_all = "camelCase")]
    RequestFailed {
        request_id: String,
        error: String,
        timestamp: i64,
    },
    /// Full transfer metadata, reported out-of-band and after the fact.
    #[serde(rename = "REQUEST_FINISHED")]
    RequestFinished(RawFullRecord),
    #[serde(rename = "WS_CONNECT", rename_all = "camelCase")]
    WsConnect {
        socket_id: String,
        url: String,
        timestamp: i64,
    },
    /// Data sent by the application over a socket.
    #[serde(rename = "WS_SEND", rename_all = "camelCase")]
    WsSend {
        socket_id: String,
        data: String,
        timestamp: i64,
    },
    /// Data received by the application over a socket.
    #[serde(rename = "WS_MESSAGE", rename_all = "camelCase")]
    WsMessage {
        socket_id: String,
        data: String,
        timestamp: i64,
    },
    #[serde(rename = "WS_CLOSE", rename_all = "camelCase")]
    WsClose { socket_id: String, timestamp: i64 },
    #[serde(rename = "PAGE_NAVIGATED", rename_all = "camelCase")]
    PageNavigated { timestamp: i64 },
}

/// Payload of a `REQUEST_FINISHED` event.
///
/// Sizes may be reported as -1 when unknown; headers arrive either as a
/// name/value object or as an ordered `[{name, value}]` list depending on
/// the reporting path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFullRecord {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub status: Option<u16>,
    pub started_at: i64,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub request_headers: RawHeaders,
    #[serde(default)]
    pub response_headers: RawHeaders,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub response_body: Option<String>,
    #[serde(default)]
    pub request_size: i64,
    #[serde(default)]
    pub response_size: i64,
    #[serde(default)]
    pub mime_type: String,
}

/// Header collection in either of the two wire forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawHeaders {
    List(Vec<RawHeader>),
    Map(HashMap<String, String>),
}

impl Default for RawHeaders {
    fn default() -> Self {
        RawHeaders::List(Vec::new())
    }
}

impl RawHeaders {
    /// Folds either form into name/value pairs, case preserved. The list
    /// form keeps its arrival order; the map form is sorted by name so the
    /// result is deterministic.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            RawHeaders::List(headers) => headers
                .into_iter()
                .map(|header| (header.name, header.value))
                .collect(),
            RawHeaders::Map(headers) => {
                let mut pairs: Vec<(String, String)> = headers.into_iter().collect();
                pairs.sort();
                pairs
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}
