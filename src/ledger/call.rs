//! Data model for captured network exchanges.
//!
//! A [`Call`] is one logical exchange: either a plain HTTP request/response or
//! a long-lived socket. Calls are built up incrementally from three
//! independent event sources (lifecycle notifications, late full transfer
//! records, socket frames), so most fields start empty and are filled in by
//! merge operations on the ledger.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Which kind of exchange a call represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Http,
    Socket,
}

/// Direction of a socket frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by the observed application.
    Outbound,
    /// Received by the observed application.
    Inbound,
}

/// Lifecycle state of a call.
///
/// HTTP calls move `Pending -> Done | Failed`; socket calls move
/// `Open -> Closed`. No other transitions occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Pending,
    Done(u16),
    Failed,
    Open,
    Closed,
}

impl CallStatus {
    /// Numeric form used at the consumer boundary: 0 while pending, -1 for a
    /// transport failure, the HTTP status otherwise (101 for sockets).
    pub fn code(&self) -> i32 {
        match self {
            CallStatus::Pending => 0,
            CallStatus::Done(status) => *status as i32,
            CallStatus::Failed => -1,
            CallStatus::Open | CallStatus::Closed => 101,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Done(_) | CallStatus::Failed | CallStatus::Closed)
    }
}

/// Opaque request/response payload.
///
/// JSON is attempted first so consumers can search structured content; any
/// other text is kept verbatim.
///
/// ```
/// use netlens::ledger::Body;
///
/// assert!(matches!(Body::from_text(Some("{\"a\":1}")), Body::Json(_)));
/// assert!(matches!(Body::from_text(Some("plain")), Body::Text(_)));
/// assert!(matches!(Body::from_text(None), Body::Empty));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Text(String),
}

impl Body {
    pub fn from_text(text: Option<&str>) -> Body {
        match text {
            None => Body::Empty,
            Some(raw) if raw.is_empty() => Body::Empty,
            Some(raw) => match serde_json::from_str(raw) {
                Ok(value) => Body::Json(value),
                Err(_) => Body::Text(raw.to_string()),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

/// Coarse tag derived from the response MIME type, used by consumers to pick
/// a preview renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Json,
    Image,
    Html,
    Pdf,
    Binary,
    Unknown,
}

impl ContentKind {
    pub fn from_mime(mime: &str) -> ContentKind {
        let mime = mime.trim();
        if mime.is_empty() || mime == "unknown" {
            ContentKind::Unknown
        } else if mime.contains("json") {
            ContentKind::Json
        } else if mime.contains("image") {
            ContentKind::Image
        } else if mime.contains("html") {
            ContentKind::Html
        } else if mime.contains("pdf") {
            ContentKind::Pdf
        } else {
            ContentKind::Binary
        }
    }
}

/// One discrete send/receive on a socket call. Append-only, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub id: Uuid,
    pub direction: Direction,
    pub payload: String,
    pub at: DateTime<Utc>,
}

impl Frame {
    pub fn new(direction: Direction, payload: String, at: DateTime<Utc>) -> Frame {
        Frame {
            id: Uuid::new_v4(),
            direction,
            payload,
            at,
        }
    }
}

/// Complete transfer metadata reported out-of-band, after the fact.
///
/// Carries no request id; it is joined to an existing call by URL and start
/// time proximity, which is the only correlation signal the source provides.
#[derive(Debug, Clone, PartialEq)]
pub struct FullRecord {
    pub url: String,
    pub method: String,
    /// Terminal HTTP status, when the source reported one.
    pub status: Option<u16>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub request_headers: Vec<(String, String)>,
    pub response_headers: Vec<(String, String)>,
    pub request_body: Body,
    pub response_body: Body,
    pub request_size: u64,
    pub response_size: u64,
    pub content_kind: ContentKind,
}

/// One logical network exchange.
///
/// Exactly one `Call` owns a given id at any time. Merges mutate the call in
/// place and never fork its identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub id: Uuid,
    pub url: String,
    pub method: String,
    pub transport: Transport,
    pub status: CallStatus,
    /// Failure payload from a lifecycle Failed event.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Header name/value pairs, case preserved exactly as received.
    pub request_headers: Vec<(String, String)>,
    pub response_headers: Vec<(String, String)>,
    pub request_body: Body,
    pub response_body: Body,
    pub request_size: u64,
    pub response_size: u64,
    pub content_kind: ContentKind,
    /// Socket calls only; append-only.
    pub frames: Vec<Frame>,
    /// Start time of the full record currently occupying this call's slot.
    /// `None` until a record has been merged in.
    #[serde(skip)]
    pub(crate) record_started_at: Option<DateTime<Utc>>,
}

impl Call {
    /// A pending HTTP call created from a lifecycle Started event.
    pub fn pending_http(url: String, method: String, at: DateTime<Utc>) -> Call {
        Call {
            id: Uuid::new_v4(),
            url,
            method,
            transport: Transport::Http,
            status: CallStatus::Pending,
            error: None,
            started_at: at,
            finished_at: None,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            request_body: Body::Empty,
            response_body: Body::Empty,
            request_size: 0,
            response_size: 0,
            content_kind: ContentKind::Unknown,
            frames: Vec::new(),
            record_started_at: None,
        }
    }

    /// An open socket call created from a connect event.
    pub fn socket(url: String, at: DateTime<Utc>) -> Call {
        Call {
            transport: Transport::Socket,
            status: CallStatus::Open,
            method: String::from("WS"),
            ..Call::pending_http(url, String::new(), at)
        }
    }

    /// A call synthesized from a full record that matched nothing.
    pub fn from_record(record: FullRecord) -> Call {
        let mut call = Call::pending_http(record.url.clone(), record.method.clone(), record.started_at);
        call.apply_record(record);
        call
    }

    pub fn duration(&self) -> Option<Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    pub fn has_full_record(&self) -> bool {
        self.record_started_at.is_some()
    }

    /// Overwrites every field except `id` with the record's data.
    ///
    /// A lifecycle-reported terminal status is kept when the record carries
    /// none of its own.
    pub(crate) fn apply_record(&mut self, record: FullRecord) {
        self.url = record.url;
        self.method = record.method;
        self.status = match record.status {
            Some(status) if status > 0 => CallStatus::Done(status),
            _ => self.status,
        };
        self.started_at = record.started_at;
        self.finished_at = Some(record.finished_at);
        self.request_headers = record.request_headers;
        self.response_headers = record.response_headers;
        self.request_body = record.request_body;
        self.response_body = record.response_body;
        self.request_size = record.request_size;
        self.response_size = record.response_size;
        self.content_kind = record.content_kind;
        self.record_started_at = Some(record.started_at);
    }

    /// Rebuilds the full record currently occupying this call's slot, for
    /// re-insertion when a later record displaces it.
    pub(crate) fn extract_record(&self) -> Option<FullRecord> {
        let record_started_at = self.record_started_at?;
        Some(FullRecord {
            url: self.url.clone(),
            method: self.method.clone(),
            status: match self.status {
                CallStatus::Done(status) => Some(status),
                _ => None,
            },
            started_at: record_started_at,
            finished_at: self.finished_at.unwrap_or(record_started_at),
            request_headers: self.request_headers.clone(),
            response_headers: self.response_headers.clone(),
            request_body: self.request_body.clone(),
            response_body: self.response_body.clone(),
            request_size: self.request_size,
            response_size: self.response_size,
            content_kind: self.content_kind,
        })
    }
}
