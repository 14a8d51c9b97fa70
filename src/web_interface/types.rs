use crate::ledger::{Body, Call, ContentKind, Direction, Frame, Transport};
use crate::snapshot::{CaptureStats, MonitorView, SessionView};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// JSON shape of the full monitor view.
#[derive(Serialize)]
pub struct MonitorResponse {
    pub generated_at: DateTime<Utc>,
    pub stats: CaptureStats,
    pub sessions: Vec<SessionResponse>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub is_open: bool,
    pub call_count: usize,
    pub calls: Vec<CallResponse>,
}

#[derive(Serialize)]
pub struct CallResponse {
    pub id: Uuid,
    pub url: String,
    pub method: String,
    pub transport: Transport,
    /// Numeric status: 0 pending, -1 transport failure, HTTP code otherwise.
    pub status: i32,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub request_headers: Vec<(String, String)>,
    pub response_headers: Vec<(String, String)>,
    pub request_body: Body,
    pub response_body: Body,
    pub request_size: u64,
    pub response_size: u64,
    pub content_kind: ContentKind,
    pub frames: Vec<FrameResponse>,
}

#[derive(Serialize)]
pub struct FrameResponse {
    pub id: Uuid,
    pub direction: Direction,
    pub payload: String,
    pub at: DateTime<Utc>,
}

/// Outcome of a `POST /events` batch.
#[derive(Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
}

impl From<&MonitorView> for MonitorResponse {
    fn from(view: &MonitorView) -> Self {
        MonitorResponse {
            generated_at: view.generated_at,
            stats: view.stats,
            sessions: view.sessions.iter().map(SessionResponse::from).collect(),
        }
    }
}

impl From<&SessionView> for SessionResponse {
    fn from(session: &SessionView) -> Self {
        SessionResponse {
            id: session.id,
            started_at: session.started_at,
            is_open: session.is_open,
            call_count: session.calls.len(),
            calls: session.calls.iter().map(|call| CallResponse::from(call.as_ref())).collect(),
        }
    }
}

impl From<&Call> for CallResponse {
    fn from(call: &Call) -> Self {
        CallResponse {
            id: call.id,
            url: call.url.clone(),
            method: call.method.clone(),
            transport: call.transport,
            status: call.status.code(),
            state: match call.status {
                crate::ledger::CallStatus::Pending => "pending",
                crate::ledger::CallStatus::Done(_) => "done",
                crate::ledger::CallStatus::Failed => "failed",
                crate::ledger::CallStatus::Open => "open",
                crate::ledger::CallStatus::Closed => "closed",
            },
            error: call.error.clone(),
            started_at: call.started_at,
            finished_at: call.finished_at,
            duration_ms: call.duration().map(|d| d.num_milliseconds()),
            request_headers: call.request_headers.clone(),
            response_headers: call.response_headers.clone(),
            request_body: call.request_body.clone(),
            response_body: call.response_body.clone(),
            request_size: call.request_size,
            response_size: call.response_size,
            content_kind: call.content_kind,
            frames: call.frames.iter().map(FrameResponse::from).collect(),
        }
    }
}

impl From<&Frame> for FrameResponse {
    fn from(frame: &Frame) -> Self {
        FrameResponse {
            id: frame.id,
            direction: frame.direction,
            payload: frame.payload.clone(),
            at: frame.at,
        }
    }
}
