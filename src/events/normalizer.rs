//! Converts raw wire events into validated [`MonitorEvent`]s.
//!
//! Anything malformed (unparseable JSON, an unknown tag, a missing or empty
//! required field, an out-of-range timestamp) is a [`DecodeError`]. The
//! caller drops the event and counts the error; nothing malformed ever
//! reaches the ledger.

use crate::error_handling::types::DecodeError;
use crate::events::raw::{RawEvent, RawFullRecord};
use crate::events::types::MonitorEvent;
use crate::ledger::{Body, ContentKind, Direction, FullRecord};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Decodes one NDJSON line and normalizes it.
pub fn normalize_line(line: &str) -> Result<MonitorEvent, DecodeError> {
    let raw: RawEvent = serde_json::from_str(line)?;
    normalize(raw)
}

/// Validates a decoded wire event and produces its internal form.
pub fn normalize(raw: RawEvent) -> Result<MonitorEvent, DecodeError> {
    match raw {
        RawEvent::RequestStarted {
            request_id,
            url,
            method,
            timestamp,
        } => Ok(MonitorEvent::LifecycleStarted {
            request_id: require("requestId", request_id)?,
            url: require("url", url)?,
            method: require("method", method)?,
            at: timestamp_ms(timestamp)?,
        }),
        RawEvent::RequestCompleted {
            request_id,
            status_code,
            timestamp,
        } => Ok(MonitorEvent::LifecycleCompleted {
            request_id: require("requestId", request_id)?,
            status: status_code,
            at: timestamp_ms(timestamp)?,
        }),
        RawEvent::RequestFailed {
            request_id,
            error,
            timestamp,
        } => Ok(MonitorEvent::LifecycleFailed {
            request_id: require("requestId", request_id)?,
            error,
            at: timestamp_ms(timestamp)?,
        }),
        RawEvent::RequestFinished(record) => Ok(MonitorEvent::FullRecord(full_record(record)?)),
        RawEvent::WsConnect {
            socket_id,
            url,
            timestamp,
        } => Ok(MonitorEvent::SocketConnect {
            socket_id: require("socketId", socket_id)?,
            url: require("url", url)?,
            at: timestamp_ms(timestamp)?,
        }),
        RawEvent::WsSend {
            socket_id,
            data,
            timestamp,
        } => Ok(MonitorEvent::SocketFrame {
            socket_id: require("socketId", socket_id)?,
            direction: Direction::Outbound,
            payload: data,
            at: timestamp_ms(timestamp)?,
        }),
        RawEvent::WsMessage {
            socket_id,
            data,
            timestamp,
        } => Ok(MonitorEvent::SocketFrame {
            socket_id: require("socketId", socket_id)?,
            direction: Direction::Inbound,
            payload: data,
            at: timestamp_ms(timestamp)?,
        }),
        RawEvent::WsClose {
            socket_id,
            timestamp,
        } => Ok(MonitorEvent::SocketClose {
            socket_id: require("socketId", socket_id)?,
            at: timestamp_ms(timestamp)?,
        }),
        RawEvent::PageNavigated { timestamp } => Ok(MonitorEvent::Navigation {
            at: timestamp_ms(timestamp)?,
        }),
    }
}

fn full_record(raw: RawFullRecord) -> Result<FullRecord, DecodeError> {
    let started_at = timestamp_ms(raw.started_at)?;
    let duration = Duration::milliseconds(raw.duration_ms.max(0.0).round() as i64);
    Ok(FullRecord {
        url: require("url", raw.url)?,
        method: require("method", raw.method)?,
        status: raw.status.filter(|status| *status > 0),
        started_at,
        finished_at: started_at + duration,
        request_headers: raw.request_headers.into_pairs(),
        response_headers: raw.response_headers.into_pairs(),
        request_body: Body::from_text(raw.request_body.as_deref()),
        response_body: Body::from_text(raw.response_body.as_deref()),
        // Unknown sizes are reported as -1; clamp to zero.
        request_size: raw.request_size.max(0) as u64,
        response_size: raw.response_size.max(0) as u64,
        content_kind: ContentKind::from_mime(&raw.mime_type),
    })
}

fn timestamp_ms(timestamp: i64) -> Result<DateTime<Utc>, DecodeError> {
    Utc.timestamp_millis_opt(timestamp)
        .single()
        .ok_or(DecodeError::BadTimestamp(timestamp))
}

fn require(field: &'static str, value: String) -> Result<String, DecodeError> {
    if value.is_empty() {
        Err(DecodeError::EmptyField(field))
    } else {
        Ok(value)
    }
}
