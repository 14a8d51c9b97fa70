use std::fmt;

/// Raised while decoding a raw instrumentation event.
///
/// Decode failures are never surfaced to consumers: the offending event is
/// dropped, the `decode_errors` counter is incremented, and the engine keeps
/// accepting events.
#[derive(Debug)]
pub enum DecodeError {
    Json(serde_json::Error),
    EmptyField(&'static str),
    BadTimestamp(i64),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "JSON decode error: {}", e),
            DecodeError::EmptyField(field) => write!(f, "Required field is empty: {}", field),
            DecodeError::BadTimestamp(ts) => write!(f, "Timestamp out of range: {}", ts),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
    BadAddress(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::BadAddress(e) => write!(f, "Bad address: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum EngineError {
    QueueClosed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::QueueClosed => write!(f, "Event queue is closed"),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Debug)]
pub enum WebError {
    BadAddress(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BadAddress(e) => write!(f, "Bad bind address: {}", e),
        }
    }
}

impl std::error::Error for WebError {}
