//! Ingestion plumbing: the bounded event queue and the single consuming task.

pub mod capture_engine;
pub mod event_queue;

pub use capture_engine::{CaptureEngine, EngineHandle};
pub use event_queue::EventQueue;
