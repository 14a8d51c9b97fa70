//! Session management core module.
//!
//! Sessions partition the capture timeline: every navigation boundary starts
//! a fresh session, and each call belongs to the session that was active when
//! it was first seen.

/// Submodule for session data structures.
pub mod session;
/// Submodule for the session manager implementation.
pub mod session_manager;

pub use session::Session;
pub use session_manager::SessionManager;
