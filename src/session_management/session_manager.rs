use crate::session_management::session::Session;
use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

/// Owns the session timeline and the active-session state machine.
///
/// There is always exactly one active session: the most recently created.
/// Navigation boundaries create a new one and collapse all prior sessions;
/// an explicit reset discards everything and returns to a single fresh
/// session. At most `max_sessions` sessions are retained; creating one past
/// the cap evicts the oldest together with its calls (the caller cleans the
/// ledger with the returned session).
pub struct SessionManager {
    /// Sessions, newest first. The active session is `sessions[0]`.
    sessions: Vec<Session>,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize, at: DateTime<Utc>) -> SessionManager {
        SessionManager {
            sessions: vec![Session::new(at)],
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn active(&self) -> &Session {
        &self.sessions[0]
    }

    pub fn active_mut(&mut self) -> &mut Session {
        &mut self.sessions[0]
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn get(&self, session_id: Uuid) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    /// Starts a new active session on a navigation boundary.
    ///
    /// All prior sessions collapse (`is_open = false`). Returns the session
    /// evicted by the retention cap, if any.
    pub fn begin_session(&mut self, at: DateTime<Utc>) -> Option<Session> {
        for session in &mut self.sessions {
            session.is_open = false;
        }
        let session = Session::new(at);
        debug!("session {} opened at {}", session.id, at);
        self.sessions.insert(0, session);

        if self.sessions.len() > self.max_sessions {
            let evicted = self.sessions.pop();
            if let Some(ref evicted) = evicted {
                info!(
                    "session {} evicted ({} calls, retention cap {})",
                    evicted.id,
                    evicted.len(),
                    self.max_sessions
                );
            }
            evicted
        } else {
            None
        }
    }

    /// Flips consumer-visible expand state. Has no effect on routing.
    /// Returns false for an unknown session id.
    pub fn toggle_open(&mut self, session_id: Uuid) -> bool {
        match self.sessions.iter_mut().find(|s| s.id == session_id) {
            Some(session) => {
                session.is_open = !session.is_open;
                true
            }
            None => false,
        }
    }

    /// Discards every session and starts over with a single fresh one.
    /// Returns the discarded sessions so the caller can clean the ledger.
    pub fn reset(&mut self, at: DateTime<Utc>) -> Vec<Session> {
        info!("session timeline reset, discarding {} sessions", self.sessions.len());
        std::mem::replace(&mut self.sessions, vec![Session::new(at)])
    }
}
