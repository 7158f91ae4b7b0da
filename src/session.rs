//! Conversation session registry.
//!
//! Sessions are keyed by caller-supplied ID and hold the exchange history
//! that future prompts may draw on. A session processes at most one turn at
//! a time: a second message while a turn is in flight is rejected rather
//! than queued. Clearing a session bumps its epoch, which cancels the
//! in-flight turn at its next state boundary and discards its result.
//!
//! Idle sessions are evicted lazily: every registry access sweeps entries
//! whose last activity is older than the TTL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session '{session_id}' already has a message in flight")]
    Busy { session_id: String },
}

/// One completed question/answer pair.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

struct SessionEntry {
    history: Vec<Exchange>,
    epoch: Arc<AtomicU64>,
    in_flight: Arc<AtomicBool>,
    last_active: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            epoch: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicBool::new(false)),
            last_active: Instant::now(),
        }
    }
}

/// Held for the duration of one turn. Dropping it releases the session's
/// in-flight slot regardless of how the turn ended.
pub struct TurnGuard {
    epoch: Arc<AtomicU64>,
    started_epoch: u64,
    in_flight: Arc<AtomicBool>,
}

impl TurnGuard {
    /// True once the session was cleared after this turn started. The
    /// orchestrator polls this at state boundaries and abandons the turn.
    pub fn cancelled(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) != self.started_epoch
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Claim the session for one turn, creating it on first contact.
    /// Returns the guard plus a snapshot of the history so the turn can run
    /// without holding any lock.
    pub fn begin_turn(&self, session_id: &str) -> Result<(TurnGuard, Vec<Exchange>), SessionError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let ttl = self.ttl;
        sessions.retain(|_, entry| {
            entry.in_flight.load(Ordering::SeqCst) || now.duration_since(entry.last_active) < ttl
        });

        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionEntry::new);

        if entry.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Busy {
                session_id: session_id.to_string(),
            });
        }
        entry.last_active = now;

        let guard = TurnGuard {
            epoch: Arc::clone(&entry.epoch),
            started_epoch: entry.epoch.load(Ordering::SeqCst),
            in_flight: Arc::clone(&entry.in_flight),
        };
        Ok((guard, entry.history.clone()))
    }

    /// Persist a finished exchange. A turn that was cancelled, or whose
    /// session was cleared and recreated meanwhile, writes nothing.
    pub fn record_exchange(
        &self,
        session_id: &str,
        guard: &TurnGuard,
        question: String,
        answer: String,
    ) {
        if guard.cancelled() {
            return;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = sessions.get_mut(session_id) {
            if Arc::ptr_eq(&entry.epoch, &guard.epoch) {
                entry.history.push(Exchange { question, answer });
                entry.last_active = Instant::now();
            }
        }
    }

    /// Drop the session's history and cancel any in-flight turn. Returns
    /// whether a session existed.
    pub fn clear(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.remove(session_id) {
            Some(entry) => {
                entry.epoch.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
