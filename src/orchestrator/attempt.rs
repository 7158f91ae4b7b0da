//! Attempt accounting for one turn.
//!
//! A single budget covers every kind of recoverable failure: rejected
//! statements, database errors, anomalous results, and transient upstream
//! failures all draw from the same counter. Feedback is append-only, so the
//! final attempt sees everything every earlier attempt learned.

/// Tracks the 1-based attempt number and accumulated feedback.
#[derive(Debug)]
pub struct AttemptTracker {
    attempt: u8,
    max_attempts: u8,
    feedback: Vec<String>,
}

impl AttemptTracker {
    pub fn new(max_attempts: u8) -> Self {
        Self {
            attempt: 1,
            max_attempts: max_attempts.max(1),
            feedback: Vec::new(),
        }
    }

    pub fn current(&self) -> u8 {
        self.attempt
    }

    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    pub fn last_failure(&self) -> String {
        self.feedback
            .last()
            .cloned()
            .unwrap_or_else(|| "no failure recorded".to_string())
    }

    /// Add a feedback line without spending an attempt. Used for advisory
    /// notes (dropped tables, relaxed constraints) rather than failures.
    pub fn note(&mut self, line: String) {
        log::info!("Turn note: {}", line);
        self.feedback.push(line);
    }

    /// Record a recoverable failure. Returns true when another attempt is
    /// available, advancing the counter; false when the budget is spent.
    pub fn register_failure(&mut self, reason: String) -> bool {
        log::warn!("Attempt {} failed: {}", self.attempt, reason);
        self.feedback.push(reason);
        if self.attempt < self.max_attempts {
            self.attempt += 1;
            true
        } else {
            false
        }
    }
}
