//! Per-connection activity tracking.
//!
//! Each side records when it last received and last sent a frame. A periodic
//! task calls [`Activity::check`]: silence longer than the timeout drops the
//! peer, and an idle outbound direction gets a `PING` frame.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Traffic in both directions recently.
    Alive,
    /// Nothing sent for the keep-alive interval.
    NeedsPing,
    /// Nothing received for the timeout.
    TimedOut,
}

/// Last-received and last-sent timestamps of one connection.
#[derive(Debug)]
pub struct Activity {
    last_received: Mutex<Instant>,
    last_sent: Mutex<Instant>,
}

impl Activity {
    /// Start tracking with both timestamps at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            last_received: Mutex::new(now),
            last_sent: Mutex::new(now),
        }
    }

    /// Record an inbound frame.
    pub fn mark_received(&self, now: Instant) {
        *self.last_received.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Record an outbound frame.
    pub fn mark_sent(&self, now: Instant) {
        *self.last_sent.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Time since the last inbound frame.
    pub fn since_received(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_received.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Time since the last outbound frame.
    pub fn since_sent(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Classify the connection at `now`.
    pub fn check(&self, now: Instant, timeout: Duration, keepalive: Duration) -> Liveness {
        if self.since_received(now) > timeout {
            Liveness::TimedOut
        } else if self.since_sent(now) >= keepalive {
            Liveness::NeedsPing
        } else {
            Liveness::Alive
        }
    }
}
