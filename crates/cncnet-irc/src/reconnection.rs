//! Bounded reconnect budget for lost IRC sessions.
//!
//! After a lost connection the client waits [`ReconnectConfig::delay`] and
//! reconnects, up to [`ReconnectConfig::max_attempts`] times. A welcome
//! ([`ReconnectState::reset`]) restores the full budget; once it is spent the
//! connection stays down until the user connects again.

use std::time::Duration;

/// Reconnect policy of an [`IrcConnection`](crate::IrcConnection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Pause before each reconnect attempt. Default: 4 s.
    pub delay: Duration,
    /// Attempts allowed between two welcomes. Default: 8.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(4),
            max_attempts: 8,
        }
    }
}

/// Attempts spent against a [`ReconnectConfig`] budget.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectState {
    /// A fresh state with the whole budget available.
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempts: 0 }
    }

    /// Spend one attempt and return the pause before it, or `None` when the
    /// budget is used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.has_budget() {
            return None;
        }
        self.attempts += 1;
        Some(self.config.delay)
    }

    /// Restore the full budget. Called on every welcome.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts spent since the last welcome.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is allowed.
    pub fn has_budget(&self) -> bool {
        self.attempts < self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_by_default() {
        let mut state = ReconnectState::new(ReconnectConfig::default());
        assert_eq!(state.next_delay(), Some(Duration::from_secs(4)));
        assert_eq!(state.next_delay(), Some(Duration::from_secs(4)));
        assert_eq!(state.attempts(), 2);
    }

    #[test]
    fn test_budget_exhausted_after_max_attempts() {
        let mut state = ReconnectState::new(ReconnectConfig::default());
        for _ in 0..8 {
            assert!(state.next_delay().is_some());
        }
        assert!(!state.has_budget());
        assert_eq!(state.next_delay(), None, "ninth loss gets no reconnect");
        assert_eq!(state.attempts(), 8);
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut state = ReconnectState::new(ReconnectConfig::default());
        for _ in 0..5 {
            state.next_delay();
        }
        state.reset();
        assert_eq!(state.attempts(), 0);
        for _ in 0..8 {
            assert!(state.next_delay().is_some());
        }
    }

    #[test]
    fn test_zero_budget_never_reconnects() {
        let mut state = ReconnectState::new(ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        });
        assert_eq!(state.next_delay(), None);
    }
}
