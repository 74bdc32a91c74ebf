//! Match statistics hook.

use std::collections::HashMap;
use std::time::Duration;

/// Receives the play time of a resumed match.
pub trait StatisticsStore: Send {
    /// Add `duration` to the record of `game_id`. Returns `false` when no
    /// record exists for the game.
    fn add_duration(&mut self, game_id: &str, duration: Duration) -> bool;
}

/// Keeps durations in memory, keyed by game id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatistics {
    records: HashMap<String, Duration>,
}

impl InMemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `game_id` with zero play time.
    pub fn insert_record(&mut self, game_id: impl Into<String>) {
        self.records.entry(game_id.into()).or_default();
    }

    pub fn duration(&self, game_id: &str) -> Option<Duration> {
        self.records.get(game_id).copied()
    }
}

impl StatisticsStore for InMemoryStatistics {
    fn add_duration(&mut self, game_id: &str, duration: Duration) -> bool {
        match self.records.get_mut(game_id) {
            Some(total) => {
                *total += duration;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_existing_records_accumulate() {
        let mut stats = InMemoryStatistics::new();
        assert!(!stats.add_duration("5521", Duration::from_secs(60)));
        stats.insert_record("5521");
        assert!(stats.add_duration("5521", Duration::from_secs(60)));
        assert!(stats.add_duration("5521", Duration::from_secs(30)));
        assert_eq!(stats.duration("5521"), Some(Duration::from_secs(90)));
        assert_eq!(stats.duration("1"), None);
    }
}
