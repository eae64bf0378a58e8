// Per-key suppression windows shared by the alert evaluator and the arming
// trigger path.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Last-fire timestamps keyed by `K`, measured on the scheduler's monotonic clock.
#[derive(Debug, Clone)]
pub struct CooldownTable<K> {
    last_fired: HashMap<K, Duration>,
}

impl<K: Eq + Hash> CooldownTable<K> {
    pub fn new() -> Self {
        Self {
            last_fired: HashMap::new(),
        }
    }

    /// True if `key` fired less than `window` ago.
    pub fn is_cooling(&self, key: &K, now: Duration, window: Duration) -> bool {
        self.last_fired
            .get(key)
            .map(|last| now.saturating_sub(*last) < window)
            .unwrap_or(false)
    }

    /// Record a fire for `key` unless it is still cooling down.
    /// Returns whether the fire was accepted.
    pub fn try_fire(&mut self, key: K, now: Duration, window: Duration) -> bool {
        if self.is_cooling(&key, now, window) {
            return false;
        }
        self.last_fired.insert(key, now);
        true
    }

    pub fn last_fired(&self, key: &K) -> Option<Duration> {
        self.last_fired.get(key).copied()
    }

    pub fn reset(&mut self, key: &K) {
        self.last_fired.remove(key);
    }

    pub fn clear(&mut self) {
        self.last_fired.clear();
    }
}

impl<K: Eq + Hash> Default for CooldownTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_blocks_then_reopens() {
        let mut table = CooldownTable::new();
        let window = Duration::from_secs(30);

        assert!(table.try_fire("motion", Duration::from_secs(0), window));
        assert!(!table.try_fire("motion", Duration::from_secs(29), window));
        assert!(table.try_fire("motion", Duration::from_secs(30), window));
        assert_eq!(table.last_fired(&"motion"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut table = CooldownTable::new();
        let window = Duration::from_secs(30);

        assert!(table.try_fire("motion", Duration::from_secs(0), window));
        assert!(table.try_fire("audio", Duration::from_secs(1), window));
        assert!(table.is_cooling(&"motion", Duration::from_secs(2), window));
    }

    #[test]
    fn test_suppressed_fire_does_not_extend_window() {
        let mut table = CooldownTable::new();
        let window = Duration::from_secs(10);

        table.try_fire((), Duration::from_secs(0), window);
        table.try_fire((), Duration::from_secs(9), window);
        assert!(table.try_fire((), Duration::from_secs(10), window));
    }

    #[test]
    fn test_reset_clears_key() {
        let mut table = CooldownTable::new();
        let window = Duration::from_secs(60);

        table.try_fire(1u8, Duration::from_secs(0), window);
        table.reset(&1);
        assert!(table.try_fire(1, Duration::from_secs(1), window));
    }
}
