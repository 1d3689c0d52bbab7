use std::collections::BTreeMap;

/// Named call counters that live as long as their context.
///
/// Counters only ever grow; the limiter answers "has this key been used more
/// than `limit` times" and leaves the reaction to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLimiter {
    counters: BTreeMap<String, u64>,
}

impl CallLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps `key` and returns true once its count exceeds `limit`.
    pub fn check_and_increment(&mut self, key: &str, limit: u64) -> bool {
        let current = self.counters.entry(key.to_string()).or_insert(0);
        *current = current.saturating_add(1);
        *current > limit
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }
}
