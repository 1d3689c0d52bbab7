use std::collections::BTreeMap;

use tracing::debug;

use crate::limiter::CallLimiter;
use crate::rng::{next_random_bounded, shuffle_in_place};
use crate::sanitize::MentionPolicy;

/// Longest deletion delay an action may request, in seconds.
pub(crate) const MAX_DELETE_DELAY_SECS: i64 = 86_400;

/// Post-render deletion requests, read by the caller once rendering is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionIntent {
    pub delete_response: bool,
    pub response_delay_secs: i64,
    pub delete_trigger: bool,
    pub trigger_delay_secs: i64,
}

/// Mutable per-context state that action functions write into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub mentions: MentionPolicy,
    pub deletion: DeletionIntent,
    limiter: CallLimiter,
    rng_state: u32,
}

impl Session {
    pub(crate) fn new(seed: u32) -> Self {
        Self {
            mentions: MentionPolicy::deny_all(),
            deletion: DeletionIntent::default(),
            limiter: CallLimiter::new(),
            rng_state: seed,
        }
    }

    pub fn check_and_increment(&mut self, key: &str, limit: u64) -> bool {
        let exceeded = self.limiter.check_and_increment(key, limit);
        if exceeded {
            debug!(
                key,
                limit,
                count = self.limiter.count(key),
                "call limit exceeded"
            );
        }
        exceeded
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        self.limiter.counters()
    }

    pub fn random_below(&mut self, bound: u32) -> u32 {
        next_random_bounded(&mut self.rng_state, bound)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        shuffle_in_place(&mut self.rng_state, items);
    }
}

pub(crate) fn clamp_delay(delay_secs: i64) -> i64 {
    delay_secs.clamp(0, MAX_DELETE_DELAY_SECS)
}
