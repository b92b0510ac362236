//! Token-bucket pacing of egress words.

use crate::config::RateLimit;

/// Token bucket: `inc` tokens every `period` ticks, at most `size` held.
/// Each word let through spends one token.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    settings: RateLimit,
    tokens: u32,
    counter: u32,
}

impl RateLimiter {
    /// Start with a full bucket.
    pub fn new(settings: RateLimit) -> Self {
        Self { settings, tokens: settings.size, counter: 0 }
    }

    pub fn settings(&self) -> RateLimit {
        self.settings
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Change settings; the bucket is refilled.
    pub fn set(&mut self, settings: RateLimit) {
        *self = Self::new(settings);
    }

    /// Advance one tick.
    pub fn tick(&mut self) {
        if self.settings.is_unlimited() {
            return;
        }
        self.counter += 1;
        if self.counter >= self.settings.period {
            self.counter = 0;
            self.tokens = self.tokens.saturating_add(self.settings.inc).min(self.settings.size);
        }
    }

    /// True when a word may pass this tick.
    pub fn ready(&self) -> bool {
        self.settings.is_unlimited() || self.tokens > 0
    }

    /// Spend a token for a word that passed.
    pub fn consume(&mut self) {
        if !self.settings.is_unlimited() {
            debug_assert!(self.tokens > 0, "BUG: rate limiter consumed with no tokens");
            self.tokens = self.tokens.saturating_sub(1);
        }
    }
}
