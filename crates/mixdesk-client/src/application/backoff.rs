//! Bounded exponential backoff with jitter for reconnect scheduling.
//!
//! One [`RecoveryEpisode`] spans one outage: it starts when the socket drops
//! and ends either with a successful reconnect (the episode is simply
//! dropped, and the next outage starts a fresh one — the attempt counter
//! resets on every successful connect) or when a bound is hit.  Two bounds
//! apply, and whichever is reached first wins:
//!
//! - `max_attempts` — total connect attempts in the episode,
//! - `max_elapsed` — wall-clock budget since the episode started.
//!
//! The schedule is `min(cap, base * 2^attempt)` scaled by a random factor in
//! `1 ± jitter_fraction`, so a fleet of clients that lost the same console
//! does not reconnect in lockstep.

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::config::ReconnectPolicy;

/// Tracks attempts and elapsed budget across one recovery outage.
pub struct RecoveryEpisode {
    policy: ReconnectPolicy,
    /// Attempts made so far (0 before the first).
    attempts: u32,
    /// Hard stop for the whole episode.
    deadline: Instant,
}

impl RecoveryEpisode {
    /// Starts an episode at `now` (the moment the disconnect was observed).
    pub fn start(policy: ReconnectPolicy, now: Instant) -> Self {
        let deadline = now + policy.max_elapsed;
        Self {
            policy,
            attempts: 0,
            deadline,
        }
    }

    /// Returns the next attempt number (1-based) and the delay to sleep
    /// before it, or `None` when either bound is exhausted.
    ///
    /// Calling this *consumes* an attempt: the caller must actually try to
    /// connect after sleeping the returned delay.
    pub fn next_attempt(&mut self, now: Instant) -> Option<(u32, Duration)> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        if now >= self.deadline {
            return None;
        }

        let delay = jittered(
            raw_delay(&self.policy, self.attempts),
            self.policy.jitter_fraction,
            rand::random::<f64>(),
        );
        self.attempts += 1;
        Some((self.attempts, delay))
    }

    /// Attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// The unjittered delay before attempt `attempt` (0-based):
/// `min(cap, base * 2^attempt)`, saturating.
fn raw_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    policy.base.saturating_mul(factor).min(policy.cap)
}

/// Scales `delay` by a factor in `1 ± fraction`, with `unit` drawn uniformly
/// from `[0, 1)`.  Split out from the random draw so the shape is testable.
fn jittered(delay: Duration, fraction: f64, unit: f64) -> Duration {
    let fraction = fraction.clamp(0.0, 1.0);
    let scale = (1.0 - fraction) + 2.0 * fraction * unit;
    delay.mul_f64(scale)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
