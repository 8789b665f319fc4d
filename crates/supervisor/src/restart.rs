// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart bookkeeping: attempt window, exponential backoff, circuit breaker.

use rand::Rng;
use rosey_core::RestartConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of a crash under the restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart after `delay`; this is attempt number `attempt` within the
    /// current window.
    Restart { delay: Duration, attempt: u32 },
    /// Attempts within the window exceeded `max_restarts`.
    CircuitOpen,
}

/// Tracks restart attempts for one plugin.
#[derive(Debug)]
pub struct RestartTracker {
    config: RestartConfig,
    attempts: VecDeque<Instant>,
}

impl RestartTracker {
    pub fn new(config: RestartConfig) -> Self {
        Self {
            config,
            attempts: VecDeque::new(),
        }
    }

    /// Decide whether another restart is allowed at `now`, recording the
    /// attempt when it is.
    pub fn on_crash(&mut self, now: Instant) -> RestartDecision {
        self.prune(now);

        if self.attempts.len() as u32 >= self.config.max_restarts {
            return RestartDecision::CircuitOpen;
        }

        let attempt = self.attempts.len() as u32 + 1;
        self.attempts.push_back(now);
        RestartDecision::Restart {
            delay: jittered(backoff_delay(&self.config, attempt)),
            attempt,
        }
    }

    /// Attempts still inside the window. The counter reads as zero once no
    /// restart has happened for a full window.
    pub fn attempts_in_window(&mut self, now: Instant) -> u32 {
        self.prune(now);
        self.attempts.len() as u32
    }

    pub fn reset(&mut self) {
        self.attempts.clear();
    }

    fn prune(&mut self, now: Instant) {
        let window = self.config.window;
        while let Some(front) = self.attempts.front() {
            if now.duration_since(*front) >= window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Pure backoff: min(initial * multiplier^(n-1), max).
pub fn backoff_delay(config: &RestartConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = config.backoff_multiplier.powi(exponent as i32);
    let delay = config.initial_backoff.as_secs_f64() * factor;
    Duration::from_secs_f64(delay.min(config.max_backoff.as_secs_f64()))
}

// ±10% so restarting plugins do not thunder in lockstep
fn jittered(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.9..=1.1);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

#[cfg(test)]
#[path = "restart_tests.rs"]
mod tests;
