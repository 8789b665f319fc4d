// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The rate limiter.

use crate::window::Window;
use parking_lot::{Mutex, RwLock};
use rosey_core::{Clock, PrincipalId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Limits applied to every principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub requests_per_minute: u64,
    pub requests_per_hour: u64,
    pub requests_per_day: u64,
    pub tokens_per_day: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
            requests_per_hour: 100,
            requests_per_day: 500,
            tokens_per_day: 50_000,
        }
    }
}

/// Outcome of a [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Human-readable denial reason, including seconds until reset.
    pub reason: Option<String>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Current counters and limits for a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub requests_minute: u64,
    pub requests_hour: u64,
    pub requests_day: u64,
    pub tokens_day: u64,
    pub limit_minute: u64,
    pub limit_hour: u64,
    pub limit_day: u64,
    pub limit_tokens_day: u64,
}

/// Remaining capacity for a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub requests_minute: u64,
    pub requests_hour: u64,
    pub requests_day: u64,
    pub tokens_day: u64,
}

/// Window named in a threshold report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdWindow {
    Minute,
    Hour,
    Day,
    Tokens,
}

impl fmt::Display for ThresholdWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThresholdWindow::Minute => "minute",
            ThresholdWindow::Hour => "hour",
            ThresholdWindow::Day => "day",
            ThresholdWindow::Tokens => "tokens",
        };
        write!(f, "{name}")
    }
}

/// A window running at or past the warning ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdHit {
    pub window: ThresholdWindow,
    pub current: u64,
    pub limit: u64,
}

/// Aggregate usage across every tracked principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub principals: usize,
    pub requests_day: u64,
    pub tokens_day: u64,
}

struct Usage {
    minute: Window,
    hour: Window,
    day: Window,
}

impl Usage {
    fn new(now: Instant) -> Self {
        Self {
            minute: Window::new(now, Duration::from_secs(60)),
            hour: Window::new(now, Duration::from_secs(60 * 60)),
            day: Window::new(now, Duration::from_secs(24 * 60 * 60)),
        }
    }

    fn roll(&mut self, now: Instant) {
        self.minute.roll(now);
        self.hour.roll(now);
        self.day.roll(now);
    }
}

/// Thread-safe per-principal rate limiter.
///
/// `check` and `record` synchronize on the principal's entry mutex, so a
/// check-then-record pair from two tasks cannot over-admit past a limit by
/// more than the raciness the two-call protocol itself allows.
pub struct RateLimiter<C: Clock> {
    config: RateLimitConfig,
    clock: C,
    usage: RwLock<HashMap<PrincipalId, Arc<Mutex<Usage>>>>,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(config: RateLimitConfig, clock: C) -> Self {
        debug!(
            per_minute = config.requests_per_minute,
            per_hour = config.requests_per_hour,
            per_day = config.requests_per_day,
            tokens_per_day = config.tokens_per_day,
            "rate limiter configured"
        );
        Self {
            config,
            clock,
            usage: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Whether the principal may make another request right now.
    pub fn check(&self, principal: &PrincipalId) -> Decision {
        let now = self.clock.now();
        let entry = self.entry(principal);
        let mut usage = entry.lock();
        usage.roll(now);

        let config = &self.config;
        if usage.minute.count >= config.requests_per_minute {
            let secs = usage.minute.resets_in(now).as_secs();
            return Decision::deny(format!(
                "Rate limit: {} requests/minute (resets in {}s)",
                config.requests_per_minute, secs
            ));
        }
        if usage.hour.count >= config.requests_per_hour {
            let minutes = usage.hour.resets_in(now).as_secs() / 60;
            return Decision::deny(format!(
                "Rate limit: {} requests/hour (resets in {} minutes)",
                config.requests_per_hour, minutes
            ));
        }
        if usage.day.count >= config.requests_per_day {
            let hours = usage.day.resets_in(now).as_secs() / 3600;
            return Decision::deny(format!(
                "Rate limit: {} requests/day (resets in {} hours)",
                config.requests_per_day, hours
            ));
        }
        if usage.day.tokens >= config.tokens_per_day {
            let hours = usage.day.resets_in(now).as_secs() / 3600;
            return Decision::deny(format!(
                "Token limit: {} tokens/day (resets in {} hours)",
                config.tokens_per_day, hours
            ));
        }
        Decision::allow()
    }

    /// Record one request and its token usage.
    pub fn record(&self, principal: &PrincipalId, tokens: u64) {
        let now = self.clock.now();
        let entry = self.entry(principal);
        let mut usage = entry.lock();
        usage.roll(now);

        usage.minute.count += 1;
        usage.hour.count += 1;
        usage.day.count += 1;
        usage.day.tokens += tokens;

        debug!(
            principal = %principal,
            minute = usage.minute.count,
            hour = usage.hour.count,
            day = usage.day.count,
            tokens = usage.day.tokens,
            "usage recorded"
        );
    }

    /// Current counters alongside the configured limits.
    pub fn usage(&self, principal: &PrincipalId) -> UsageSnapshot {
        let now = self.clock.now();
        let entry = self.entry(principal);
        let mut usage = entry.lock();
        usage.roll(now);

        UsageSnapshot {
            requests_minute: usage.minute.count,
            requests_hour: usage.hour.count,
            requests_day: usage.day.count,
            tokens_day: usage.day.tokens,
            limit_minute: self.config.requests_per_minute,
            limit_hour: self.config.requests_per_hour,
            limit_day: self.config.requests_per_day,
            limit_tokens_day: self.config.tokens_per_day,
        }
    }

    /// Capacity left in each window.
    pub fn remaining(&self, principal: &PrincipalId) -> Remaining {
        let snapshot = self.usage(principal);
        Remaining {
            requests_minute: snapshot.limit_minute.saturating_sub(snapshot.requests_minute),
            requests_hour: snapshot.limit_hour.saturating_sub(snapshot.requests_hour),
            requests_day: snapshot.limit_day.saturating_sub(snapshot.requests_day),
            tokens_day: snapshot
                .limit_tokens_day
                .saturating_sub(snapshot.tokens_day),
        }
    }

    /// Drop all tracking for a principal.
    pub fn reset(&self, principal: &PrincipalId) {
        if self.usage.write().remove(principal).is_some() {
            debug!(principal = %principal, "rate limits reset");
        }
    }

    /// First window at or past `ratio` of its limit, checked
    /// minute → hour → day → tokens. Windows with a zero limit are skipped.
    pub fn check_threshold(
        &self,
        principal: &PrincipalId,
        ratio: f64,
    ) -> Option<ThresholdHit> {
        let snapshot = self.usage(principal);
        let windows = [
            (
                ThresholdWindow::Minute,
                snapshot.requests_minute,
                snapshot.limit_minute,
            ),
            (
                ThresholdWindow::Hour,
                snapshot.requests_hour,
                snapshot.limit_hour,
            ),
            (ThresholdWindow::Day, snapshot.requests_day, snapshot.limit_day),
            (
                ThresholdWindow::Tokens,
                snapshot.tokens_day,
                snapshot.limit_tokens_day,
            ),
        ];

        windows
            .into_iter()
            .find(|(_, current, limit)| {
                *limit > 0 && (*current as f64 / *limit as f64) >= ratio
            })
            .map(|(window, current, limit)| ThresholdHit {
                window,
                current,
                limit,
            })
    }

    /// Aggregate day-window usage across all principals.
    pub fn global_stats(&self) -> GlobalStats {
        let now = self.clock.now();
        let usage = self.usage.read();
        let mut requests_day = 0;
        let mut tokens_day = 0;
        for entry in usage.values() {
            let mut u = entry.lock();
            u.roll(now);
            requests_day += u.day.count;
            tokens_day += u.day.tokens;
        }
        GlobalStats {
            principals: usage.len(),
            requests_day,
            tokens_day,
        }
    }

    fn entry(&self, principal: &PrincipalId) -> Arc<Mutex<Usage>> {
        if let Some(entry) = self.usage.read().get(principal) {
            return Arc::clone(entry);
        }
        let now = self.clock.now();
        let mut usage = self.usage.write();
        Arc::clone(
            usage
                .entry(principal.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Usage::new(now)))),
        )
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
