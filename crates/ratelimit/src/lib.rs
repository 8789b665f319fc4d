// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rosey-ratelimit: Per-principal sliding-window request and token budgets.
//!
//! Each principal is tracked across a minute, an hour, and a day window for
//! requests plus a daily token counter. Windows roll lazily: nothing ticks,
//! a window resets on first access past its horizon.

mod limiter;
mod window;

pub use limiter::{
    Decision, GlobalStats, RateLimitConfig, RateLimiter, Remaining, ThresholdHit,
    ThresholdWindow, UsageSnapshot,
};
