// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate-limit boundary scenarios.

use rosey_core::{FakeClock, PrincipalId};
use rosey_ratelimit::{RateLimitConfig, RateLimiter};
use std::time::Duration;

#[test]
fn exactly_the_limit_allows_then_denies_then_reopens() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(
        RateLimitConfig {
            requests_per_minute: 5,
            ..RateLimitConfig::default()
        },
        clock.clone(),
    );
    let alice = PrincipalId::new("alice");

    // five check+record pairs in quick succession all pass
    for i in 0..5 {
        let decision = limiter.check(&alice);
        assert!(decision.allowed, "request {i} should be allowed");
        limiter.record(&alice, 0);
    }

    // the sixth is denied with a minute-window reason
    let decision = limiter.check(&alice);
    assert!(!decision.allowed);
    assert!(decision.reason.unwrap().contains("minute"));
    assert_eq!(limiter.remaining(&alice).requests_minute, 0);

    // once the minute elapses, the window reopens
    clock.advance(Duration::from_secs(61));
    assert!(limiter.check(&alice).allowed);
}

#[test]
fn record_then_usage_counts_every_active_window() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(RateLimitConfig::default(), clock);
    let bob = PrincipalId::new("bob");

    let before = limiter.usage(&bob);
    limiter.record(&bob, 42);
    let after = limiter.usage(&bob);

    assert_eq!(after.requests_minute, before.requests_minute + 1);
    assert_eq!(after.requests_hour, before.requests_hour + 1);
    assert_eq!(after.requests_day, before.requests_day + 1);
    assert_eq!(after.tokens_day, before.tokens_day + 42);
}

#[test]
fn allow_implies_strictly_under_every_limit() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(
        RateLimitConfig {
            requests_per_minute: 3,
            requests_per_hour: 4,
            requests_per_day: 5,
            tokens_per_day: 100,
        },
        clock,
    );
    let carol = PrincipalId::new("carol");

    while limiter.check(&carol).allowed {
        let snapshot = limiter.usage(&carol);
        assert!(snapshot.requests_minute < 3);
        assert!(snapshot.requests_hour < 4);
        assert!(snapshot.requests_day < 5);
        assert!(snapshot.tokens_day < 100);
        limiter.record(&carol, 30);
    }

    // denial came from the first exhausted window
    let reason = limiter.check(&carol).reason.unwrap();
    assert!(reason.contains("minute"), "unexpected reason: {reason}");
}
