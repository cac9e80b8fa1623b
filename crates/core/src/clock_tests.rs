// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}

#[test]
fn fake_clock_starts_stable() {
    let a = FakeClock::new();
    let b = FakeClock::new();
    assert_eq!(a.now(), b.now());
}

#[test]
fn fake_clock_advance() {
    let clock = FakeClock::new();
    let start = clock.now();
    clock.advance(Duration::seconds(30));
    assert_eq!(clock.now() - start, Duration::seconds(30));
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::milliseconds(250));
    assert_eq!(clock.now(), other.now());
}

#[test]
fn fake_clock_set() {
    let clock = FakeClock::new();
    let target = clock.now() + Duration::hours(1);
    clock.set(target);
    assert_eq!(clock.now(), target);
}
