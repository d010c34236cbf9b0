// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances_monotonic_and_epoch() {
    let clock = FakeClock::new();
    let t0 = clock.now();
    let e0 = clock.epoch_ms();

    clock.advance(Duration::from_secs(5));

    assert_eq!(clock.now() - t0, Duration::from_secs(5));
    assert_eq!(clock.epoch_ms() - e0, 5000);
}

#[test]
fn fake_clock_clones_share_offset() {
    let clock = FakeClock::new();
    let clone = clock.clone();
    clock.advance(Duration::from_millis(250));
    assert_eq!(clone.epoch_ms(), clock.epoch_ms());
}

#[test]
fn iso_timestamps_carry_z_suffix() {
    let ts = utc_now_iso();
    assert!(ts.ends_with('Z'), "expected Z suffix, got {ts}");

    let fixed = iso_from_epoch_ms(1_700_000_000_000);
    assert!(fixed.starts_with("2023-11-14T"), "got {fixed}");
    assert!(fixed.ends_with('Z'));
}

#[test]
fn system_clock_epoch_is_sane() {
    let clock = SystemClock;
    // Past 2020-01-01 in epoch milliseconds
    assert!(clock.epoch_ms() > 1_577_836_800_000);
}
