/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub const DEFAULT_WINDOW_SECS: u64 = 2 * 60 * 60;

/// Seconds left before a node may bump again. Never more than `window_secs`,
/// even when `now` is behind `last_bump_ts`.
pub fn remaining(last_bump_ts: i64, now: i64, window_secs: u64) -> u64 {
    let elapsed = now.saturating_sub(last_bump_ts).max(0) as u64;
    window_secs.saturating_sub(elapsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakdown {
    pub hours: u64,
    pub minutes: u64,
}

pub fn breakdown(remaining_secs: u64) -> Breakdown {
    Breakdown {
        hours: remaining_secs / 3600,
        minutes: (remaining_secs % 3600) / 60,
    }
}

/// "1h 59m", or "<1m" for the last minute.
pub fn describe(remaining_secs: u64) -> String {
    let b = breakdown(remaining_secs);
    if b.hours == 0 && b.minutes == 0 {
        return "<1m".to_string();
    }
    format!("{}h {}m", b.hours, b.minutes)
}
