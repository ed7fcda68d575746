// Copyright 2026 loopd contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Anomaly Engine (spec.md §4.C, Component C): counter-to-rate conversion,
//! moving-average maintenance, and tiered alarm evaluation.
//!
//! Grounded line-for-line on `examples/original_source/src/loopd/data.cpp`:
//! `process_intdata` (counter handling), `calculate_datamav` (moving
//! average), and `check_alarm` (threshold evaluation and clear/re-arm).
//! The C++ pushes straight onto a global `alarm_queue` of raw pointers;
//! here each function returns an [`AlarmEvent`] and the caller (the Main
//! Controller tick loop) is responsible for pushing an [`AlarmRef`] onto
//! the identifier-based queue (spec.md §9 Design Notes).

use std::collections::VecDeque;

use crate::config::PollerConfig;
use crate::model::{AlarmKind, PollData};

/// The modulus a `Counter64` wraps around at: `2^64`, not `u64::MAX`
/// (`2^64 - 1`) — spec.md §4.C-1 defines the wrap delta as `2^64 - c0 + c`.
const COUNTER_MODULUS: u128 = 1u128 << 64;

/// Delta (in counts/sec) above which a decreasing counter is treated as a
/// device-side counter reset rather than a 64-bit wraparound, per spec.md §6.
const COUNTER_RESET_CUTOFF: f64 = 500_000.0;

/// Outcome of folding one new raw counter reading into an interface's
/// poll state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterUpdate {
    /// First sample ever seen for this interface; counter was only seeded.
    Seeded,
    /// The counter decreased by more than the reset cutoff; treated as a
    /// device-side reset. Counter reseeded, no rate sample recorded.
    Reset,
    /// A rate sample (counts/sec) was computed and pushed onto the window.
    Delta(f64),
}

/// Converts one new `ifHCInBroadcastPkts` reading into a rate sample,
/// updating `poll.counter` and, on success, pushing the sample onto the
/// front of `poll.mav_vals` (spec.md §4.C `process_intdata`).
///
/// `timedelta_secs` is the elapsed time since the previous poll, derived
/// from the device's sysUpTime delta.
pub fn ingest_counter(poll: &mut PollData, new_counter: u64, timedelta_secs: f64) -> CounterUpdate {
    if poll.counter == 0 {
        poll.counter = new_counter;
        return CounterUpdate::Seeded;
    }

    let delta = if new_counter < poll.counter {
        let wrapped = COUNTER_MODULUS - poll.counter as u128 + new_counter as u128;
        let rate = wrapped as f64 / timedelta_secs;
        if rate > COUNTER_RESET_CUTOFF {
            poll.counter = new_counter;
            return CounterUpdate::Reset;
        }
        rate
    } else {
        (new_counter - poll.counter) as f64 / timedelta_secs
    };

    poll.mav_vals.push_front(delta);
    poll.counter = new_counter;
    CounterUpdate::Delta(delta)
}

/// Recomputes the moving average after a new sample has been pushed onto
/// `poll.mav_vals` (spec.md §4.C `calculate_datamav`).
///
/// Uses the incremental update once the window is full (subtract the
/// sample leaving the window, add the one entering it) and a plain mean
/// while still warming up. Must be called exactly once per sample pushed
/// by [`ingest_counter`], before [`evaluate_alarm`].
pub fn update_moving_average(poll: &mut PollData, window_size: usize) {
    if poll.alarm == AlarmKind::None {
        poll.prevmav = poll.lastmav;
    }

    let msize = poll.mav_vals.len();
    if window_size < msize {
        let back = *poll.mav_vals.back().expect("msize > 0");
        let front = *poll.mav_vals.front().expect("msize > 0");
        poll.lastmav = poll.lastmav - (back / window_size as f64) + (front / window_size as f64);
        poll.mav_vals.pop_back();
    } else {
        let sum: f64 = poll.mav_vals.iter().sum();
        poll.lastmav = sum / msize as f64;
    }
}

/// Result of evaluating alarm thresholds for one interface after a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlarmEvent {
    /// No alarm active, none newly fired.
    Quiet,
    /// A previously firing alarm cleared and nothing re-fired this tick.
    Cleared,
    /// An alarm cleared and a (possibly different) condition immediately
    /// re-armed; per the original, this is logged but not re-queued the
    /// same tick the clear happened.
    ClearedAndRearmed(AlarmKind),
    /// An alarm is newly firing and should be pushed onto the alarm queue.
    Fired(AlarmKind),
    /// An alarm was already firing and still is; no new action needed.
    StillFiring(AlarmKind),
}

/// Evaluates (and possibly clears or fires) the alarm for one interface
/// (spec.md §4.C `check_alarm`).
///
/// `window_size` is the configured moving-average window, as a sample
/// count (matches [`PollerConfig::window_size`]).
pub fn evaluate_alarm(poll: &mut PollData, cfg: &PollerConfig, window_size: usize) -> AlarmEvent {
    let recover_ratio = cfg.recover_ratio_fraction();
    let front = match poll.mav_vals.front() {
        Some(&v) => v,
        None => return AlarmEvent::Quiet,
    };

    let mut check_reset = false;

    if poll.alarm != AlarmKind::None {
        let clears = match poll.alarm {
            AlarmKind::Bcmax => front < cfg.bcmax as f64,
            AlarmKind::Mavmax => poll.lastmav < cfg.mavmax as f64,
            AlarmKind::Spike => front < poll.prevmav * recover_ratio,
            AlarmKind::None => unreachable!(),
        };

        if clears {
            poll.alarm = AlarmKind::None;
            poll.lastmav = front;
            poll.prevmav = 0.0;
            poll.mav_vals.clear();
            check_reset = true;
        } else {
            return AlarmEvent::StillFiring(poll.alarm);
        }
    }

    let ratio = 0.8 - 0.7 * (poll.mav_vals.len() as f64 / window_size as f64);

    let front = poll.mav_vals.front().copied().unwrap_or(front);
    if (cfg.bcmax as f64) < front {
        poll.alarm = AlarmKind::Bcmax;
    } else if (cfg.mavmax as f64) < poll.lastmav {
        poll.alarm = AlarmKind::Mavmax;
    } else if poll.prevmav != 0.0
        && (cfg.mavlow as f64) < poll.lastmav
        && (poll.prevmav * ratio) < (poll.lastmav - poll.prevmav)
    {
        poll.alarm = AlarmKind::Spike;
    }

    if poll.alarm != AlarmKind::None {
        if check_reset {
            return AlarmEvent::ClearedAndRearmed(poll.alarm);
        }
        return AlarmEvent::Fired(poll.alarm);
    }

    if check_reset {
        AlarmEvent::Cleared
    } else {
        AlarmEvent::Quiet
    }
}

/// Drops samples beyond `window_size` from an externally-constructed
/// window. Only used by tests that seed `mav_vals` directly; production
/// code relies on [`update_moving_average`]'s incremental pop.
#[cfg(test)]
fn truncate(vals: &mut VecDeque<f64>, window_size: usize) {
    while vals.len() > window_size {
        vals.pop_back();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PollerConfig {
        PollerConfig {
            update_interval_hours: 6,
            poll_interval_secs: 10,
            recheck_interval_secs: 2,
            bcmax: 1000,
            mavlow: 10,
            mavmax: 500,
            recover_ratio_pct: 50,
        }
    }

    #[test]
    fn first_sample_only_seeds_counter() {
        let mut poll = PollData::default();
        let outcome = ingest_counter(&mut poll, 100, 10.0);
        assert_eq!(outcome, CounterUpdate::Seeded);
        assert_eq!(poll.counter, 100);
        assert!(poll.mav_vals.is_empty());
    }

    #[test]
    fn normal_increase_computes_rate() {
        let mut poll = PollData::default();
        poll.counter = 1000;
        let outcome = ingest_counter(&mut poll, 1100, 10.0);
        assert_eq!(outcome, CounterUpdate::Delta(10.0));
        assert_eq!(poll.mav_vals.front(), Some(&10.0));
    }

    #[test]
    fn large_decrease_is_treated_as_reset() {
        let mut poll = PollData::default();
        poll.counter = 5_000_000;
        let outcome = ingest_counter(&mut poll, 10, 1.0);
        assert_eq!(outcome, CounterUpdate::Reset);
        assert_eq!(poll.counter, 10);
        assert!(poll.mav_vals.is_empty());
    }

    #[test]
    fn small_decrease_is_treated_as_wraparound() {
        let mut poll = PollData::default();
        poll.counter = u64::MAX - 50;
        let outcome = ingest_counter(&mut poll, 50, 1.0);
        assert_eq!(outcome, CounterUpdate::Delta(101.0));
    }

    #[test]
    fn moving_average_means_while_warming_up() {
        let mut poll = PollData::default();
        poll.mav_vals.push_front(20.0);
        poll.mav_vals.push_front(10.0);
        update_moving_average(&mut poll, 360);
        assert!((poll.lastmav - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn moving_average_slides_once_window_is_full() {
        let mut poll = PollData::default();
        for v in [10.0, 10.0, 10.0] {
            poll.mav_vals.push_front(v);
        }
        update_moving_average(&mut poll, 3);
        assert!((poll.lastmav - 10.0).abs() < f64::EPSILON);

        poll.mav_vals.push_front(40.0);
        update_moving_average(&mut poll, 3);
        truncate(&mut poll.mav_vals, 3);
        assert!(poll.lastmav > 10.0);
        assert_eq!(poll.mav_vals.len(), 3);
    }

    #[test]
    fn bcmax_fires_on_raw_rate() {
        let mut poll = PollData::default();
        poll.mav_vals.push_front(2000.0);
        poll.lastmav = 50.0;
        let event = evaluate_alarm(&mut poll, &cfg(), 360);
        assert_eq!(event, AlarmEvent::Fired(AlarmKind::Bcmax));
    }

    #[test]
    fn mavmax_fires_on_average_rate() {
        let mut poll = PollData::default();
        poll.mav_vals.push_front(5.0);
        poll.lastmav = 600.0;
        let event = evaluate_alarm(&mut poll, &cfg(), 360);
        assert_eq!(event, AlarmEvent::Fired(AlarmKind::Mavmax));
    }

    #[test]
    fn bcmax_clears_once_rate_drops_back_down() {
        let mut poll = PollData::default();
        poll.alarm = AlarmKind::Bcmax;
        poll.mav_vals.push_front(5.0);
        poll.lastmav = 5.0;
        let event = evaluate_alarm(&mut poll, &cfg(), 360);
        assert_eq!(event, AlarmEvent::Cleared);
        assert_eq!(poll.alarm, AlarmKind::None);
    }

    #[test]
    fn still_firing_alarm_returns_early_without_reevaluating() {
        let mut poll = PollData::default();
        poll.alarm = AlarmKind::Bcmax;
        poll.mav_vals.push_front(5000.0);
        let event = evaluate_alarm(&mut poll, &cfg(), 360);
        assert_eq!(event, AlarmEvent::StillFiring(AlarmKind::Bcmax));
    }

    #[test]
    fn spike_requires_nonzero_baseline_and_minimum_average() {
        let mut poll = PollData::default();
        poll.mav_vals.push_front(50.0);
        poll.lastmav = 50.0;
        poll.prevmav = 5.0;
        let event = evaluate_alarm(&mut poll, &cfg(), 360);
        assert_eq!(event, AlarmEvent::Fired(AlarmKind::Spike));
    }

    #[test]
    fn no_samples_is_quiet() {
        let mut poll = PollData::default();
        let event = evaluate_alarm(&mut poll, &cfg(), 360);
        assert_eq!(event, AlarmEvent::Quiet);
    }
}
