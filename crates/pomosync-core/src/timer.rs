//! Shared play/pause timer.
//!
//! The timer is either idle (`start_epoch_ms == 0`) or running since
//! `start_epoch_ms`. `elapsed_secs` accumulates closed running intervals and
//! only advances on a transition out of running.

use serde::{Deserialize, Serialize};

use crate::protocol::Action;

/// Canonical timer state of one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    /// Wall-clock millis of the last resume, `0` while idle.
    #[serde(rename = "startTime")]
    pub start_epoch_ms: i64,
    /// Accumulated seconds of all closed running intervals.
    #[serde(rename = "elapsedTime")]
    pub elapsed_secs: i64,
}

impl TimerState {
    /// Whether an interval is currently open.
    pub fn is_running(&self) -> bool {
        self.start_epoch_ms != 0
    }

    /// Whether a joiner needs a state replay (running or paused with progress).
    pub fn has_progress(&self) -> bool {
        self.start_epoch_ms > 0 || self.elapsed_secs > 0
    }

    /// Open a running interval at `now_ms`. No-op while running.
    ///
    /// Returns `true` if the state changed.
    pub fn play(&mut self, now_ms: i64) -> bool {
        if self.is_running() {
            return false;
        }
        self.start_epoch_ms = now_ms;
        true
    }

    /// Close the running interval at `now_ms`. No-op while idle.
    ///
    /// The interval is truncated to whole seconds. A clock that moved
    /// backwards contributes nothing.
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if !self.is_running() {
            return false;
        }
        let interval_ms = (now_ms - self.start_epoch_ms).max(0);
        self.elapsed_secs += interval_ms / 1000;
        self.start_epoch_ms = 0;
        true
    }

    /// Apply an action; only `play` and `pause` touch the timer.
    pub fn apply(&mut self, action: &Action, now_ms: i64) -> bool {
        match action {
            Action::Play => self.play(now_ms),
            Action::Pause => self.pause(now_ms),
            _ => false,
        }
    }

    /// `"<startTime>,<elapsedTime>"` payload of a state replay.
    pub fn replay_data(&self) -> String {
        format!("{},{}", self.start_epoch_ms, self.elapsed_secs)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_is_idle_without_progress() {
        let t = TimerState::default();
        assert!(!t.is_running());
        assert!(!t.has_progress());
    }

    #[test]
    fn play_records_start() {
        let mut t = TimerState::default();
        assert!(t.play(1_000));
        assert_eq!(t.start_epoch_ms, 1_000);
        assert!(t.is_running());
        assert!(t.has_progress());
    }

    #[test]
    fn play_while_running_is_noop() {
        let mut t = TimerState::default();
        let _ = t.play(1_000);
        assert!(!t.play(5_000));
        assert_eq!(t.start_epoch_ms, 1_000);
    }

    #[test]
    fn pause_accumulates_truncated_seconds() {
        let mut t = TimerState::default();
        let _ = t.play(10_000);
        assert!(t.pause(12_999));
        assert_eq!(t.elapsed_secs, 2);
        assert_eq!(t.start_epoch_ms, 0);
    }

    #[test]
    fn pause_while_idle_is_noop() {
        let mut t = TimerState {
            start_epoch_ms: 0,
            elapsed_secs: 7,
        };
        assert!(!t.pause(99_000));
        assert_eq!(t.elapsed_secs, 7);
    }

    #[test]
    fn paused_with_progress_needs_replay() {
        let t = TimerState {
            start_epoch_ms: 0,
            elapsed_secs: 3,
        };
        assert!(!t.is_running());
        assert!(t.has_progress());
    }

    #[test]
    fn backwards_clock_adds_nothing() {
        let mut t = TimerState::default();
        let _ = t.play(50_000);
        let _ = t.pause(40_000);
        assert_eq!(t.elapsed_secs, 0);
    }

    #[test]
    fn apply_ignores_non_timer_actions() {
        let mut t = TimerState::default();
        assert!(!t.apply(&Action::Chat, 1_000));
        assert!(!t.apply(&Action::Unknown, 1_000));
        assert_eq!(t, TimerState::default());
        assert!(t.apply(&Action::Play, 1_000));
        assert!(t.apply(&Action::Pause, 3_000));
        assert_eq!(t.elapsed_secs, 2);
    }

    #[test]
    fn replay_data_is_comma_joined() {
        let t = TimerState {
            start_epoch_ms: 1_700_000_000_000,
            elapsed_secs: 42,
        };
        assert_eq!(t.replay_data(), "1700000000000,42");
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let t = TimerState {
            start_epoch_ms: 5,
            elapsed_secs: 6,
        };
        let json = serde_json::to_value(t).unwrap();
        assert_eq!(json["startTime"], 5);
        assert_eq!(json["elapsedTime"], 6);
    }

    #[derive(Clone, Debug)]
    enum Step {
        Play,
        Pause,
    }

    fn step() -> impl Strategy<Value = (Step, i64)> {
        (
            prop_oneof![Just(Step::Play), Just(Step::Pause)],
            0i64..10_000,
        )
    }

    proptest! {
        /// After every pause, elapsed equals the sum of closed intervals,
        /// regardless of repeated no-op plays and pauses.
        #[test]
        fn elapsed_is_sum_of_closed_intervals(steps in prop::collection::vec(step(), 0..64)) {
            let mut timer = TimerState::default();
            let mut now = 1_000_000i64;
            let mut open: Option<i64> = None;
            let mut expected = 0i64;

            for (kind, advance) in steps {
                now += advance;
                match kind {
                    Step::Play => {
                        let changed = timer.play(now);
                        prop_assert_eq!(changed, open.is_none());
                        if open.is_none() {
                            open = Some(now);
                        }
                    }
                    Step::Pause => {
                        let changed = timer.pause(now);
                        prop_assert_eq!(changed, open.is_some());
                        if let Some(started) = open.take() {
                            expected += (now - started) / 1000;
                        }
                        prop_assert_eq!(timer.elapsed_secs, expected);
                        prop_assert!(!timer.is_running());
                    }
                }
            }
        }
    }
}
