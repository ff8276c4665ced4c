//! Logical clocks and the interpolated playhead.
//!
//! The backend orders every transition by a `(time, theta)` pair. `time` is
//! an integer bucket, `theta` the position inside that bucket. Before the
//! first step both are unset.
//!
//! The playhead is the front-end's own clock. It advances continuously while
//! playing, so its `time` is fractional between steps and its `theta` is
//! unknown there. An interpolated playhead compares as if `theta` were
//! infinite: it sits after every event of its integer bucket.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A backend-assigned `(time, theta)` pair.
///
/// Ordering is total: an unset component sorts before every set one, then
/// `time` is compared before `theta`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LogicalClock {
    pub time: Option<u64>,
    pub theta: Option<u64>,
}

impl LogicalClock {
    /// No backend time established yet.
    pub const UNSET: LogicalClock = LogicalClock {
        time: None,
        theta: None,
    };

    /// A clock at a defined step.
    pub const fn at(time: u64, theta: u64) -> Self {
        Self {
            time: Some(time),
            theta: Some(theta),
        }
    }

    /// Whether the backend has produced a first event.
    pub fn is_set(&self) -> bool {
        self.time.is_some()
    }

    /// Whether an event arriving at `(time, theta)` has been processed by
    /// the backend at this clock.
    pub fn covers(&self, time: u64, theta: u64) -> bool {
        match (self.time, self.theta) {
            (None, _) => false,
            (Some(t), th) => time < t || (time == t && theta <= th.unwrap_or(0)),
        }
    }

    /// Parse the `"time/theta"` keys used by the `states` endpoint.
    pub fn parse_key(key: &str) -> Result<Self> {
        let (time, theta) = key
            .split_once('/')
            .ok_or_else(|| Error::InvalidClock(format!("missing '/' in {key:?}")))?;
        Ok(Self {
            time: parse_component(time, key)?,
            theta: parse_component(theta, key)?,
        })
    }
}

fn parse_component(raw: &str, key: &str) -> Result<Option<u64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "None" || raw == "null" {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| Error::InvalidClock(format!("bad component {raw:?} in {key:?}")))
}

impl fmt::Display for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.time, self.theta) {
            (Some(t), Some(th)) => write!(f, "{t}/{th}"),
            (Some(t), None) => write!(f, "{t}/-"),
            (None, _) => write!(f, "-/-"),
        }
    }
}

/// Compare two clocks; usable as a sort key.
pub fn compare(a: &LogicalClock, b: &LogicalClock) -> Ordering {
    a.cmp(b)
}

/// The front-end clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Playhead {
    pub time: f64,
    /// `None` while `time` is interpolated between steps.
    pub theta: Option<u64>,
}

impl Default for Playhead {
    fn default() -> Self {
        Self::at(0, 0)
    }
}

impl Playhead {
    /// A playhead exactly on a step boundary.
    pub fn at(time: u64, theta: u64) -> Self {
        Self {
            time: time as f64,
            theta: Some(theta),
        }
    }

    /// A playhead between steps.
    pub fn interpolated(time: f64) -> Self {
        Self { time, theta: None }
    }

    /// Snap to a backend clock. Unset clocks yield `None`.
    pub fn from_clock(clock: LogicalClock) -> Option<Self> {
        clock
            .time
            .map(|time| Self::at(time, clock.theta.unwrap_or(0)))
    }

    /// `time % 1 == 0`
    pub fn is_integral(&self) -> bool {
        self.time.fract() == 0.0
    }

    /// The integer bucket the playhead is in.
    pub fn bucket(&self) -> u64 {
        if self.time <= 0.0 {
            0
        } else {
            self.time.floor() as u64
        }
    }

    /// Theta used for comparisons: infinite between steps, zero if unknown.
    pub fn effective_theta(&self) -> f64 {
        if !self.is_integral() {
            return f64::INFINITY;
        }
        self.theta.map_or(0.0, |theta| theta as f64)
    }

    /// Whether `(time, theta)` is at or before the playhead.
    pub fn has_reached(&self, time: u64, theta: u64) -> bool {
        let bucket = self.bucket();
        time < bucket || (time == bucket && (theta as f64) <= self.effective_theta())
    }

    /// Ordering against a logical clock, with unset clocks sorting first.
    pub fn compare_clock(&self, clock: &LogicalClock) -> Ordering {
        let Some(time) = clock.time else {
            return Ordering::Greater;
        };
        match self.bucket().cmp(&time) {
            Ordering::Equal => {
                let theta = clock.theta.unwrap_or(0) as f64;
                self.effective_theta()
                    .partial_cmp(&theta)
                    .unwrap_or(Ordering::Equal)
            }
            other => other,
        }
    }
}

impl fmt::Display for Playhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.theta {
            Some(theta) if self.is_integral() => write!(f, "{}/{theta}", self.time),
            _ => write!(f, "{:.2}/~", self.time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clock() -> impl Strategy<Value = LogicalClock> {
        (proptest::option::of(0u64..20), proptest::option::of(0u64..5))
            .prop_map(|(time, theta)| LogicalClock { time, theta })
    }

    proptest! {
        #[test]
        fn compare_is_antisymmetric(a in clock(), b in clock()) {
            prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
        }

        #[test]
        fn compare_is_transitive(a in clock(), b in clock(), c in clock()) {
            if compare(&a, &b) != Ordering::Greater && compare(&b, &c) != Ordering::Greater {
                prop_assert_ne!(compare(&a, &c), Ordering::Greater);
            }
        }

        #[test]
        fn interpolated_playhead_follows_its_bucket(time in 0u64..100, frac in 0.01f64..0.99, theta in 0u64..1000) {
            let playhead = Playhead::interpolated(time as f64 + frac);
            prop_assert!(playhead.has_reached(time, theta));
            prop_assert!(!playhead.has_reached(time + 1, 0));
        }
    }

    #[test]
    fn unset_sorts_first() {
        assert_eq!(
            compare(&LogicalClock::UNSET, &LogicalClock::at(0, 0)),
            Ordering::Less
        );
        let mut clocks = vec![
            LogicalClock::at(3, 1),
            LogicalClock::UNSET,
            LogicalClock::at(3, 0),
            LogicalClock::at(1, 7),
        ];
        clocks.sort_by(compare);
        assert_eq!(
            clocks,
            vec![
                LogicalClock::UNSET,
                LogicalClock::at(1, 7),
                LogicalClock::at(3, 0),
                LogicalClock::at(3, 1),
            ]
        );
    }

    #[test]
    fn covers_respects_theta() {
        let backend = LogicalClock::at(5, 1);
        assert!(backend.covers(4, 9));
        assert!(backend.covers(5, 1));
        assert!(!backend.covers(5, 2));
        assert!(!LogicalClock::UNSET.covers(0, 0));
    }

    #[test]
    fn parse_state_keys() {
        assert_eq!(LogicalClock::parse_key("4/2").unwrap(), LogicalClock::at(4, 2));
        assert_eq!(LogicalClock::parse_key("None/None").unwrap(), LogicalClock::UNSET);
        assert!(LogicalClock::parse_key("4").is_err());
        assert!(LogicalClock::parse_key("x/1").is_err());
    }

    #[test]
    fn integral_playhead_uses_theta() {
        let playhead = Playhead::at(5, 0);
        assert!(playhead.is_integral());
        assert!(playhead.has_reached(5, 0));
        assert!(!playhead.has_reached(5, 1));
        assert_eq!(playhead.compare_clock(&LogicalClock::at(5, 0)), Ordering::Equal);
        assert_eq!(playhead.compare_clock(&LogicalClock::UNSET), Ordering::Greater);
    }

    #[test]
    fn fractional_playhead_sorts_after_bucket() {
        let playhead = Playhead::interpolated(5.25);
        assert_eq!(playhead.effective_theta(), f64::INFINITY);
        assert_eq!(playhead.compare_clock(&LogicalClock::at(5, 99)), Ordering::Greater);
        assert_eq!(playhead.compare_clock(&LogicalClock::at(6, 0)), Ordering::Less);
    }
}
