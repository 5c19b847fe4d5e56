//! Time primitives
//!
//! All protocol time is expressed in microseconds. A node's local clock is
//! the transport's hardware timestamp plus the Timekeeper's additive skew
//! correction; `Time` itself is just the arithmetic carrier.

use std::fmt;
use std::ops::{Add, Sub};

/// Protocol time in microseconds
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(pub i64);

impl Time {
    pub const ZERO: Time = Time(0);
    /// Sentinel for messages that never expire
    pub const INFINITE: Time = Time(i64::MAX);

    #[inline]
    pub fn from_micros(micros: i64) -> Self {
        Time(micros)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        Time(millis * 1_000)
    }

    #[inline]
    pub fn from_secs(secs: i64) -> Self {
        Time(secs * 1_000_000)
    }

    #[inline]
    pub fn as_micros(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_infinite(self) -> bool {
        self == Time::INFINITE
    }

    #[inline]
    pub fn saturating_add(self, rhs: Time) -> Self {
        Time(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Time) -> Self {
        Time(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Time {
    type Output = Time;

    #[inline]
    fn add(self, rhs: Time) -> Time {
        Time(self.0 + rhs.0)
    }
}

impl Sub for Time {
    type Output = Time;

    #[inline]
    fn sub(self, rhs: Time) -> Time {
        Time(self.0 - rhs.0)
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "t(inf)")
        } else {
            write!(f, "t({}us)", self.0)
        }
    }
}

/// Closed time interval [t0, t1]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeInterval {
    pub t0: Time,
    pub t1: Time,
}

impl TimeInterval {
    /// Create a new interval; `t0` must not exceed `t1`
    pub fn new(t0: Time, t1: Time) -> Self {
        debug_assert!(t0 <= t1);
        TimeInterval { t0, t1 }
    }

    #[inline]
    pub fn contains(&self, t: Time) -> bool {
        t >= self.t0 && t <= self.t1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_contains_bounds() {
        let iv = TimeInterval::new(Time::from_micros(10), Time::from_micros(20));
        assert!(iv.contains(Time::from_micros(10)));
        assert!(iv.contains(Time::from_micros(20)));
        assert!(!iv.contains(Time::from_micros(9)));
        assert!(!iv.contains(Time::from_micros(21)));
    }

    #[test]
    fn infinite_upper_bound_never_expires() {
        let iv = TimeInterval::new(Time::ZERO, Time::INFINITE);
        assert!(iv.contains(Time::from_secs(1_000_000)));
    }
}
