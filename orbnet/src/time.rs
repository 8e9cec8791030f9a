//! Time types for the orbnet protocol.
//!
//! Devices keep time as a free-running 32-bit millisecond counter (the
//! usual `millis()` of a microcontroller). It wraps after ~49.7 days, so
//! deadlines are compared through the signed difference of two counter
//! values instead of plain inequality. For the same reason `Timestamp`
//! deliberately does not implement `Ord`.

use core::ops::{Add, AddAssign, Mul, Sub};

/// Point on the wrapping millisecond tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Counter value at boot.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from a raw millisecond counter value.
    #[inline]
    pub const fn from_millis(ms: u32) -> Self {
        Timestamp(ms)
    }

    /// Create a timestamp from seconds (wrapping).
    #[inline]
    pub const fn from_secs(secs: u32) -> Self {
        Timestamp(secs.wrapping_mul(1000))
    }

    /// Raw counter value.
    #[inline]
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Signed distance from `earlier` to `self` in milliseconds.
    ///
    /// Correct across a counter wrap as long as the two points are less
    /// than ~24.8 days apart.
    #[inline]
    pub const fn diff(self, earlier: Timestamp) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// True once `now` is at or past this deadline.
    #[inline]
    pub const fn reached(self, now: Timestamp) -> bool {
        now.diff(self) >= 0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` lies in the future.
    #[inline]
    pub const fn since(self, earlier: Timestamp) -> Duration {
        let d = self.diff(earlier);
        if d < 0 {
            Duration::ZERO
        } else {
            Duration(d as u32)
        }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.wrapping_sub(rhs.0))
    }
}

/// Duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u32);

impl Duration {
    /// Zero duration.
    pub const ZERO: Duration = Duration(0);

    /// Maximum duration.
    pub const MAX: Duration = Duration(u32::MAX);

    /// Create a duration from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u32) -> Self {
        Duration(ms)
    }

    /// Create a duration from seconds.
    #[inline]
    pub const fn from_secs(secs: u32) -> Self {
        Duration(secs.saturating_mul(1000))
    }

    /// Get the duration as milliseconds.
    #[inline]
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Get the duration as seconds (truncated).
    #[inline]
    pub const fn as_secs(self) -> u32 {
        self.0 / 1000
    }

    /// Saturating addition.
    #[inline]
    pub const fn saturating_add(self, other: Duration) -> Self {
        Duration(self.0.saturating_add(other.0))
    }

    /// Saturating multiplication.
    #[inline]
    pub const fn saturating_mul(self, n: u32) -> Self {
        Duration(self.0.saturating_mul(n))
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        self.saturating_add(rhs)
    }
}

impl Mul<u32> for Duration {
    type Output = Duration;

    #[inline]
    fn mul(self, rhs: u32) -> Duration {
        self.saturating_mul(rhs)
    }
}
