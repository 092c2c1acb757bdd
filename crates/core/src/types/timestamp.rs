//! Nanosecond-precision timestamps.
//!
//! [`Timestamp`] wraps a `u64` of nanoseconds since the Unix epoch. Exchanges
//! report event times in seconds, milliseconds, or nanoseconds depending on
//! the venue; everything normalizes into this one representation so that
//! exchange timestamps and receipt timestamps are directly comparable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanosecond-precision wall-clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

/// Native epoch unit an exchange reports event times in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Seconds since the Unix epoch.
    Seconds,
    /// Milliseconds since the Unix epoch.
    Millis,
    /// Nanoseconds since the Unix epoch.
    Nanos,
}

impl Timestamp {
    /// Capture the current wall-clock time as nanoseconds since the epoch.
    ///
    /// Uses `clock_gettime(CLOCK_REALTIME)` where available so the receipt
    /// timestamps stamped onto every inbound frame stay cheap.
    #[inline]
    pub fn now() -> Self {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            Self(realtime_nanos())
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            use std::time::{SystemTime, UNIX_EPOCH};
            let dur = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before UNIX epoch");
            Self(dur.as_nanos() as u64)
        }
    }

    /// Create a timestamp from seconds since the epoch.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s * 1_000_000_000)
    }

    /// Create a timestamp from milliseconds since the epoch.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1_000_000)
    }

    /// Create a timestamp from nanoseconds since the epoch.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Interpret `raw` in the given exchange-native unit.
    #[inline]
    pub const fn from_unit(raw: u64, unit: TimeUnit) -> Self {
        match unit {
            TimeUnit::Seconds => Self::from_secs(raw),
            TimeUnit::Millis => Self::from_millis(raw),
            TimeUnit::Nanos => Self::from_nanos(raw),
        }
    }

    /// Convert to milliseconds since the epoch (truncating).
    #[inline]
    pub const fn to_millis(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Returns the raw nanosecond value.
    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Elapsed nanoseconds from `earlier` to `self`, saturating at zero.
    #[inline]
    pub const fn elapsed_since(&self, earlier: &Timestamp) -> u64 {
        if self.0 >= earlier.0 {
            self.0 - earlier.0
        } else {
            0
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = self.0 % 1_000_000_000;
        write!(f, "{}.{:09}", secs, nanos)
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn realtime_nanos() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: passing a valid pointer to a stack-allocated timespec.
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}
