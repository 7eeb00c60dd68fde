use crate::error::Error;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A monotonic instant in nanoseconds. Only differences between two
/// timestamps read from the same clock mean anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_nanos(ns: u64) -> Self {
        Timestamp(ns)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Nanoseconds from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// CLOCK_MONOTONIC via clock_gettime(2).
#[derive(Debug)]
pub struct MonotonicClock(());

impl MonotonicClock {
    /// Probes the clock once so that a missing clock fails the run up front
    /// instead of silently producing zero timings.
    pub fn new() -> Result<Self, Error> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if ret != 0 {
            return Err(Error::ClockUnavailable(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        Ok(MonotonicClock(()))
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Timestamp {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        Timestamp(
            (ts.tv_sec as u64)
                .wrapping_mul(NANOS_PER_SEC)
                .wrapping_add(ts.tv_nsec as u64),
        )
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
