use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::aggregate::Report;
use crate::calibrate;
use crate::clock::{Clock, MonotonicClock};
use crate::config::ProfilerConfig;
use crate::error::Error;
use crate::registry::{RunContext, ThreadId};

/// Entry points an interception layer calls into.
///
/// Thread registration and process exit propagate errors, since the run is
/// meaningless without them. Lock hooks run inside the profiled program's
/// call path and only log.
pub struct Profiler<C: Clock> {
    ctx: RunContext<C>,
}

impl Profiler<MonotonicClock> {
    /// Probes the clock, calibrates, then stamps the process start.
    pub fn start(config: &ProfilerConfig) -> Result<Self, Error> {
        let clock = MonotonicClock::new()?;
        let cal = calibrate::calibrate(&clock, config.calibration_samples)?;
        log::info!(
            "calibration offset {}ns (clock read {}ns, accumulate {}ns)",
            cal.offset.as_nanos(),
            cal.base_clock_cost,
            cal.instrumentation_cost
        );
        Ok(Profiler::with_context(RunContext::new(
            clock,
            cal.offset,
            config.run_settings(),
        )))
    }
}

impl<C: Clock> Profiler<C> {
    pub fn with_context(ctx: RunContext<C>) -> Self {
        Profiler { ctx }
    }

    pub fn context(&self) -> &RunContext<C> {
        &self.ctx
    }

    pub fn on_thread_start(&self, id: ThreadId) -> Result<(), Error> {
        self.ctx.on_thread_start(id)
    }

    pub fn on_thread_finish(&self, id: ThreadId) {
        if let Err(e) = self.ctx.on_thread_finish(id) {
            log::error!("{}", e);
        }
    }

    #[inline]
    pub fn on_lock_acquire_begin(&self, id: ThreadId) {
        if let Err(e) = self.ctx.on_lock_acquire_begin(id) {
            log::error!("{}", e);
        }
    }

    #[inline]
    pub fn on_lock_acquire_end(&self, id: ThreadId) {
        if let Err(e) = self.ctx.on_lock_acquire_end(id) {
            log::error!("{}", e);
        }
    }

    pub fn on_process_exit(&self) -> Result<Report, Error> {
        self.ctx.on_process_exit()
    }
}

/// `std::sync::Mutex` whose `lock` is bracketed by the profiler's
/// lock-acquire hooks.
pub struct ProfiledMutex<'p, T, C: Clock> {
    profiler: &'p Profiler<C>,
    inner: Mutex<T>,
}

impl<'p, T, C: Clock> ProfiledMutex<'p, T, C> {
    pub fn new(profiler: &'p Profiler<C>, value: T) -> Self {
        ProfiledMutex {
            profiler,
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self, id: ThreadId) -> MutexGuard<'_, T> {
        self.profiler.on_lock_acquire_begin(id);
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.profiler.on_lock_acquire_end(id);
        guard
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::CalibrationOffset;
    use crate::clock::testing::ManualClock;
    use crate::registry::RunSettings;

    #[test]
    fn test_profiled_mutex_counts_acquisitions() {
        let clock = ManualClock::new(0);
        let profiler = Profiler::with_context(RunContext::new(
            &clock,
            CalibrationOffset::ZERO,
            RunSettings::default(),
        ));
        profiler.on_thread_start(ThreadId(0)).unwrap();
        let m = ProfiledMutex::new(&profiler, 0u32);
        for _ in 0..5 {
            *m.lock(ThreadId(0)) += 1;
        }
        assert_eq!(m.into_inner(), 5);
        let times = profiler.context().lookup(ThreadId(0)).unwrap().snapshot();
        assert_eq!(times.acquisitions, 5);
        assert_eq!(times.lock_wait_ns, 0);
    }

    #[test]
    fn test_lock_hooks_tolerate_unregistered_thread() {
        let clock = ManualClock::new(0);
        let profiler = Profiler::with_context(RunContext::new(
            &clock,
            CalibrationOffset::ZERO,
            RunSettings::default(),
        ));
        let m = ProfiledMutex::new(&profiler, ());
        // Logged, not propagated into the caller.
        drop(m.lock(ThreadId(9)));
        profiler.on_thread_finish(ThreadId(9));
        assert_eq!(profiler.context().thread_count(), 0);
    }

    #[test]
    fn test_start_calibrates_real_clock() {
        let profiler = Profiler::start(&ProfilerConfig::default()).unwrap();
        assert!(profiler.context().offset().as_nanos() < 1_000_000);
        assert_eq!(profiler.context().capacity(), 1024);
    }
}
