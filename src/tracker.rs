use std::sync::atomic::Ordering;

use crate::calibrate::CalibrationOffset;
use crate::clock::{Clock, Timestamp};
use crate::error::Error;
use crate::registry::{NestingPolicy, RunContext, ThreadId, ThreadRecord, MAX_NESTING};

/// `end - start - offset`, clamped at zero.
///
/// The calibrator runs this exact function to price the accumulation step,
/// so it must stay the only arithmetic on the measured path.
#[inline]
pub fn calibrated_elapsed(start: Timestamp, end: Timestamp, offset: CalibrationOffset) -> u64 {
    end.saturating_since(start).saturating_sub(offset.as_nanos())
}

impl ThreadRecord {
    fn begin_wait(&self, id: ThreadId, now: Timestamp) -> Result<(), Error> {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth >= MAX_NESTING {
            return Err(Error::NestingTooDeep(id));
        }
        self.pending[depth].store(now.as_nanos(), Ordering::Relaxed);
        self.depth.store(depth + 1, Ordering::Relaxed);
        Ok(())
    }

    fn end_wait(
        &self,
        id: ThreadId,
        now: Timestamp,
        offset: CalibrationOffset,
        policy: NestingPolicy,
    ) -> Result<u64, Error> {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth == 0 {
            return Err(Error::UnbalancedWait(id));
        }
        let level = depth - 1;
        let start = Timestamp::from_nanos(self.pending[level].load(Ordering::Relaxed));
        self.depth.store(level, Ordering::Relaxed);

        let elapsed = calibrated_elapsed(start, now, offset);
        let counted = match policy {
            NestingPolicy::Outermost if level > 0 => 0,
            _ => elapsed,
        };
        self.lock_wait_ns.fetch_add(counted, Ordering::Relaxed);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(counted)
    }
}

impl<C: Clock> RunContext<C> {
    pub fn on_lock_acquire_begin(&self, id: ThreadId) -> Result<(), Error> {
        let record = self.lookup(id)?;
        record.begin_wait(id, self.clock.now())
    }

    /// Returns the nanoseconds added to the thread's lock-wait total.
    pub fn on_lock_acquire_end(&self, id: ThreadId) -> Result<u64, Error> {
        let now = self.clock.now();
        let record = self.lookup(id)?;
        record.end_wait(id, now, self.offset, self.nesting)
    }
}
