use std::fmt;

use serde::{Serialize, Serializer};

use crate::clock::Clock;
use crate::error::Error;
use crate::registry::{RunContext, ThreadId};

/// A percentage, or `NotApplicable` when its denominator was zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Share {
    Percent(f64),
    NotApplicable,
}

impl Share {
    fn of(numerator: u64, denominator: u64) -> Share {
        if denominator == 0 {
            return Share::NotApplicable;
        }
        Share::Percent(numerator as f64 / denominator as f64 * 100.0)
    }

    #[cfg(test)]
    pub fn percent(self) -> Option<f64> {
        match self {
            Share::Percent(p) => Some(p),
            Share::NotApplicable => None,
        }
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Share::Percent(p) => f.pad(&format!("{:.2}", p)),
            Share::NotApplicable => f.pad("N/A"),
        }
    }
}

impl Serialize for Share {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Share::Percent(p) => serializer.serialize_f64(*p),
            Share::NotApplicable => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadRow {
    pub thread: ThreadId,
    pub elapsed_ns: u64,
    pub lock_wait_ns: u64,
    pub acquisitions: u64,
    pub runtime_share: Share,
    pub lock_share: Share,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_elapsed_ns: u64,
    pub calibration_offset_ns: u64,
    pub threads: Vec<ThreadRow>,
    /// Ids below the highest registered id that never registered.
    pub skipped: Vec<ThreadId>,
}

/// Turns the frozen run state into per-thread shares. Read-only, so running
/// it again over the same state yields the same report.
pub fn aggregate<C: Clock>(ctx: &RunContext<C>) -> Result<Report, Error> {
    let process_end = ctx.process_end().ok_or(Error::ProcessNotFinished)?;
    let total = process_end.saturating_since(ctx.process_start());

    // Ids are expected to be dense, but a host may skip some; walk far
    // enough to cover every registered slot.
    let count = ctx.thread_count();
    let span = ctx
        .highest_registered()
        .map_or(0, |id| id.0 + 1)
        .max(count);
    if span > count {
        log::warn!(
            "{} threads registered but ids reach {}; thread ids are not dense",
            count,
            span - 1
        );
    }
    let mut threads = Vec::with_capacity(count as usize);
    let mut skipped = Vec::new();

    for id in (0..span).map(ThreadId) {
        let record = match ctx.lookup(id) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("skipping thread {} in report: {}", id, e);
                skipped.push(id);
                continue;
            }
        };
        let times = record.snapshot();
        let end = times.end.unwrap_or_else(|| {
            log::debug!("thread {} still running at exit, using process end", id);
            process_end
        });
        let elapsed = end.saturating_since(times.start);

        if times.lock_wait_ns > elapsed {
            log::debug!(
                "thread {}: lock wait {}ns exceeds lifetime {}ns, clamping",
                id,
                times.lock_wait_ns,
                elapsed
            );
        }
        let lock_wait = times.lock_wait_ns.min(elapsed);

        threads.push(ThreadRow {
            thread: id,
            elapsed_ns: elapsed,
            lock_wait_ns: lock_wait,
            acquisitions: times.acquisitions,
            runtime_share: Share::of(elapsed, total),
            lock_share: Share::of(lock_wait, elapsed),
        });
    }

    Ok(Report {
        total_elapsed_ns: total,
        calibration_offset_ns: ctx.offset().as_nanos(),
        threads,
        skipped,
    })
}

impl<C: Clock> RunContext<C> {
    /// Stamps the process end (once) and aggregates.
    pub fn on_process_exit(&self) -> Result<Report, Error> {
        self.mark_process_end();
        aggregate(self)
    }
}
