use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};

use crate::calibrate::CalibrationOffset;
use crate::clock::{Clock, Timestamp};
use crate::error::Error;

/// Deepest chain of nested lock acquisitions tracked on one thread.
pub const MAX_NESTING: usize = 16;

pub const DEFAULT_MAX_THREADS: usize = 1024;

/// Stable thread identity handed out by the host in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// How waits nested inside an in-flight acquisition on the same thread are
/// accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NestingPolicy {
    /// Only the outermost acquisition's interval is added.
    #[default]
    Outermost,
    /// Every level's interval is added, counting nested time more than once.
    Summed,
}

/// Per-thread timing state.
///
/// Single writer: only the owning thread mutates a record after creation, so
/// relaxed atomics suffice. The aggregator reads it after the thread has been
/// joined.
#[derive(Debug)]
pub struct ThreadRecord {
    thread_start: Timestamp,
    thread_end: OnceLock<Timestamp>,
    pub(crate) lock_wait_ns: AtomicU64,
    pub(crate) acquisitions: AtomicU64,
    pub(crate) pending: [AtomicU64; MAX_NESTING],
    pub(crate) depth: AtomicUsize,
}

/// Point-in-time copy of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadTimes {
    pub start: Timestamp,
    pub end: Option<Timestamp>,
    pub lock_wait_ns: u64,
    pub acquisitions: u64,
}

impl ThreadRecord {
    fn new(thread_start: Timestamp) -> Self {
        ThreadRecord {
            thread_start,
            thread_end: OnceLock::new(),
            lock_wait_ns: AtomicU64::new(0),
            acquisitions: AtomicU64::new(0),
            pending: std::array::from_fn(|_| AtomicU64::new(0)),
            depth: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> ThreadTimes {
        ThreadTimes {
            start: self.thread_start,
            end: self.thread_end.get().copied(),
            lock_wait_ns: self.lock_wait_ns.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
        }
    }

    pub fn pending_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub max_threads: usize,
    pub nesting: NestingPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            nesting: NestingPolicy::Outermost,
        }
    }
}

/// Everything one profiled run shares between threads.
pub struct RunContext<C: Clock> {
    pub(crate) clock: C,
    pub(crate) offset: CalibrationOffset,
    pub(crate) nesting: NestingPolicy,
    process_start: Timestamp,
    process_end: OnceLock<Timestamp>,
    thread_count: Mutex<u32>,
    slots: Box<[OnceLock<ThreadRecord>]>,
}

impl<C: Clock> RunContext<C> {
    /// Stamps the process start; calibration must already have run.
    pub fn new(clock: C, offset: CalibrationOffset, settings: RunSettings) -> Self {
        let process_start = clock.now();
        let slots = (0..settings.max_threads)
            .map(|_| OnceLock::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        RunContext {
            clock,
            offset,
            nesting: settings.nesting,
            process_start,
            process_end: OnceLock::new(),
            thread_count: Mutex::new(0),
            slots,
        }
    }

    pub fn offset(&self) -> CalibrationOffset {
        self.offset
    }

    pub fn process_start(&self) -> Timestamp {
        self.process_start
    }

    pub fn process_end(&self) -> Option<Timestamp> {
        self.process_end.get().copied()
    }

    pub fn thread_count(&self) -> u32 {
        match self.thread_count.lock() {
            Ok(n) => *n,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn on_thread_start(&self, id: ThreadId) -> Result<(), Error> {
        let slot = self
            .slots
            .get(id.0 as usize)
            .ok_or(Error::ThreadIdOutOfRange {
                id,
                capacity: self.slots.len(),
            })?;

        {
            let mut count = match self.thread_count.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.set(ThreadRecord::new(self.clock.now()))
                .map_err(|_| Error::AlreadyRegistered(id))?;
            *count += 1;
        }
        log::debug!("thread {} started", id);
        Ok(())
    }

    pub fn on_thread_finish(&self, id: ThreadId) -> Result<(), Error> {
        let record = self.lookup(id)?;
        let open = record.pending_depth();
        if open > 0 {
            log::warn!(
                "thread {} finished with {} lock acquisitions still open",
                id,
                open
            );
        }
        if record.thread_end.set(self.clock.now()).is_err() {
            log::warn!("thread {} finished twice; keeping the first end time", id);
        } else {
            log::debug!("thread {} finished", id);
        }
        Ok(())
    }

    /// Lock-free lookup of a registered thread's record.
    #[inline]
    pub fn lookup(&self, id: ThreadId) -> Result<&ThreadRecord, Error> {
        self.slots
            .get(id.0 as usize)
            .and_then(|slot| slot.get())
            .ok_or(Error::MissingRecord(id))
    }

    /// Highest id with a registered record, if any.
    pub fn highest_registered(&self) -> Option<ThreadId> {
        self.slots
            .iter()
            .rposition(|slot| slot.get().is_some())
            .map(|i| ThreadId(i as u32))
    }

    /// Stamps the process end. Later calls keep the first stamp.
    pub fn mark_process_end(&self) -> Timestamp {
        *self.process_end.get_or_init(|| self.clock.now())
    }
}
