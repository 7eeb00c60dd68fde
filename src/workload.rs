use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::aggregate::Report;
use crate::cli::WorkloadArgs;
use crate::clock::Clock;
use crate::error::Error;
use crate::hooks::{ProfiledMutex, Profiler};
use crate::registry::ThreadId;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

const MAIN_THREAD: ThreadId = ThreadId(0);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = signal_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
    }
}

/// Busy-wait so held and unlocked phases stay on-CPU like real work.
fn spin_for(d: Duration) {
    let start = Instant::now();
    while start.elapsed() < d {
        spin_loop();
    }
}

fn worker<C: Clock>(
    profiler: &Profiler<C>,
    shared: &ProfiledMutex<'_, u64, C>,
    id: ThreadId,
    args: &WorkloadArgs,
) -> Result<(), Error> {
    profiler.on_thread_start(id)?;

    let hold = Duration::from_micros(args.hold_us);
    let work = Duration::from_micros(args.work_us);
    for _ in 0..args.iterations {
        if SHUTDOWN.load(Ordering::Relaxed) {
            break;
        }
        {
            let mut counter = shared.lock(id);
            *counter += 1;
            spin_for(hold);
        }
        spin_for(work);
    }

    profiler.on_thread_finish(id);
    Ok(())
}

/// Runs `args.threads` workers contending for one profiled mutex, with the
/// calling thread registered as thread 0, and returns the exit report.
pub fn run<C: Clock>(profiler: &Profiler<C>, args: &WorkloadArgs) -> Result<Report, Error> {
    if args.threads == 0 {
        return Err(Error::InvalidArgs("threads must be greater than 0".into()));
    }
    let capacity = profiler.context().capacity();
    if args.threads as usize >= capacity {
        return Err(Error::InvalidArgs(format!(
            "{} workers plus the main thread exceed max-threads {}",
            args.threads, capacity
        )));
    }

    install_signal_handlers();

    profiler.on_thread_start(MAIN_THREAD)?;

    log::info!(
        "workload: threads={} iterations={} hold={}us work={}us",
        args.threads,
        args.iterations,
        args.hold_us,
        args.work_us,
    );

    let shared = ProfiledMutex::new(profiler, 0u64);

    let results: Vec<Result<(), Error>> = thread::scope(|s| {
        let handles: Vec<_> = (1..=args.threads)
            .map(|n| {
                let id = ThreadId(n);
                let shared = &shared;
                let handle = thread::Builder::new()
                    .name(format!("worker-{}", n))
                    .spawn_scoped(s, move || worker(profiler, shared, id, args));
                (id, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(id, handle)| {
                handle
                    .map_err(|e| Error::Workload(format!("cannot spawn thread {}: {}", id, e)))?
                    .join()
                    .map_err(|_| Error::Workload(format!("worker thread {} panicked", id)))?
            })
            .collect()
    });

    for result in results {
        result?;
    }

    let acquisitions = shared.into_inner();
    if SHUTDOWN.load(Ordering::Relaxed) {
        log::warn!("interrupted after {} lock acquisitions", acquisitions);
    } else {
        log::info!("workload finished: {} lock acquisitions", acquisitions);
    }

    profiler.on_thread_finish(MAIN_THREAD);
    profiler.on_process_exit()
}
