use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;

use clap::{Args, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record};

type SyslogLogger = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

/// Used when `--log-level` is not given. The profiler shares stderr with the
/// program it measures, so only problems are printed by default.
pub const DEFAULT_LEVEL: LogLevel = LogLevel::Warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Log level (default: warn)
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Append log messages to a file (the profiled program's stderr may be
    /// closed by the time the run ends)
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Send log messages to syslog
    #[arg(long)]
    pub syslog: bool,
}

impl LogArgs {
    pub fn level(&self) -> LogLevel {
        self.log_level.unwrap_or(DEFAULT_LEVEL)
    }
}

/// Lines are tagged with the emitting thread, since hook failures are
/// reported from inside the profiled threads.
struct ThreadtimeLogger {
    level: LevelFilter,
    log_file: Option<Mutex<File>>,
    syslog: Option<Mutex<SyslogLogger>>,
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warn => "warning",
        Level::Info => "info",
        Level::Debug | Level::Trace => "debug",
    }
}

fn format_line(level: Level, thread: Option<&str>, args: &fmt::Arguments<'_>) -> String {
    match thread {
        Some(name) => format!("[threadtime {}] {}: {}", name, level_tag(level), args),
        None => format!("[threadtime] {}: {}", level_tag(level), args),
    }
}

impl Log for ThreadtimeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let current = thread::current();
        let line = format_line(record.level(), current.name(), record.args());

        let _ = writeln!(io::stderr().lock(), "{}", line);

        if let Some(ref file) = self.log_file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{}", line);
            }
        }

        if let Some(ref logger) = self.syslog {
            if let Ok(mut l) = logger.lock() {
                let text = record.args().to_string();
                let _ = match record.level() {
                    Level::Error => l.err(&text),
                    Level::Warn => l.warning(&text),
                    Level::Info => l.info(&text),
                    Level::Debug | Level::Trace => l.debug(&text),
                };
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Some(ref file) = self.log_file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

/// Installs the logger. A log file or syslog socket that cannot be opened
/// does not stop the run; the failure is reported through the logger itself
/// once it is in place.
pub fn init(args: &LogArgs) {
    let level = LevelFilter::from(args.level());
    let mut failures = Vec::new();

    let log_file = match args.log_file {
        Some(ref path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(Mutex::new(f)),
            Err(e) => {
                failures.push(format!("cannot open log file {}: {}", path.display(), e));
                None
            }
        },
        None => None,
    };

    let syslog = if args.syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: "threadtime".into(),
            pid: std::process::id(),
        };
        match syslog::unix(formatter) {
            Ok(l) => Some(Mutex::new(l)),
            Err(e) => {
                failures.push(format!("cannot connect to syslog: {}", e));
                None
            }
        }
    } else {
        None
    };

    let logger = ThreadtimeLogger {
        level,
        log_file,
        syslog,
    };

    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }
    for msg in failures {
        log::warn!("{}", msg);
    }
}

/// Flushes buffered log output; call before `process::exit`.
pub fn flush() {
    log::logger().flush();
}
