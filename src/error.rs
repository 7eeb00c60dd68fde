use std::fmt;
use std::io;

use crate::registry::ThreadId;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    ClockUnavailable(String),
    MissingRecord(ThreadId),
    AlreadyRegistered(ThreadId),
    ThreadIdOutOfRange { id: ThreadId, capacity: usize },
    UnbalancedWait(ThreadId),
    NestingTooDeep(ThreadId),
    ProcessNotFinished,
    Workload(String),
    InvalidArgs(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::ClockUnavailable(msg) => write!(f, "monotonic clock unavailable: {}", msg),
            Error::MissingRecord(id) => {
                write!(f, "internal error: no timing record for thread {}", id)
            }
            Error::AlreadyRegistered(id) => write!(f, "thread {} is already registered", id),
            Error::ThreadIdOutOfRange { id, capacity } => write!(
                f,
                "thread {} exceeds registry capacity of {} threads",
                id, capacity
            ),
            Error::UnbalancedWait(id) => write!(
                f,
                "thread {} finished a lock acquisition that never began",
                id
            ),
            Error::NestingTooDeep(id) => {
                write!(f, "thread {} exceeded the maximum lock nesting depth", id)
            }
            Error::ProcessNotFinished => write!(f, "process end has not been recorded"),
            Error::Workload(msg) => write!(f, "workload error: {}", msg),
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
