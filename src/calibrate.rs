use std::hint::black_box;

use crate::clock::Clock;
use crate::error::Error;
use crate::tracker::calibrated_elapsed;

pub const DEFAULT_SAMPLES: u32 = 100;

/// Relative spread between repeated calibrations above which the offset is
/// considered unstable.
pub const STABILITY_TOLERANCE: f64 = 0.20;

/// Fixed instrumentation cost subtracted from every measured lock wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationOffset(u64);

impl CalibrationOffset {
    #[cfg(test)]
    pub const ZERO: CalibrationOffset = CalibrationOffset(0);

    #[cfg(test)]
    pub const fn from_nanos(ns: u64) -> Self {
        CalibrationOffset(ns)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }
}

/// Outcome of one calibration pass.
#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    /// Average cost of a single clock read.
    pub base_clock_cost: u64,
    /// Average cost of one subtract-and-accumulate step.
    pub instrumentation_cost: u64,
    pub offset: CalibrationOffset,
}

/// Estimates the overhead a begin/end hook pair adds to a measured interval:
/// both timestamps contribute one clock read each, plus one pass through the
/// accumulation arithmetic.
pub fn calibrate<C: Clock + ?Sized>(clock: &C, samples: u32) -> Result<Calibration, Error> {
    if samples == 0 {
        return Err(Error::InvalidArgs(
            "calibration needs at least one sample".into(),
        ));
    }
    let n = samples as u64;

    let start = clock.now();
    for _ in 0..samples {
        black_box(clock.now());
    }
    let end = clock.now();
    let base_clock_cost = end.saturating_since(start) / n;

    let mut acc: u64 = 0;
    let inst_start = clock.now();
    for _ in 0..samples {
        let elapsed = calibrated_elapsed(
            black_box(start),
            black_box(end),
            black_box(CalibrationOffset(base_clock_cost)),
        );
        acc = acc.wrapping_add(elapsed);
    }
    black_box(acc);
    let inst_end = clock.now();
    let instrumentation_cost = inst_end.saturating_since(inst_start) / n;

    let offset = CalibrationOffset(
        base_clock_cost
            .saturating_mul(2)
            .saturating_add(instrumentation_cost),
    );

    log::debug!(
        "calibration: clock read {}ns, accumulate {}ns, offset {}ns ({} samples)",
        base_clock_cost,
        instrumentation_cost,
        offset.0,
        samples
    );

    Ok(Calibration {
        base_clock_cost,
        instrumentation_cost,
        offset,
    })
}

/// Spread of offsets across repeated calibration passes.
#[derive(Debug, Clone)]
pub struct CalibrationSummary {
    pub offsets: Vec<u64>,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

impl CalibrationSummary {
    /// (max - min) / mean, or 0.0 when every pass measured nothing.
    pub fn relative_spread(&self) -> f64 {
        if self.mean < f64::EPSILON {
            return 0.0;
        }
        (self.max - self.min) as f64 / self.mean
    }

    pub fn is_stable(&self) -> bool {
        self.relative_spread() <= STABILITY_TOLERANCE
    }
}

pub fn calibrate_repeated<C: Clock + ?Sized>(
    clock: &C,
    samples: u32,
    rounds: u32,
) -> Result<CalibrationSummary, Error> {
    if rounds == 0 {
        return Err(Error::InvalidArgs("rounds must be greater than 0".into()));
    }

    let mut offsets = Vec::with_capacity(rounds as usize);
    for _ in 0..rounds {
        offsets.push(calibrate(clock, samples)?.offset.as_nanos());
    }

    let min = offsets.iter().copied().min().unwrap_or(0);
    let max = offsets.iter().copied().max().unwrap_or(0);
    let mean = offsets.iter().map(|&o| o as f64).sum::<f64>() / offsets.len() as f64;

    Ok(CalibrationSummary {
        offsets,
        min,
        max,
        mean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::{ManualClock, TickingClock};
    use crate::clock::MonotonicClock;

    #[test]
    fn test_frozen_clock_gives_zero_offset() {
        let clock = ManualClock::new(5_000);
        let cal = calibrate(&clock, DEFAULT_SAMPLES).unwrap();
        assert_eq!(cal.base_clock_cost, 0);
        assert_eq!(cal.instrumentation_cost, 0);
        assert_eq!(cal.offset, CalibrationOffset::ZERO);
    }

    #[test]
    fn test_ticking_clock_offset() {
        // 100 reads inside the bracket plus the closing read: 101 ticks of 10ns.
        // The accumulate loop reads no clock, so only the closing tick counts.
        let clock = TickingClock::new(10);
        let cal = calibrate(&clock, 100).unwrap();
        assert_eq!(cal.base_clock_cost, 10);
        assert_eq!(cal.instrumentation_cost, 0);
        assert_eq!(cal.offset.as_nanos(), 20);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let clock = ManualClock::new(0);
        assert!(matches!(calibrate(&clock, 0), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn test_repeated_deterministic_is_stable() {
        let clock = TickingClock::new(7);
        let summary = calibrate_repeated(&clock, 100, 5).unwrap();
        assert_eq!(summary.offsets.len(), 5);
        assert_eq!(summary.min, summary.max);
        assert!(summary.is_stable());
        assert_eq!(summary.relative_spread(), 0.0);
    }

    #[test]
    fn test_spread_detects_instability() {
        let summary = CalibrationSummary {
            offsets: vec![50, 100],
            min: 50,
            max: 100,
            mean: 75.0,
        };
        assert!(!summary.is_stable());
    }

    #[test]
    fn test_real_clock_offset_is_small() {
        let clock = MonotonicClock::new().unwrap();
        let cal = calibrate(&clock, DEFAULT_SAMPLES).unwrap();
        // A pair of clock reads plus an add costs far less than a millisecond.
        assert!(cal.offset.as_nanos() < 1_000_000, "offset {}", cal.offset.as_nanos());
    }

    #[test]
    fn test_repeated_zero_rounds_rejected() {
        let clock = ManualClock::new(0);
        assert!(calibrate_repeated(&clock, 10, 0).is_err());
    }
}
