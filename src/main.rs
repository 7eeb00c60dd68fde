mod aggregate;
mod calibrate;
mod cli;
mod clock;
mod config;
mod error;
mod hooks;
mod logging;
mod registry;
mod report;
mod tracker;
mod workload;

use std::path::Path;
use std::process;

use clap::Parser;

use cli::{CalibrateArgs, Cli, Command, ProfilerArgs};
use config::ProfilerConfig;
use error::Error;
use hooks::Profiler;

/// Build a ProfilerConfig by layering: defaults → TOML file → CLI overrides.
fn build_profiler_config(config_file: Option<&Path>, args: &ProfilerArgs) -> ProfilerConfig {
    let mut cfg = match config::load_config(config_file) {
        Ok(c) => c.profiler,
        Err(e) => {
            log::warn!("{}", e);
            ProfilerConfig::default()
        }
    };

    // Apply CLI overrides (only if explicitly set)
    if let Some(ref v) = args.output_file {
        cfg.output_path = v.clone();
    }
    if let Some(v) = args.format {
        cfg.format = v;
    }
    if let Some(v) = args.calibration_samples {
        cfg.calibration_samples = v;
    }
    if let Some(v) = args.max_threads {
        cfg.max_threads = v;
    }
    if let Some(v) = args.nesting {
        cfg.nesting = v;
    }

    cfg.validate();
    cfg
}

fn run_profile(cli: &Cli, cfg: &ProfilerConfig) -> Result<(), Error> {
    let profiler = Profiler::start(cfg)?;
    let report = workload::run(&profiler, &cli.workload)?;
    report::write_report(&report, cfg.format, &cfg.output_path)?;
    log::info!(
        "report for {} threads written to {}",
        report.threads.len(),
        cfg.output_path.display()
    );
    Ok(())
}

fn run_calibrate(args: &CalibrateArgs, cfg: &ProfilerConfig) -> Result<(), Error> {
    let clock = clock::MonotonicClock::new()?;
    let summary = calibrate::calibrate_repeated(&clock, cfg.calibration_samples, args.rounds)?;

    println!("{:>6} {:>12}", "Round", "Offset (ns)");
    for (i, offset) in summary.offsets.iter().enumerate() {
        println!("{:>6} {:>12}", i, offset);
    }
    println!();
    println!(
        "min {}ns  max {}ns  mean {:.1}ns  spread {:.1}%",
        summary.min,
        summary.max,
        summary.mean,
        summary.relative_spread() * 100.0
    );

    if !summary.is_stable() {
        log::warn!(
            "calibration spread {:.1}% exceeds {:.0}%; lock wait figures will be noisy",
            summary.relative_spread() * 100.0,
            calibrate::STABILITY_TOLERANCE * 100.0
        );
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::Calibrate(args)) => {
            logging::init(&args.log);
            let cfg = build_profiler_config(args.config_file.as_deref(), &args.profiler);
            if let Err(e) = run_calibrate(args, &cfg) {
                log::error!("{}", e);
                logging::flush();
                process::exit(1);
            }
        }
        None => {
            logging::init(&cli.log);
            let cfg = build_profiler_config(cli.config_file.as_deref(), &cli.profiler);
            if let Err(e) = run_profile(&cli, &cfg) {
                log::error!("{}", e);
                logging::flush();
                process::exit(1);
            }
        }
    }
    logging::flush();
}
