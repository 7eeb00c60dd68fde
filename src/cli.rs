use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogArgs;
use crate::registry::NestingPolicy;
use crate::report::ReportFormat;

#[derive(Debug, Args)]
pub struct ProfilerArgs {
    /// Report file (default: threadtime.out, "-" for stdout)
    #[arg(short = 'o', long = "output-file")]
    pub output_file: Option<PathBuf>,

    /// Report format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<ReportFormat>,

    /// Clock reads per calibration pass (1-1000000)
    #[arg(long)]
    pub calibration_samples: Option<u32>,

    /// Highest number of threads the registry can hold
    #[arg(long)]
    pub max_threads: Option<usize>,

    /// How nested lock acquisitions on one thread are counted
    #[arg(long, value_enum)]
    pub nesting: Option<NestingPolicy>,
}

#[derive(Debug, Args)]
pub struct WorkloadArgs {
    /// Worker threads contending for the shared lock
    #[arg(short = 't', long, default_value_t = 4)]
    pub threads: u32,

    /// Lock acquisitions per worker
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub iterations: u32,

    /// Microseconds each worker holds the lock
    #[arg(long = "hold-us", default_value_t = 50)]
    pub hold_us: u64,

    /// Microseconds of unlocked work between acquisitions
    #[arg(long = "work-us", default_value_t = 50)]
    pub work_us: u64,
}

#[derive(Debug, Parser)]
#[command(
    name = "threadtime",
    about = "Per-thread runtime and lock-wait profiler"
)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(flatten)]
    pub workload: WorkloadArgs,

    /// Configuration file path (default: /etc/threadtime.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub profiler: ProfilerArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Measure the instrumentation overhead repeatedly and report its stability
    Calibrate(CalibrateArgs),
}

#[derive(Debug, Parser)]
pub struct CalibrateArgs {
    /// Number of calibration passes
    #[arg(short = 'r', long, default_value_t = 10)]
    pub rounds: u32,

    /// Configuration file path (default: /etc/threadtime.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub profiler: ProfilerArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["threadtime"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.workload.threads, 4);
        assert_eq!(cli.workload.iterations, 1000);
        assert!(cli.profiler.output_file.is_none());
    }

    #[test]
    fn test_workload_overrides() {
        let cli = Cli::try_parse_from([
            "threadtime",
            "-t",
            "8",
            "--hold-us",
            "200",
            "-o",
            "-",
            "--nesting",
            "summed",
            "-f",
            "detailed",
        ])
        .unwrap();
        assert_eq!(cli.workload.threads, 8);
        assert_eq!(cli.workload.hold_us, 200);
        assert_eq!(cli.profiler.output_file, Some(PathBuf::from("-")));
        assert_eq!(cli.profiler.nesting, Some(NestingPolicy::Summed));
        assert_eq!(cli.profiler.format, Some(ReportFormat::Detailed));
    }

    #[test]
    fn test_calibrate_subcommand() {
        let cli = Cli::try_parse_from([
            "threadtime",
            "calibrate",
            "-r",
            "3",
            "--calibration-samples",
            "500",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Calibrate(args)) => {
                assert_eq!(args.rounds, 3);
                assert_eq!(args.profiler.calibration_samples, Some(500));
            }
            None => panic!("expected calibrate subcommand"),
        }
    }
}
