use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Deserialize;

use crate::aggregate::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Thread id, runtime share and lock share
    #[default]
    Table,
    /// Table plus raw nanosecond totals and acquisition counts
    Detailed,
    /// Machine-readable JSON
    Json,
}

/// Writes the report to `path`, or to stdout when the path is `-`.
pub fn write_report(report: &Report, format: ReportFormat, path: &Path) -> io::Result<()> {
    if path == Path::new("-") {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        format_report(report, format, &mut out)?;
        out.flush()
    } else {
        let f = File::create(path)?;
        let mut out = BufWriter::new(f);
        format_report(report, format, &mut out)?;
        out.flush()
    }
}

fn format_report(report: &Report, format: ReportFormat, out: &mut dyn Write) -> io::Result<()> {
    match format {
        ReportFormat::Table => write_table(report, out),
        ReportFormat::Detailed => write_detailed(report, out),
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, report).map_err(io::Error::other)?;
            writeln!(out)
        }
    }
}

fn write_table(report: &Report, out: &mut dyn Write) -> io::Result<()> {
    writeln!(
        out,
        "{:>7}{:>15}{:>21}",
        "Thread ", "% of runtime ", "% waiting for a lock"
    )?;
    for row in &report.threads {
        writeln!(
            out,
            "{:>6}{:>15}{:>22}",
            row.thread, row.runtime_share, row.lock_share
        )?;
    }
    Ok(())
}

fn write_detailed(report: &Report, out: &mut dyn Write) -> io::Result<()> {
    writeln!(
        out,
        "{:>7}{:>15}{:>21}{:>16}{:>16}{:>10}",
        "Thread ", "% of runtime ", "% waiting for a lock", "elapsed (ns)", "lock wait (ns)", "locks"
    )?;
    for row in &report.threads {
        writeln!(
            out,
            "{:>6}{:>15}{:>22}{:>16}{:>16}{:>10}",
            row.thread,
            row.runtime_share,
            row.lock_share,
            row.elapsed_ns,
            row.lock_wait_ns,
            row.acquisitions
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Total elapsed:      {} ns", report.total_elapsed_ns)?;
    writeln!(out, "Calibration offset: {} ns", report.calibration_offset_ns)?;
    if !report.skipped.is_empty() {
        let ids: Vec<String> = report.skipped.iter().map(|id| id.to_string()).collect();
        writeln!(out, "Skipped threads:    {}", ids.join(", "))?;
    }
    Ok(())
}
