use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::calibrate;
use crate::error::Error;
use crate::registry::{NestingPolicy, RunSettings, DEFAULT_MAX_THREADS};
use crate::report::ReportFormat;

pub const DEFAULT_OUTPUT: &str = "threadtime.out";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub calibration_samples: u32,
    pub max_threads: usize,
    pub nesting: NestingPolicy,
    pub output_path: PathBuf,
    pub format: ReportFormat,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            calibration_samples: calibrate::DEFAULT_SAMPLES,
            max_threads: DEFAULT_MAX_THREADS,
            nesting: NestingPolicy::Outermost,
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            format: ReportFormat::Table,
        }
    }
}

impl ProfilerConfig {
    /// Clamp fields to valid ranges.
    pub fn validate(&mut self) {
        self.calibration_samples = self.calibration_samples.clamp(1, 1_000_000);
        self.max_threads = self.max_threads.clamp(1, 65_536);
        if self.output_path.as_os_str().is_empty() {
            self.output_path = PathBuf::from(DEFAULT_OUTPUT);
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            max_threads: self.max_threads,
            nesting: self.nesting,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profiler: ProfilerConfig,
}

/// Load configuration from a TOML file.
///
/// - If `explicit_path` is `Some` and the file is missing, returns an error.
/// - If `explicit_path` is `None`, tries `/etc/threadtime.toml`; if missing, returns defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::InvalidArgs(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = Path::new("/etc/threadtime.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgs(format!("failed to read config {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| {
        Error::InvalidArgs(format!("failed to parse config {}: {}", path.display(), e))
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = ProfilerConfig::default();
        assert_eq!(cfg.calibration_samples, 100);
        assert_eq!(cfg.max_threads, 1024);
        assert_eq!(cfg.nesting, NestingPolicy::Outermost);
        assert_eq!(cfg.output_path, PathBuf::from("threadtime.out"));
        assert_eq!(cfg.format, ReportFormat::Table);
    }

    #[test]
    fn test_validate_clamps_high() {
        let mut cfg = ProfilerConfig {
            calibration_samples: 5_000_000,
            max_threads: 1 << 20,
            ..Default::default()
        };
        cfg.validate();
        assert_eq!(cfg.calibration_samples, 1_000_000);
        assert_eq!(cfg.max_threads, 65_536);
    }

    #[test]
    fn test_validate_clamps_low() {
        let mut cfg = ProfilerConfig {
            calibration_samples: 0,
            max_threads: 0,
            output_path: PathBuf::new(),
            ..Default::default()
        };
        cfg.validate();
        assert_eq!(cfg.calibration_samples, 1);
        assert_eq!(cfg.max_threads, 1);
        assert_eq!(cfg.output_path, PathBuf::from(DEFAULT_OUTPUT));
    }

    #[test]
    fn test_toml_parsing() {
        let dir = std::env::temp_dir();
        let path = dir.join("threadtime_test_config.toml");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            write!(
                f,
                r#"
[profiler]
calibration_samples = 250
nesting = "summed"
format = "json"
"#
            )
            .unwrap();
        }
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.profiler.calibration_samples, 250);
        assert_eq!(config.profiler.nesting, NestingPolicy::Summed);
        assert_eq!(config.profiler.format, ReportFormat::Json);
        // Unset fields should get defaults
        assert_eq!(config.profiler.output_path, PathBuf::from(DEFAULT_OUTPUT));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_explicit_config_errors() {
        let path = std::path::Path::new("/tmp/threadtime_nonexistent_config.toml");
        let result = load_config(Some(path));
        assert!(result.is_err());
    }
}
