// Service configuration, read from POLYRUN_* environment variables

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1024 * 1024; // 1MB
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024; // 1MB per stream
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 64;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Directory under which every job gets its own subdirectory.
    pub scratch_root: PathBuf,
    /// Wall-clock budget per job, shared by compile and run.
    pub timeout_seconds: u64,
    pub max_source_bytes: usize,
    pub max_output_bytes: usize,
    pub max_concurrent_jobs: usize,
    pub bind_addr: String,
    /// Optional JSON file replacing the built-in language table.
    pub languages_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("polyrun"),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            languages_file: None,
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Split out so tests never touch the
    /// real process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(root) = lookup("POLYRUN_SCRATCH_DIR") {
            if root.trim().is_empty() {
                return Err(ConfigError::Empty { key: "POLYRUN_SCRATCH_DIR" });
            }
            config.scratch_root = PathBuf::from(root);
        }
        if let Some(value) = lookup("POLYRUN_TIMEOUT_SECONDS") {
            config.timeout_seconds = parse_positive("POLYRUN_TIMEOUT_SECONDS", &value)? as u64;
        }
        if let Some(value) = lookup("POLYRUN_MAX_SOURCE_BYTES") {
            config.max_source_bytes = parse_positive("POLYRUN_MAX_SOURCE_BYTES", &value)?;
        }
        if let Some(value) = lookup("POLYRUN_MAX_OUTPUT_BYTES") {
            config.max_output_bytes = parse_positive("POLYRUN_MAX_OUTPUT_BYTES", &value)?;
        }
        if let Some(value) = lookup("POLYRUN_MAX_CONCURRENT_JOBS") {
            config.max_concurrent_jobs = parse_positive("POLYRUN_MAX_CONCURRENT_JOBS", &value)?;
        }
        if let Some(addr) = lookup("POLYRUN_BIND_ADDR") {
            if addr.trim().is_empty() {
                return Err(ConfigError::Empty { key: "POLYRUN_BIND_ADDR" });
            }
            config.bind_addr = addr;
        }
        config.languages_file = lookup("POLYRUN_LANGUAGES_FILE")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        }),
    }
}
