//! Synthesis configuration.
//!
//! The knobs the synthesiser reads from the driver: debugging output,
//! profiling, provenance mode, worker count, and the display strings
//! threaded into the generated program's command line handling.

use thiserror::Error;

/// Configuration error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid jobs count: {0}")]
    InvalidJobs(usize),
    #[error("unknown provenance mode: {0}")]
    UnknownProvenance(String),
}

/// Result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Provenance instrumentation mode of the generated program.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provenance {
    #[default]
    Off,
    Explain,
    SubtreeHeights,
    Explore,
}

impl Provenance {
    /// Parse the driver's option value; the empty string selects
    /// `Explain` (provenance requested without a sub-mode).
    pub fn from_option(value: &str) -> ConfigResult<Self> {
        match value {
            "" | "explain" => Ok(Provenance::Explain),
            "subtreeHeights" => Ok(Provenance::SubtreeHeights),
            "explore" => Ok(Provenance::Explore),
            other => Err(ConfigError::UnknownProvenance(other.to_string())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != Provenance::Off
    }
}

/// Configuration for one synthesis run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Emit `/* BEGIN .. */` region comments into generated code.
    pub debug_report: bool,
    pub verbose: bool,
    /// Profile log path; `Some` enables profiling instrumentation.
    pub profile: Option<String>,
    pub provenance: Provenance,
    /// Spawn the live profiler TUI from the generated `runAll`.
    pub live_profile: bool,
    /// Worker count baked into the generated command-line defaults.
    pub jobs: usize,
    pub version: String,
    /// Datalog source file name, shown by the generated program.
    pub source_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug_report: false,
            verbose: false,
            profile: None,
            provenance: Provenance::Off,
            live_profile: false,
            jobs: 1,
            version: String::new(),
            source_file: String::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.jobs == 0 {
            return Err(ConfigError::InvalidJobs(self.jobs));
        }
        Ok(())
    }

    pub fn profiling(&self) -> bool {
        self.profile.is_some()
    }

    pub fn profile_path(&self) -> &str {
        self.profile.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_modes() {
        assert_eq!(Provenance::from_option(""), Ok(Provenance::Explain));
        assert_eq!(
            Provenance::from_option("subtreeHeights"),
            Ok(Provenance::SubtreeHeights)
        );
        assert!(Provenance::from_option("bogus").is_err());
    }

    #[test]
    fn test_jobs_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.jobs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidJobs(0)));
    }
}
