//! Logging setup for the poolvisor binary.
//!
//! Output goes to stderr so stdout stays reserved for command results and,
//! in role mode, the ready line read by the parent.
//!
//! # Environment Variables
//!
//! - `POOLVISOR_LOG` - Log filter (overrides RUST_LOG)
//! - `POOLVISOR_LOG_FORMAT` - Output format: full, compact
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! # Example
//!
//! ```no_run
//! use poolvisor::logging::{LogConfig, init};
//!
//! init(LogConfig::from_verbosity(1).with_env_overrides());
//! ```

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Default multi-field format.
    #[default]
    Full,
    /// Compact single-line format.
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" | "pretty" => Ok(Self::Full),
            "compact" => Ok(Self::Compact),
            _ => Err(format!(
                "unknown log format '{s}', valid options: full, compact"
            )),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when no filter is set.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Directive string for `EnvFilter`; takes precedence over `level`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::default(),
            filter: None,
        }
    }
}

impl LogConfig {
    /// Maps a `-v` count to a level: 0 warn, 1 info, 2 debug, 3+ trace.
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Self::default()
        }
    }

    /// Set the log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// `POOLVISOR_LOG` wins over `RUST_LOG`; neither replaces a filter that is already set.
    pub fn with_env_overrides(mut self) -> Self {
        if self.filter.is_none() {
            self.filter = std::env::var("POOLVISOR_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .ok();
        }
        if let Some(format) = std::env::var("POOLVISOR_LOG_FORMAT")
            .ok()
            .and_then(|f| f.parse().ok())
        {
            self.format = format;
        }
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str().to_lowercase());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("warning: invalid log filter '{filter}', using default");
                fallback()
            }),
            None => fallback(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Subsequent calls are silently ignored.
pub fn init(config: LogConfig) {
    let filter = config.build_filter();
    let result = match config.format {
        LogFormat::Full => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    let _ = result;
}
