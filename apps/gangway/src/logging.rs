use clap::ValueEnum;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

/// Replaces the level-derived directives entirely when set.
pub const LOG_FILTER_ENV: &str = "GANGWAY_LOG_FILTER";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to open log file {path:?}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid GANGWAY_LOG_FILTER: {0}")]
    Filter(#[from] ParseError),
    #[error("a global logger is already installed")]
    AlreadyInstalled,
}

impl LogConfig {
    /// Gangway's own targets log at the chosen level; dependencies (reqwest,
    /// hyper, rustls) stay at warn unless the level is stricter.
    fn directives(&self) -> String {
        let level = self.level.min(LogLevel::Warn).as_directive();
        format!("{level},gangway={}", self.level.as_directive())
    }

    fn resolve_directives(&self, override_directives: Option<&str>) -> String {
        match override_directives.map(str::trim) {
            Some(custom) if !custom.is_empty() => custom.to_string(),
            _ => self.directives(),
        }
    }

    fn env_filter(&self, override_directives: Option<&str>) -> Result<EnvFilter, LogError> {
        Ok(EnvFilter::try_new(self.resolve_directives(override_directives))?)
    }
}

/// Installs the global subscriber, writing to stderr or `config.file`.
/// Lines are flushed by a background worker; keep the returned guard alive
/// until the process is about to exit.
pub fn init(config: &LogConfig) -> Result<WorkerGuard, LogError> {
    let filter = config.env_filter(std::env::var(LOG_FILTER_ENV).ok().as_deref())?;

    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LogError::OpenFile {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.level >= LogLevel::Debug)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .try_init()
        .map_err(|_| LogError::AlreadyInstalled)?;
    Ok(guard)
}
