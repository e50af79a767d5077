use super::tune::TuneLogLevel;
use core::fmt::Display;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
};

/// Configuration for logging, parameterized by a log level type.
///
/// Note that you can use multiple sinks at the same time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// Path to the log file, if file logging is enabled.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to append to the log file (true) or overwrite it (false). Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Whether to log to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Whether to log to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Optional crate-level logging configuration (e.g., info, debug, trace).
    #[serde(default = "log_default")]
    pub log: Option<LogCrateLevel>,

    /// The log level for this logger, determining verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: log_default(),
            level: L::default(),
        }
    }
}

/// Log levels using the `log` crate.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// Logs informational messages.
    #[default]
    #[serde(rename = "info")]
    Info,

    /// Logs debugging messages.
    #[serde(rename = "debug")]
    Debug,

    /// Logs trace-level messages.
    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

fn log_default() -> Option<LogCrateLevel> {
    Some(LogCrateLevel::Info)
}

/// Trait for types that can be used as log levels in `LoggerConfig`.
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
}

/// Routes the messages of the tuning loop to every configured sink.
#[derive(Debug)]
pub struct Logger {
    sinks: Vec<LoggerKind>,
    level: TuneLogLevel,
}

impl Logger {
    /// Creates a logger from its configuration.
    ///
    /// A log file that can't be opened is skipped with a warning.
    pub fn new(config: &LoggerConfig<TuneLogLevel>) -> Self {
        let mut sinks = Vec::new();

        if let TuneLogLevel::Disabled = config.level {
            return Self::disabled();
        }

        if let Some(path) = &config.file {
            match FileLogger::new(path, config.append) {
                Ok(logger) => sinks.push(LoggerKind::File(logger)),
                Err(err) => log::warn!("Unable to open log file {path:?} ({err})."),
            }
        }
        if config.stdout {
            sinks.push(LoggerKind::Stdout);
        }
        if config.stderr {
            sinks.push(LoggerKind::Stderr);
        }
        if let Some(level) = config.log {
            sinks.push(LoggerKind::Log(level));
        }

        Self {
            sinks,
            level: config.level,
        }
    }

    /// A logger that drops every message.
    pub fn disabled() -> Self {
        Self {
            sinks: Vec::new(),
            level: TuneLogLevel::Disabled,
        }
    }

    /// Logs the progress of the tuning loop, one line per shape.
    pub fn log_tune<S: Display>(&mut self, msg: &S) {
        if let TuneLogLevel::Disabled = self.level {
            return;
        }
        self.log(msg);
    }

    /// Logs a search decision, only kept at the full level.
    pub fn log_search<S: Display>(&mut self, msg: &S) {
        if let TuneLogLevel::Full = self.level {
            self.log(msg);
        }
    }

    /// The configured level.
    pub fn log_level(&self) -> TuneLogLevel {
        self.level
    }

    fn log<S: Display>(&mut self, msg: &S) {
        for sink in self.sinks.iter_mut() {
            sink.log(msg);
        }
    }
}

/// Represents different types of loggers.
#[derive(Debug)]
enum LoggerKind {
    /// Logs to a file.
    File(FileLogger),

    /// Logs to standard output.
    Stdout,

    /// Logs to standard error.
    Stderr,

    /// Logs using the `log` crate with a specified level.
    Log(LogCrateLevel),
}

impl LoggerKind {
    fn log<S: Display>(&mut self, msg: &S) {
        match self {
            LoggerKind::File(file_logger) => file_logger.log(msg),
            LoggerKind::Stdout => println!("{msg}"),
            LoggerKind::Stderr => eprintln!("{msg}"),
            LoggerKind::Log(level) => match level {
                LogCrateLevel::Info => log::info!("{msg}"),
                LogCrateLevel::Debug => log::debug!("{msg}"),
                LogCrateLevel::Trace => log::trace!("{msg}"),
            },
        }
    }
}

/// Logger that writes messages to a file.
#[derive(Debug)]
struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    fn new(path: &PathBuf, append: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .create(true)
            .open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    // Flushes after every line so a crashed run keeps its progress.
    fn log<S: Display>(&mut self, msg: &S) {
        if let Err(err) = writeln!(self.writer, "{msg}").and_then(|_| self.writer.flush()) {
            log::warn!("Unable to write log line ({err}).");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_receives_tune_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tune.log");
        let config = LoggerConfig::<TuneLogLevel> {
            file: Some(path.clone()),
            log: None,
            ..Default::default()
        };

        let mut logger = Logger::new(&config);
        logger.log_tune(&"1024 : 125 GB/s");
        logger.log_search(&"dropped at the minimal level");

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "1024 : 125 GB/s\n");
    }

    #[test]
    fn disabled_level_drops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tune.log");
        let config = LoggerConfig::<TuneLogLevel> {
            file: Some(path.clone()),
            level: TuneLogLevel::Disabled,
            ..Default::default()
        };

        let mut logger = Logger::new(&config);
        logger.log_tune(&"nothing");

        assert!(!path.exists());
        assert_eq!(logger.log_level(), TuneLogLevel::Disabled);
    }
}
