/// Logging sink
///
/// Single-line, timestamped records:
/// `[<unix-seconds>.<millis>] [nanoinit] <LEVEL> <message>`.
///
/// The console goes through two `env_logger` loggers, info and below on
/// stdout and warnings and errors on stderr. Verbosity picks their base
/// filter; `RUST_LOG` refines it. The optional log file receives every
/// record at info or above whatever the verbosity, flushed one by one.
use chrono::{DateTime, Utc};
use env_logger::fmt::Formatter;
use env_logger::{Builder, Env, Logger, Target};
use log::{error, Level, LevelFilter, Log, Metadata, Record};
use std::fmt::Display;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Threshold for the log file; verbosity does not apply there.
pub const FILE_LEVEL: LevelFilter = LevelFilter::Info;

/// Where records end up after [`init_logger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Console,
    /// Console plus the given file.
    File(PathBuf),
}

/// 0 = supervisor errors only, 1 = plus application errors, 2 = plus info.
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        _ => LevelFilter::Info,
    }
}

pub fn format_line(timestamp: DateTime<Utc>, level: Level, message: impl Display) -> String {
    format!(
        "[{}.{:03}] [nanoinit] {} {}",
        timestamp.timestamp(),
        timestamp.timestamp_subsec_millis(),
        level,
        message
    )
}

fn write_record(buf: &mut Formatter, record: &Record) -> io::Result<()> {
    writeln!(buf, "{}", format_line(Utc::now(), record.level(), record.args()))
}

fn console(verbosity: u8, target: Target) -> Logger {
    Builder::new()
        .filter_level(level_for_verbosity(verbosity))
        .parse_env(Env::default())
        .format(write_record)
        .target(target)
        .build()
}

/// Console loggers plus an optional always-on file.
pub struct SinkLogger {
    stdout: Logger,
    stderr: Logger,
    file: Option<Mutex<File>>,
}

impl SinkLogger {
    pub fn new(verbosity: u8, file: Option<File>) -> Self {
        Self {
            stdout: console(verbosity, Target::Stdout),
            stderr: console(verbosity, Target::Stderr),
            file: file.map(Mutex::new),
        }
    }

    fn console_for(&self, level: Level) -> &Logger {
        match level {
            Level::Error | Level::Warn => &self.stderr,
            _ => &self.stdout,
        }
    }

    pub fn console_enabled(&self, metadata: &Metadata) -> bool {
        self.console_for(metadata.level()).enabled(metadata)
    }

    fn file_enabled(&self, level: Level) -> bool {
        self.file.is_some() && level <= FILE_LEVEL
    }

    /// Most verbose level any sink accepts.
    pub fn max_level(&self) -> LevelFilter {
        let console = self.stdout.filter().max(self.stderr.filter());
        if self.file.is_some() {
            console.max(FILE_LEVEL)
        } else {
            console
        }
    }
}

impl Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.file_enabled(metadata.level()) || self.console_enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.file_enabled(record.level()) {
            if let Some(Ok(mut file)) = self.file.as_ref().map(|f| f.lock()) {
                let line = format_line(Utc::now(), record.level(), record.args());
                let _ = writeln!(file, "{}", line).and_then(|_| file.flush());
            }
        }
        self.console_for(record.level()).log(record);
    }

    fn flush(&self) {
        self.stdout.flush();
        self.stderr.flush();
        if let Some(Ok(mut file)) = self.file.as_ref().map(|f| f.lock()) {
            let _ = file.flush();
        }
    }
}

/// Install the global logger. A log file that cannot be created is reported
/// and file logging is disabled. Installing twice keeps the first logger.
pub fn init_logger(verbosity: u8, log_path: Option<&Path>) -> LogTarget {
    let mut open_error = None;
    let (file, target) = match log_path {
        Some(path) => match File::create(path) {
            Ok(file) => (Some(file), LogTarget::File(path.to_path_buf())),
            Err(e) => {
                open_error = Some(format!("cannot open log file {}: {}", path.display(), e));
                (None, LogTarget::Console)
            }
        },
        None => (None, LogTarget::Console),
    };

    let logger = SinkLogger::new(verbosity, file);
    let max_level = logger.max_level();
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
    if let Some(message) = open_error {
        error!("{}; logging to file is disabled", message);
    }
    target
}
