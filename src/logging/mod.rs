use std::fmt;
use std::sync::Arc;

use log::{Level, LevelFilter, Log, Record};
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

use crate::configuration::SetupError;

const PATTERN: &str = "{d} - {t} - {l} - {f} - line: {L} - {m}{n}";

/// Handle through which every component emits its log records.
///
/// The sink wraps a `log4rs::Logger` (or any other `log::Log`) without
/// installing it as the process-wide logger, so it is built once in `main`
/// and handed to each component explicitly.
#[derive(Clone)]
pub struct LogSink {
    logger: Arc<dyn Log>,
}

impl LogSink {
    pub const TARGET: &'static str = "backup_s3";

    pub fn new(logger: Arc<dyn Log>) -> LogSink {
        LogSink { logger }
    }

    /// Console only sink used until the configuration names a log file.
    pub fn bootstrap() -> Result<LogSink, SetupError> {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();

        let config = Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(stderr)))
            .build(Root::builder().appender("stderr").build(LevelFilter::Info))
            .map_err(|errors| SetupError::Logger(errors.to_string()))?;

        Ok(LogSink::new(Arc::new(log4rs::Logger::new(config))))
    }

    /// Everything from debug up goes to `log_file`; errors are echoed to stderr.
    pub fn with_log_file(log_file: &str) -> Result<LogSink, SetupError> {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(log_file)
            .map_err(|source| SetupError::LogFile {
                path: log_file.to_string(),
                source,
            })?;

        let config = Config::builder()
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(LevelFilter::Error)))
                    .build("stderr", Box::new(stderr)),
            )
            .appender(Appender::builder().build("logfile", Box::new(file)))
            .build(
                Root::builder()
                    .appender("stderr")
                    .appender("logfile")
                    .build(LevelFilter::Debug),
            )
            .map_err(|errors| SetupError::Logger(errors.to_string()))?;

        Ok(LogSink::new(Arc::new(log4rs::Logger::new(config))))
    }

    pub fn write(&self, level: Level, file: &'static str, line: u32, args: fmt::Arguments) {
        let record = Record::builder()
            .args(args)
            .level(level)
            .target(Self::TARGET)
            .file_static(Some(file))
            .line(Some(line))
            .build();
        if self.logger.enabled(record.metadata()) {
            self.logger.log(&record);
        }
    }

    pub fn flush(&self) {
        self.logger.flush();
    }
}

macro_rules! sink_log {
    ($sink:expr, $level:expr, $($arg:tt)+) => {
        $sink.write($level, file!(), line!(), format_args!($($arg)+))
    };
}

macro_rules! log_error {
    ($sink:expr, $($arg:tt)+) => { sink_log!($sink, log::Level::Error, $($arg)+) };
}

macro_rules! log_warn {
    ($sink:expr, $($arg:tt)+) => { sink_log!($sink, log::Level::Warn, $($arg)+) };
}

macro_rules! log_info {
    ($sink:expr, $($arg:tt)+) => { sink_log!($sink, log::Level::Info, $($arg)+) };
}

macro_rules! log_debug {
    ($sink:expr, $($arg:tt)+) => { sink_log!($sink, log::Level::Debug, $($arg)+) };
}
