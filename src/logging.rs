use env_logger::Builder;
use log::{Level, LevelFilter, Record};
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

pub fn setup_logging() {
    let colored = atty::is(atty::Stream::Stderr);

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .format(move |buf, record| write_record(buf, record, colored))
        .init();
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1B[31m",
        Level::Warn => "\x1B[33m",
        Level::Info => "\x1B[32m",
        Level::Debug => "\x1B[36m",
        Level::Trace => "\x1B[35m",
    }
}

fn write_record<W: Write>(buf: &mut W, record: &Record, colored: bool) -> io::Result<()> {
    let level = record.level();
    let timestamp = humantime::format_rfc3339_millis(SystemTime::now());

    if colored {
        write!(buf, "{}{:>5}\x1B[0m", level_color(level), level)?;
    } else {
        write!(buf, "{:>5}", level)?;
    }
    write!(buf, " [{}] {}", timestamp, record.args())?;

    // Source location only at debug/trace
    if level >= Level::Debug {
        write!(
            buf,
            " - {}:{}",
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0)
        )?;
    }
    writeln!(buf)
}

/// Logs an incoming request as `→ METHOD scheme://host/target VERSION`.
#[macro_export]
macro_rules! log_request {
    ($scheme:expr, $request:expr) => {
        log::info!(
            "→ {} {}://{}{} {}",
            $request.method,
            $scheme,
            $request.host().unwrap_or("-"),
            $request.target,
            $request.version
        )
    };
}

#[macro_export]
macro_rules! log_response {
    ($status:expr, $duration:expr, $original_size:expr, $final_size:expr) => {
        log::info!(
            "← {} ({:?}) - Size: {} → {}",
            $status,
            $duration,
            $original_size,
            $final_size
        )
    };
}

#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        log::error!("❌ {} - {}", $context, $error)
    };
}

pub trait Loggable {
    fn log_description(&self) -> String;
}

impl Loggable for Path {
    fn log_description(&self) -> String {
        self.display().to_string()
    }
}

impl Loggable for str {
    fn log_description(&self) -> String {
        self.to_string()
    }
}

/// Wraps a fallible step with debug logging on entry and exit and an error
/// log on failure.
pub trait LoggingExt: Loggable {
    fn log_operation<F, T, E>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::fmt::Display;
}

impl<S: ?Sized + Loggable> LoggingExt for S {
    fn log_operation<F, T, E>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::fmt::Display,
    {
        log::debug!("Starting {} on {}", operation, self.log_description());
        match f() {
            Ok(result) => {
                log::debug!("Completed {} on {}", operation, self.log_description());
                Ok(result)
            }
            Err(e) => {
                log::error!("Failed {} on {}: {}", operation, self.log_description(), e);
                Err(e)
            }
        }
    }
}
