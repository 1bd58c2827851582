use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;
use std::time::SystemTime;

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1B[31m", // Red
        Level::Warn => "\x1B[33m",  // Yellow
        Level::Info => "\x1B[32m",  // Green
        Level::Debug => "\x1B[36m", // Cyan
        Level::Trace => "\x1B[35m", // Magenta
    }
}

/// Installs the global logger: `info` unless `RUST_LOG` says otherwise,
/// colored when stderr is a terminal.
pub fn setup_logging() {
    let colored = atty::is(atty::Stream::Stderr);

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .format(move |buf, record| {
            let level = record.level();
            let timestamp = humantime::format_rfc3339_millis(SystemTime::now());
            let (color, reset) = if colored {
                (level_color(level), "\x1B[0m")
            } else {
                ("", "")
            };

            write!(
                buf,
                "{}{:>5}{} [{}] {}",
                color,
                level,
                reset,
                timestamp,
                record.args()
            )?;
            // Source location only at debug and trace
            if level >= Level::Debug {
                write!(
                    buf,
                    " - {}:{}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0)
                )?;
            }
            writeln!(buf)
        })
        .init();
}

#[macro_export]
macro_rules! log_request {
    ($request:expr) => {{
        let request: &$crate::http::Request = $request;
        log::info!("→ {} {}", request.method(), request.target())
    }};
}

#[macro_export]
macro_rules! log_response {
    ($status:expr, $duration:expr, $size:expr) => {
        log::info!("← {} ({:?}) - Size: {}", $status, $duration, $size)
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

impl<T: std::fmt::Display> Loggable for T {
    fn log_description(&self) -> String {
        self.to_string()
    }
}

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
        log::trace!("Starting {} on {}", operation, self.log_description());
        match f() {
            Ok(result) => {
                log::trace!("Completed {} on {}", operation, self.log_description());
                Ok(result)
            }
            Err(e) => {
                log::error!("Failed {} on {}: {}", operation, self.log_description(), e);
                Err(e)
            }
        }
    }
}
