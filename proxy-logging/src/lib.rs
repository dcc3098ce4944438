//! Tracing bootstrap for the registry proxy binaries.
//!
//! Output is controlled through environment variables so the same binary can
//! log human-readable lines in a terminal and JSON lines in a container:
//!
//! - `LOG_LEVEL`: default filter when `RUST_LOG` is unset (`info`)
//! - `LOG_FORMAT`: `human` or `json` (`human`)
//! - `LOG_OUTPUT`: `console`, `file` or `both` (`console`)
//! - `LOG_FILE_PATH`: target of the daily-rolled file writer (`/tmp/registry-proxy.log`)

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

const DEFAULT_LOG_FILE: &str = "/tmp/registry-proxy.log";

/// Where formatted events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

/// Line format of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
            output: LogOutput::Console,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LogSettings {
    /// Read settings from `LOG_*` variables, falling back to defaults for
    /// anything missing or unrecognised.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };
        let output = match lookup("LOG_OUTPUT").as_deref() {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            _ => LogOutput::Console,
        };

        Self {
            level: lookup("LOG_LEVEL").unwrap_or(defaults.level),
            format,
            output,
            file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_path),
        }
    }
}

// Duplicates every write to stdout and the file appender.
struct Fanout<A, B> {
    primary: A,
    secondary: B,
}

impl<A: Write, B: Write> Write for Fanout<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let primary = self.primary.write(buf);
        let secondary = self.secondary.write(buf);
        primary.or(secondary)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}

#[derive(Clone)]
struct MakeFanout<A, B> {
    primary: A,
    secondary: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeFanout<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Fanout<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Fanout {
            primary: self.primary.make_writer(),
            secondary: self.secondary.make_writer(),
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    ["hyper=warn", "reqwest=warn", "tokio=warn"]
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

fn file_writer(path: &Path) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("/tmp"));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| "registry-proxy.log".as_ref());
    tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name))
}

macro_rules! install {
    ($subscriber:expr, $writer:expr, $format:expr) => {{
        let layer = tracing_subscriber::fmt::layer().with_writer($writer);
        match $format {
            LogFormat::Json => $subscriber.with(layer.json()).init(),
            LogFormat::Human => $subscriber.with(layer).init(),
        }
    }};
}

/// Install the global subscriber described by `settings`.
///
/// The returned guard must be held for the lifetime of the process when file
/// output is enabled, otherwise buffered lines are lost on exit.
pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(env_filter(&settings.level));

    match settings.output {
        LogOutput::Console => {
            install!(subscriber, std::io::stdout, settings.format);
            None
        }
        LogOutput::File => {
            let (writer, guard) = file_writer(&settings.file_path);
            install!(subscriber, writer, settings.format);
            Some(guard)
        }
        LogOutput::Both => {
            let (writer, guard) = file_writer(&settings.file_path);
            let fanout = MakeFanout {
                primary: std::io::stdout,
                secondary: writer,
            };
            install!(subscriber, fanout, settings.format);
            Some(guard)
        }
    }
}

/// Initializes the global tracing subscriber based on environment variables.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env())
}
