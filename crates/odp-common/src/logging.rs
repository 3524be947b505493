//! Subscriber setup shared by the runner and every extractor binary
//!
//! The two process roles differ in one respect: an extractor's stdout is
//! read by the runner (it carries the `New data detected` token), so
//! extractors write their diagnostics to stderr. [`LogConfig::runner`] and
//! [`LogConfig::extractor`] encode those defaults; `LOG_*` variables
//! override either.
//!
//! ```no_run
//! use odp_common::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::runner().merge_env().unwrap_or_else(|_| LogConfig::runner());
//! let _guard = init_logging(&config).ok();
//! tracing::info!(tasks = 12, "Run started");
//! ```

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Resolve `input` against a table of accepted spellings
fn lookup_choice<T: Copy>(kind: &str, input: &str, choices: &[(&str, T)]) -> Result<T> {
    let wanted = input.trim().to_ascii_lowercase();
    choices
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, value)| *value)
        .ok_or_else(|| anyhow!("unknown {kind} '{input}'"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        lookup_choice(
            "log level",
            s,
            &[
                ("trace", Self::Trace),
                ("debug", Self::Debug),
                ("info", Self::Info),
                ("warn", Self::Warn),
                ("warning", Self::Warn),
                ("error", Self::Error),
            ],
        )
    }
}

/// Sinks that receive log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        self != Self::File
    }

    fn file(self) -> bool {
        self != Self::Console
    }
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        lookup_choice(
            "log output",
            s,
            &[("console", Self::Console), ("file", Self::File), ("both", Self::Both), ("all", Self::Both)],
        )
    }
}

/// Which standard stream the console sink writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    #[default]
    Stdout,
    Stderr,
}

impl ConsoleStream {
    fn writer(self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(std::io::stdout),
            Self::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        lookup_choice("log format", s, &[("text", Self::Text), ("pretty", Self::Text), ("json", Self::Json)])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub console: ConsoleStream,
    pub format: LogFormat,
    /// Where daily files go when `output` includes a file
    pub log_dir: PathBuf,
    /// `odp-runner` rolls to `odp-runner.2025-01-13`
    pub log_file_prefix: String,
    /// Comma separated `EnvFilter` directives, e.g. `reqwest=warn,odp_ingest=debug`
    pub filter_directives: Option<String>,
    pub include_location: bool,
    pub include_thread_ids: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            output: LogOutput::default(),
            console: ConsoleStream::default(),
            format: LogFormat::default(),
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "odp".into(),
            filter_directives: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

impl LogConfig {
    /// Orchestrator process: console on stdout
    pub fn runner() -> Self {
        Self::builder().log_file_prefix("odp-runner").build()
    }

    /// Extractor process: console on stderr, stdout stays free for the token
    pub fn extractor() -> Self {
        Self::builder()
            .console(ConsoleStream::Stderr)
            .log_file_prefix("odp-extractor")
            .build()
    }

    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay the `LOG_*` process environment
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|name| std::env::var(name).ok())
    }

    /// Overlay `LOG_*` values from any source; unset names keep the current value
    pub fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = var("LOG_LEVEL") {
            self.level = v.parse()?;
        }
        if let Some(v) = var("LOG_OUTPUT") {
            self.output = v.parse()?;
        }
        if let Some(v) = var("LOG_FORMAT") {
            self.format = v.parse()?;
        }
        if let Some(v) = var("LOG_DIR") {
            self.log_dir = v.into();
        }
        if let Some(v) = var("LOG_FILE_PREFIX") {
            self.log_file_prefix = v;
        }
        if let Some(v) = var("LOG_FILTER") {
            self.filter_directives = Some(v);
        }

        let switches: [(&str, &mut bool); 3] = [
            ("LOG_INCLUDE_LOCATION", &mut self.include_location),
            ("LOG_INCLUDE_THREAD_IDS", &mut self.include_thread_ids),
            ("LOG_INCLUDE_TARGETS", &mut self.include_targets),
        ];
        for (name, slot) in switches {
            if let Some(v) = var(name) {
                *slot = parse_switch(&v).with_context(|| format!("{name}: expected true or false"))?;
            }
        }
        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::builder()
            .with_default_directive(self.level.as_filter().into())
            .from_env_lossy();
        let extra = self.filter_directives.as_deref().unwrap_or_default();
        for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            filter = filter.add_directive(
                directive
                    .parse()
                    .with_context(|| format!("invalid log filter directive '{directive}'"))?,
            );
        }
        Ok(filter)
    }

    fn sink(&self, writer: BoxMakeWriter, ansi: bool) -> BoxedLayer {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(self.include_targets)
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_thread_ids(self.include_thread_ids)
            .with_span_events(FmtSpan::CLOSE);
        if self.format == LogFormat::Json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("'{other}' is not a switch value"),
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn console(mut self, console: ConsoleStream) -> Self {
        self.config.console = console;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.config.filter_directives = Some(directives.into());
        self
    }

    pub fn include_location(mut self, on: bool) -> Self {
        self.config.include_location = on;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Flushes the file sink when dropped
#[must_use = "file logging stops when the guard is dropped"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber; a second call in the same process fails
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let mut layers: Vec<BoxedLayer> = vec![config.env_filter()?.boxed()];
    let mut file_guard = None;

    if config.output.console() {
        layers.push(config.sink(config.console.writer(), true));
    }
    if config.output.file() {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("cannot create log directory {}", config.log_dir.display()))?;
        let rolling = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(rolling);
        file_guard = Some(guard);
        layers.push(config.sink(BoxMakeWriter::new(writer), false));
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(LogGuard { _file: file_guard })
}
