//! Configuration schema definitions.
//!
//! Every section carries per-field defaults, so an empty file (or no file at
//! all) yields a usable configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stibium_core::{BotOptions, Credentials, DEFAULT_DEADLINE, DEFAULT_IDLE_TICK, Notices};

use super::error::ConfigError;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StibiumConfig {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Identity and account of the bot.
    #[serde(default)]
    pub bot: BotConfig,

    /// Untrusted executor settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Event dispatch settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Timeout and recurrence scheduling settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// User-facing notice texts.
    #[serde(default)]
    pub notices: Notices,
}

impl StibiumConfig {
    /// Builds the [`BotOptions`] described by this configuration.
    pub fn bot_options(&self) -> BotOptions {
        let mut options = BotOptions::new(self.bot.name.clone())
            .prefix(self.bot.prefix.clone())
            .deadline(self.executor.deadline())
            .engagement_delay(self.dispatcher.engagement_delay())
            .channel_capacity(self.dispatcher.channel_capacity)
            .idle_tick(self.scheduler.idle_tick())
            .notices(self.notices.clone());
        if let Some(owner) = &self.bot.owner {
            options = options.owner(owner.clone());
        }
        options
    }

    /// Returns the configured account credentials, if a login is set.
    pub fn credentials(&self) -> Option<Credentials> {
        let login = self.bot.login.as_deref()?;
        Some(Credentials::new(
            login,
            self.bot.password.clone().unwrap_or_default(),
        ))
    }
}

// =============================================================================
// Bot
// =============================================================================

/// Bot identity and account.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot name, used in logs.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// User id that receives failure reports.
    #[serde(default)]
    pub owner: Option<String>,

    /// Account login.
    #[serde(default)]
    pub login: Option<String>,

    /// Account password.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            prefix: default_prefix(),
            owner: None,
            login: None,
            password: None,
        }
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("owner", &self.owner)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_bot_name() -> String {
    "stibium".to_string()
}

fn default_prefix() -> String {
    "!".to_string()
}

// =============================================================================
// Executor / Dispatcher / Scheduler
// =============================================================================

/// Untrusted executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Deadline for a single piece of handler code, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl ExecutorConfig {
    /// Returns the deadline as a [`Duration`].
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn default_deadline_secs() -> u64 {
    DEFAULT_DEADLINE.as_secs()
}

/// Event dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Pause between the typing indicator and the action, in milliseconds.
    #[serde(default = "default_engagement_delay_ms")]
    pub engagement_delay_ms: u64,

    /// Capacity of the inbound event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl DispatcherConfig {
    /// Returns the engagement delay as a [`Duration`].
    pub fn engagement_delay(&self) -> Duration {
        Duration::from_millis(self.engagement_delay_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            engagement_delay_ms: default_engagement_delay_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_engagement_delay_ms() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    256
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Polling interval while nothing is queued, in milliseconds.
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,
}

impl SchedulerConfig {
    /// Returns the idle tick as a [`Duration`].
    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_tick_ms: default_idle_tick_ms(),
        }
    }
}

fn default_idle_tick_ms() -> u64 {
    DEFAULT_IDLE_TICK.as_millis() as u64
}

// =============================================================================
// Logging
// =============================================================================

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level: trace, debug, info, warn or error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Rotation of the log file.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Span lifecycle events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target levels, e.g. `stibium_core = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            rotation: LogRotation::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A parsed log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase level name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}
