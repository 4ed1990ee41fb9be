//! Process-level runtime: configuration, logging and signal handling around
//! a [`Bot`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stibium_runtime::StibiumRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = StibiumRuntime::builder().profile("production").build()?;
//!     let bot = runtime.bot(Arc::new(MyPlatform::connect().await?));
//!     bot.register(CommandHandler::new("echo", echo)).await?;
//!     runtime.run(&bot).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Signals
//!
//! Ctrl+C is first offered to the bot as an operator interrupt. If a running
//! action absorbs it, that action is cancelled and the bot keeps listening;
//! otherwise the runtime shuts down. SIGTERM always shuts down.

use std::future::Future;

use stibium_core::{Bot, BotError, BoxedPlatform};
use tokio::signal;
use tracing::{info, warn};

use crate::config::{ConfigLoader, ConfigResult, StibiumConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Runs bots built from a [`StibiumConfig`].
#[derive(Debug, Clone)]
pub struct StibiumRuntime {
    config: StibiumConfig,
}

impl StibiumRuntime {
    /// Creates a runtime from the configuration in the current directory.
    ///
    /// Falls back to defaults if loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                StibiumConfig::default()
            });
        Self::from_config(config)
    }

    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from a loaded configuration and initializes logging.
    pub fn from_config(config: StibiumConfig) -> Self {
        logging::init_from_config(&config.logging);
        info!(
            bot = %config.bot.name,
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StibiumConfig {
        &self.config
    }

    /// Creates a bot on `platform` with the configured options.
    pub fn bot(&self, platform: BoxedPlatform) -> Bot {
        Bot::new(platform, self.config.bot_options())
    }

    /// Logs in and listens until Ctrl+C (not absorbed by a handler) or SIGTERM.
    pub async fn run(&self, bot: &Bot) -> RuntimeResult<()> {
        info!("Stibium runtime is now running. Press Ctrl+C to stop.");
        self.serve(bot, wait_for_shutdown(bot)).await
    }

    /// Logs in and listens until `shutdown` completes.
    pub async fn run_until<F>(&self, bot: &Bot, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.serve(bot, async {
            shutdown.await;
            Ok(())
        })
        .await
    }

    async fn serve<F>(&self, bot: &Bot, stop: F) -> RuntimeResult<()>
    where
        F: Future<Output = RuntimeResult<()>>,
    {
        self.login(bot).await?;

        let listen = bot.listen();
        tokio::pin!(listen);

        let stopped = tokio::select! {
            result = &mut listen => return finish(result),
            stopped = stop => stopped,
        };

        bot.shutdown();
        let listened = finish(listen.await);
        stopped.and(listened)
    }

    async fn login(&self, bot: &Bot) -> RuntimeResult<()> {
        if bot.is_logged_in() {
            return Ok(());
        }
        let credentials = self
            .config
            .credentials()
            .ok_or(RuntimeError::MissingCredentials)?;
        bot.login(&credentials).await?;
        Ok(())
    }
}

impl Default for StibiumRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Treats an unabsorbed operator interrupt as a regular stop.
fn finish(result: Result<(), BotError>) -> RuntimeResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(BotError::Cancelled(_)) => {
            info!("Listening ended by operator interrupt");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Offers a Ctrl+C to the bot. Returns `true` if a running action absorbed it.
fn absorb_interrupt(bot: &Bot) -> bool {
    let absorbed = bot.interrupt();
    if absorbed {
        warn!(bot = %bot.name(), "Interrupt absorbed by a running action, still listening");
    }
    absorbed
}

/// Resolves on SIGTERM or on a Ctrl+C that no running action absorbed.
async fn wait_for_shutdown(bot: &Bot) -> RuntimeResult<()> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    loop {
        #[cfg(unix)]
        tokio::select! {
            result = signal::ctrl_c() => result?,
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                return Ok(());
            }
        }

        #[cfg(not(unix))]
        signal::ctrl_c().await?;

        if !absorb_interrupt(bot) {
            info!("Received Ctrl+C, shutting down");
            return Ok(());
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`StibiumRuntime`] with custom configuration sources.
///
/// ```rust,ignore
/// let runtime = StibiumRuntime::builder()
///     .config_file("deploy/stibium.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration programmatically.
    pub fn merge(mut self, config: StibiumConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> ConfigResult<StibiumRuntime> {
        let config = self.config_loader.load()?;
        Ok(StibiumRuntime::from_config(config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
