//! Tracing setup driven by the `[logging]` config section.
//!
//! Logs go to the systemd journal when `journald` is enabled and the
//! journal socket answers, otherwise to `placelist.log` rolled daily in
//! the configured directory.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable overriding `logging.level`, e.g.
/// `PLACELIST_LOG=placelist::db=debug,info`.
pub const LOG_ENV: &str = "PLACELIST_LOG";

const LOG_FILE: &str = "placelist.log";

/// Dropping the guard stops the writer thread.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Filter from `PLACELIST_LOG` when set, else from `logging.level`.
pub fn filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives).with_context(|| format!("parsing {LOG_ENV}={directives}"))
        }
        _ => EnvFilter::try_new(&config.level)
            .with_context(|| format!("parsing logging.level \"{}\"", config.level)),
    }
}

/// Install the global subscriber. Call once, after the config is loaded.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = filter(config)?;

    #[cfg(target_os = "linux")]
    {
        if config.journald {
            if let Ok(journald_layer) = tracing_journald::layer() {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(journald_layer)
                    .try_init()?;
                tracing::info!(level = %config.level, "logging to journald");
                return Ok(());
            }
        }
    }

    init_file(env_filter, &config.dir)
}

fn init_file(env_filter: EnvFilter, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE));
    let _ = FILE_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;

    tracing::info!(dir = %dir.display(), "logging to {LOG_FILE}");
    Ok(())
}
