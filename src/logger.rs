use std::path::PathBuf;

use anyhow::Result;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Install the global tracing subscriber. `RUST_LOG` overrides the level
/// passed in; with a log directory output goes to a daily-rolling file,
/// otherwise to stderr.
pub fn init_tracing(log_level: &str, log_dir: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "plumber.log");
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(appender))
                .try_init()?;
        }
        None => {
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .try_init()?;
        }
    }
    Ok(())
}
