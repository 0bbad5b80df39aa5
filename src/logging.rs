use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogLevel;

const QUIET_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "notify"];

/// Filter directives used when `RUST_LOG` is unset. Each `-v` raises the
/// configured level by one step.
pub fn default_directives(level: LogLevel, verbosity: u8) -> String {
    const ORDER: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];
    let start = ORDER.iter().position(|l| *l == level).unwrap_or(2);
    let level = ORDER[(start + usize::from(verbosity)).min(ORDER.len() - 1)];
    let mut directives = level.as_str().to_string();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

/// Installs the global subscriber: stderr output plus, when `file` is set,
/// an uncoloured copy appended to that file.
pub fn init(level: LogLevel, verbosity: u8, file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level, verbosity)))
        .context("invalid log filter")?;

    let file_layer = match file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(log_file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert!(default_directives(LogLevel::Info, 0).starts_with("info,"));
        assert!(default_directives(LogLevel::Info, 1).starts_with("debug,"));
        assert!(default_directives(LogLevel::Warning, 1).starts_with("info,"));
        assert!(default_directives(LogLevel::Info, 3).starts_with("trace,"));
        assert!(default_directives(LogLevel::Error, 0).contains("notify=warn"));
    }

    #[test]
    fn directives_parse() {
        assert!(EnvFilter::try_new(default_directives(LogLevel::Warning, 0)).is_ok());
    }
}
