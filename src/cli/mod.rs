//! Command-line front end.
//!
//! One module per command family; each exposes a `run` taking its parsed
//! arguments plus the resolved [`AppConfig`].

pub mod analyze;
pub mod args;
pub mod convert;
pub mod store;

pub use args::Cli;
pub use args::Commands;

use std::path::Path;

use anyhow::{Context, Result};
use speech_intake::config::AppConfig;

/// Load settings from `--config`, or the platform file, then apply
/// `--data-dir`.  A missing or unreadable platform file falls back to
/// defaults with a warning; an explicit `--config` path must parse.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {e:#}");
            AppConfig::default()
        }),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Lowercased extension of `path`, used as a decoder probing hint.
pub(crate) fn extension_hint(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}
