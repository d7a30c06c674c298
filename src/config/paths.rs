//! Where speech-intake keeps its settings, audio and records.
//!
//! ```text
//! <config dir>/speech-intake/settings.toml
//! <data dir>/speech-intake/
//!   blobs/audio/<id>.<ext>      uploaded and canonical audio (FsStorage)
//!   blobs/tmp/convert-…         originals staged during conversion
//!   records/<id>.json           Recording + ProcessingResult (JsonFileRepository)
//! ```
//!
//! `<config dir>` and `<data dir>` come from `dirs::config_dir` and
//! `dirs::data_local_dir`.  `storage.data_dir` in the settings file, or the
//! CLI's `--data-dir`, replaces the data root.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "speech-intake";

/// Resolved settings file and data root.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Parent of `blobs/` and `records/` unless overridden by configuration.
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Platform locations; the working directory stands in for any the
    /// platform does not report.
    pub fn new() -> Self {
        let under = |base: Option<PathBuf>| base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR);
        let config_dir = under(dirs::config_dir());
        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            data_dir: under(dirs::data_local_dir()),
        }
    }

    /// Root of [`FsStorage`](crate::recording::FsStorage) blobs.
    pub fn blobs_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("blobs")
    }

    /// Root of the [`JsonFileRepository`](crate::recording::JsonFileRepository).
    pub fn records_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("records")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
