//! Pipeline settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to worker
//! tasks by value.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Framing and feature-extraction constants for the metric extractor and the
/// speech/silence segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// FFT size used for the spectrogram (samples).
    pub n_fft: usize,
    /// Hop between successive spectrogram frames (samples).
    pub hop_length: usize,
    /// Frame length used for segmentation RMS energy (samples).
    pub segment_frame_length: usize,
    /// Hop used for segmentation RMS energy (samples).
    pub segment_hop_length: usize,
    /// Percentile of the frame-energy distribution used as the speech
    /// threshold (0–100).
    pub speech_percentile: f64,
    /// Fraction of frames at each end of the clip used to estimate noise.
    pub noise_edge_fraction: f64,
    /// Absolute amplitude above which a sample counts as clipped.
    pub clipping_threshold: f32,
    /// Absolute amplitude below which a sample counts as silent.
    pub silence_threshold: f32,
    /// Number of MFCC coefficients kept.
    pub n_mfcc: usize,
    /// Number of mel bands in the filterbank.
    pub n_mels: usize,
    /// Fraction of spectral magnitude below the rolloff frequency.
    pub rolloff_percent: f64,
    /// Lowest frequency considered by the pitch tracker (Hz).
    pub pitch_fmin: f64,
    /// Highest frequency considered by the pitch tracker (Hz).
    pub pitch_fmax: f64,
    /// Minimum peak magnitude relative to the frame maximum for a pitch
    /// candidate.
    pub pitch_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            segment_frame_length: 2048,
            segment_hop_length: 512,
            speech_percentile: 30.0,
            noise_edge_fraction: 0.1,
            clipping_threshold: 0.95,
            silence_threshold: 0.01,
            n_mfcc: 13,
            n_mels: 40,
            rolloff_percent: 0.85,
            pitch_fmin: 150.0,
            pitch_fmax: 4000.0,
            pitch_threshold: 0.1,
        }
    }
}

// ---------------------------------------------------------------------------
// QualityConfig
// ---------------------------------------------------------------------------

/// Pass/fail gates applied to every recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Shortest accepted recording in seconds.
    pub min_duration_secs: f64,
    /// Longest accepted recording in seconds.
    pub max_duration_secs: f64,
    /// Minimum estimated signal-to-noise ratio in dB.
    pub min_snr_db: f64,
    /// Maximum fraction of clipped samples.
    pub max_clipping_ratio: f64,
    /// Maximum fraction of silent samples.
    pub max_silence_ratio: f64,
    /// Minimum RMS energy.
    pub min_rms_energy: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 1.0,
            max_duration_secs: 30.0,
            min_snr_db: 10.0,
            max_clipping_ratio: 0.01,
            max_silence_ratio: 0.8,
            min_rms_energy: 1e-3,
        }
    }
}

// ---------------------------------------------------------------------------
// FormatConfig
// ---------------------------------------------------------------------------

/// Canonical encoding every accepted recording is normalized toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Target sample rate in Hz.
    pub sample_rate: u32,
    /// Target channel count.
    pub channels: u16,
    /// Target PCM bit depth.
    pub bits_per_sample: u16,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum number of units of work running at the same time.
    pub max_concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Where blobs and recording records live on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory override.  `None` uses the platform data directory
    /// from [`AppPaths`].
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved data directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().data_dir)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use speech_intake::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// assert_eq!(config.format.sample_rate, 16_000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Metric extraction and segmentation constants.
    pub analysis: AnalysisConfig,
    /// Quality gates.
    pub quality: QualityConfig,
    /// Canonical output format.
    pub format: FormatConfig,
    /// Worker pool settings.
    pub dispatch: DispatchConfig,
    /// Storage locations.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet so
    /// callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
