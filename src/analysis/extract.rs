//! Metric extraction entry point: bytes → [`Waveform`] → [`Extraction`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{decode, stereo_to_mono, DecodeError, DecodedAudio};
use crate::config::AnalysisConfig;

use super::signal::{self, SignalMetrics};
use super::spectral::{self, SpectralFeatures};
use super::stft::Spectrogram;

// ---------------------------------------------------------------------------
// ExtractionError
// ---------------------------------------------------------------------------

/// Input that cannot be analysed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot decode audio: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid audio: {0}")]
    Invalid(&'static str),
}

// ---------------------------------------------------------------------------
// Waveform
// ---------------------------------------------------------------------------

/// Source-format facts about a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProperties {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: Option<u16>,
}

/// Mono analysis signal plus the properties of the source it came from.
#[derive(Debug, Clone)]
pub struct Waveform {
    samples: Vec<f32>,
    properties: AudioProperties,
}

impl Waveform {
    /// Build from interleaved samples, downmixing by channel averaging.
    pub fn from_interleaved(
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, ExtractionError> {
        if sample_rate == 0 {
            return Err(ExtractionError::Invalid("sample rate is zero"));
        }
        if channels == 0 {
            return Err(ExtractionError::Invalid("channel count is zero"));
        }
        let mono = stereo_to_mono(samples, channels);
        if mono.is_empty() {
            return Err(ExtractionError::Invalid("no samples"));
        }
        let duration_secs = mono.len() as f64 / sample_rate as f64;
        Ok(Self {
            samples: mono,
            properties: AudioProperties {
                duration_secs,
                sample_rate,
                channels,
                bits_per_sample: None,
            },
        })
    }

    pub fn from_decoded(decoded: &DecodedAudio) -> Result<Self, ExtractionError> {
        let mut waveform =
            Self::from_interleaved(&decoded.samples, decoded.sample_rate, decoded.channels)?;
        waveform.properties.bits_per_sample = decoded.bits_per_sample;
        Ok(waveform)
    }

    /// Mono samples at the source sample rate.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn properties(&self) -> &AudioProperties {
        &self.properties
    }

    pub fn sample_rate(&self) -> u32 {
        self.properties.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.properties.duration_secs
    }
}

/// Decode `bytes` and prepare them for analysis.
pub fn load_waveform(bytes: &[u8], extension: Option<&str>) -> Result<Waveform, ExtractionError> {
    let decoded = decode(bytes, extension)?;
    Waveform::from_decoded(&decoded)
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// All per-recording measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub properties: AudioProperties,
    pub metrics: SignalMetrics,
    pub features: SpectralFeatures,
}

/// Run every signal and spectral measurement over `waveform`.
pub fn extract(waveform: &Waveform, cfg: &AnalysisConfig) -> Extraction {
    let spec = Spectrogram::compute(
        waveform.samples(),
        waveform.sample_rate(),
        cfg.n_fft,
        cfg.hop_length,
    );
    let metrics = signal::measure(waveform.samples(), &spec, cfg);
    let features = spectral::extract(&spec, cfg);

    log::debug!(
        "extract: {:.2}s, snr {:.1} dB, silence {:.3}, clipping {:.4}",
        waveform.duration_secs(),
        metrics.snr_db,
        metrics.silence_ratio,
        metrics.clipping_ratio
    );

    Extraction {
        properties: waveform.properties().clone(),
        metrics,
        features,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sine, wav_bytes};

    #[test]
    fn loads_wav_properties() {
        let bytes = wav_bytes(&sine(440.0, 0.5, 22_050, 1.5), 22_050, 1);
        let w = load_waveform(&bytes, Some("wav")).expect("load");
        let p = w.properties();
        assert_eq!(p.sample_rate, 22_050);
        assert_eq!(p.channels, 1);
        assert_eq!(p.bits_per_sample, Some(16));
        assert!((p.duration_secs - 1.5).abs() < 1e-3);
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let interleaved: Vec<f32> = (0..1_000).flat_map(|_| [0.4_f32, 0.2]).collect();
        let w = Waveform::from_interleaved(&interleaved, 8_000, 2).expect("waveform");
        assert_eq!(w.samples().len(), 1_000);
        assert!(w.samples().iter().all(|&s| (s - 0.3).abs() < 1e-6));
        assert_eq!(w.properties().channels, 2);
    }

    #[test]
    fn structural_problems_are_errors() {
        assert!(matches!(
            Waveform::from_interleaved(&[0.1; 10], 0, 1),
            Err(ExtractionError::Invalid(_))
        ));
        assert!(matches!(
            Waveform::from_interleaved(&[0.1; 10], 16_000, 0),
            Err(ExtractionError::Invalid(_))
        ));
        assert!(matches!(
            Waveform::from_interleaved(&[], 16_000, 1),
            Err(ExtractionError::Invalid(_))
        ));
        assert!(matches!(
            load_waveform(b"not audio at all", None),
            Err(ExtractionError::Decode(_))
        ));
    }

    #[test]
    fn extraction_is_deterministic() {
        let w = Waveform::from_interleaved(&sine(523.0, 0.6, 16_000, 1.2), 16_000, 1)
            .expect("waveform");
        let cfg = AnalysisConfig::default();
        assert_eq!(extract(&w, &cfg), extract(&w, &cfg));
    }
}
