//! Conversion to the canonical storage format (mono, 16 kHz, 16-bit PCM WAV).
//!
//! [`FormatNormalizer::normalize`] is a no-op for recordings whose declared
//! sample rate and channel count already match the target; the input bytes
//! come back untouched.  Anything else is decoded, downmixed, resampled and
//! re-encoded as WAV.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

use crate::config::FormatConfig;

use super::decode::{decode, DecodeError};
use super::resample::{resample, ResampleError};

// ---------------------------------------------------------------------------
// ConversionError
// ---------------------------------------------------------------------------

/// Why a conversion attempt failed.  Never fatal to the recording.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("cannot decode source audio: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("unsupported target bit depth {0} (only 16-bit PCM is written)")]
    UnsupportedBitDepth(u16),
}

// ---------------------------------------------------------------------------
// Normalized
// ---------------------------------------------------------------------------

/// Result of a normalization request.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Input already matches the canonical layout; nothing was re-encoded.
    Unchanged,
    /// Input was re-encoded.
    Converted(CanonicalAudio),
}

/// Re-encoded canonical audio and the format fields it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalAudio {
    /// WAV container bytes.
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub duration_secs: f64,
}

// ---------------------------------------------------------------------------
// FormatNormalizer
// ---------------------------------------------------------------------------

/// Converts arbitrary input encodings to the configured canonical format.
#[derive(Debug, Clone, Default)]
pub struct FormatNormalizer {
    target: FormatConfig,
}

impl FormatNormalizer {
    pub fn new(target: FormatConfig) -> Self {
        Self { target }
    }

    /// The canonical format this normalizer produces.
    pub fn target(&self) -> &FormatConfig {
        &self.target
    }

    /// `true` when a recording with this layout must be converted.
    pub fn needs_conversion(&self, sample_rate: u32, channels: u16) -> bool {
        sample_rate != self.target.sample_rate || channels != self.target.channels
    }

    /// Normalize `bytes`, whose recorded layout is `sample_rate` / `channels`.
    ///
    /// `extension` is a probing hint for the decoder.
    pub fn normalize(
        &self,
        bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        extension: Option<&str>,
    ) -> Result<Normalized, ConversionError> {
        if !self.needs_conversion(sample_rate, channels) {
            return Ok(Normalized::Unchanged);
        }
        if self.target.bits_per_sample != 16 {
            return Err(ConversionError::UnsupportedBitDepth(
                self.target.bits_per_sample,
            ));
        }

        let decoded = decode(bytes, extension)?;
        let mono = decoded.to_mono();
        let resampled = resample(&mono, decoded.sample_rate, self.target.sample_rate)?;

        let channels = self.target.channels.max(1);
        let interleaved = if channels == 1 {
            resampled
        } else {
            resampled
                .iter()
                .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
                .collect()
        };

        let bytes = encode_wav_pcm16(&interleaved, self.target.sample_rate, channels)?;
        let frames = interleaved.len() / channels as usize;

        log::debug!(
            "normalize: {} Hz/{} ch -> {} Hz/{} ch ({} frames)",
            decoded.sample_rate,
            decoded.channels,
            self.target.sample_rate,
            channels,
            frames
        );

        Ok(Normalized::Converted(CanonicalAudio {
            bytes,
            sample_rate: self.target.sample_rate,
            channels,
            bits_per_sample: 16,
            duration_secs: frames as f64 / self.target.sample_rate as f64,
        }))
    }
}

// ---------------------------------------------------------------------------
// encode_wav_pcm16
// ---------------------------------------------------------------------------

/// Encode interleaved `f32` samples as a 16-bit PCM WAV file in memory.
///
/// Samples are clamped to `[-1.0, 1.0]` before quantisation.
pub fn encode_wav_pcm16(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let q = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            writer.write_sample(q)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
