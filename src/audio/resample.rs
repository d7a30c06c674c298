//! Channel mixing and sample-rate conversion.
//!
//! Two conversion steps bring any decoded stream to the canonical layout:
//!
//! 1. [`stereo_to_mono`] — downmix any number of interleaved channels to mono.
//! 2. [`resample`] — band-limited resampling between arbitrary rates using
//!    rubato's FFT resampler.

use rubato::{FftFixedIn, Resampler};
use thiserror::Error;

/// Input block size handed to the FFT resampler.
const CHUNK_FRAMES: usize = 1024;

/// Sub-chunks per block (trades latency for quality; 2 is rubato's usual).
const SUB_CHUNKS: usize = 2;

// ---------------------------------------------------------------------------
// ResampleError
// ---------------------------------------------------------------------------

/// Sample-rate conversion failures.
#[derive(Debug, Error)]
pub enum ResampleError {
    /// Source or target rate is zero.
    #[error("invalid sample rate conversion {from} Hz -> {to} Hz")]
    InvalidRate { from: u32, to: u32 },

    /// rubato refused the rate pair.
    #[error("resampler construction failed: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    /// rubato failed while processing a block.
    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; a trailing incomplete
/// frame is dropped.
///
/// * `channels == 1` returns the input as an owned `Vec`.
/// * `channels == 0` returns an empty vector.
///
/// # Example
///
/// ```rust
/// use speech_intake::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `from` Hz to `to` Hz.
///
/// * Equal rates return the input unchanged.
/// * Empty input returns an empty vector.
///
/// The output length is `round(samples.len() * to / from)`; the resampler's
/// group delay is removed so the output stays time-aligned with the input.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, ResampleError> {
    if from == 0 || to == 0 {
        return Err(ResampleError::InvalidRate { from, to });
    }
    if from == to {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK_FRAMES, SUB_CHUNKS, 1)?;

    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let delay = resampler.output_delay();
    let chunk = resampler.input_frames_next();

    let mut output = Vec::with_capacity(expected + delay + chunk);
    let mut pos = 0;

    // Keep feeding (zero-padded past the end) until the delayed tail is out.
    while output.len() < expected + delay {
        let end = (pos + chunk).min(samples.len());
        let mut block = if pos < samples.len() {
            samples[pos..end].to_vec()
        } else {
            Vec::new()
        };
        block.resize(chunk, 0.0);

        let out = resampler.process(&[block], None)?;
        output.extend_from_slice(&out[0]);
        pos += chunk;
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sine;

    // ---- stereo_to_mono ----------------------------------------------------

    #[test]
    fn downmix_averages_each_frame() {
        // Three-channel frames; the trailing partial frame is ignored.
        let interleaved = [0.3_f32, 0.3, 0.0, -0.6, 0.0, 0.0, 0.9];
        let mono = stereo_to_mono(&interleaved, 3);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.2).abs() < 1e-6);
        assert!((mono[1] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn downmix_degenerate_channel_counts() {
        let samples = [0.25_f32, -0.75];
        assert_eq!(stereo_to_mono(&samples, 1), samples.to_vec());
        assert!(stereo_to_mono(&samples, 0).is_empty());
    }

    // ---- resample ----------------------------------------------------------

    #[test]
    fn same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        let out = resample(&input, 16_000, 16_000).expect("resample");
        assert_eq!(out, input);
    }

    #[test]
    fn empty_input() {
        let out = resample(&[], 48_000, 16_000).expect("resample");
        assert!(out.is_empty());
    }

    #[test]
    fn zero_rate_rejected() {
        assert!(matches!(
            resample(&[0.0; 10], 0, 16_000),
            Err(ResampleError::InvalidRate { .. })
        ));
    }

    #[test]
    fn downsample_48k_output_length() {
        let input = vec![0.0_f32; 48_000];
        let out = resample(&input, 48_000, 16_000).expect("resample");
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn downsample_44100_output_length() {
        let input = vec![0.0_f32; 44_100];
        let out = resample(&input, 44_100, 16_000).expect("resample");
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn upsample_8k_output_length() {
        let input = vec![0.0_f32; 8_000];
        let out = resample(&input, 8_000, 16_000).expect("resample");
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn tone_amplitude_survives_resampling() {
        // 1 s of 440 Hz at 0.5 amplitude; compare the steady-state middle.
        let input = sine(440.0, 0.5, 48_000, 1.0);
        let out = resample(&input, 48_000, 16_000).expect("resample");
        let middle = &out[4_000..12_000];
        let peak = middle.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.02, "peak after resampling: {peak}");
    }
}
