//! Objective signal measurements: SNR, clipping, silence, energy, ZCR.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;

use super::stft::{frame, frame_count, Spectrogram};

/// Guard against division by zero in the SNR ratio.
pub const SNR_EPSILON: f64 = 1e-10;

/// Signal measurements for one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetrics {
    /// Estimated signal-to-noise ratio in dB.
    pub snr_db: f64,
    /// At least one sample exceeded the clipping threshold.
    pub clipping_detected: bool,
    /// Fraction of samples above the clipping threshold.
    pub clipping_ratio: f64,
    /// Fraction of samples below the silence threshold.
    pub silence_ratio: f64,
    /// Root-mean-square amplitude.
    pub rms_energy: f64,
    /// Mean per-frame rate of sign changes.
    pub zero_crossing_rate: f64,
}

/// Compute every [`SignalMetrics`] field for mono `samples`.
pub fn measure(samples: &[f32], spec: &Spectrogram, cfg: &AnalysisConfig) -> SignalMetrics {
    let (clipping_detected, clipping_ratio) = clipping(samples, cfg.clipping_threshold);
    SignalMetrics {
        snr_db: snr_db(spec, cfg.noise_edge_fraction),
        clipping_detected,
        clipping_ratio,
        silence_ratio: silence_ratio(samples, cfg.silence_threshold),
        rms_energy: rms(samples),
        zero_crossing_rate: zero_crossing_rate(samples, cfg.n_fft, cfg.hop_length),
    }
}

/// SNR estimate in dB.
///
/// The noise spectrum is the per-bin mean magnitude over the first and last
/// `edge_fraction` of frames; its floor level (median across bins of the
/// squared spectrum) is the noise power.  Signal power is the mean squared
/// magnitude over the whole spectrogram.  The result is always finite: a zero
/// ratio is floored at [`SNR_EPSILON`] (−100 dB).
pub fn snr_db(spec: &Spectrogram, edge_fraction: f64) -> f64 {
    let frames = spec.frames();
    let n_frames = frames.len();
    let n_bins = spec.n_bins();
    if n_frames == 0 || n_bins == 0 {
        return 10.0 * SNR_EPSILON.log10();
    }

    let edge = ((edge_fraction * n_frames as f64) as usize).clamp(1, n_frames);
    let noise_frames: Vec<&Vec<f32>> = frames[..edge]
        .iter()
        .chain(frames[n_frames - edge..].iter())
        .collect();

    let mut noise_spectrum = vec![0.0_f64; n_bins];
    for row in &noise_frames {
        for (acc, &m) in noise_spectrum.iter_mut().zip(row.iter()) {
            *acc += m as f64;
        }
    }
    let mut noise_bin_power: Vec<f64> = noise_spectrum
        .iter()
        .map(|&sum| {
            let mean = sum / noise_frames.len() as f64;
            mean * mean
        })
        .collect();
    let noise_power = median(&mut noise_bin_power);

    let total: f64 = frames
        .iter()
        .flatten()
        .map(|&m| (m as f64) * (m as f64))
        .sum();
    let signal_power = total / (n_frames * n_bins) as f64;

    let ratio = signal_power / (noise_power + SNR_EPSILON);
    10.0 * ratio.max(SNR_EPSILON).log10()
}

/// `(any clipped, clipped fraction)` for samples whose magnitude exceeds
/// `threshold`.
pub fn clipping(samples: &[f32], threshold: f32) -> (bool, f64) {
    if samples.is_empty() {
        return (false, 0.0);
    }
    let clipped = samples.iter().filter(|s| s.abs() > threshold).count();
    (clipped > 0, clipped as f64 / samples.len() as f64)
}

/// Fraction of samples whose magnitude is below `threshold`.
pub fn silence_ratio(samples: &[f32], threshold: f32) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let silent = samples.iter().filter(|s| s.abs() < threshold).count();
    silent as f64 / samples.len() as f64
}

/// Root-mean-square amplitude.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Mean over frames of the fraction of adjacent sample pairs that change sign.
///
/// Zero counts as positive.
pub fn zero_crossing_rate(samples: &[f32], frame_len: usize, hop: usize) -> f64 {
    if samples.is_empty() || frame_len == 0 {
        return 0.0;
    }
    let count = frame_count(samples.len(), frame_len, hop);
    let total: f64 = (0..count)
        .map(|i| {
            let f = frame(samples, i, frame_len, hop);
            let crossings = f
                .windows(2)
                .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
                .count();
            crossings as f64 / frame_len as f64
        })
        .sum();
    total / count as f64
}

/// Median of `values` (mean of the two middle values for even lengths).
fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
