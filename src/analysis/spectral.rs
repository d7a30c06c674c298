//! Spectral-shape, MFCC and pitch summaries.
//!
//! Every feature is computed per spectrogram frame and summarised over the
//! whole recording (mean, plus standard deviation for MFCCs).

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;

use super::stft::Spectrogram;

/// Floor applied to mel power before taking the logarithm.
const POWER_FLOOR: f64 = 1e-10;

/// Dynamic range kept below the loudest mel value, in dB.
const TOP_DB: f64 = 80.0;

/// MFCC mean and standard deviation per coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfccFeatures {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// Frequency-domain shape descriptors (Hz, averaged over frames).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralShape {
    pub centroid_mean: f64,
    pub rolloff_mean: f64,
    pub bandwidth_mean: f64,
}

/// Pitch summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchFeatures {
    /// Mean of positive per-frame pitch estimates, 0 when none were found.
    pub mean_hz: f64,
    /// Frames that produced a pitch estimate.
    pub voiced_frames: usize,
}

/// Everything the spectral extractor produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralFeatures {
    pub mfcc: MfccFeatures,
    pub shape: SpectralShape,
    pub pitch: PitchFeatures,
}

/// Extract MFCC, shape and pitch summaries from a magnitude spectrogram.
pub fn extract(spec: &Spectrogram, cfg: &AnalysisConfig) -> SpectralFeatures {
    SpectralFeatures {
        mfcc: mfcc(spec, cfg.n_mels, cfg.n_mfcc),
        shape: shape(spec, cfg.rolloff_percent),
        pitch: pitch(spec, cfg.pitch_fmin, cfg.pitch_fmax, cfg.pitch_threshold),
    }
}

// ---------------------------------------------------------------------------
// MFCC
// ---------------------------------------------------------------------------

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank, `n_mels` rows of `n_bins` weights spanning
/// 0 Hz to Nyquist.
pub fn mel_filterbank(n_mels: usize, spec: &Spectrogram) -> Vec<Vec<f64>> {
    let n_bins = spec.n_bins();
    let nyquist = spec.sample_rate() as f64 / 2.0;
    let max_mel = hz_to_mel(nyquist);

    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lo, centre, hi) = (edges[m], edges[m + 1], edges[m + 2]);
            (0..n_bins)
                .map(|k| {
                    let f = spec.bin_frequency(k);
                    if f <= lo || f >= hi {
                        0.0
                    } else if f <= centre {
                        (f - lo) / (centre - lo)
                    } else {
                        (hi - f) / (hi - centre)
                    }
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II of `input`, first `n_out` coefficients.
fn dct_ortho(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()
                })
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

fn mfcc(spec: &Spectrogram, n_mels: usize, n_mfcc: usize) -> MfccFeatures {
    let n_mels = n_mels.max(1);
    let bank = mel_filterbank(n_mels, spec);

    let mel_db: Vec<Vec<f64>> = spec
        .frames()
        .iter()
        .map(|row| {
            bank.iter()
                .map(|weights| {
                    let energy: f64 = weights
                        .iter()
                        .zip(row.iter())
                        .map(|(&w, &m)| w * (m as f64) * (m as f64))
                        .sum();
                    10.0 * energy.max(POWER_FLOOR).log10()
                })
                .collect()
        })
        .collect();

    let loudest = mel_db
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = loudest - TOP_DB;

    let coeffs: Vec<Vec<f64>> = mel_db
        .iter()
        .map(|row| {
            let clamped: Vec<f64> = row.iter().map(|&v| v.max(floor)).collect();
            dct_ortho(&clamped, n_mfcc)
        })
        .collect();

    let n = coeffs.len().max(1) as f64;
    let mean: Vec<f64> = (0..n_mfcc)
        .map(|c| coeffs.iter().map(|row| row[c]).sum::<f64>() / n)
        .collect();
    let std: Vec<f64> = (0..n_mfcc)
        .map(|c| {
            let var = coeffs
                .iter()
                .map(|row| (row[c] - mean[c]).powi(2))
                .sum::<f64>()
                / n;
            var.sqrt()
        })
        .collect();

    MfccFeatures { mean, std }
}

// ---------------------------------------------------------------------------
// Spectral shape
// ---------------------------------------------------------------------------

fn shape(spec: &Spectrogram, rolloff_percent: f64) -> SpectralShape {
    let n = spec.n_frames().max(1) as f64;
    let (mut centroid_sum, mut rolloff_sum, mut bandwidth_sum) = (0.0, 0.0, 0.0);

    for row in spec.frames() {
        let total: f64 = row.iter().map(|&m| m as f64).sum();
        if total <= 0.0 {
            continue;
        }

        let centroid: f64 = row
            .iter()
            .enumerate()
            .map(|(k, &m)| spec.bin_frequency(k) * m as f64)
            .sum::<f64>()
            / total;

        let bandwidth = (row
            .iter()
            .enumerate()
            .map(|(k, &m)| m as f64 * (spec.bin_frequency(k) - centroid).powi(2))
            .sum::<f64>()
            / total)
            .sqrt();

        let target = rolloff_percent * total;
        let mut cumulative = 0.0;
        let mut rolloff = spec.bin_frequency(row.len().saturating_sub(1));
        for (k, &m) in row.iter().enumerate() {
            cumulative += m as f64;
            if cumulative >= target {
                rolloff = spec.bin_frequency(k);
                break;
            }
        }

        centroid_sum += centroid;
        rolloff_sum += rolloff;
        bandwidth_sum += bandwidth;
    }

    SpectralShape {
        centroid_mean: centroid_sum / n,
        rolloff_mean: rolloff_sum / n,
        bandwidth_mean: bandwidth_sum / n,
    }
}

// ---------------------------------------------------------------------------
// Pitch
// ---------------------------------------------------------------------------

/// Dominant spectral peak per frame within `[fmin, fmax]`, refined by
/// parabolic interpolation.  Frames whose strongest in-range peak is below
/// `threshold × frame maximum` are unvoiced.
fn pitch(spec: &Spectrogram, fmin: f64, fmax: f64, threshold: f64) -> PitchFeatures {
    let mut sum = 0.0;
    let mut voiced = 0usize;

    for row in spec.frames() {
        let frame_max = row.iter().copied().fold(0.0_f32, f32::max) as f64;
        if frame_max <= 0.0 {
            continue;
        }

        let mut best: Option<(usize, f32)> = None;
        for k in 1..row.len().saturating_sub(1) {
            let f = spec.bin_frequency(k);
            if f < fmin || f > fmax {
                continue;
            }
            let (a, b, c) = (row[k - 1], row[k], row[k + 1]);
            let is_peak = b > a && b >= c;
            if is_peak && (b as f64) > threshold * frame_max && best.map_or(true, |(_, m)| b > m) {
                best = Some((k, b));
            }
        }

        if let Some((k, _)) = best {
            let (a, b, c) = (row[k - 1] as f64, row[k] as f64, row[k + 1] as f64);
            let denom = a - 2.0 * b + c;
            let shift = if denom.abs() > f64::EPSILON {
                0.5 * (a - c) / denom
            } else {
                0.0
            };
            let hz = (k as f64 + shift) * spec.sample_rate() as f64 / spec.n_fft() as f64;
            if hz > 0.0 {
                sum += hz;
                voiced += 1;
            }
        }
    }

    PitchFeatures {
        mean_hz: if voiced > 0 { sum / voiced as f64 } else { 0.0 },
        voiced_frames: voiced,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
