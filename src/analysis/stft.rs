//! Framing and short-time Fourier transform.
//!
//! Frames are laid fully inside the signal: frame `i` covers samples
//! `[i·hop, i·hop + frame_len)`.  A signal shorter than one frame yields a
//! single zero-padded frame; a trailing remainder shorter than one hop is not
//! given its own frame.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Number of frames for a signal of `len` samples.
///
/// Always at least 1 so that short clips still produce one measurement.
pub fn frame_count(len: usize, frame_len: usize, hop: usize) -> usize {
    let hop = hop.max(1);
    if len <= frame_len {
        1
    } else {
        1 + (len - frame_len) / hop
    }
}

/// Copy frame `index` out of `samples`, zero-padding past the end.
pub fn frame(samples: &[f32], index: usize, frame_len: usize, hop: usize) -> Vec<f32> {
    let start = (index * hop).min(samples.len());
    let end = (start + frame_len).min(samples.len());
    let mut out = samples[start..end].to_vec();
    out.resize(frame_len, 0.0);
    out
}

/// Periodic Hann window of length `n`.
pub fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            (0.5 - 0.5 * phase.cos()) as f32
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Spectrogram
// ---------------------------------------------------------------------------

/// Magnitude spectrogram: one row of `n_fft / 2 + 1` bins per frame.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    frames: Vec<Vec<f32>>,
    n_fft: usize,
    sample_rate: u32,
}

impl Spectrogram {
    /// Hann-windowed STFT magnitudes of `samples`.
    pub fn compute(samples: &[f32], sample_rate: u32, n_fft: usize, hop: usize) -> Self {
        let n_fft = n_fft.max(2);
        let window = hann(n_fft);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
        let n_bins = n_fft / 2 + 1;

        let count = frame_count(samples.len(), n_fft, hop);
        let mut frames = Vec::with_capacity(count);
        let mut buffer = vec![Complex::new(0.0_f32, 0.0); n_fft];

        for i in 0..count {
            let raw = frame(samples, i, n_fft, hop);
            for (slot, (s, w)) in buffer.iter_mut().zip(raw.iter().zip(window.iter())) {
                *slot = Complex::new(s * w, 0.0);
            }
            fft.process(&mut buffer);
            frames.push(buffer[..n_bins].iter().map(|c| c.norm()).collect());
        }

        Self {
            frames,
            n_fft,
            sample_rate,
        }
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Centre frequency of bin `k` in Hz.
    pub fn bin_frequency(&self, k: usize) -> f64 {
        k as f64 * self.sample_rate as f64 / self.n_fft as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sine;

    #[test]
    fn frame_count_short_signal_is_one() {
        assert_eq!(frame_count(0, 2048, 512), 1);
        assert_eq!(frame_count(100, 2048, 512), 1);
        assert_eq!(frame_count(2048, 2048, 512), 1);
    }

    #[test]
    fn frame_count_long_signal() {
        // 2 s @ 16 kHz
        assert_eq!(frame_count(32_000, 2048, 512), 59);
        assert_eq!(frame_count(2048 + 512, 2048, 512), 2);
        assert_eq!(frame_count(2048 + 511, 2048, 512), 1);
    }

    #[test]
    fn frame_is_zero_padded() {
        let samples = [1.0_f32; 3];
        let f = frame(&samples, 0, 5, 2);
        assert_eq!(f, vec![1.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn hann_is_periodic() {
        let w = hann(4);
        assert!((w[0] - 0.0).abs() < 1e-7);
        assert!((w[1] - 0.5).abs() < 1e-6);
        assert!((w[2] - 1.0).abs() < 1e-6);
        assert!((w[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let tone = sine(1_000.0, 0.9, 16_000, 0.5);
        let spec = Spectrogram::compute(&tone, 16_000, 2048, 512);

        assert_eq!(spec.n_bins(), 1025);
        let row = &spec.frames()[0];
        let peak = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert!((spec.bin_frequency(peak) - 1_000.0).abs() < 1.0);
    }

    #[test]
    fn silence_has_zero_magnitude() {
        let spec = Spectrogram::compute(&[0.0; 4096], 16_000, 2048, 512);
        assert!(spec.frames().iter().flatten().all(|&m| m == 0.0));
    }
}
