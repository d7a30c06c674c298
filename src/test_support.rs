//! Signal generators and fixtures shared by unit tests.

use crate::audio::encode_wav_pcm16;

/// `secs` seconds of a sine wave at `freq` Hz with peak `amplitude`.
pub fn sine(freq: f32, amplitude: f32, sample_rate: u32, secs: f32) -> Vec<f32> {
    let n = (secs * sample_rate as f32).round() as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (amplitude as f64 * (2.0 * std::f64::consts::PI * freq as f64 * t).sin()) as f32
        })
        .collect()
}

/// Deterministic uniform noise in `[-amplitude, amplitude]` (xorshift32).
pub fn noise(amplitude: f32, n: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let unit = state as f64 / u32::MAX as f64;
            ((unit * 2.0 - 1.0) * amplitude as f64) as f32
        })
        .collect()
}

/// 16-bit PCM WAV bytes for interleaved `samples`.
pub fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    encode_wav_pcm16(samples, sample_rate, channels).expect("in-memory WAV encoding")
}

/// Force every `every`-th sample to `value` (clipping fixture).
pub fn force_every(samples: &mut [f32], every: usize, value: f32) {
    for s in samples.iter_mut().step_by(every) {
        *s = value;
    }
}
