//! Composite quality score in `[0, 1]`.

use crate::analysis::SignalMetrics;

/// SNR (dB) that earns the full SNR component.
const SNR_FULL_SCALE_DB: f64 = 40.0;

/// Silence ratio tolerated before the silence penalty starts.
const SILENCE_ALLOWANCE: f64 = 0.3;

/// Weighted combination of SNR, energy, clipping and silence.
///
/// ```text
/// 0.4·clamp(snr/40) + 0.3·clamp(rms·10) + 0.2·(1 − 2·clip) + 0.1·(1 − 2·max(0, silence − 0.3))
/// ```
///
/// The result is clamped to `[0, 1]`.  Any non-finite input scores 0.
pub fn quality_score(metrics: &SignalMetrics) -> f64 {
    let inputs = [
        metrics.snr_db,
        metrics.rms_energy,
        metrics.clipping_ratio,
        metrics.silence_ratio,
    ];
    if inputs.iter().any(|v| !v.is_finite()) {
        return 0.0;
    }

    let snr_score = (metrics.snr_db / SNR_FULL_SCALE_DB).clamp(0.0, 1.0);
    let energy_score = (metrics.rms_energy * 10.0).clamp(0.0, 1.0);
    let clip_penalty = metrics.clipping_ratio * 2.0;
    let silence_penalty = (metrics.silence_ratio - SILENCE_ALLOWANCE).max(0.0) * 2.0;

    let score = 0.4 * snr_score
        + 0.3 * energy_score
        + 0.2 * (1.0 - clip_penalty)
        + 0.1 * (1.0 - silence_penalty);
    score.clamp(0.0, 1.0)
}
