//! Leading/trailing silence removal.
//!
//! [`trim_silence`] keeps everything between the first and the last sample
//! whose magnitude exceeds the threshold.  Interior pauses are preserved;
//! only the dead air before the speaker starts and after they stop is cut.

/// Default amplitude below which a sample counts as silent.
pub const DEFAULT_TRIM_THRESHOLD: f32 = 0.01;

/// Trim leading and trailing silence from `audio`.
///
/// Returns a sub-slice of the original buffer, or `None` when every sample is
/// at or below `threshold` (nothing worth keeping).
///
/// # Example
///
/// ```rust
/// use speech_intake::audio::trim_silence;
///
/// let mut audio = vec![0.0_f32; 480];
/// audio.extend(vec![0.5_f32; 480]);
/// audio.extend(vec![0.0_f32; 480]);
///
/// let trimmed = trim_silence(&audio, 0.01).unwrap();
/// assert_eq!(trimmed.len(), 480);
/// ```
pub fn trim_silence(audio: &[f32], threshold: f32) -> Option<&[f32]> {
    let loud = |s: &f32| s.abs() > threshold;
    let start = audio.iter().position(loud)?;
    let end = audio.iter().rposition(loud)?;
    Some(&audio[start..=end])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
