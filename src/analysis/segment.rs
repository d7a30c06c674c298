//! Speech/silence segmentation from frame energy.
//!
//! Each frame's RMS energy is compared against an adaptive threshold (a
//! percentile of that recording's own frame energies).  Consecutive frames of
//! the same class are merged, and the resulting segments partition
//! `[0, duration]` with no gaps or overlaps.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;

use super::stft::{frame, frame_count};

/// Class of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Speech,
    Silence,
}

/// `[start, end]` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: f64,
    pub end: f64,
}

impl TimeSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One classified interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn span(&self) -> TimeSpan {
        TimeSpan {
            start: self.start,
            end: self.end,
        }
    }
}

/// Ordered, alternating segments plus the energy threshold that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    pub segments: Vec<Segment>,
    pub threshold: f64,
}

impl Segmentation {
    pub fn speech(&self) -> Vec<TimeSpan> {
        self.of_kind(SegmentKind::Speech)
    }

    pub fn silence(&self) -> Vec<TimeSpan> {
        self.of_kind(SegmentKind::Silence)
    }

    /// Total seconds classified as speech.
    pub fn speech_duration(&self) -> f64 {
        self.speech().iter().map(TimeSpan::duration).sum()
    }

    fn of_kind(&self, kind: SegmentKind) -> Vec<TimeSpan> {
        self.segments
            .iter()
            .filter(|s| s.kind == kind)
            .map(Segment::span)
            .collect()
    }
}

/// RMS energy per frame.
pub fn frame_rms(samples: &[f32], frame_len: usize, hop: usize) -> Vec<f64> {
    if samples.is_empty() || frame_len == 0 {
        return Vec::new();
    }
    let count = frame_count(samples.len(), frame_len, hop);
    (0..count)
        .map(|i| {
            let f = frame(samples, i, frame_len, hop);
            let sum_sq: f64 = f.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum_sq / frame_len as f64).sqrt()
        })
        .collect()
}

/// `p`-th percentile (0–100) with linear interpolation between ranks.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Partition mono `samples` into speech and silence segments.
pub fn segment(samples: &[f32], sample_rate: u32, cfg: &AnalysisConfig) -> Segmentation {
    let hop = cfg.segment_hop_length.max(1);
    let energies = frame_rms(samples, cfg.segment_frame_length, hop);
    let threshold = percentile(&energies, cfg.speech_percentile);

    if energies.is_empty() || sample_rate == 0 {
        return Segmentation {
            segments: Vec::new(),
            threshold,
        };
    }

    let duration = samples.len() as f64 / sample_rate as f64;
    let frame_start = |i: usize| (i * hop) as f64 / sample_rate as f64;

    let mut segments: Vec<Segment> = Vec::new();
    for (i, &energy) in energies.iter().enumerate() {
        let kind = if energy > threshold {
            SegmentKind::Speech
        } else {
            SegmentKind::Silence
        };
        match segments.last_mut() {
            Some(last) if last.kind == kind => {}
            Some(last) => {
                let start = frame_start(i);
                last.end = start;
                segments.push(Segment {
                    kind,
                    start,
                    end: duration,
                });
            }
            None => segments.push(Segment {
                kind,
                start: 0.0,
                end: duration,
            }),
        }
    }

    log::debug!(
        "segment: {} segment(s), threshold {:.6}",
        segments.len(),
        threshold
    );

    Segmentation {
        segments,
        threshold,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
