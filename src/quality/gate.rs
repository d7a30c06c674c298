//! Pass/fail quality gates.
//!
//! [`QualityGate`] checks a recording's duration and [`SignalMetrics`] against
//! the configured bounds and reports **every** failing gate, not just the
//! first.
//!
//! | Gate | Fails when |
//! |------|------------|
//! | Duration | outside `[min_duration_secs, max_duration_secs]` |
//! | SNR | `snr_db < min_snr_db` |
//! | Clipping | `clipping_ratio > max_clipping_ratio` |
//! | Silence | `silence_ratio > max_silence_ratio` |
//! | Energy | `rms_energy < min_rms_energy` |
//!
//! Non-finite measurements fail their gate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::SignalMetrics;
use crate::config::QualityConfig;

// ---------------------------------------------------------------------------
// QualityIssue
// ---------------------------------------------------------------------------

/// One failed gate, with the measured value and the bound it violated.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum QualityIssue {
    #[error("recording too short: {got_secs:.2}s (minimum {min_secs:.2}s)")]
    TooShort { got_secs: f64, min_secs: f64 },

    #[error("recording too long: {got_secs:.2}s (maximum {max_secs:.2}s)")]
    TooLong { got_secs: f64, max_secs: f64 },

    #[error("signal-to-noise ratio too low: {snr_db:.1} dB (minimum {min_db:.1} dB)")]
    LowSnr { snr_db: f64, min_db: f64 },

    #[error("audio clipping: {:.2}% of samples clipped (max {:.2}%)", .ratio * 100.0, .max_ratio * 100.0)]
    Clipping { ratio: f64, max_ratio: f64 },

    #[error("too much silence: {:.1}% silent (max {:.1}%)", .ratio * 100.0, .max_ratio * 100.0)]
    TooSilent { ratio: f64, max_ratio: f64 },

    #[error("audio too quiet: RMS {rms:.5} (minimum {min_rms:.5})")]
    TooQuiet { rms: f64, min_rms: f64 },
}

// ---------------------------------------------------------------------------
// QualityRejection
// ---------------------------------------------------------------------------

/// Every gate a recording failed.  Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRejection {
    pub issues: Vec<QualityIssue>,
}

impl QualityRejection {
    /// Human-readable reasons, one per failed gate.
    pub fn reasons(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for QualityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quality validation failed: {}", self.reasons().join("; "))
    }
}

impl std::error::Error for QualityRejection {}

// ---------------------------------------------------------------------------
// QualityGate
// ---------------------------------------------------------------------------

/// Applies a [`QualityConfig`] to measured recordings.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    bounds: QualityConfig,
}

impl From<QualityConfig> for QualityGate {
    fn from(bounds: QualityConfig) -> Self {
        Self { bounds }
    }
}

impl QualityGate {
    pub fn bounds(&self) -> &QualityConfig {
        &self.bounds
    }

    /// All failing gates, in table order.  Empty when the recording passes.
    pub fn check(&self, duration_secs: f64, metrics: &SignalMetrics) -> Vec<QualityIssue> {
        let b = &self.bounds;
        let mut issues = Vec::new();

        if !(duration_secs >= b.min_duration_secs) {
            issues.push(QualityIssue::TooShort {
                got_secs: duration_secs,
                min_secs: b.min_duration_secs,
            });
        } else if duration_secs > b.max_duration_secs {
            issues.push(QualityIssue::TooLong {
                got_secs: duration_secs,
                max_secs: b.max_duration_secs,
            });
        }

        if !(metrics.snr_db >= b.min_snr_db) {
            issues.push(QualityIssue::LowSnr {
                snr_db: metrics.snr_db,
                min_db: b.min_snr_db,
            });
        }

        if !(metrics.clipping_ratio <= b.max_clipping_ratio) {
            issues.push(QualityIssue::Clipping {
                ratio: metrics.clipping_ratio,
                max_ratio: b.max_clipping_ratio,
            });
        }

        if !(metrics.silence_ratio <= b.max_silence_ratio) {
            issues.push(QualityIssue::TooSilent {
                ratio: metrics.silence_ratio,
                max_ratio: b.max_silence_ratio,
            });
        }

        if !(metrics.rms_energy >= b.min_rms_energy) {
            issues.push(QualityIssue::TooQuiet {
                rms: metrics.rms_energy,
                min_rms: b.min_rms_energy,
            });
        }

        issues
    }

    /// `Ok(())` when every gate passes.
    pub fn validate(
        &self,
        duration_secs: f64,
        metrics: &SignalMetrics,
    ) -> Result<(), QualityRejection> {
        let issues = self.check(duration_secs, metrics);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(QualityRejection { issues })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn good() -> SignalMetrics {
        SignalMetrics {
            snr_db: 35.0,
            clipping_detected: false,
            clipping_ratio: 0.0,
            silence_ratio: 0.2,
            rms_energy: 0.2,
            zero_crossing_rate: 0.1,
        }
    }

    #[test]
    fn good_recording_passes() {
        let gate = QualityGate::default();
        assert!(gate.validate(2.0, &good()).is_ok());
    }

    #[test]
    fn duration_bounds_are_inclusive() {
        let gate = QualityGate::default();
        assert!(gate.check(1.0, &good()).is_empty());
        assert!(gate.check(30.0, &good()).is_empty());
        assert!(matches!(
            gate.check(0.5, &good())[..],
            [QualityIssue::TooShort { .. }]
        ));
        assert!(matches!(
            gate.check(30.5, &good())[..],
            [QualityIssue::TooLong { .. }]
        ));
    }

    #[test]
    fn silence_fails_several_gates() {
        let silent = SignalMetrics {
            snr_db: -100.0,
            clipping_detected: false,
            clipping_ratio: 0.0,
            silence_ratio: 1.0,
            rms_energy: 0.0,
            zero_crossing_rate: 0.0,
        };
        let rejection = QualityGate::default()
            .validate(2.0, &silent)
            .unwrap_err();
        assert_eq!(rejection.issues.len(), 3);
        assert!(rejection
            .issues
            .iter()
            .any(|i| matches!(i, QualityIssue::TooSilent { .. })));
        assert!(rejection
            .issues
            .iter()
            .any(|i| matches!(i, QualityIssue::LowSnr { .. })));
        assert!(rejection
            .issues
            .iter()
            .any(|i| matches!(i, QualityIssue::TooQuiet { .. })));
    }

    #[test]
    fn clipping_above_one_percent_fails() {
        let mut m = good();
        m.clipping_detected = true;
        m.clipping_ratio = 0.05;
        let issues = QualityGate::default().check(2.0, &m);
        assert_eq!(
            issues,
            vec![QualityIssue::Clipping {
                ratio: 0.05,
                max_ratio: 0.01
            }]
        );

        m.clipping_ratio = 0.01;
        assert!(QualityGate::default().check(2.0, &m).is_empty());
    }

    #[test]
    fn nan_measurement_fails() {
        let mut m = good();
        m.snr_db = f64::NAN;
        let issues = QualityGate::default().check(2.0, &m);
        assert!(matches!(issues[..], [QualityIssue::LowSnr { .. }]));
    }

    #[test]
    fn custom_bounds_apply() {
        let gate = QualityGate::from(QualityConfig {
            min_duration_secs: 0.1,
            ..QualityConfig::default()
        });
        assert!(gate.check(0.5, &good()).is_empty());
        assert_eq!(gate.bounds().min_duration_secs, 0.1);
    }

    #[test]
    fn rejection_display_lists_every_reason() {
        let rejection = QualityRejection {
            issues: vec![
                QualityIssue::TooShort {
                    got_secs: 0.4,
                    min_secs: 1.0,
                },
                QualityIssue::Clipping {
                    ratio: 0.05,
                    max_ratio: 0.01,
                },
            ],
        };
        let msg = rejection.to_string();
        assert!(msg.contains("0.40s"), "message: {msg}");
        assert!(msg.contains("5.00%"), "message: {msg}");
        assert_eq!(rejection.reasons().len(), 2);
    }
}
