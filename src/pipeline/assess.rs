//! One synchronous analysis pass: decode → extract → segment → validate → score.
//!
//! [`Assessor`] is CPU-bound; async callers run it under
//! `tokio::task::spawn_blocking`.

use serde::Serialize;

use crate::analysis::{self, Extraction, ExtractionError, Segmentation, Waveform};
use crate::config::{AnalysisConfig, AppConfig, QualityConfig};
use crate::quality::{quality_score, QualityGate, QualityIssue, QualityRejection};

/// Everything measured and decided about one recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub extraction: Extraction,
    pub segmentation: Segmentation,
    pub quality_score: f64,
    /// Failed gates; empty when the recording is valid.
    pub issues: Vec<QualityIssue>,
}

impl Assessment {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn rejection(&self) -> Option<QualityRejection> {
        if self.is_valid() {
            None
        } else {
            Some(QualityRejection {
                issues: self.issues.clone(),
            })
        }
    }
}

/// Runs the analysis steps with fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Assessor {
    analysis: AnalysisConfig,
    gate: QualityGate,
}

impl Assessor {
    pub fn new(analysis: AnalysisConfig, quality: QualityConfig) -> Self {
        Self {
            analysis,
            gate: QualityGate::from(quality),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.analysis.clone(), config.quality.clone())
    }

    /// Decode `bytes` and assess them.
    pub fn assess_bytes(
        &self,
        bytes: &[u8],
        extension: Option<&str>,
    ) -> Result<Assessment, ExtractionError> {
        let waveform = analysis::load_waveform(bytes, extension)?;
        Ok(self.assess(&waveform))
    }

    pub fn assess(&self, waveform: &Waveform) -> Assessment {
        let extraction = analysis::extract(waveform, &self.analysis);
        let segmentation =
            analysis::segment(waveform.samples(), waveform.sample_rate(), &self.analysis);
        let issues = self
            .gate
            .check(waveform.duration_secs(), &extraction.metrics);
        let quality_score = quality_score(&extraction.metrics);

        Assessment {
            extraction,
            segmentation,
            quality_score,
            issues,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
