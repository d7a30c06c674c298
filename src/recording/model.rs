//! Recording and processing-result entities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::analysis::{
    AudioProperties, MfccFeatures, PitchFeatures, Segmentation, SignalMetrics, SpectralFeatures,
    SpectralShape, TimeSpan,
};
use crate::pipeline::state::{RecordingStatus, TransitionError};

/// Recording identifier (UUID v4).
pub type RecordingId = Uuid;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Kind of speech captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingType {
    #[default]
    ReadSpeech,
    Spontaneous,
    Conversation,
    Narration,
}

impl RecordingType {
    pub fn label(self) -> &'static str {
        match self {
            RecordingType::ReadSpeech => "read_speech",
            RecordingType::Spontaneous => "spontaneous",
            RecordingType::Conversation => "conversation",
            RecordingType::Narration => "narration",
        }
    }
}

impl fmt::Display for RecordingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            RecordingType::ReadSpeech,
            RecordingType::Spontaneous,
            RecordingType::Conversation,
            RecordingType::Narration,
        ]
        .into_iter()
        .find(|t| t.label() == s)
        .ok_or_else(|| format!("unknown recording type '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeRange {
    #[serde(rename = "18-25")]
    From18To25,
    #[serde(rename = "26-35")]
    From26To35,
    #[serde(rename = "36-45")]
    From36To45,
    #[serde(rename = "46-55")]
    From46To55,
    #[serde(rename = "56-65")]
    From56To65,
    #[serde(rename = "65+")]
    Over65,
}

impl AgeRange {
    pub fn label(self) -> &'static str {
        match self {
            AgeRange::From18To25 => "18-25",
            AgeRange::From26To35 => "26-35",
            AgeRange::From36To45 => "36-45",
            AgeRange::From46To55 => "46-55",
            AgeRange::From56To65 => "56-65",
            AgeRange::Over65 => "65+",
        }
    }
}

impl FromStr for AgeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AgeRange::From18To25,
            AgeRange::From26To35,
            AgeRange::From36To45,
            AgeRange::From46To55,
            AgeRange::From56To65,
            AgeRange::Over65,
        ]
        .into_iter()
        .find(|a| a.label() == s)
        .ok_or_else(|| format!("unknown age range '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            "prefer_not_to_say" => Ok(Gender::PreferNotToSay),
            _ => Err(format!("unknown gender '{s}'")),
        }
    }
}

/// Anonymized speaker attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub speaker_id: String,
    pub age_range: Option<AgeRange>,
    pub gender: Option<Gender>,
}

// ---------------------------------------------------------------------------
// QualityMetrics
// ---------------------------------------------------------------------------

/// Quality fields stored on the recording itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub snr_db: Option<f64>,
    pub silence_ratio: Option<f64>,
    pub clipping_detected: bool,
    #[serde(deserialize_with = "clamped_score")]
    quality_score: f64,
}

impl QualityMetrics {
    pub fn new(metrics: &SignalMetrics, quality_score: f64) -> Self {
        let mut q = Self {
            snr_db: Some(metrics.snr_db),
            silence_ratio: Some(metrics.silence_ratio),
            clipping_detected: metrics.clipping_detected,
            quality_score: 0.0,
        };
        q.set_quality_score(quality_score);
        q
    }

    /// Always within `[0, 1]`.
    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    /// Stores `score` clamped to `[0, 1]`; NaN is stored as 0.
    pub fn set_quality_score(&mut self, score: f64) {
        self.quality_score = clamp_score(score);
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

fn clamped_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    f64::deserialize(deserializer).map(clamp_score)
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// A contributed speech recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: RecordingId,
    /// Storage reference of the audio blob, e.g. `audio/<id>.wav`.
    pub audio_ref: String,
    pub original_filename: String,
    /// Size of the stored blob in bytes.
    pub file_size: u64,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    status: RecordingStatus,
    pub recording_type: RecordingType,
    pub quality: QualityMetrics,
    pub speaker: SpeakerInfo,
    pub contributor_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recording {
    /// A freshly uploaded recording.
    ///
    /// Bit depth defaults to 16 when the codec does not declare one.
    pub fn new(
        id: RecordingId,
        audio_ref: impl Into<String>,
        original_filename: impl Into<String>,
        file_size: u64,
        properties: &AudioProperties,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            audio_ref: audio_ref.into(),
            original_filename: original_filename.into(),
            file_size,
            duration_secs: properties.duration_secs,
            sample_rate: properties.sample_rate,
            channels: properties.channels,
            bit_depth: properties.bits_per_sample.unwrap_or(16),
            status: RecordingStatus::Uploaded,
            recording_type: RecordingType::default(),
            quality: QualityMetrics::default(),
            speaker: SpeakerInfo::default(),
            contributor_id: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    /// Move to `next`, refusing transitions the lifecycle forbids.
    pub fn set_status(&mut self, next: RecordingStatus) -> Result<(), TransitionError> {
        self.status = self.status.transition(next)?;
        self.touch();
        Ok(())
    }

    /// Extension of the stored blob, used as a decoder hint.
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.audio_ref)
    }

    /// Record signal metrics and the composite score.
    pub fn apply_metrics(&mut self, metrics: &SignalMetrics, quality_score: f64) {
        self.quality = QualityMetrics::new(metrics, quality_score);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            audio_ref: self.audio_ref.clone(),
            file_size: self.file_size,
            duration_secs: self.duration_secs,
            sample_rate: self.sample_rate,
            channels: self.channels,
            bit_depth: self.bit_depth,
        }
    }

    /// Point at a new blob and adopt its format fields.
    pub fn set_format(&mut self, format: &AudioFormat) {
        self.audio_ref = format.audio_ref.clone();
        self.file_size = format.file_size;
        self.duration_secs = format.duration_secs;
        self.sample_rate = format.sample_rate;
        self.channels = format.channels;
        self.bit_depth = format.bit_depth;
        self.touch();
    }

    /// Take status, quality metrics and `updated_at` from `outcome`.
    ///
    /// Blob reference, format fields and contributor metadata stay as they
    /// are on `self`.  Equal statuses are accepted as a repeated write.
    pub fn absorb_outcome(&mut self, outcome: &Recording) -> Result<(), TransitionError> {
        if self.status != outcome.status {
            self.status = self.status.transition(outcome.status)?;
        }
        self.quality = outcome.quality.clone();
        self.updated_at = outcome.updated_at;
        Ok(())
    }
}

/// Where a recording's audio lives and how it is encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub audio_ref: String,
    pub file_size: u64,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

/// Extension (without the dot) of a blob reference or filename.
pub fn extension_of(name: &str) -> Option<&str> {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ProcessingResult
// ---------------------------------------------------------------------------

/// Analysis output attached one-to-one to a [`Recording`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub recording_id: RecordingId,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_duration_secs: f64,
    pub spectral_features: Option<SpectralShape>,
    pub mfcc_features: Option<MfccFeatures>,
    pub pitch_features: Option<PitchFeatures>,
    /// RMS energy of the whole recording.
    pub noise_level: Option<f64>,
    pub speech_segments: Vec<TimeSpan>,
    pub silence_segments: Vec<TimeSpan>,
    pub auto_transcript: Option<String>,
    pub transcript_confidence: Option<f64>,
    pub processing_errors: Vec<String>,
}

impl ProcessingResult {
    pub fn empty(recording_id: RecordingId) -> Self {
        Self {
            recording_id,
            processed_at: None,
            processing_duration_secs: 0.0,
            spectral_features: None,
            mfcc_features: None,
            pitch_features: None,
            noise_level: None,
            speech_segments: Vec::new(),
            silence_segments: Vec::new(),
            auto_transcript: None,
            transcript_confidence: None,
            processing_errors: Vec::new(),
        }
    }

    /// Replace every analysis field with `features`, `metrics` and
    /// `segmentation`, clearing previous errors.
    pub fn fill(
        &mut self,
        features: &SpectralFeatures,
        metrics: &SignalMetrics,
        segmentation: &Segmentation,
    ) {
        let id = self.recording_id;
        *self = Self::empty(id);
        self.spectral_features = Some(features.shape.clone());
        self.mfcc_features = Some(features.mfcc.clone());
        self.pitch_features = Some(features.pitch.clone());
        self.noise_level = Some(metrics.rms_energy);
        self.speech_segments = segmentation.speech();
        self.silence_segments = segmentation.silence();
    }

    /// Stamp the attempt's completion time and wall-clock duration.
    pub fn stamp(&mut self, duration_secs: f64) {
        self.processed_at = Some(Utc::now());
        self.processing_duration_secs = duration_secs;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
