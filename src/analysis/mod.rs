//! Signal analysis: metric extraction and speech/silence segmentation.
//!
//! Everything here is a pure function of the input samples and an
//! [`AnalysisConfig`](crate::config::AnalysisConfig); nothing holds state
//! between calls, so repeated runs on the same waveform give bit-identical
//! results.
//!
//! ```text
//! bytes ─ load_waveform ─▶ Waveform ─┬─ extract ─▶ Extraction
//!                                    │              ├─ SignalMetrics
//!                                    │              └─ SpectralFeatures
//!                                    └─ segment ─▶ Segmentation
//! ```

pub mod extract;
pub mod segment;
pub mod signal;
pub mod spectral;
pub mod stft;

pub use extract::{extract, load_waveform, AudioProperties, Extraction, ExtractionError, Waveform};
pub use segment::{segment, Segment, SegmentKind, Segmentation, TimeSpan};
pub use signal::SignalMetrics;
pub use spectral::{MfccFeatures, PitchFeatures, SpectralFeatures, SpectralShape};
pub use stft::Spectrogram;
