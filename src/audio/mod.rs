//! Audio I/O — decoding, channel/rate conversion, canonical encoding, trimming.
//!
//! # Pipeline
//!
//! ```text
//! encoded bytes → decode (symphonia) → stereo_to_mono → resample (rubato)
//!               → encode_wav_pcm16 (hound)
//! ```
//!
//! Signal analysis lives in [`crate::analysis`]; this module only moves
//! samples between representations.

pub mod decode;
pub mod normalize;
pub mod resample;
pub mod trim;

pub use decode::{decode, DecodeError, DecodedAudio};
pub use normalize::{encode_wav_pcm16, CanonicalAudio, ConversionError, FormatNormalizer, Normalized};
pub use resample::{resample, stereo_to_mono, ResampleError};
pub use trim::{trim_silence, DEFAULT_TRIM_THRESHOLD};
