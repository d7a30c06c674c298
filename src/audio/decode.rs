//! Container/codec decoding into interleaved `f32` samples.
//!
//! Any format symphonia can probe (WAV, FLAC, Ogg/Vorbis, MP3, …) is accepted.
//! The first decodable audio track is used; every other track is ignored.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::resample::stereo_to_mono;

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Reasons a byte stream could not be turned into samples.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The byte stream is empty.
    #[error("audio stream is empty")]
    EmptyInput,

    /// No track with a known codec was found in the container.
    #[error("no decodable audio track found")]
    NoAudioTrack,

    /// The track does not declare a sample rate or channel layout.
    #[error("audio track is missing its {0}")]
    MissingParameter(&'static str),

    /// The stream decoded to zero samples.
    #[error("audio stream contains no samples")]
    NoSamples,

    /// Wrapper around errors produced by the symphonia decoding library.
    #[error(transparent)]
    Symphonia(#[from] SymphoniaError),
}

// ---------------------------------------------------------------------------
// DecodedAudio
// ---------------------------------------------------------------------------

/// PCM samples recovered from an encoded stream.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples normalized to `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bit depth declared by the codec, when it has one (lossy codecs don't).
    pub bits_per_sample: Option<u16>,
}

impl DecodedAudio {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Channel-averaged mono samples.
    pub fn to_mono(&self) -> Vec<f32> {
        stereo_to_mono(&self.samples, self.channels)
    }
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Decode `bytes` into interleaved samples.
///
/// `extension` (e.g. `"wav"`, `"mp3"`) is only a probing hint; the container
/// is still detected from its content.
pub fn decode(bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let source = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let declared_rate = track.codec_params.sample_rate;
    let declared_channels = track.codec_params.channels.map(|c| c.count() as u16);
    let bits_per_sample = track.codec_params.bits_per_sample.map(|b| b as u16);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut spec_rate = None;
    let mut spec_channels = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                spec_rate.get_or_insert(spec.rate);
                spec_channels.get_or_insert(spec.channels.count() as u16);

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // Corrupt packet: skip it and keep going.
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("decode: skipping corrupt packet ({msg})");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let sample_rate = spec_rate
        .or(declared_rate)
        .filter(|&r| r > 0)
        .ok_or(DecodeError::MissingParameter("sample rate"))?;
    let channels = spec_channels
        .or(declared_channels)
        .filter(|&c| c > 0)
        .ok_or(DecodeError::MissingParameter("channel layout"))?;

    if samples.is_empty() {
        return Err(DecodeError::NoSamples);
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
        bits_per_sample,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
