//! `convert` and `trim`: file-to-file audio transforms.

use std::fs;

use anyhow::{bail, Context, Result};
use speech_intake::audio::{self, FormatNormalizer, Normalized};
use speech_intake::config::AppConfig;

use crate::cli::args::{ConvertArgs, TrimArgs};
use crate::cli::extension_hint;

pub fn convert(args: ConvertArgs, config: &AppConfig) -> Result<()> {
    eprintln!("Reading: {}", args.input.display());
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let hint = extension_hint(&args.input);

    let decoded = audio::decode(&bytes, hint.as_deref())
        .with_context(|| format!("cannot decode {}", args.input.display()))?;
    eprintln!(
        "  {} channels, {}Hz, {:.2}s",
        decoded.channels,
        decoded.sample_rate,
        decoded.duration_secs()
    );

    let normalizer = FormatNormalizer::new(config.format.clone());
    match normalizer.normalize(&bytes, decoded.sample_rate, decoded.channels, hint.as_deref())? {
        Normalized::Unchanged => {
            eprintln!("  already canonical, copying");
            fs::write(&args.output, &bytes)?;
        }
        Normalized::Converted(canonical) => {
            eprintln!(
                "  → {} channels, {}Hz, {}-bit, {:.2}s",
                canonical.channels,
                canonical.sample_rate,
                canonical.bits_per_sample,
                canonical.duration_secs
            );
            fs::write(&args.output, &canonical.bytes)?;
        }
    }
    eprintln!("Wrote: {}", args.output.display());
    Ok(())
}

pub fn trim(args: TrimArgs, config: &AppConfig) -> Result<()> {
    eprintln!("Reading: {}", args.input.display());
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let decoded = audio::decode(&bytes, extension_hint(&args.input).as_deref())
        .with_context(|| format!("cannot decode {}", args.input.display()))?;

    let mono = decoded.to_mono();
    let Some(kept) = audio::trim_silence(&mono, args.threshold) else {
        bail!(
            "{} contains no sample above {}",
            args.input.display(),
            args.threshold
        );
    };

    let target_rate = config.format.sample_rate;
    let samples = if decoded.sample_rate == target_rate {
        kept.to_vec()
    } else {
        audio::resample(kept, decoded.sample_rate, target_rate)?
    };
    let wav = audio::encode_wav_pcm16(&samples, target_rate, 1)?;
    fs::write(&args.output, wav)?;

    eprintln!(
        "  kept {:.2}s of {:.2}s",
        samples.len() as f64 / f64::from(target_rate),
        decoded.duration_secs()
    );
    eprintln!("Wrote: {}", args.output.display());
    Ok(())
}
