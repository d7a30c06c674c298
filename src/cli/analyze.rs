//! `analyze`: one-shot quality report for a local file.

use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use speech_intake::config::AppConfig;
use speech_intake::pipeline::{Assessment, Assessor};

use crate::cli::args::AnalyzeArgs;
use crate::cli::extension_hint;

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    version: &'static str,
    input_file: String,
    valid: bool,
    reasons: Vec<String>,
    #[serde(flatten)]
    assessment: &'a Assessment,
}

pub fn run(args: AnalyzeArgs, config: &AppConfig) -> Result<()> {
    eprintln!("Reading: {}", args.input.display());
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let assessor = Assessor::from_config(config);
    let assessment = assessor
        .assess_bytes(&bytes, extension_hint(&args.input).as_deref())
        .with_context(|| format!("cannot analyse {}", args.input.display()))?;

    let props = &assessment.extraction.properties;
    eprintln!(
        "  {} channels, {}Hz, {:.2}s, score {:.3}",
        props.channels, props.sample_rate, props.duration_secs, assessment.quality_score
    );

    let output = AnalyzeOutput {
        version: env!("CARGO_PKG_VERSION"),
        input_file: args.input.display().to_string(),
        valid: assessment.is_valid(),
        reasons: assessment.issues.iter().map(|i| i.to_string()).collect(),
        assessment: &assessment,
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}
