//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use speech_intake::recording::{AgeRange, Gender, RecordingId, RecordingType};

/// Speech intake: screen, analyse and normalize contributed recordings
#[derive(Parser)]
#[command(name = "speech-intake")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path (default: platform config dir / settings.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory override (blobs and recording records)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse a file and print the quality report as JSON
    Analyze(AnalyzeArgs),
    /// Screen and store files, then process them in the background
    Ingest(IngestArgs),
    /// Re-run processing for stored recordings
    Reprocess(ReprocessArgs),
    /// List stored recordings and their status
    List,
    /// Convert a file to canonical mono 16 kHz 16-bit WAV
    Convert(ConvertArgs),
    /// Cut leading and trailing silence, writing canonical WAV
    Trim(TrimArgs),
    /// Write the default settings file
    InitConfig(InitConfigArgs),
}

#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Audio file to analyse
    pub input: PathBuf,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Parser)]
pub struct IngestArgs {
    /// Audio files to ingest
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Recording type
    #[arg(long, default_value_t = RecordingType::ReadSpeech)]
    pub recording_type: RecordingType,

    /// Anonymized speaker id
    #[arg(long, default_value = "")]
    pub speaker_id: String,

    /// Speaker age range (18-25, 26-35, 36-45, 46-55, 56-65, 65+)
    #[arg(long)]
    pub age_range: Option<AgeRange>,

    /// Speaker gender (male, female, other, prefer_not_to_say)
    #[arg(long)]
    pub gender: Option<Gender>,

    /// Contributor id
    #[arg(long, default_value = "cli")]
    pub contributor: String,
}

#[derive(Parser)]
pub struct ReprocessArgs {
    /// Recording ids to resubmit
    #[arg(required = true)]
    pub ids: Vec<RecordingId>,
}

#[derive(Parser)]
pub struct ConvertArgs {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Parser)]
pub struct TrimArgs {
    pub input: PathBuf,
    pub output: PathBuf,

    /// Amplitude at or below which a sample counts as silent
    #[arg(long, default_value_t = speech_intake::audio::DEFAULT_TRIM_THRESHOLD)]
    pub threshold: f32,
}

#[derive(Parser)]
pub struct InitConfigArgs {
    /// Overwrite an existing settings file
    #[arg(long)]
    pub force: bool,
}
