//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`, default `info`).
//! 2. Parse the command line.
//! 3. Load [`AppConfig`] (explicit `--config`, else platform file, else
//!    defaults).
//! 4. Build a multi-thread tokio runtime sized from `dispatch.max_concurrency`
//!    and run the command on it.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use speech_intake::config::AppConfig;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Arguments
    let cli = Cli::parse();

    // 3. Configuration
    let config = cli::load_config(&cli)?;

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.dispatch.max_concurrency.clamp(1, 16))
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let config_path = cli.config.clone();
    match cli.command {
        Commands::Analyze(args) => cli::analyze::run(args, &config),
        Commands::Ingest(args) => rt.block_on(cli::store::ingest(args, &config)),
        Commands::Reprocess(args) => rt.block_on(cli::store::reprocess(args, &config)),
        Commands::List => rt.block_on(cli::store::list(&config)),
        Commands::Convert(args) => cli::convert::convert(args, &config),
        Commands::Trim(args) => cli::convert::trim(args, &config),
        Commands::InitConfig(args) => init_config(config_path, args.force),
    }
}

fn init_config(path: Option<std::path::PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| speech_intake::config::AppPaths::new().settings_file);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    AppConfig::default()
        .save_to(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("Wrote: {}", path.display());
    Ok(())
}
