//! Model provisioning binary.
//!
//! Downloads the Kokoro model and matching voice archive to their
//! configured local paths. The first failure is printed and the process
//! exits with status 1; nothing is retried or cleaned up.

use clap::Parser;
use neurospeak::SpeakConfig;
use neurospeak::models::Provisioner;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Download the Kokoro model and voice artifacts.
#[derive(Parser)]
#[command(name = "neurospeak-fetch", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep artifacts that already exist locally.
    #[arg(long)]
    skip_existing: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("neurospeak=warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("\nError: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> neurospeak::Result<()> {
    let mut config = SpeakConfig::load(cli.config.as_deref())?;
    if cli.skip_existing {
        config.models.skip_existing = true;
    }

    let artifacts = Provisioner::new(&config.models).fetch_all(None)?;
    println!(
        "\nAll artifacts ready: {} and {}",
        artifacts.model.display(),
        artifacts.voices.display()
    );
    Ok(())
}
