//! Synthesis service binary.
//!
//! Loads the Kokoro artifacts once at startup, then serves `POST /tts`
//! until Ctrl+C. A load failure is fatal.

use clap::Parser;
use neurospeak::SpeakConfig;
use neurospeak::server::SynthesisServer;
use neurospeak::tts::{KokoroTts, SpeechEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Serve Kokoro text-to-speech over HTTP.
#[derive(Parser)]
#[command(name = "neurospeak-server", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("neurospeak=info,ort=warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = SpeakConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    info!("initializing Kokoro engine");
    let model_path = config.models.model_path.clone();
    let voices_path = config.models.voices_path.clone();
    let tts = config.tts.clone();
    let engine = tokio::task::spawn_blocking(move || {
        KokoroTts::load(&model_path, &voices_path, &tts)
    })
    .await?
    .map_err(|e| {
        error!("could not load model: {e}");
        anyhow::anyhow!("could not load model: {e}")
    })?;
    let engine: Arc<dyn SpeechEngine> = Arc::new(engine);

    let server = SynthesisServer::start(engine, &config.server, &config.tts).await?;
    println!("neurospeak listening on http://{}", server.addr());

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down");
    server.shutdown();
    Ok(())
}
