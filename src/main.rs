use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use voicebridge::{create_router, AppState, Config};

#[derive(Debug, Parser)]
#[command(name = "voicebridge", about = "Speech-to-speech session service")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/voicebridge")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Channel server: {}", cfg.channel.nats_url);
    info!("Handshake endpoint: {}", cfg.channel.handshake_url);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Control API listening on {}", addr);

    axum::serve(listener, router)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
