//! RDS encoder bridge: entry point.
//!
//! ```text
//! rds-encoder                    Run in the foreground
//! rds-encoder --config <path>    Load a custom config TOML
//! rds-encoder --gen-config       Write default config to stdout
//! rds-encoder --host h --port p  Override the encoder address
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rds_encoder::config::EncoderConfig;
use rds_encoder::service::EncoderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rds-encoder", about = "Now-playing to SmartGen RDS encoder bridge")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rds-encoder.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Encoder host, overriding the config file.
    #[arg(long, env = "RDS_ENCODER_HOST")]
    host: Option<String>,

    /// Encoder port, overriding the config file.
    #[arg(long, env = "RDS_ENCODER_PORT")]
    port: Option<u16>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&EncoderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = EncoderConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.encoder.host = host;
    }
    if let Some(port) = cli.port {
        config.encoder.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("rds-encoder v{}", env!("CARGO_PKG_VERSION"));
    info!("encoder: {}:{}", config.encoder.host, config.encoder.port);
    info!("submit policy: {:?}", config.encoder.submit_policy);
    info!("source: {:?}", config.source.kind);

    let service = EncoderService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    service.run().await?;

    Ok(())
}
