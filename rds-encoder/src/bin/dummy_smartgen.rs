//! Stand-in SmartGen encoder: logs every command and answers `OK`.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rds_core::{DummyEncoder, DummyOptions, LineTerminator};

#[derive(Parser, Debug)]
#[command(name = "dummy-smartgen", about = "Fake SmartGen encoder for bench tests")]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    listen: String,

    /// Reply with a bare `OK` and no line terminator.
    #[arg(long)]
    bare: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let options = DummyOptions {
        script: Vec::new(),
        reply_terminator: (!cli.bare).then_some(LineTerminator::Crlf),
    };
    let dummy = DummyEncoder::bind(cli.listen.as_str(), options).await?;
    info!("dummy SmartGen listening on {}", dummy.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("received {} commands", dummy.received().len());
    dummy.stop().await;
    Ok(())
}
