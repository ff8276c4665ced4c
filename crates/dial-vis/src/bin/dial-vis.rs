//! DIAL Visualizer
//!
//! Connect to a simulator backend and serve the playback views.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use dial_client::HttpSimulator;
use dial_vis::{Controller, VisConfig, VisServer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dial-vis")]
#[command(about = "Playback controls and live views for a DIAL simulator backend")]
struct Args {
    /// Simulator backend base URL (overrides DIAL_BACKEND_URL)
    #[arg(long)]
    backend: Option<String>,

    /// Address to serve the views on (overrides DIAL_VIS_ADDR)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Playback speed in time units per second
    #[arg(long)]
    speed: Option<f64>,

    /// Directory holding a browser front-end
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Verify the backend's TLS certificate
    #[arg(long)]
    strict_tls: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dial_vis=info,dial_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = VisConfig::from_env()?;
    if let Some(backend) = args.backend {
        config.client = config.client.with_base_url(backend);
    }
    if args.strict_tls {
        config.client = config.client.with_accept_invalid_certs(false);
    }
    if let Some(listen) = args.listen {
        config = config.with_listen(listen);
    }
    if let Some(speed) = args.speed {
        config = config.with_speed(speed);
    }
    if let Some(dir) = args.static_dir {
        config = config.with_static_dir(dir);
    }
    config.validate()?;

    info!(backend = %config.client.base_url, listen = %config.listen, "starting visualizer");

    let api = HttpSimulator::new(config.client.clone())?;
    let (controller, handle) = Controller::new(api, config.clone())?;
    tokio::spawn(controller.run());

    VisServer::new(handle)
        .with_static_dir(config.static_dir.clone())
        .serve(config.listen)
        .await?;

    Ok(())
}
