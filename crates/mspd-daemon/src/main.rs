use clap::Parser;
use mspd_daemon::core::DaemonCore;
use mspd_daemon::dispatch::Dispatcher;
use mspd_daemon::socket;
use mspd_proto::config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "mspd", about = "Music stream player daemon", version)]
struct Args {
    /// Config file (default: ~/.config/mspd/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Log to a file in the data dir and to stderr
    let data_dir = mspd_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,mspd=debug,mspd_daemon=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config_path = args.config.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)?;
    info!("Config loaded from: {:?}", config_path);

    let core = Arc::new(DaemonCore::from_config(&config)?);

    // Stale status files from an earlier run are re-validated here rather
    // than trusted
    match core.now_playing().await {
        Ok(now) if now.station_id != 0 => {
            info!("Player from a previous run still recorded: station {}", now.station_id)
        }
        Ok(_) => {}
        Err(e) => warn!("Status files need a stop to recover: {}", e),
    }

    let dispatcher = Arc::new(Dispatcher::new(core));
    let listener = socket::bind(&config.server.bind_address, config.server.port).await?;
    let server = socket::start_server(listener, dispatcher);

    tokio::select! {
        result = server => {
            result?;
        }
        _ = shutdown_signal() => {
            // players run in their own process group and keep playing
            info!("Shutting down; playback is left running");
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
