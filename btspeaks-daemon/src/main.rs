/*!
 * btspeaks daemon
 * Bluetooth audio sink that tells you who connected
 */

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

mod bluez;
mod buttons;
mod config;
mod controller;
mod error;
mod ipc;
mod platform;
mod speech;
#[cfg(test)]
mod testing;

use bluez::BluezSession;
use buttons::ButtonPanel;
use config::DaemonConfig;
use controller::SinkController;
use ipc::{IpcServer, Request, Response};
use speech::{Announcer, EspeakEngine};

#[derive(Parser)]
#[command(name = "btspeaksd")]
#[command(about = "Bluetooth audio sink daemon with spoken connection feedback")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/btspeaks/btspeaksd.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run,
    /// Show sink status
    Status,
    /// Make the sink discoverable
    Pair,
    /// Disconnect every connected source
    Disconnect,
    /// Stop the daemon
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("btspeaks_daemon={}", log_level))
        .init();

    // Load configuration
    let config = DaemonConfig::load(&cli.config)?;

    let request = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => return run_daemon(config).await,
        Commands::Status => Request::Status,
        Commands::Pair => Request::Pair,
        Commands::Disconnect => Request::Disconnect,
        Commands::Stop => Request::Shutdown,
    };
    send_command(&config, request).await
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    info!("btspeaks daemon starting...");

    let session = BluezSession::connect()?;
    let adapter = session
        .find_adapter(config.bluetooth.adapter.as_deref())
        .await?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (profiles, _watch) = match &adapter {
        Some(adapter) => {
            let profiles = session.profiles(adapter, &config.bluetooth);
            let watch = session.watch(adapter, event_tx).await?;
            (Some(profiles), Some(watch))
        }
        None => (None, None),
    };

    let announcer = if config.speech.enabled {
        Announcer::initialize(
            EspeakEngine::open(&config.speech).await,
            &config.speech.locale,
            config.speech.queue_mode,
        )
        .await
    } else {
        info!("Speech disabled in configuration");
        Announcer::disabled()
    };

    let (command_tx, command_rx) = mpsc::channel(32);
    let ipc_server = IpcServer::bind(&config.socket_path, command_tx.clone())?;
    info!("btspeaks daemon ready on socket: {}", config.socket_path);
    let (ipc_stop_tx, ipc_stop_rx) = oneshot::channel::<()>();
    let ipc_task = tokio::spawn(async move {
        let stopped = async {
            let _ = ipc_stop_rx.await;
        };
        if let Err(e) = ipc_server.run(stopped).await {
            error!("IPC server stopped: {}", e);
        }
    });

    match ButtonPanel::open(&config.buttons) {
        Ok(Some(panel)) => {
            info!("Front panel buttons ready on {}", panel.chip());
            tokio::spawn(panel.run(command_tx));
        }
        Ok(None) => debug!("No GPIO buttons configured"),
        Err(e) => error!("Front panel buttons unavailable: {:#}", e),
    }

    let mut controller = SinkController::new(config.bluetooth.clone(), adapter, profiles, announcer);
    controller.start().await;
    controller.run(event_rx, command_rx, shutdown_signal()).await;

    // Lets the reply to a Shutdown request reach its client.
    let _ = ipc_stop_tx.send(());
    if let Err(e) = ipc_task.await {
        error!("IPC server task failed: {}", e);
    }

    let _ = std::fs::remove_file(&config.socket_path);
    info!("btspeaks daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

async fn send_command(config: &DaemonConfig, request: Request) -> Result<()> {
    match ipc::send_request(&config.socket_path, &request).await? {
        Response::Success { message } => println!("{}", message),
        Response::Error { message } => anyhow::bail!(message),
        Response::Status { status } => println!("{}", serde_json::to_string_pretty(&status)?),
    }
    Ok(())
}
