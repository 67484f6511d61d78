/*!
 * IPC Server for the btspeaks daemon
 * JSON protocol over Unix socket
 */

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::controller::{ControlCommand, SinkStatus};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Pair,
    Disconnect,
    Status,
    Shutdown,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Success { message: String },
    Error { message: String },
    Status { status: SinkStatus },
}

pub struct IpcServer {
    listener: UnixListener,
    commands: mpsc::Sender<ControlCommand>,
}

impl IpcServer {
    pub fn new(listener: UnixListener, commands: mpsc::Sender<ControlCommand>) -> Self {
        Self { listener, commands }
    }

    /// Bind the socket, replacing a stale file left by an earlier run.
    pub fn bind(path: impl AsRef<Path>, commands: mpsc::Sender<ControlCommand>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(Self::new(UnixListener::bind(path)?, commands))
    }

    /// Serve clients until `shutdown` resolves, then give in-flight replies a moment to go out.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tracing::info!("IPC server listening for connections...");
        tokio::pin!(shutdown);
        let mut clients = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        tracing::debug!("New client connected");
                        let commands = self.commands.clone();

                        clients.spawn(async move {
                            if let Err(e) = handle_client(stream, commands).await {
                                tracing::error!("Client error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
                Some(_) = clients.join_next(), if !clients.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while clients.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!("Dropping {} client(s) still connected at shutdown", clients.len());
        }
        Ok(())
    }
}

async fn handle_client(stream: UnixStream, commands: mpsc::Sender<ControlCommand>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        tracing::debug!("Received request: {}", request);

        let response = match serde_json::from_str::<Request>(request) {
            Ok(request) => dispatch(request, &commands).await,
            Err(e) => Response::Error {
                message: format!("Malformed request: {}", e),
            },
        };

        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
    }

    Ok(())
}

async fn dispatch(request: Request, commands: &mpsc::Sender<ControlCommand>) -> Response {
    match request {
        Request::Pair => match ask(commands, |reply| ControlCommand::Pair { reply }).await {
            Ok(true) => Response::Success {
                message: "Discoverable window requested".to_string(),
            },
            Ok(false) => not_ready(),
            Err(e) => Response::Error { message: e.to_string() },
        },
        Request::Disconnect => match ask(commands, |reply| ControlCommand::Disconnect { reply }).await {
            Ok(Some(count)) => Response::Success {
                message: format!("Disconnect requested for {} device(s)", count),
            },
            Ok(None) => not_ready(),
            Err(e) => Response::Error { message: e.to_string() },
        },
        Request::Status => match ask(commands, |reply| ControlCommand::Status { reply }).await {
            Ok(status) => Response::Status { status },
            Err(e) => Response::Error { message: e.to_string() },
        },
        Request::Shutdown => match ask(commands, |reply| ControlCommand::Shutdown { reply }).await {
            Ok(()) => Response::Success {
                message: "Shutting down".to_string(),
            },
            Err(e) => Response::Error { message: e.to_string() },
        },
    }
}

fn not_ready() -> Response {
    Response::Error {
        message: "Sink is not ready".to_string(),
    }
}

/// Send one command to the controller and wait for its answer.
pub async fn ask<T>(
    commands: &mpsc::Sender<ControlCommand>,
    build: impl FnOnce(oneshot::Sender<T>) -> ControlCommand,
) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    commands
        .send(build(tx))
        .await
        .map_err(|_| anyhow!("Sink controller has stopped"))?;
    rx.await.map_err(|_| anyhow!("Sink controller has stopped"))
}

/// One request, one response line.
pub async fn send_request(socket_path: impl AsRef<Path>, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket_path.as_ref()).await?;
    let (reader, mut writer) = stream.into_split();

    let mut request_json = serde_json::to_string(request)?;
    request_json.push('\n');
    writer.write_all(request_json.as_bytes()).await?;

    let mut lines = BufReader::new(reader).lines();
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("Daemon closed the connection without answering"))?;
    Ok(serde_json::from_str(&line)?)
}
