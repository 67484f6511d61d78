/*!
 * btspeaks Daemon Client
 * JSON IPC communication with btspeaksd
 */

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Pair,
    Disconnect,
    Status,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Success { message: String },
    Error { message: String },
    Status { status: SinkStatus },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkStatus {
    pub adapter_present: bool,
    pub adapter_enabled: bool,
    pub friendly_name: String,
    pub sink_ready: bool,
    pub controls_ready: bool,
    pub speech_available: bool,
    pub connected_devices: Vec<PeerDevice>,
    pub discoverable_until: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDevice {
    pub address: String,
    pub name: Option<String>,
}

pub struct SinkClient {
    socket_path: String,
}

impl SinkClient {
    pub fn new(socket_path: String) -> Self {
        Self { socket_path }
    }

    pub async fn send_request(&self, request: Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (reader, mut writer) = stream.into_split();

        let mut request_json = serde_json::to_string(&request)?;
        request_json.push('\n');
        writer.write_all(request_json.as_bytes()).await?;

        let line = BufReader::new(reader)
            .lines()
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("daemon closed the connection"))?;
        Ok(serde_json::from_str(&line)?)
    }
}
