/*!
 * Platform seams
 * Everything the sink controller asks of the host Bluetooth stack and speech engine
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, SinkError};

/// Bluetooth capability roles the sink cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// A2DP source: this device streams audio out.
    Source,
    /// A2DP sink: this device accepts an incoming audio stream.
    Receiver,
    /// AVRCP controller: lets the connected source drive playback controls.
    RemoteControlTarget,
}

pub type RoleSet = BTreeSet<Role>;

const AUDIO_SOURCE_UUID: Uuid = Uuid::from_u128(0x0000110a_0000_1000_8000_00805f9b34fb);
const AUDIO_SINK_UUID: Uuid = Uuid::from_u128(0x0000110b_0000_1000_8000_00805f9b34fb);
const AV_REMOTE_CONTROLLER_UUID: Uuid = Uuid::from_u128(0x0000110f_0000_1000_8000_00805f9b34fb);

impl Role {
    pub fn uuid(self) -> Uuid {
        match self {
            Role::Source => AUDIO_SOURCE_UUID,
            Role::Receiver => AUDIO_SINK_UUID,
            Role::RemoteControlTarget => AV_REMOTE_CONTROLLER_UUID,
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        [Role::Source, Role::Receiver, Role::RemoteControlTarget]
            .into_iter()
            .find(|role| role.uuid() == *uuid)
    }

    pub fn key(self) -> &'static str {
        match self {
            Role::Source => "a2dp-source",
            Role::Receiver => "a2dp-sink",
            Role::RemoteControlTarget => "avrcp-controller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Off,
    TurningOn,
    On,
    TurningOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    NotPlaying,
}

/// A remote device as reported by the host stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDevice {
    pub address: String,
    pub name: Option<String>,
}

impl PeerDevice {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("a device")
    }
}

impl fmt::Display for PeerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => f.write_str(&self.address),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverabilityWindow {
    pub duration_ms: u64,
}

impl DiscoverabilityWindow {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverableOutcome {
    Granted(DiscoverabilityWindow),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueMode {
    #[default]
    Add,
    Flush,
}

/// Notifications delivered by the host stack, in the order it produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    AdapterStateChanged {
        previous: AdapterState,
        current: AdapterState,
    },
    ConnectionStateChanged {
        previous: ConnectionState,
        current: ConnectionState,
        device: Option<PeerDevice>,
    },
    PlaybackStateChanged {
        previous: PlaybackState,
        current: PlaybackState,
        device: Option<PeerDevice>,
    },
    ProxyLost(Role),
}

#[async_trait]
pub trait RadioAdapter: Send + Sync {
    type Proxy: ProfileProxy;

    async fn is_enabled(&self) -> Result<bool>;

    /// Request power-on. Completion shows up later as an adapter state event.
    async fn enable(&self) -> Result<()>;

    async fn set_name(&self, name: &str) -> Result<()>;

    async fn request_discoverable(&self, window: DiscoverabilityWindow) -> Result<DiscoverableOutcome>;

    async fn acquire_proxy(&self, role: Role) -> Result<Self::Proxy>;

    async fn release_proxy(&self, proxy: Self::Proxy);
}

#[async_trait]
pub trait ProfileManager: Send + Sync {
    async fn enabled_roles(&self) -> Result<RoleSet>;

    /// Swap roles in one request.
    async fn enable_and_disable(&self, enable: &RoleSet, disable: &RoleSet) -> Result<()>;
}

/// Without an adapter there is nothing to configure.
#[async_trait]
impl<M: ProfileManager> ProfileManager for Option<M> {
    async fn enabled_roles(&self) -> Result<RoleSet> {
        match self {
            Some(profiles) => profiles.enabled_roles().await,
            None => Err(SinkError::NoAdapter),
        }
    }

    async fn enable_and_disable(&self, enable: &RoleSet, disable: &RoleSet) -> Result<()> {
        match self {
            Some(profiles) => profiles.enable_and_disable(enable, disable).await,
            None => Err(SinkError::NoAdapter),
        }
    }
}

/// Handle on one capability role managed by the host stack.
#[async_trait]
pub trait ProfileProxy: Send + Sync {
    fn role(&self) -> Role;

    async fn connected_devices(&self) -> Result<Vec<PeerDevice>>;
}

/// Proxies that can drop a connected peer.
#[async_trait]
pub trait Disconnect: ProfileProxy {
    async fn disconnect(&self, device: &PeerDevice) -> Result<()>;
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn set_language(&self, locale: &str) -> Result<()>;

    async fn speak(&self, utterance: &str, mode: QueueMode) -> Result<()>;

    async fn stop(&self);

    async fn shutdown(&self);
}

/// Fire-and-forget disconnect. Failures are logged and reported as `false`.
pub async fn disconnect_peer<P: Disconnect + ?Sized>(proxy: &P, device: &PeerDevice) -> bool {
    match proxy.disconnect(device).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                "Could not disconnect {} through the {} proxy, ignoring request: {}",
                device,
                proxy.role(),
                e
            );
            false
        }
    }
}
