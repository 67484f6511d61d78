/*!
 * Sink Controller
 * Reacts to adapter, connection and playback notifications and to the front panel buttons
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::BluetoothConfig;
use crate::platform::{
    disconnect_peer, AdapterState, ConnectionState, DiscoverabilityWindow, DiscoverableOutcome,
    Disconnect, PeerDevice, PlatformEvent, PlaybackState, ProfileManager, ProfileProxy,
    RadioAdapter, Role, RoleSet, SpeechEngine,
};
use crate::speech::Announcer;

/// Requests coming in from the front panel or the CLI.
#[derive(Debug)]
pub enum ControlCommand {
    Pair { reply: oneshot::Sender<bool> },
    Disconnect { reply: oneshot::Sender<Option<usize>> },
    Status { reply: oneshot::Sender<SinkStatus> },
    Shutdown { reply: oneshot::Sender<()> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

pub struct SinkController<A: RadioAdapter, M, E> {
    config: BluetoothConfig,
    adapter: Option<A>,
    profiles: M,
    proxy: Option<A::Proxy>,
    announcer: Announcer<E>,
    controls_ready: bool,
    discoverable_until: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
}

impl<A, M, E> SinkController<A, M, E>
where
    A: RadioAdapter,
    A::Proxy: Disconnect,
    M: ProfileManager,
    E: SpeechEngine,
{
    pub fn new(config: BluetoothConfig, adapter: Option<A>, profiles: M, announcer: Announcer<E>) -> Self {
        Self {
            config,
            adapter,
            profiles,
            proxy: None,
            announcer,
            controls_ready: false,
            discoverable_until: None,
            started_at: Utc::now(),
        }
    }

    /// Bring the sink up, or power the radio on and wait for the adapter watcher.
    pub async fn start(&mut self) {
        let Some(adapter) = &self.adapter else {
            warn!("No default Bluetooth adapter. Device likely does not support bluetooth.");
            return;
        };

        match adapter.is_enabled().await {
            Ok(true) => {
                debug!("Bluetooth adapter is already enabled.");
                self.init_sink().await;
            }
            Ok(false) if self.config.power_on_at_start => {
                debug!("Bluetooth adapter not enabled. Enabling.");
                if let Err(e) = adapter.enable().await {
                    error!("Failed to power on Bluetooth adapter: {}", e);
                }
            }
            Ok(false) => {
                info!("Bluetooth adapter is off; waiting for it to be powered on");
            }
            Err(e) => error!("Could not read Bluetooth adapter state: {}", e),
        }
    }

    /// Dispatch loop. Events, commands and shutdown are handled one at a time.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<PlatformEvent>,
        mut commands: mpsc::Receiver<ControlCommand>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(command) = commands.recv() => {
                    if self.handle_command(command).await {
                        break;
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                else => break,
            }
        }

        self.shutdown().await;
    }

    pub async fn handle_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::AdapterStateChanged { previous, current } => {
                self.on_adapter_state_changed(previous, current).await
            }
            PlatformEvent::ConnectionStateChanged {
                previous,
                current,
                device,
            } => {
                self.on_connection_state_changed(previous, current, device.as_ref())
                    .await
            }
            PlatformEvent::PlaybackStateChanged {
                previous,
                current,
                device,
            } => self.on_playback_state_changed(previous, current, device.as_ref()),
            PlatformEvent::ProxyLost(role) => self.on_proxy_lost(role),
        }
    }

    /// Returns `true` when the command asks the loop to stop.
    async fn handle_command(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Pair { reply } => {
                let accepted = self.press_pair().await;
                let _ = reply.send(accepted);
            }
            ControlCommand::Disconnect { reply } => {
                let issued = self.press_disconnect().await;
                let _ = reply.send(issued);
            }
            ControlCommand::Status { reply } => {
                let status = self.status().await;
                let _ = reply.send(status);
            }
            ControlCommand::Shutdown { reply } => {
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    async fn on_adapter_state_changed(&mut self, previous: AdapterState, current: AdapterState) {
        debug!(
            "Bluetooth adapter changing state from {:?} to {:?}",
            previous, current
        );
        if current == AdapterState::On {
            info!("Bluetooth adapter is ready");
            self.init_sink().await;
        }
    }

    async fn on_connection_state_changed(
        &mut self,
        previous: ConnectionState,
        current: ConnectionState,
        device: Option<&PeerDevice>,
    ) {
        debug!(
            "Bluetooth A2DP sink changing connection state from {:?} to {:?} device {:?}",
            previous, current, device
        );
        let Some(device) = device else {
            return;
        };
        match current {
            ConnectionState::Connected => {
                self.announcer
                    .speak(&format!("Connected to {}", device.display_name()))
                    .await
            }
            ConnectionState::Disconnected => {
                self.announcer
                    .speak(&format!("Disconnected from {}", device.display_name()))
                    .await
            }
            ConnectionState::Connecting | ConnectionState::Disconnecting => {}
        }
    }

    fn on_playback_state_changed(
        &self,
        previous: PlaybackState,
        current: PlaybackState,
        device: Option<&PeerDevice>,
    ) {
        debug!(
            "Bluetooth A2DP sink changing playback state from {:?} to {:?} device {:?}",
            previous, current, device
        );
        if let Some(device) = device {
            match current {
                PlaybackState::Playing => info!("Playing audio from device {}", device.address),
                PlaybackState::NotPlaying => info!("Stopped playing audio from {}", device.address),
            }
        }
    }

    fn on_proxy_lost(&mut self, role: Role) {
        if role == Role::Receiver && self.proxy.take().is_some() {
            warn!("Lost the {} profile proxy", role);
        }
    }

    pub async fn init_sink(&mut self) {
        let Some(adapter) = enabled_adapter(self.adapter.as_ref()).await else {
            error!("Bluetooth adapter not available or not enabled.");
            return;
        };

        let switch_timeout = Duration::from_millis(self.config.role_switch_timeout_ms);
        configure_profiles(&self.profiles, switch_timeout).await;

        debug!("Set up Bluetooth adapter name and profile");
        if let Err(e) = adapter.set_name(&self.config.friendly_name).await {
            error!("Failed to set adapter name: {}", e);
        }

        match adapter.acquire_proxy(Role::Receiver).await {
            Ok(proxy) => {
                if let Some(stale) = self.proxy.replace(proxy) {
                    adapter.release_proxy(stale).await;
                }
                self.enable_discoverable().await;
            }
            Err(e) => error!("Could not acquire the {} profile proxy: {}", Role::Receiver, e),
        }

        self.controls_ready = true;
    }

    pub async fn enable_discoverable(&mut self) {
        let Some(adapter) = &self.adapter else {
            return;
        };
        debug!("Registering for discovery.");

        let window = DiscoverabilityWindow {
            duration_ms: self.config.discoverable_timeout_ms,
        };
        let outcome = match adapter.request_discoverable(window).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Enable discoverable failed: {}", e);
                return;
            }
        };
        debug!("Enable discoverable returned with result {:?}", outcome);

        match outcome {
            DiscoverableOutcome::Cancelled => {
                error!(
                    "Enable discoverable has been cancelled. \
                     This should never happen on an unattended device."
                );
            }
            DiscoverableOutcome::Granted(granted) => {
                self.discoverable_until = chrono::Duration::from_std(granted.duration())
                    .ok()
                    .map(|d| Utc::now() + d);
                info!(
                    "Bluetooth adapter successfully set to discoverable mode. \
                     Any A2DP source can find it with the name {} and pair for the next {} ms.",
                    self.config.friendly_name, granted.duration_ms
                );
                self.announcer
                    .speak(&format!(
                        "Bluetooth audio sink is discoverable for {} milliseconds. \
                         Look for a device named {}",
                        granted.duration_ms, self.config.friendly_name
                    ))
                    .await;
            }
        }
    }

    /// Pair button. `false` when the controls are not wired yet.
    pub async fn press_pair(&mut self) -> bool {
        if !self.controls_ready {
            debug!("Pair pressed before the sink was initialized");
            return false;
        }
        self.enable_discoverable().await;
        true
    }

    /// Disconnect button. Returns how many disconnect requests went out.
    pub async fn press_disconnect(&mut self) -> Option<usize> {
        if !self.controls_ready {
            debug!("Disconnect pressed before the sink was initialized");
            return None;
        }
        self.disconnect_connected_devices().await
    }

    pub async fn disconnect_connected_devices(&mut self) -> Option<usize> {
        enabled_adapter(self.adapter.as_ref()).await?;
        let proxy = self.proxy.as_ref()?;

        self.announcer.speak("Disconnecting devices").await;

        let devices = match proxy.connected_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Could not list connected devices: {}", e);
                return Some(0);
            }
        };
        for device in &devices {
            info!("Disconnecting device {}", device);
            disconnect_peer(proxy, device).await;
        }
        Some(devices.len())
    }

    pub async fn status(&self) -> SinkStatus {
        let adapter_enabled = match &self.adapter {
            Some(adapter) => adapter.is_enabled().await.unwrap_or(false),
            None => false,
        };
        let connected_devices = match &self.proxy {
            Some(proxy) => proxy.connected_devices().await.unwrap_or_else(|e| {
                warn!("Could not list connected devices: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        SinkStatus {
            adapter_present: self.adapter.is_some(),
            adapter_enabled,
            friendly_name: self.config.friendly_name.clone(),
            sink_ready: self.proxy.is_some(),
            controls_ready: self.controls_ready,
            speech_available: self.announcer.is_available(),
            connected_devices,
            discoverable_until: self.discoverable_until.filter(|until| *until > Utc::now()),
            started_at: self.started_at,
        }
    }

    /// Release the proxy and the speech engine. The adapter stays powered.
    pub async fn shutdown(&mut self) {
        debug!("Shutting down sink controller");
        if let (Some(adapter), Some(proxy)) = (&self.adapter, self.proxy.take()) {
            adapter.release_proxy(proxy).await;
        }
        self.controls_ready = false;
        self.announcer.shutdown().await;
    }
}

async fn enabled_adapter<A: RadioAdapter>(adapter: Option<&A>) -> Option<&A> {
    let adapter = adapter?;
    match adapter.is_enabled().await {
        Ok(true) => Some(adapter),
        Ok(false) => None,
        Err(e) => {
            warn!("Could not read Bluetooth adapter state: {}", e);
            None
        }
    }
}

/// Make sure the receiver and remote-control roles are on, replacing the source role.
/// A switch still running after `switch_timeout` is abandoned.
pub async fn configure_profiles<M: ProfileManager>(profiles: &M, switch_timeout: Duration) {
    let enabled = match profiles.enabled_roles().await {
        Ok(enabled) => enabled,
        Err(e) => {
            error!("Could not read enabled Bluetooth profiles: {}", e);
            return;
        }
    };
    if enabled.contains(&Role::Receiver) {
        debug!("A2DP sink profile is enabled.");
        return;
    }

    debug!("Enabling A2DP sink mode.");
    let disable: RoleSet = [Role::Source].into_iter().collect();
    let enable: RoleSet = [Role::Receiver, Role::RemoteControlTarget]
        .into_iter()
        .collect();
    match tokio::time::timeout(switch_timeout, profiles.enable_and_disable(&enable, &disable)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Failed to switch Bluetooth profiles: {}", e),
        Err(_) => error!(
            "Failed to switch Bluetooth profiles: no answer after {} ms",
            switch_timeout.as_millis()
        ),
    }
}
