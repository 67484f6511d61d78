/*!
 * BlueZ backend
 * Adapter, sink profile and notifications over the system D-Bus
 */

use async_trait::async_trait;
use dbus::arg::{prop_cast, PropMap};
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::{ObjectManager, Properties};
use dbus::nonblock::{MsgMatch, Proxy, SyncConnection};
use futures::StreamExt;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BluetoothConfig;
use crate::error::{Result, SinkError};
use crate::platform::{
    AdapterState, ConnectionState, DiscoverabilityWindow, DiscoverableOutcome, Disconnect,
    PeerDevice, PlatformEvent, PlaybackState, ProfileManager, ProfileProxy, RadioAdapter, Role,
    RoleSet,
};

const BLUEZ: &str = "org.bluez";
const ADAPTER_IFACE: &str = "org.bluez.Adapter1";
const DEVICE_IFACE: &str = "org.bluez.Device1";
const TRANSPORT_IFACE: &str = "org.bluez.MediaTransport1";
const DBUS_TIMEOUT: Duration = Duration::from_secs(5);

type Connection = Arc<SyncConnection>;

fn bluez_proxy<'a>(conn: &Connection, path: &'a str) -> Proxy<'a, Connection> {
    Proxy::new(BLUEZ, path, DBUS_TIMEOUT, conn.clone())
}

/// Shared system bus connection to BlueZ.
pub struct BluezSession {
    conn: Connection,
}

impl BluezSession {
    pub fn connect() -> Result<Self> {
        let (resource, conn) = dbus_tokio::connection::new_system_sync()?;
        tokio::spawn(async move {
            let err = resource.await;
            error!("Lost connection to the system D-Bus: {}", err);
        });
        Ok(Self { conn })
    }

    /// The configured adapter, or the first one BlueZ knows about.
    pub async fn find_adapter(&self, name: Option<&str>) -> Result<Option<BluezAdapter>> {
        let objects = bluez_proxy(&self.conn, "/").get_managed_objects().await?;
        let mut adapters: Vec<String> = objects
            .iter()
            .filter(|(_, interfaces)| interfaces.contains_key(ADAPTER_IFACE))
            .map(|(path, _)| path.to_string())
            .collect();
        adapters.sort();

        let path = match name {
            Some(name) => adapters
                .into_iter()
                .find(|path| path.rsplit('/').next() == Some(name)),
            None => adapters.into_iter().next(),
        };
        Ok(path.map(|path| {
            info!("Using Bluetooth adapter {}", path);
            BluezAdapter {
                conn: self.conn.clone(),
                path,
            }
        }))
    }

    pub fn profiles(&self, adapter: &BluezAdapter, config: &BluetoothConfig) -> BluezProfiles {
        BluezProfiles {
            conn: self.conn.clone(),
            adapter_path: adapter.path.clone(),
            role_switch_command: config.role_switch_command.clone(),
            role_switch_timeout: Duration::from_millis(config.role_switch_timeout_ms),
        }
    }

    /// Forward adapter, connection and playback changes as platform events.
    pub async fn watch(
        &self,
        adapter: &BluezAdapter,
        events: mpsc::UnboundedSender<PlatformEvent>,
    ) -> Result<BluezWatch> {
        let changed_rule = MatchRule::new_signal("org.freedesktop.DBus.Properties", "PropertiesChanged")
            .with_sender(BLUEZ);
        let (changed_match, mut changed) = self
            .conn
            .add_match(changed_rule)
            .await?
            .stream::<(String, PropMap, Vec<String>)>();

        let removed_rule = MatchRule::new_signal("org.freedesktop.DBus.ObjectManager", "InterfacesRemoved")
            .with_sender(BLUEZ);
        let (removed_match, mut removed) = self
            .conn
            .add_match(removed_rule)
            .await?
            .stream::<(dbus::Path<'static>, Vec<String>)>();

        let initial = adapter.power_state().await.unwrap_or(AdapterState::Off);
        let mut translator = EventTranslator::new(adapter.path.clone(), initial);
        let conn = self.conn.clone();

        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(signal) = changed.next() => {
                        match translator.translate(signal) {
                            Some(change) => resolve(&conn, change).await,
                            None => None,
                        }
                    }
                    Some((_, (path, interfaces))) = removed.next() => {
                        translator.interfaces_removed(&path.to_string(), &interfaces)
                    }
                    else => break,
                };
                if let Some(event) = event {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
            debug!("BlueZ signal watcher stopped");
        });

        Ok(BluezWatch {
            _matches: vec![changed_match, removed_match],
            task,
        })
    }
}

/// Keeps the signal subscriptions alive while the daemon runs.
pub struct BluezWatch {
    _matches: Vec<MsgMatch>,
    task: JoinHandle<()>,
}

impl Drop for BluezWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct BluezAdapter {
    conn: Connection,
    path: String,
}

impl BluezAdapter {
    async fn power_state(&self) -> Result<AdapterState> {
        let proxy = bluez_proxy(&self.conn, &self.path);
        match proxy.get::<String>(ADAPTER_IFACE, "PowerState").await {
            Ok(state) => Ok(parse_power_state(&state).unwrap_or(AdapterState::Off)),
            // Older BlueZ only has Powered.
            Err(_) => {
                let powered: bool = proxy.get(ADAPTER_IFACE, "Powered").await?;
                Ok(if powered { AdapterState::On } else { AdapterState::Off })
            }
        }
    }
}

#[async_trait]
impl RadioAdapter for BluezAdapter {
    type Proxy = BluezSinkProxy;

    async fn is_enabled(&self) -> Result<bool> {
        let powered: bool = bluez_proxy(&self.conn, &self.path)
            .get(ADAPTER_IFACE, "Powered")
            .await?;
        Ok(powered)
    }

    async fn enable(&self) -> Result<()> {
        bluez_proxy(&self.conn, &self.path)
            .set(ADAPTER_IFACE, "Powered", true)
            .await?;
        Ok(())
    }

    async fn set_name(&self, name: &str) -> Result<()> {
        bluez_proxy(&self.conn, &self.path)
            .set(ADAPTER_IFACE, "Alias", name.to_string())
            .await?;
        Ok(())
    }

    async fn request_discoverable(&self, window: DiscoverabilityWindow) -> Result<DiscoverableOutcome> {
        let proxy = bluez_proxy(&self.conn, &self.path);
        let timeout = timeout_secs(window.duration_ms);

        proxy.set(ADAPTER_IFACE, "Pairable", true).await?;
        proxy.set(ADAPTER_IFACE, "PairableTimeout", timeout).await?;
        proxy.set(ADAPTER_IFACE, "DiscoverableTimeout", timeout).await?;
        proxy.set(ADAPTER_IFACE, "Discoverable", true).await?;

        let discoverable: bool = proxy.get(ADAPTER_IFACE, "Discoverable").await?;
        Ok(if discoverable {
            DiscoverableOutcome::Granted(window)
        } else {
            DiscoverableOutcome::Cancelled
        })
    }

    async fn acquire_proxy(&self, role: Role) -> Result<BluezSinkProxy> {
        if role != Role::Receiver {
            return Err(SinkError::UnsupportedRole(role));
        }
        let adapter = bluez_proxy(&self.conn, &self.path);
        let uuids: Vec<String> = adapter.get(ADAPTER_IFACE, "UUIDs").await?;
        require_role(&uuids, role)?;
        let address: String = adapter.get(ADAPTER_IFACE, "Address").await?;
        debug!("{} profile proxy ready on {}", role, address);
        Ok(BluezSinkProxy {
            conn: self.conn.clone(),
            adapter_path: self.path.clone(),
        })
    }

    async fn release_proxy(&self, proxy: BluezSinkProxy) {
        debug!("Releasing {} profile proxy on {}", proxy.role(), proxy.adapter_path);
    }
}

/// The A2DP sink role of one adapter.
pub struct BluezSinkProxy {
    conn: Connection,
    adapter_path: String,
}

#[async_trait]
impl ProfileProxy for BluezSinkProxy {
    fn role(&self) -> Role {
        Role::Receiver
    }

    async fn connected_devices(&self) -> Result<Vec<PeerDevice>> {
        let objects = bluez_proxy(&self.conn, "/").get_managed_objects().await?;
        let devices = objects
            .iter()
            .filter(|(path, _)| is_child_of(path, &self.adapter_path))
            .filter_map(|(_, interfaces)| interfaces.get(DEVICE_IFACE))
            .filter(|props| prop_cast::<bool>(props, "Connected").copied().unwrap_or(false))
            .filter(|props| may_stream_audio(&string_list(props, "UUIDs")))
            .filter_map(peer_from_props)
            .collect();
        Ok(devices)
    }
}

#[async_trait]
impl Disconnect for BluezSinkProxy {
    async fn disconnect(&self, device: &PeerDevice) -> Result<()> {
        let path = device_path(&self.adapter_path, &device.address);
        // The remote end of our sink is an A2DP source.
        let _: () = bluez_proxy(&self.conn, &path)
            .method_call(DEVICE_IFACE, "DisconnectProfile", (Role::Source.uuid().to_string(),))
            .await?;
        Ok(())
    }
}

/// Role set comes from the adapter's advertised UUIDs; switching runs an operator hook.
pub struct BluezProfiles {
    conn: Connection,
    adapter_path: String,
    role_switch_command: Vec<String>,
    role_switch_timeout: Duration,
}

#[async_trait]
impl ProfileManager for BluezProfiles {
    async fn enabled_roles(&self) -> Result<RoleSet> {
        let uuids: Vec<String> = bluez_proxy(&self.conn, &self.adapter_path)
            .get(ADAPTER_IFACE, "UUIDs")
            .await?;
        Ok(roles_from_uuids(&uuids))
    }

    async fn enable_and_disable(&self, enable: &RoleSet, disable: &RoleSet) -> Result<()> {
        let Some((program, args)) = self.role_switch_command.split_first() else {
            return Err(SinkError::RoleSwitch(
                "no role_switch_command configured".to_string(),
            ));
        };
        let mut hook = Command::new(program);
        hook.args(args)
            .env("BTSPEAKS_ENABLE_ROLES", role_list(enable))
            .env("BTSPEAKS_DISABLE_ROLES", role_list(disable))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let status = run_hook(hook, self.role_switch_timeout).await?;
        if !status.success() {
            return Err(SinkError::RoleSwitch(format!("{} exited with {}", program, status)));
        }
        Ok(())
    }
}

/// The adapter only serves a role once the audio stack has registered its UUID.
fn require_role(uuids: &[String], role: Role) -> Result<()> {
    if roles_from_uuids(uuids).contains(&role) {
        Ok(())
    } else {
        Err(SinkError::UnsupportedRole(role))
    }
}

/// Runs `hook` to completion, killing it once `limit` has passed.
async fn run_hook(mut hook: Command, limit: Duration) -> Result<ExitStatus> {
    let mut child = hook.spawn()?;
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!("Could not kill role switch hook: {}", e);
            }
            Err(SinkError::RoleSwitch(format!(
                "timed out after {} ms",
                limit.as_millis()
            )))
        }
    }
}

#[derive(Debug, PartialEq)]
enum Change {
    Adapter {
        previous: AdapterState,
        current: AdapterState,
    },
    Connection {
        device_path: String,
        connected: bool,
    },
    Playback {
        device_path: String,
        previous: PlaybackState,
        current: PlaybackState,
    },
}

/// Turns raw BlueZ signals into state transitions, dropping repeats.
struct EventTranslator {
    adapter_path: String,
    power: AdapterState,
    playback: HashMap<String, PlaybackState>,
}

impl EventTranslator {
    fn new(adapter_path: String, power: AdapterState) -> Self {
        Self {
            adapter_path,
            power,
            playback: HashMap::new(),
        }
    }

    fn translate(&mut self, signal: (dbus::Message, (String, PropMap, Vec<String>))) -> Option<Change> {
        let (msg, (interface, props, _)) = signal;
        let path = msg.path()?;
        self.properties_changed(&path, &interface, &props)
    }

    fn properties_changed(&mut self, path: &str, interface: &str, props: &PropMap) -> Option<Change> {
        match interface {
            ADAPTER_IFACE if path == self.adapter_path => {
                let current = prop_cast::<String>(props, "PowerState")
                    .and_then(|state| parse_power_state(state))
                    .or_else(|| {
                        prop_cast::<bool>(props, "Powered").map(|&on| {
                            if on {
                                AdapterState::On
                            } else {
                                AdapterState::Off
                            }
                        })
                    })?;
                if current == self.power {
                    return None;
                }
                let previous = std::mem::replace(&mut self.power, current);
                Some(Change::Adapter { previous, current })
            }
            DEVICE_IFACE if is_child_of(path, &self.adapter_path) => {
                let connected = *prop_cast::<bool>(props, "Connected")?;
                Some(Change::Connection {
                    device_path: path.to_string(),
                    connected,
                })
            }
            TRANSPORT_IFACE if is_child_of(path, &self.adapter_path) => {
                let current = parse_transport_state(prop_cast::<String>(props, "State")?)?;
                let previous = self
                    .playback
                    .insert(path.to_string(), current)
                    .unwrap_or(PlaybackState::NotPlaying);
                if previous == current {
                    return None;
                }
                Some(Change::Playback {
                    device_path: transport_device_path(path)?.to_string(),
                    previous,
                    current,
                })
            }
            _ => None,
        }
    }

    fn interfaces_removed(&mut self, path: &str, interfaces: &[String]) -> Option<PlatformEvent> {
        if interfaces.iter().any(|i| i == TRANSPORT_IFACE) {
            self.playback.remove(path);
        }
        if path == self.adapter_path && interfaces.iter().any(|i| i == ADAPTER_IFACE) {
            return Some(PlatformEvent::ProxyLost(Role::Receiver));
        }
        None
    }
}

async fn resolve(conn: &Connection, change: Change) -> Option<PlatformEvent> {
    match change {
        Change::Adapter { previous, current } => {
            Some(PlatformEvent::AdapterStateChanged { previous, current })
        }
        Change::Connection {
            device_path,
            connected,
        } => {
            let (device, uuids) = lookup_device(conn, &device_path).await;
            if !may_stream_audio(&uuids) {
                debug!("Ignoring connection change of non-audio device {}", device_path);
                return None;
            }
            let (previous, current) = if connected {
                (ConnectionState::Disconnected, ConnectionState::Connected)
            } else {
                (ConnectionState::Connected, ConnectionState::Disconnected)
            };
            Some(PlatformEvent::ConnectionStateChanged {
                previous,
                current,
                device,
            })
        }
        Change::Playback {
            device_path,
            previous,
            current,
        } => {
            let (device, _) = lookup_device(conn, &device_path).await;
            Some(PlatformEvent::PlaybackStateChanged {
                previous,
                current,
                device,
            })
        }
    }
}

async fn lookup_device(conn: &Connection, path: &str) -> (Option<PeerDevice>, Vec<String>) {
    match bluez_proxy(conn, path).get_all(DEVICE_IFACE).await {
        Ok(props) => (peer_from_props(&props), string_list(&props, "UUIDs")),
        Err(e) => {
            warn!("Could not read device {}: {}", path, e);
            let device = address_from_device_path(path).map(|address| PeerDevice {
                address,
                name: None,
            });
            (device, Vec::new())
        }
    }
}

fn peer_from_props(props: &PropMap) -> Option<PeerDevice> {
    Some(PeerDevice {
        address: prop_cast::<String>(props, "Address")?.clone(),
        name: prop_cast::<String>(props, "Name").cloned(),
    })
}

fn string_list(props: &PropMap, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(|value| value.0.as_iter())
        .map(|items| items.filter_map(|item| item.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn parse_power_state(state: &str) -> Option<AdapterState> {
    match state {
        "on" => Some(AdapterState::On),
        "off" | "off-blocked" => Some(AdapterState::Off),
        "off-enabling" => Some(AdapterState::TurningOn),
        "on-disabling" => Some(AdapterState::TurningOff),
        _ => None,
    }
}

fn parse_transport_state(state: &str) -> Option<PlaybackState> {
    match state {
        "active" => Some(PlaybackState::Playing),
        "idle" | "pending" => Some(PlaybackState::NotPlaying),
        _ => None,
    }
}

fn roles_from_uuids(uuids: &[String]) -> RoleSet {
    uuids
        .iter()
        .filter_map(|uuid| uuid::Uuid::parse_str(uuid).ok())
        .filter_map(|uuid| Role::from_uuid(&uuid))
        .collect()
}

/// Devices that have not resolved their services yet get the benefit of the doubt.
fn may_stream_audio(uuids: &[String]) -> bool {
    uuids.is_empty() || roles_from_uuids(uuids).contains(&Role::Source)
}

fn role_list(roles: &RoleSet) -> String {
    roles.iter().map(|role| role.key()).collect::<Vec<_>>().join(",")
}

/// BlueZ takes whole seconds; zero would mean "forever".
fn timeout_secs(duration_ms: u64) -> u32 {
    let secs = duration_ms.div_ceil(1000).max(1);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

fn is_child_of(path: &str, parent: &str) -> bool {
    path.strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
}

fn device_path(adapter_path: &str, address: &str) -> String {
    format!("{}/dev_{}", adapter_path, address.replace(':', "_"))
}

/// `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/fd0` -> `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`
fn transport_device_path(path: &str) -> Option<&str> {
    let (parent, _) = path.rsplit_once('/')?;
    parent
        .rsplit('/')
        .next()
        .filter(|last| last.starts_with("dev_"))
        .map(|_| parent)
}

fn address_from_device_path(path: &str) -> Option<String> {
    let node = path.rsplit('/').next()?.strip_prefix("dev_")?;
    Some(node.replace('_', ":"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbus::arg::{RefArg, Variant};

    const ADAPTER: &str = "/org/bluez/hci0";
    const PHONE: &str = "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_01";

    fn props(entries: Vec<(&str, Box<dyn RefArg>)>) -> PropMap {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), Variant(value)))
            .collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn power_states_map_to_adapter_states() {
        assert_eq!(parse_power_state("on"), Some(AdapterState::On));
        assert_eq!(parse_power_state("off"), Some(AdapterState::Off));
        assert_eq!(parse_power_state("off-blocked"), Some(AdapterState::Off));
        assert_eq!(parse_power_state("off-enabling"), Some(AdapterState::TurningOn));
        assert_eq!(parse_power_state("on-disabling"), Some(AdapterState::TurningOff));
        assert_eq!(parse_power_state("sideways"), None);
    }

    #[test]
    fn adapter_uuids_map_to_roles() {
        let advertised = strings(&[
            "0000110a-0000-1000-8000-00805f9b34fb",
            "0000110c-0000-1000-8000-00805f9b34fb",
            "0000110e-0000-1000-8000-00805f9b34fb",
            "not-a-uuid",
        ]);
        assert_eq!(roles_from_uuids(&advertised), [Role::Source].into_iter().collect());

        let sink = strings(&[
            "0000110B-0000-1000-8000-00805F9B34FB",
            "0000110f-0000-1000-8000-00805f9b34fb",
        ]);
        assert_eq!(
            roles_from_uuids(&sink),
            [Role::Receiver, Role::RemoteControlTarget].into_iter().collect()
        );
    }

    #[test]
    fn sink_proxy_needs_the_sink_uuid() {
        let source_only = strings(&["0000110a-0000-1000-8000-00805f9b34fb"]);
        assert!(matches!(
            require_role(&source_only, Role::Receiver),
            Err(SinkError::UnsupportedRole(Role::Receiver))
        ));
        assert!(require_role(&[], Role::Receiver).is_err());

        let sink = strings(&[
            "0000110b-0000-1000-8000-00805f9b34fb",
            "0000110f-0000-1000-8000-00805f9b34fb",
        ]);
        assert!(require_role(&sink, Role::Receiver).is_ok());
    }

    #[tokio::test]
    async fn role_switch_hook_is_killed_after_timeout() {
        let mut hook = Command::new("sleep");
        hook.arg("30").stdin(Stdio::null()).kill_on_drop(true);

        let started = std::time::Instant::now();
        let result = run_hook(hook, Duration::from_millis(100)).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        match result {
            Err(SinkError::RoleSwitch(reason)) => assert!(reason.contains("timed out")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn role_switch_hook_reports_exit_status() {
        let status = run_hook(Command::new("true"), Duration::from_secs(5)).await.unwrap();
        assert!(status.success());

        let status = run_hook(Command::new("false"), Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
    }

    #[test]
    fn only_audio_sources_count_as_sink_peers() {
        assert!(may_stream_audio(&[]));
        assert!(may_stream_audio(&strings(&["0000110a-0000-1000-8000-00805f9b34fb"])));
        assert!(!may_stream_audio(&strings(&["00001124-0000-1000-8000-00805f9b34fb"])));
    }

    #[test]
    fn discoverable_timeouts_round_up_to_seconds() {
        assert_eq!(timeout_secs(300), 1);
        assert_eq!(timeout_secs(0), 1);
        assert_eq!(timeout_secs(1000), 1);
        assert_eq!(timeout_secs(1001), 2);
        assert_eq!(timeout_secs(120_000), 120);
    }

    #[test]
    fn device_paths_follow_bluez_layout() {
        assert_eq!(device_path(ADAPTER, "AA:BB:CC:DD:EE:01"), PHONE);
        assert_eq!(address_from_device_path(PHONE).as_deref(), Some("AA:BB:CC:DD:EE:01"));
        assert_eq!(address_from_device_path(ADAPTER), None);
        assert_eq!(transport_device_path(&format!("{}/fd3", PHONE)), Some(PHONE));
        assert_eq!(transport_device_path(PHONE), None);
        assert!(is_child_of(PHONE, ADAPTER));
        assert!(!is_child_of("/org/bluez/hci01/dev_X", ADAPTER));
        assert!(!is_child_of(ADAPTER, ADAPTER));
    }

    #[test]
    fn role_lists_are_comma_separated() {
        let roles: RoleSet = [Role::RemoteControlTarget, Role::Receiver].into_iter().collect();
        assert_eq!(role_list(&roles), "a2dp-sink,avrcp-controller");
    }

    #[test]
    fn peers_read_address_and_optional_name() {
        let named = props(vec![
            ("Address", Box::new("AA:BB:CC:DD:EE:01".to_string())),
            ("Name", Box::new("Alice's Phone".to_string())),
            ("Connected", Box::new(true)),
        ]);
        let unnamed = props(vec![("Address", Box::new("AA:BB:CC:DD:EE:02".to_string()))]);

        assert_eq!(
            peer_from_props(&named),
            Some(PeerDevice {
                address: "AA:BB:CC:DD:EE:01".to_string(),
                name: Some("Alice's Phone".to_string()),
            })
        );
        assert_eq!(peer_from_props(&unnamed).unwrap().name, None);
        assert_eq!(peer_from_props(&props(vec![])), None);

        let with_uuids = props(vec![(
            "UUIDs",
            Box::new(strings(&["0000110a-0000-1000-8000-00805f9b34fb"])),
        )]);
        assert_eq!(string_list(&with_uuids, "UUIDs").len(), 1);
        assert!(string_list(&with_uuids, "Missing").is_empty());
    }

    #[test]
    fn adapter_power_changes_are_deduplicated() {
        let mut translator = EventTranslator::new(ADAPTER.to_string(), AdapterState::Off);

        let enabling = props(vec![("PowerState", Box::new("off-enabling".to_string()))]);
        assert_eq!(
            translator.properties_changed(ADAPTER, ADAPTER_IFACE, &enabling),
            Some(Change::Adapter {
                previous: AdapterState::Off,
                current: AdapterState::TurningOn,
            })
        );

        let on = props(vec![
            ("PowerState", Box::new("on".to_string())),
            ("Powered", Box::new(true)),
        ]);
        assert_eq!(
            translator.properties_changed(ADAPTER, ADAPTER_IFACE, &on),
            Some(Change::Adapter {
                previous: AdapterState::TurningOn,
                current: AdapterState::On,
            })
        );

        let powered_again = props(vec![("Powered", Box::new(true))]);
        assert_eq!(translator.properties_changed(ADAPTER, ADAPTER_IFACE, &powered_again), None);

        let other_adapter = props(vec![("Powered", Box::new(false))]);
        assert_eq!(
            translator.properties_changed("/org/bluez/hci1", ADAPTER_IFACE, &other_adapter),
            None
        );
    }

    #[test]
    fn device_connection_changes_are_reported() {
        let mut translator = EventTranslator::new(ADAPTER.to_string(), AdapterState::On);

        let connected = props(vec![("Connected", Box::new(true))]);
        assert_eq!(
            translator.properties_changed(PHONE, DEVICE_IFACE, &connected),
            Some(Change::Connection {
                device_path: PHONE.to_string(),
                connected: true,
            })
        );

        let rssi_only = props(vec![("RSSI", Box::new(-40i16))]);
        assert_eq!(translator.properties_changed(PHONE, DEVICE_IFACE, &rssi_only), None);
    }

    #[test]
    fn transport_state_changes_become_playback_changes() {
        let mut translator = EventTranslator::new(ADAPTER.to_string(), AdapterState::On);
        let transport = format!("{}/fd0", PHONE);

        let active = props(vec![("State", Box::new("active".to_string()))]);
        assert_eq!(
            translator.properties_changed(&transport, TRANSPORT_IFACE, &active),
            Some(Change::Playback {
                device_path: PHONE.to_string(),
                previous: PlaybackState::NotPlaying,
                current: PlaybackState::Playing,
            })
        );
        assert_eq!(translator.properties_changed(&transport, TRANSPORT_IFACE, &active), None);

        let idle = props(vec![("State", Box::new("idle".to_string()))]);
        assert_eq!(
            translator.properties_changed(&transport, TRANSPORT_IFACE, &idle),
            Some(Change::Playback {
                device_path: PHONE.to_string(),
                previous: PlaybackState::Playing,
                current: PlaybackState::NotPlaying,
            })
        );
    }

    #[test]
    fn removing_the_adapter_loses_the_proxy() {
        let mut translator = EventTranslator::new(ADAPTER.to_string(), AdapterState::On);

        assert_eq!(
            translator.interfaces_removed(PHONE, &strings(&[DEVICE_IFACE])),
            None
        );
        assert_eq!(
            translator.interfaces_removed(ADAPTER, &strings(&[ADAPTER_IFACE, "org.bluez.Media1"])),
            Some(PlatformEvent::ProxyLost(Role::Receiver))
        );
    }
}
