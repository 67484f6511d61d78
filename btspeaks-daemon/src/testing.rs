//! In-memory stand-ins for the host stack, shared by the unit tests.

use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

use crate::error::{Result, SinkError};
use crate::platform::{
    DiscoverabilityWindow, DiscoverableOutcome, Disconnect, PeerDevice, ProfileManager,
    ProfileProxy, QueueMode, RadioAdapter, Role, RoleSet, SpeechEngine,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enable,
    SetName(String),
    RequestDiscoverable(u64),
    AcquireProxy(Role),
    ReleaseProxy(Role),
    EnableAndDisable { enable: RoleSet, disable: RoleSet },
    Disconnect(String),
    SetLanguage(String),
    Speak(String),
    StopSpeech,
    ShutdownSpeech,
}

/// Ordered record of every call made against the fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn utterances(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Speak(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| pred(call)).count()
    }
}

/// Formatted log output, captured while the guard from [`capture_logs`] is alive.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's `tracing` output into a buffer.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}

pub fn peer(address: &str, name: Option<&str>) -> PeerDevice {
    PeerDevice {
        address: address.to_string(),
        name: name.map(str::to_string),
    }
}

pub struct FakeAdapter {
    journal: Journal,
    enabled: AtomicBool,
    cancel_discoverable: AtomicBool,
    devices: Mutex<Vec<PeerDevice>>,
}

impl FakeAdapter {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            enabled: AtomicBool::new(true),
            cancel_discoverable: AtomicBool::new(false),
            devices: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled(journal: &Journal) -> Self {
        let adapter = Self::new(journal);
        adapter.set_enabled(false);
        adapter
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn cancel_discoverable(&self) {
        self.cancel_discoverable.store(true, Ordering::SeqCst);
    }

    pub fn with_devices(self, devices: Vec<PeerDevice>) -> Self {
        *self.devices.lock().unwrap() = devices;
        self
    }
}

#[async_trait]
impl RadioAdapter for FakeAdapter {
    type Proxy = FakeProxy;

    async fn is_enabled(&self) -> Result<bool> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    async fn enable(&self) -> Result<()> {
        self.journal.record(Call::Enable);
        Ok(())
    }

    async fn set_name(&self, name: &str) -> Result<()> {
        self.journal.record(Call::SetName(name.to_string()));
        Ok(())
    }

    async fn request_discoverable(&self, window: DiscoverabilityWindow) -> Result<DiscoverableOutcome> {
        self.journal.record(Call::RequestDiscoverable(window.duration_ms));
        if self.cancel_discoverable.load(Ordering::SeqCst) {
            Ok(DiscoverableOutcome::Cancelled)
        } else {
            Ok(DiscoverableOutcome::Granted(window))
        }
    }

    async fn acquire_proxy(&self, role: Role) -> Result<FakeProxy> {
        self.journal.record(Call::AcquireProxy(role));
        let devices = self.devices.lock().unwrap().clone();
        Ok(FakeProxy::with_journal(devices, self.journal.clone()))
    }

    async fn release_proxy(&self, proxy: FakeProxy) {
        self.journal.record(Call::ReleaseProxy(proxy.role()));
    }
}

#[derive(Clone)]
pub struct FakeProxy {
    journal: Journal,
    devices: Arc<Mutex<Vec<PeerDevice>>>,
    fail: Arc<AtomicBool>,
}

impl FakeProxy {
    pub fn new(devices: Vec<PeerDevice>) -> Self {
        Self::with_journal(devices, Journal::default())
    }

    fn with_journal(devices: Vec<PeerDevice>, journal: Journal) -> Self {
        Self {
            journal,
            devices: Arc::new(Mutex::new(devices)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_disconnects(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn disconnected(&self) -> Vec<String> {
        self.journal
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Disconnect(address) => Some(address),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProfileProxy for FakeProxy {
    fn role(&self) -> Role {
        Role::Receiver
    }

    async fn connected_devices(&self) -> Result<Vec<PeerDevice>> {
        Ok(self.devices.lock().unwrap().clone())
    }
}

#[async_trait]
impl Disconnect for FakeProxy {
    async fn disconnect(&self, device: &PeerDevice) -> Result<()> {
        self.journal.record(Call::Disconnect(device.address.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::UnsupportedRole(self.role()));
        }
        Ok(())
    }
}

pub struct FakeProfiles {
    journal: Journal,
    roles: Mutex<RoleSet>,
    hang: AtomicBool,
}

impl FakeProfiles {
    pub fn new(journal: &Journal, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            journal: journal.clone(),
            roles: Mutex::new(roles.into_iter().collect()),
            hang: AtomicBool::new(false),
        }
    }

    /// Role switches never complete, like a hook that stops responding.
    pub fn hang_switches(self) -> Self {
        self.hang.store(true, Ordering::SeqCst);
        self
    }

    pub fn roles(&self) -> RoleSet {
        self.roles.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileManager for FakeProfiles {
    async fn enabled_roles(&self) -> Result<RoleSet> {
        Ok(self.roles())
    }

    async fn enable_and_disable(&self, enable: &RoleSet, disable: &RoleSet) -> Result<()> {
        self.journal.record(Call::EnableAndDisable {
            enable: enable.clone(),
            disable: disable.clone(),
        });
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let mut roles = self.roles.lock().unwrap();
        roles.retain(|role| !disable.contains(role));
        roles.extend(enable.iter().copied());
        Ok(())
    }
}

pub struct FakeSpeech {
    journal: Journal,
}

impl FakeSpeech {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl SpeechEngine for FakeSpeech {
    async fn set_language(&self, locale: &str) -> Result<()> {
        self.journal.record(Call::SetLanguage(locale.to_string()));
        Ok(())
    }

    async fn speak(&self, utterance: &str, _mode: QueueMode) -> Result<()> {
        self.journal.record(Call::Speak(utterance.to_string()));
        Ok(())
    }

    async fn stop(&self) {
        self.journal.record(Call::StopSpeech);
    }

    async fn shutdown(&self) {
        self.journal.record(Call::ShutdownSpeech);
    }
}
