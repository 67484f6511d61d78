use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::platform::QueueMode;

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: String,
    pub bluetooth: BluetoothConfig,
    pub speech: SpeechConfig,
    pub buttons: ButtonsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter to drive, e.g. `hci0`. The first adapter BlueZ reports when unset.
    pub adapter: Option<String>,
    pub friendly_name: String,
    pub discoverable_timeout_ms: u64,
    pub power_on_at_start: bool,
    /// Program (and arguments) that reconfigures the audio stack's roles.
    pub role_switch_command: Vec<String>,
    /// The role switch is abandoned (and the hook killed) after this long.
    pub role_switch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub program: String,
    pub locale: String,
    pub queue_mode: QueueMode,
}

/// Physical Pair / Disconnect buttons wired to GPIO lines.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ButtonsConfig {
    /// GPIO character device, e.g. `/dev/gpiochip0`. Buttons are off when unset.
    pub chip: Option<String>,
    pub pair_line: u32,
    pub disconnect_line: u32,
    pub debounce_ms: u64,
    /// Buttons short the line to ground; the line is pulled up otherwise.
    pub pressed_when_low: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/run/btspeaks/btspeaks.sock".to_string(),
            bluetooth: BluetoothConfig::default(),
            speech: SpeechConfig::default(),
            buttons: ButtonsConfig::default(),
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            friendly_name: "Bluetooth Speaks Things".to_string(),
            discoverable_timeout_ms: 300,
            power_on_at_start: true,
            role_switch_command: Vec::new(),
            role_switch_timeout_ms: 10_000,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "espeak-ng".to_string(),
            locale: "en-US".to_string(),
            queue_mode: QueueMode::Add,
        }
    }
}

// BCM21 / BCM20 on a Raspberry Pi header.
impl Default for ButtonsConfig {
    fn default() -> Self {
        Self {
            chip: None,
            pair_line: 21,
            disconnect_line: 20,
            debounce_ms: 20,
            pressed_when_low: true,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("invalid configuration in {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Create default config if not found
                let config = Self::default();
                if let Err(e) = fs::write(path, toml::to_string_pretty(&config)?) {
                    tracing::debug!("Could not write default config to {}: {}", path.display(), e);
                }
                Ok(config)
            }
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults_and_writes_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btspeaksd.toml");

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.bluetooth.friendly_name, "Bluetooth Speaks Things");
        assert_eq!(config.bluetooth.discoverable_timeout_ms, 300);
        assert_eq!(config.speech.locale, "en-US");
        assert!(config.buttons.chip.is_none());
        assert!(path.exists());

        let reloaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(reloaded.socket_path, config.socket_path);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btspeaksd.toml");
        fs::write(
            &path,
            r#"
[bluetooth]
adapter = "hci1"
discoverable_timeout_ms = 120000
role_switch_command = ["/usr/local/bin/bt-roles", "--restart"]

[speech]
queue_mode = "flush"

[buttons]
chip = "/dev/gpiochip4"
pair_line = 17
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.bluetooth.adapter.as_deref(), Some("hci1"));
        assert_eq!(config.bluetooth.discoverable_timeout_ms, 120_000);
        assert_eq!(config.bluetooth.role_switch_command.len(), 2);
        assert_eq!(config.bluetooth.role_switch_timeout_ms, 10_000);
        assert_eq!(config.bluetooth.friendly_name, "Bluetooth Speaks Things");
        assert!(config.bluetooth.power_on_at_start);
        assert_eq!(config.speech.queue_mode, QueueMode::Flush);
        assert_eq!(config.speech.program, "espeak-ng");
        assert_eq!(config.socket_path, "/run/btspeaks/btspeaks.sock");
        assert_eq!(config.buttons.chip.as_deref(), Some("/dev/gpiochip4"));
        assert_eq!(config.buttons.pair_line, 17);
        assert_eq!(config.buttons.disconnect_line, 20);
        assert!(config.buttons.pressed_when_low);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btspeaksd.toml");
        fs::write(&path, "bluetooth = 3").unwrap();

        assert!(DaemonConfig::load(&path).is_err());
    }
}
