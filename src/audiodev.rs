use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::CaptureError;

/// A capturable loopback audio device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub name: String,
    pub is_virtual: bool,
}

/// Enumerates the loopback devices available on this machine.
///
/// OS-specific enumeration stays behind this trait; the pipeline only cares
/// about the resolved device name it hands to the capture command.
#[async_trait]
pub trait AudioDeviceProvider: Send + Sync {
    async fn devices(&self) -> Result<Vec<AudioDevice>, CaptureError>;
}

/// Picks the capture device: a virtual loopback device if one exists,
/// otherwise the system stereo-mix device, otherwise fail fast before any
/// recording starts.
pub async fn resolve(provider: &dyn AudioDeviceProvider) -> Result<AudioDevice, CaptureError> {
    let devices = provider.devices().await?;

    if let Some(device) = devices.iter().find(|d| d.is_virtual) {
        debug!("Using virtual audio device: {}", device.name);
        return Ok(device.clone());
    }

    if let Some(device) = devices
        .iter()
        .find(|d| d.name.to_lowercase().contains("stereo"))
    {
        debug!("Using stereo mix audio device: {}", device.name);
        return Ok(device.clone());
    }

    Err(CaptureError::AudioDeviceUnavailable)
}

/// Provider for an explicitly configured device name. The configured device
/// is trusted to exist and treated as virtual so resolution always picks it.
pub struct ConfiguredDevice {
    name: String,
}

impl ConfiguredDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AudioDeviceProvider for ConfiguredDevice {
    async fn devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        Ok(vec![AudioDevice {
            name: self.name.clone(),
            is_virtual: true,
        }])
    }
}

fn is_virtual_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("cable output") || lower.contains("virtual")
}

/// Parses the transcoder's device-list output (`-list_devices true`).
///
/// Device entries arrive as two consecutive lines, the display name and the
/// alternative name; only entries tagged as audio are kept.
#[derive(Debug)]
pub struct DeviceListParser {
    name_pattern: Regex,
    alt_pattern: Regex,
    devices: Vec<AudioDevice>,
    pending: Option<String>,
}

impl Default for DeviceListParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceListParser {
    pub fn new() -> Self {
        Self {
            name_pattern: Regex::new(r#"^\[dshow\s+[^\]]+\]\s+"([^"]+)"\s+\(([^\)]+)\)\s*$"#)
                .expect("device name pattern is valid"),
            alt_pattern: Regex::new(r#"^\[dshow\s+[^\]]+\]\s+Alternative name "([^"]+)"\s*$"#)
                .expect("alternative name pattern is valid"),
            devices: Vec::new(),
            pending: None,
        }
    }

    pub fn feed(&mut self, line: &str) {
        if let Some(caps) = self.name_pattern.captures(line) {
            if caps[2].eq_ignore_ascii_case("audio") {
                self.pending = Some(caps[1].to_string());
            } else {
                self.pending = None;
            }
        } else if self.alt_pattern.is_match(line) {
            if let Some(name) = self.pending.take() {
                let is_virtual = is_virtual_name(&name);
                self.devices.push(AudioDevice { name, is_virtual });
            }
        }
    }

    pub fn into_devices(self) -> Vec<AudioDevice> {
        self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDevices(Vec<AudioDevice>);

    #[async_trait]
    impl AudioDeviceProvider for FixedDevices {
        async fn devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
            Ok(self.0.clone())
        }
    }

    fn device(name: &str, is_virtual: bool) -> AudioDevice {
        AudioDevice {
            name: name.to_string(),
            is_virtual,
        }
    }

    #[tokio::test]
    async fn test_resolve_prefers_virtual_device() {
        let provider = FixedDevices(vec![
            device("Stereo Mix (Realtek)", false),
            device("CABLE Output (VB-Audio Virtual Cable)", true),
        ]);
        let resolved = resolve(&provider).await.unwrap();
        assert!(resolved.is_virtual);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_stereo_mix() {
        let provider = FixedDevices(vec![
            device("Microphone (USB)", false),
            device("Stereo Mix (Realtek)", false),
        ]);
        let resolved = resolve(&provider).await.unwrap();
        assert_eq!(resolved.name, "Stereo Mix (Realtek)");
    }

    #[tokio::test]
    async fn test_resolve_fails_without_loopback_device() {
        let provider = FixedDevices(vec![device("Microphone (USB)", false)]);
        assert!(matches!(
            resolve(&provider).await,
            Err(CaptureError::AudioDeviceUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_configured_device_always_resolves() {
        let provider = ConfiguredDevice::new("my-loopback");
        let resolved = resolve(&provider).await.unwrap();
        assert_eq!(resolved.name, "my-loopback");
    }

    #[test]
    fn test_device_list_parser() {
        let mut parser = DeviceListParser::new();
        parser.feed(r#"[dshow @ 0x1234] "Integrated Camera" (video)"#);
        parser.feed(r#"[dshow @ 0x1234] Alternative name "@device_pnp_cam""#);
        parser.feed(r#"[dshow @ 0x1234] "CABLE Output (VB-Audio Virtual Cable)" (audio)"#);
        parser.feed(r#"[dshow @ 0x1234] Alternative name "@device_cm_cable""#);
        parser.feed(r#"[dshow @ 0x1234] "Stereo Mix (Realtek)" (audio)"#);
        parser.feed(r#"[dshow @ 0x1234] Alternative name "@device_cm_stereo""#);

        let devices = parser.into_devices();
        assert_eq!(devices.len(), 2);
        assert!(devices[0].is_virtual);
        assert!(!devices[1].is_virtual);
    }
}
