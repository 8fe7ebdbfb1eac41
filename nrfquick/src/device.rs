//! Development kit model and serial endpoint discovery.
//!
//! A Nordic development kit shows up on the host as one USB composite
//! device exposing a debugger interface plus one or more virtual COM
//! ports. Discovery here is serial-port based: endpoints are classified by
//! their USB interface, then grouped into a [`Kit`] by serial number.

use std::path::{Path, PathBuf};

use log::{debug, info, trace};

use crate::error::{Error, Result};

/// Target core of a flashable firmware image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Core {
    /// Application core.
    Application,
    /// Network core (multi-core SoCs).
    Network,
    /// Cellular modem core.
    Modem,
}

impl Core {
    /// Core that is recovered when erasing this core.
    ///
    /// Modem images do not have an independently recoverable core; they are
    /// recovered via their carrier application core.
    #[must_use]
    pub fn recover_via(self) -> Self {
        match self {
            Self::Modem => Self::Application,
            Self::Application | Self::Network => self,
        }
    }

    /// Human-readable core name as shown in progress rows.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Network => "Network",
            Self::Modem => "Modem",
        }
    }
}

impl std::fmt::Display for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An external documentation or download link attached to a firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceLink {
    /// Display text.
    pub label: String,
    /// Target URL.
    pub href: String,
}

/// One flashable firmware image and its target core.
///
/// Immutable once chosen; a programming pipeline never mutates the firmware
/// list it was compiled from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Firmware {
    /// Core the image is flashed to.
    pub core: Core,
    /// Path to the image file (.hex or .zip, opaque to this crate).
    pub file: PathBuf,
    /// Optional link shown next to the progress row.
    #[cfg_attr(feature = "serde", serde(default))]
    pub link: Option<ResourceLink>,
}

impl Firmware {
    /// Create a firmware entry without a link.
    pub fn new(core: Core, file: impl Into<PathBuf>) -> Self {
        Self {
            core,
            file: file.into(),
            link: None,
        }
    }

    /// Attach a resource link.
    #[must_use]
    pub fn with_link(mut self, label: impl Into<String>, href: impl Into<String>) -> Self {
        self.link = Some(ResourceLink {
            label: label.into(),
            href: href.into(),
        });
        self
    }
}

/// A connected development kit as seen by the toolkit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kit {
    /// Debugger serial number identifying the kit.
    pub serial_number: String,
    /// Virtual COM port paths exposed by the kit, in enumeration order.
    pub ports: Vec<String>,
}

impl Kit {
    /// Create a kit handle.
    pub fn new(serial_number: impl Into<String>, ports: Vec<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            ports,
        }
    }

    /// Virtual COM port at the given index, if the kit exposes one.
    #[must_use]
    pub fn vcom(&self, index: usize) -> Option<&str> {
        self.ports.get(index).map(String::as_str)
    }
}

/// Known USB interface kinds found on Nordic development kits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    /// SEGGER J-Link on-board debugger (VCOM carrier on most DKs).
    JLink,
    /// Nordic Semiconductor native USB device.
    NordicUsb,
    /// Unknown interface.
    Unknown,
}

/// Known USB VIDs for interfaces exposed by Nordic kits.
const KNOWN_USB_INTERFACES: &[(u16, InterfaceKind)] = &[
    (0x1366, InterfaceKind::JLink),
    (0x1915, InterfaceKind::NordicUsb),
];

impl InterfaceKind {
    /// Classify a USB VID.
    #[must_use]
    pub fn from_vid(vid: u16) -> Self {
        for (known_vid, kind) in KNOWN_USB_INTERFACES {
            if vid == *known_vid {
                return *kind;
            }
        }
        Self::Unknown
    }

    /// Get a human-readable name for the interface kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JLink => "J-Link",
            Self::NordicUsb => "Nordic USB",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known kit interface.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Discovered serial endpoint information.
#[derive(Debug, Clone)]
pub struct DetectedPort {
    /// Endpoint path (e.g., "/dev/ttyACM0" or "COM7").
    pub name: String,
    /// Classified USB interface.
    pub interface: InterfaceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Debugger serial number (if available).
    pub serial: Option<String>,
}

impl DetectedPort {
    /// Check if this endpoint is likely a Nordic development kit port.
    pub fn is_likely_kit(&self) -> bool {
        self.interface.is_known()
    }
}

/// Detect all available serial endpoints with metadata.
pub fn detect_ports() -> Vec<DetectedPort> {
    let mut result = Vec::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for port_info in ports {
                let mut detected = DetectedPort {
                    name: port_info.port_name.clone(),
                    interface: InterfaceKind::Unknown,
                    vid: None,
                    pid: None,
                    product: None,
                    serial: None,
                };

                if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                    detected.vid = Some(usb_info.vid);
                    detected.pid = Some(usb_info.pid);
                    detected.product = usb_info.product;
                    detected.serial = usb_info.serial_number;
                    detected.interface = InterfaceKind::from_vid(usb_info.vid);

                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X}, Interface: {:?})",
                        port_info.port_name, usb_info.vid, usb_info.pid, detected.interface
                    );
                }

                result.push(detected);
            }
        },
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
        },
    }

    result
}

/// Detect endpoints that are likely Nordic development kit ports.
pub fn detect_kit_ports() -> Vec<DetectedPort> {
    detect_ports()
        .into_iter()
        .filter(DetectedPort::is_likely_kit)
        .collect()
}

/// Auto-detect a single kit endpoint.
pub fn auto_detect_port() -> Result<DetectedPort> {
    let ports = detect_ports();

    if let Some(port) = ports.iter().find(|p| p.interface == InterfaceKind::JLink) {
        info!("Auto-detected J-Link VCOM port: {}", port.name);
        return Ok(port.clone());
    }

    if let Some(port) = ports.iter().find(|p| p.interface.is_known()) {
        info!(
            "Auto-detected {} port: {}",
            port.interface.name(),
            port.name
        );
        return Ok(port.clone());
    }

    if let Some(port) = ports.into_iter().next() {
        info!("Using first available port: {}", port.name);
        return Ok(port);
    }

    Err(Error::DeviceNotConnected)
}

/// Group detected kit ports into [`Kit`] handles by debugger serial number.
///
/// Ports without a serial number are ignored; port order within a kit
/// follows enumeration order, which matches the VCOM index numbering used
/// by action-list entries.
pub fn kits_from_ports(ports: &[DetectedPort]) -> Vec<Kit> {
    let mut kits: Vec<Kit> = Vec::new();

    for port in ports {
        if !port.is_likely_kit() {
            continue;
        }
        let Some(serial) = port.serial.as_deref() else {
            continue;
        };

        match kits.iter_mut().find(|k| k.serial_number == serial) {
            Some(kit) => kit.ports.push(port.name.clone()),
            None => kits.push(Kit::new(serial, vec![port.name.clone()])),
        }
    }

    kits
}

/// Check that a firmware file path looks flashable (exists and has a
/// recognized extension). The image format itself is opaque to this crate.
pub fn check_firmware_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Firmware file not found: {}",
            path.display()
        )));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("hex" | "zip") => Ok(()),
        _ => Err(Error::Config(format!(
            "Unsupported firmware file type: {}",
            path.display()
        ))),
    }
}
