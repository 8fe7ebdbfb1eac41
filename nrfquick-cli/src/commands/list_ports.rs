//! List-ports command implementation.

use console::style;
use nrfquick::device::{detect_ports, kits_from_ports};
use serde::Serialize;

#[derive(Serialize)]
struct PortEntry<'a> {
    name: &'a str,
    interface: &'a str,
    known: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial: Option<&'a str>,
}

/// List-ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) {
    let ports = detect_ports();

    if json {
        let entries: Vec<PortEntry<'_>> = ports
            .iter()
            .map(|p| PortEntry {
                name: &p.name,
                interface: p.interface.name(),
                known: p.interface.is_known(),
                vid: p.vid,
                pid: p.pid,
                product: p.product.as_deref(),
                serial: p.serial.as_deref(),
            })
            .collect();
        // Stdout carries only the JSON document.
        match serde_json::to_string_pretty(&entries) {
            Ok(doc) => println!("{doc}"),
            Err(e) => eprintln!("Failed to serialize port list: {e}"),
        }
        return;
    }

    if ports.is_empty() {
        eprintln!("{} No serial ports detected", style("✗").red());
        return;
    }

    eprintln!("{} Detected serial ports:", style("🔌").cyan());
    for port in &ports {
        let marker = if port.is_likely_kit() {
            style("●").green()
        } else {
            style("○").dim()
        };
        let usb = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" [{vid:04X}:{pid:04X}]"),
            _ => String::new(),
        };
        let product = port.product.as_deref().unwrap_or("");
        eprintln!(
            "  {} {:<16} {}{}  {}",
            marker,
            port.name,
            port.interface.name(),
            usb,
            style(product).dim()
        );
    }

    let kits = kits_from_ports(&ports);
    if kits.is_empty() {
        eprintln!("\nNo development kits recognized.");
    } else {
        eprintln!("\n{} Development kits:", style("✓").green());
        for kit in &kits {
            eprintln!(
                "  {} ({})",
                style(&kit.serial_number).bold(),
                kit.ports.join(", ")
            );
        }
    }
}
