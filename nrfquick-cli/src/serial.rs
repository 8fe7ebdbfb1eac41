//! Interactive kit and serial port selection.
//!
//! Selection must be deterministic in non-interactive mode: zero or several
//! candidates are usage errors (exit code 2) so CI callers fail fast
//! instead of hanging on a prompt.

use std::io::IsTerminal;

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme};
use log::{debug, info};
use nrfquick::device::{Kit, detect_kit_ports, kits_from_ports};

use crate::CliError;
use crate::config::Config;

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Usage(
            "Interactive selection requires a terminal; pass --serial-number or --port".to_string(),
        )
        .into())
    }
}

/// Map a dialoguer failure to the right exit-code class: Ctrl-C during a
/// prompt is a cancellation, anything else an unusable environment.
pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Selection cancelled".to_string()).into()
            } else {
                CliError::Usage("Interactive prompt failed".to_string()).into()
            }
        },
    }
}

/// Select the development kit to operate on.
///
/// Priority: explicit serial number, then the configured one, then
/// auto-selection when exactly one kit is attached, then an interactive
/// prompt.
pub fn select_kit(
    serial_number: Option<&str>,
    config: &Config,
    non_interactive: bool,
) -> Result<Kit> {
    let kits = kits_from_ports(&detect_kit_ports());

    let wanted = serial_number.or(config.connection.serial_number.as_deref());
    if let Some(serial) = wanted {
        return kits
            .into_iter()
            .find(|kit| kit.serial_number == serial)
            .ok_or_else(|| usage_err(&format!("No kit with serial number {serial} detected")));
    }

    match kits.len() {
        0 => Err(usage_err("No development kit detected")),
        1 => {
            let kit = kits
                .into_iter()
                .next()
                .ok_or_else(|| usage_err("No development kit detected"))?;
            info!(
                "Auto-selected kit {} ({} port(s))",
                kit.serial_number,
                kit.ports.len()
            );
            Ok(kit)
        },
        _ if non_interactive => Err(usage_err(
            "Multiple kits detected; pass --serial-number to pick one",
        )),
        _ => {
            ensure_interactive_terminal()?;
            select_kit_interactive(kits)
        },
    }
}

fn select_kit_interactive(kits: Vec<Kit>) -> Result<Kit> {
    let items: Vec<String> = kits
        .iter()
        .map(|kit| format!("{} ({})", kit.serial_number, kit.ports.join(", ")))
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a development kit")
        .items(&items)
        .default(0)
        .interact()
        .map_err(map_prompt_error)?;

    kits.into_iter()
        .nth(selection)
        .ok_or_else(|| usage_err("Kit selection out of range"))
}

/// Candidate serial port paths for an AT transport.
///
/// An explicit port (CLI flag or config) short-circuits kit detection;
/// otherwise all of the selected kit's virtual COM ports are candidates,
/// to be probed from the last one backward.
pub fn candidate_ports(
    port: Option<&str>,
    serial_number: Option<&str>,
    config: &Config,
    non_interactive: bool,
) -> Result<Vec<String>> {
    if let Some(port) = port.or(config.connection.port.as_deref()) {
        debug!("Using explicit port {port}");
        return Ok(vec![port.to_string()]);
    }

    let kit = select_kit(serial_number, config, non_interactive)?;
    if kit.ports.is_empty() {
        return Err(usage_err(&format!(
            "Kit {} exposes no serial ports",
            kit.serial_number
        )));
    }
    Ok(kit.ports)
}

/// Offer to remember a port that was selected interactively.
pub fn ask_remember_port(port: &str, config: &mut Config) -> Result<()> {
    let remember = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remember {} for future sessions?", style(port).cyan()))
        .default(false)
        .interact()
        .map_err(map_prompt_error)?;

    if remember {
        config.remember_port(port)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_port_short_circuits_detection() {
        let config = Config::default();
        let ports = candidate_ports(Some("/dev/ttyACM9"), None, &config, true).unwrap();
        assert_eq!(ports, ["/dev/ttyACM9"]);
    }

    #[test]
    fn test_configured_port_used_when_no_flag() {
        let mut config = Config::default();
        config.connection.port = Some("COM7".to_string());
        let ports = candidate_ports(None, None, &config, true).unwrap();
        assert_eq!(ports, ["COM7"]);
    }

    #[test]
    fn test_prompt_interruption_maps_to_cancelled() {
        let err = map_prompt_error(DialoguerError::IO(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "ctrl-c",
        )));
        let cli_err = err.downcast_ref::<CliError>().expect("CliError");
        assert!(matches!(cli_err, CliError::Cancelled(_)));
    }

    #[test]
    fn test_prompt_io_failure_maps_to_usage() {
        let err = map_prompt_error(DialoguerError::IO(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "not a terminal",
        )));
        let cli_err = err.downcast_ref::<CliError>().expect("CliError");
        assert!(matches!(cli_err, CliError::Usage(_)));
    }

    #[test]
    fn test_unknown_serial_number_is_usage_error() {
        let config = Config::default();
        let err = select_kit(Some("does-not-exist"), &config, true).unwrap_err();
        let cli_err = err.downcast_ref::<CliError>().expect("CliError");
        assert!(matches!(cli_err, CliError::Usage(_)));
    }
}
