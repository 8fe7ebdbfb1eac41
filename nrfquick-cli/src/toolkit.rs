//! `nrfutil device`-backed implementation of the device toolkit.
//!
//! Programming primitives shell out to the `nrfutil` binary; JSON progress
//! lines on its stdout are forwarded to the engine's progress callback.
//! The modem version query goes over the library's own AT transport rather
//! than through nrfutil.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, trace, warn};
use nrfquick::device::{Core, Kit};
use nrfquick::error::{Error, Result};
use nrfquick::program::{ResetKind, Toolkit};
use nrfquick::transport;

/// Toolkit backed by the `nrfutil` command-line tool.
pub struct NrfutilToolkit {
    program: String,
    baud: u32,
}

impl NrfutilToolkit {
    /// Create a toolkit using `nrfutil` from `PATH`.
    #[must_use]
    pub fn new(baud: u32) -> Self {
        Self {
            program: "nrfutil".to_string(),
            baud,
        }
    }

    /// Override the nrfutil binary, e.g. for tests.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program).args(args).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Toolkit(format!(
                "{} {} failed: {}",
                self.program,
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `--core` argument for a target core.
///
/// Modem bundles carry their own target information; nrfutil rejects an
/// explicit core argument for them.
fn core_arg(core: Core) -> Option<&'static str> {
    match core {
        Core::Application => Some("Application"),
        Core::Network => Some("Network"),
        Core::Modem => None,
    }
}

/// `--reset-kind` argument for a reset mode.
fn reset_arg(mode: ResetKind) -> &'static str {
    match mode {
        ResetKind::System => "RESET_SYSTEM",
        ResetKind::Pin => "RESET_PIN",
    }
}

/// Serial numbers reported by `nrfutil device list --json`.
fn parse_device_list(json: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(json) else {
        warn!("Unparseable device list from nrfutil");
        return Vec::new();
    };

    value
        .get("devices")
        .and_then(|devices| devices.as_array())
        .map(|devices| {
            devices
                .iter()
                .filter_map(|device| device.get("serialNumber"))
                .filter_map(|serial| serial.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Extract a completion percentage from one JSON progress line.
///
/// nrfutil emits `{"progress": {"progressPercentage": N, ...}}` objects,
/// sometimes nested under a `data` envelope depending on the version.
fn parse_progress_line(line: &str) -> Option<u8> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let progress = value
        .get("progress")
        .or_else(|| value.get("data").and_then(|data| data.get("progress")))?;
    let pct = progress.get("progressPercentage")?.as_u64()?;
    u8::try_from(pct.min(100)).ok()
}

impl Toolkit for NrfutilToolkit {
    fn is_connected(&mut self, kit: &Kit) -> bool {
        match self.run(&["device", "list", "--json"]) {
            Ok(stdout) => parse_device_list(&stdout)
                .iter()
                .any(|serial| *serial == kit.serial_number),
            Err(e) => {
                warn!("Device enumeration failed: {e}");
                false
            },
        }
    }

    fn recover(&mut self, kit: &Kit, core: Core) -> Result<()> {
        let mut args = vec!["device", "recover", "--serial-number", kit.serial_number.as_str()];
        if let Some(core) = core_arg(core) {
            args.extend(["--core", core]);
        }
        self.run(&args)?;
        Ok(())
    }

    fn program(
        &mut self,
        kit: &Kit,
        file: &Path,
        core: Core,
        progress: &mut dyn FnMut(u8),
    ) -> Result<()> {
        let firmware = file.to_string_lossy().into_owned();
        let mut args = vec![
            "device",
            "program",
            "--serial-number",
            kit.serial_number.as_str(),
            "--firmware",
            firmware.as_str(),
            "--json",
        ];
        if let Some(core) = core_arg(core) {
            args.extend(["--core", core]);
        }

        debug!("Running {} {}", self.program, args.join(" "));
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                trace!("nrfutil: {line}");
                if let Some(pct) = parse_progress_line(&line) {
                    progress(pct);
                }
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Toolkit(format!(
                "Programming {} failed: {}",
                file.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn reset(&mut self, kit: &Kit, mode: ResetKind) -> Result<()> {
        self.run(&[
            "device",
            "reset",
            "--serial-number",
            kit.serial_number.as_str(),
            "--reset-kind",
            reset_arg(mode),
        ])?;
        Ok(())
    }

    fn query_modem_version(&mut self, kit: &Kit, vcom_index: usize) -> Result<String> {
        let path = kit.vcom(vcom_index).ok_or_else(|| {
            Error::Config(format!(
                "Kit {} has no virtual COM port at index {vcom_index}",
                kit.serial_number
            ))
        })?;

        let mut session = transport::connect(path, self.baud)?;
        let response = session.send_command("AT+CGMR")?;
        session.close();
        Ok(response)
    }
}
