//! AT command verification: run a guide's command list against a connected
//! kit and track the run's lifecycle.
//!
//! Verification proves that flashed firmware actually runs: each guide step
//! names an AT command and a regex that must extract something meaningful
//! from the response. Commands run strictly sequentially over one transport
//! session, and the first failed command aborts the run.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::Result;
use crate::format::format_response;
use crate::transport::Transport;

/// Settle delay before the legacy single-command verification path.
///
/// Older firmware needs time after reset before its AT host answers at all.
pub const LEGACY_SETTLE_DELAY: Duration = Duration::from_millis(3000);

/// Response window for the legacy verification command.
pub const LEGACY_RESPONSE_TIMEOUT: Duration = Duration::from_millis(3000);

/// One verification step from a device guide.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AtCommand {
    /// Human-readable step name (e.g. "IMEI").
    pub title: String,
    /// AT command to send, without terminator (e.g. "AT+CGSN=1").
    pub command: String,
    /// Pattern applied to the formatted response; capture group 1 is the
    /// extracted value.
    pub response_regex: String,
    /// Whether the extracted value is worth offering to the clipboard.
    #[cfg_attr(feature = "serde", serde(default))]
    pub copiable: bool,
}

/// Run a guide's verification commands in order, fail-fast.
///
/// Returns one extracted value per command, in command order. A command
/// whose response does not match its pattern contributes an empty string;
/// a command the device rejects (or that times out) aborts the whole run
/// with the transport's error.
pub fn run_verification(
    commands: &[AtCommand],
    transport: &mut Transport,
) -> Result<Vec<String>> {
    let mut responses = Vec::with_capacity(commands.len());

    for cmd in commands {
        info!("Verifying {}: {}", cmd.title, cmd.command);
        let raw = transport.send_command(&cmd.command)?;
        let value = format_response(&raw, &cmd.response_regex).unwrap_or_default();
        if value.is_empty() {
            debug!("{}: response did not match {:?}", cmd.title, cmd.response_regex);
        }
        responses.push(value);
    }

    Ok(responses)
}

/// Legacy single-command verification for guides that predate command lists.
///
/// Waits out [`LEGACY_SETTLE_DELAY`], then issues the command with the wider
/// [`LEGACY_RESPONSE_TIMEOUT`] window.
pub fn run_legacy_verification(command: &AtCommand, transport: &mut Transport) -> Result<String> {
    legacy_with_delays(command, transport, LEGACY_SETTLE_DELAY, LEGACY_RESPONSE_TIMEOUT)
}

fn legacy_with_delays(
    command: &AtCommand,
    transport: &mut Transport,
    settle: Duration,
    window: Duration,
) -> Result<String> {
    if !settle.is_zero() {
        debug!("Waiting {}ms before legacy verification", settle.as_millis());
        thread::sleep(settle);
    }

    let raw = transport.send_command_with_timeout(&command.command, window)?;
    Ok(format_response(&raw, &command.response_regex).unwrap_or_default())
}

/// Lifecycle of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    /// No run attempted yet.
    Idle,
    /// Commands are being executed.
    Verifying,
    /// All commands ran and extracted values are available.
    Success,
    /// A command failed; the run may be retried.
    Failed,
}

/// Tracks one kit's verification runs across retries.
///
/// `show_skip` is sticky: once any run has failed, the session keeps
/// offering the skip option even if a later retry succeeds, so a user who
/// saw a failure is never stranded without an exit.
#[derive(Debug)]
pub struct VerifySession {
    state: VerifyState,
    responses: Vec<String>,
    show_skip: bool,
}

impl Default for VerifySession {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifySession {
    /// Create a fresh session in [`VerifyState::Idle`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: VerifyState::Idle,
            responses: Vec::new(),
            show_skip: false,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> VerifyState {
        self.state
    }

    /// Extracted values from the last successful run.
    #[must_use]
    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    /// Whether a skip option should be offered.
    #[must_use]
    pub fn show_skip(&self) -> bool {
        self.show_skip
    }

    /// Begin a run (initial attempt or retry after failure).
    pub fn start(&mut self) {
        match self.state {
            VerifyState::Idle | VerifyState::Failed => {
                self.responses.clear();
                self.state = VerifyState::Verifying;
            },
            VerifyState::Verifying | VerifyState::Success => {
                warn!("Ignoring verification start in state {:?}", self.state);
            },
        }
    }

    /// Record a completed run.
    pub fn complete(&mut self, responses: Vec<String>) {
        match self.state {
            VerifyState::Verifying => {
                self.responses = responses;
                self.state = VerifyState::Success;
            },
            VerifyState::Idle | VerifyState::Success | VerifyState::Failed => {
                warn!("Ignoring verification completion in state {:?}", self.state);
            },
        }
    }

    /// Record a failed run. Enables the sticky skip option.
    pub fn fail(&mut self) {
        match self.state {
            VerifyState::Verifying => {
                self.state = VerifyState::Failed;
                self.show_skip = true;
            },
            VerifyState::Idle | VerifyState::Success | VerifyState::Failed => {
                warn!("Ignoring verification failure in state {:?}", self.state);
            },
        }
    }

    /// Drive one full run over a transport, updating the session state.
    pub fn run(
        &mut self,
        commands: &[AtCommand],
        transport: &mut Transport,
    ) -> Result<&[String]> {
        self.start();
        match run_verification(commands, transport) {
            Ok(responses) => {
                self.complete(responses);
                Ok(self.responses())
            },
            Err(e) => {
                self.fail();
                Err(e)
            },
        }
    }
}
