//! Serial transport negotiation and the uniform AT command interface.
//!
//! Flashed firmware speaks AT either directly on the virtual COM port
//! ("line mode": bare `OK`/`ERROR` terminators) or behind a Zephyr shell
//! ("shell mode": prompt, command echo and timestamped logging around the
//! response). The negotiator probes the port once and hides the difference
//! behind [`Transport::send_command`].
//!
//! The probe is sent before any caller command on purpose: some line-mode
//! AT hosts return a spurious `ERROR` for the very first command after a
//! power cycle, and the probe absorbs it so the caller's real first command
//! is not misattributed as a failure.

pub mod shell;

use std::io::Read;
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::port::{NativePort, Port, PortClaim, SerialConfig, claim_port};
use shell::{ShellAccumulator, ShellOutcome};

/// Time allowed for the device to answer the mode probe.
pub const MODE_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Response window for a command before declaring failure.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Probe command used for mode detection.
///
/// `AT AT` is valid in neither mode, but both answer it promptly: a
/// line-mode host with `ERROR`, a shell host by echoing through its parser.
const PROBE_COMMAND: &str = "AT AT";

/// Poll interval for blocking reads during negotiation and exchanges.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Negotiated transport mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Bare AT host: `<command>\r\n` out, `OK`/`ERROR` terminated text in.
    Line,
    /// Shell-wrapped AT host: `at <command>` through the shell grammar.
    Shell,
}

/// An open, mode-negotiated serial session to a kit.
///
/// Owns exactly one serial port and supports one in-flight command at a
/// time; callers serialize. Never shared across concurrent verification
/// runs.
pub struct Transport {
    port: Option<Box<dyn Port>>,
    mode: TransportMode,
    claim: Option<PortClaim>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Open a port and negotiate the transport mode.
pub fn connect(path: &str, baud_rate: u32) -> Result<Transport> {
    let claim = claim_port(path);
    let config = SerialConfig::new(path, baud_rate).with_timeout(POLL_TIMEOUT);
    let port = NativePort::open(&config)?;
    Transport::negotiate(Box::new(port), Some(claim))
}

/// Try candidate paths from the end of the list backward, returning the
/// first that yields a working transport.
///
/// USB composite kits expose several virtual COM ports; the AT host is
/// conventionally on the last one, so later candidates are better guesses.
pub fn connect_any(paths: &[String], baud_rate: u32) -> Result<Transport> {
    for path in paths.iter().rev() {
        match connect(path, baud_rate) {
            Ok(transport) => return Ok(transport),
            Err(e) => {
                debug!("Port {path} not usable for AT commands: {e}");
            },
        }
    }

    Err(Error::NoCompatiblePort)
}

impl Transport {
    /// Negotiate the transport mode on an already-open port.
    ///
    /// This is the seam used by tests; production callers go through
    /// [`connect`].
    pub fn negotiate(mut port: Box<dyn Port>, claim: Option<PortClaim>) -> Result<Self> {
        port.set_timeout(POLL_TIMEOUT)?;
        port.clear_buffers()?;

        // Line-mode probe: raw command, raw terminator.
        port.write_all_bytes(format!("{PROBE_COMMAND}\r\n").as_bytes())?;

        let deadline = Instant::now() + MODE_PROBE_TIMEOUT;
        let mut acc: Vec<u8> = Vec::new();
        let mut buf = [0u8; 256];

        while Instant::now() < deadline {
            match port.read(&mut buf) {
                Ok(n) if n > 0 => {
                    acc.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&acc);
                    if text.contains("OK") || text.contains("ERROR") {
                        info!("{}: AT host answered probe, using line mode", port.name());
                        return Ok(Self {
                            port: Some(port),
                            mode: TransportMode::Line,
                            claim,
                        });
                    }
                },
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        trace!("{}: line-mode probe timed out, probing shell mode", port.name());

        // Shell-mode probe: re-issue through the shell grammar.
        port.clear_buffers()?;
        let echo = format!("at {PROBE_COMMAND}");
        port.write_all_bytes(format!("{echo}\r\n").as_bytes())?;

        let deadline = Instant::now() + MODE_PROBE_TIMEOUT;
        let mut shell_acc = ShellAccumulator::new();

        while Instant::now() < deadline {
            match port.read(&mut buf) {
                Ok(n) if n > 0 => {
                    shell_acc.push(&buf[..n], &echo);
                    if shell_acc.outcome().is_some() {
                        info!("{}: shell host answered probe, using shell mode", port.name());
                        return Ok(Self {
                            port: Some(port),
                            mode: TransportMode::Shell,
                            claim,
                        });
                    }
                },
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        let name = port.name().to_string();
        let _ = port.close();
        Err(Error::AtHostNotDetected(name))
    }

    /// The negotiated mode.
    #[must_use]
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Port path of the underlying session, if still open.
    #[must_use]
    pub fn port_name(&self) -> Option<&str> {
        self.port.as_deref().map(Port::name)
    }

    /// Send one AT command and wait for the raw response text.
    ///
    /// The returned text is unformatted; apply
    /// [`format_response`](crate::format::format_response) to extract a
    /// payload. Only one command may be outstanding at a time.
    pub fn send_command(&mut self, command: &str) -> Result<String> {
        self.send_command_with_timeout(command, COMMAND_TIMEOUT)
    }

    /// Send one AT command with a caller-chosen response window.
    ///
    /// Slow commands (modem bring-up queries on freshly reset devices) need
    /// more than the default window.
    pub fn send_command_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String> {
        match self.mode {
            TransportMode::Line => self.send_line(command, timeout),
            TransportMode::Shell => self.send_shell(command, timeout),
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn Port>> {
        self.port.as_mut().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport closed",
            ))
        })
    }

    fn send_line(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let port = self.port_mut()?;
        port.clear_buffers()?;
        port.write_all_bytes(format!("{command}\r\n").as_bytes())?;
        trace!("{} >>> {command}", port.name());

        let deadline = Instant::now() + timeout;
        let mut acc: Vec<u8> = Vec::new();
        let mut buf = [0u8; 256];

        while Instant::now() < deadline {
            match port.read(&mut buf) {
                Ok(n) if n > 0 => {
                    acc.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&acc).into_owned();
                    if text.contains("ERROR") {
                        trace!("{} <<< {text:?}", port.name());
                        return Err(Error::CommandFailed(command.to_string()));
                    }
                    if text.contains("OK") {
                        trace!("{} <<< {text:?}", port.name());
                        return Ok(text);
                    }
                },
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Err(Error::Timeout(format!("No response to {command}")))
    }

    fn send_shell(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let port = self.port_mut()?;
        port.clear_buffers()?;
        let echo = format!("at {command}");
        port.write_all_bytes(format!("{echo}\r\n").as_bytes())?;
        trace!("{} >>> {echo}", port.name());

        let deadline = Instant::now() + timeout;
        let mut acc = ShellAccumulator::new();
        let mut buf = [0u8; 256];

        while Instant::now() < deadline {
            match port.read(&mut buf) {
                Ok(n) if n > 0 => {
                    acc.push(&buf[..n], &echo);
                    match acc.outcome() {
                        Some(ShellOutcome::Done(text)) => {
                            trace!("{} <<< {text:?}", port.name());
                            // Line-mode framing downstream expects the OK
                            // terminator; reattach it.
                            return Ok(format!("{text}\nOK"));
                        },
                        Some(ShellOutcome::Error(line)) => {
                            trace!("{} <<< {line:?}", port.name());
                            return Err(Error::CommandFailed(command.to_string()));
                        },
                        None => {},
                    }
                },
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Err(Error::Timeout(format!("No response to {command}")))
    }

    /// Tear down the session: close the port and release its claim.
    ///
    /// Idempotent; later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            let _ = port.close();
        }
        self.claim = None;
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Exchange, MockPort};
    use super::*;

    #[test]
    fn test_probe_answered_selects_line_mode() {
        // A spurious ERROR to the probe still means the host is line mode.
        let port = MockPort::new(vec![Exchange {
            expect: "AT AT",
            respond: b"ERROR\r\n",
        }]);
        let transport = Transport::negotiate(Box::new(port), None).unwrap();
        assert_eq!(transport.mode(), TransportMode::Line);
    }

    #[test]
    fn test_probe_ok_selects_line_mode() {
        let port = MockPort::new(vec![Exchange {
            expect: "AT AT",
            respond: b"OK\r\n",
        }]);
        let transport = Transport::negotiate(Box::new(port), None).unwrap();
        assert_eq!(transport.mode(), TransportMode::Line);
    }

    #[test]
    fn test_silent_probe_falls_back_to_shell_mode() {
        let port = MockPort::new(vec![Exchange {
            expect: "at AT AT",
            respond: b"uart:~$ at AT AT\r\nERROR\r\n",
        }]);
        let transport = Transport::negotiate(Box::new(port), None).unwrap();
        assert_eq!(transport.mode(), TransportMode::Shell);
    }

    #[test]
    fn test_fully_silent_device_is_not_an_at_host() {
        let port = MockPort::new(vec![]);
        let err = Transport::negotiate(Box::new(port), None).unwrap_err();
        assert!(matches!(err, Error::AtHostNotDetected(_)));
    }

    #[test]
    fn test_line_mode_command_returns_raw_text() {
        let port = MockPort::new(vec![
            Exchange {
                expect: "AT AT",
                respond: b"ERROR\r\n",
            },
            Exchange {
                expect: "AT+CGMI",
                respond: b"Nordic Semiconductor ASA\r\nOK\r\n",
            },
        ]);
        let mut transport = Transport::negotiate(Box::new(port), None).unwrap();
        let response = transport.send_command("AT+CGMI").unwrap();
        assert!(response.contains("Nordic Semiconductor ASA"));
        assert!(response.contains("OK"));
    }

    #[test]
    fn test_line_mode_error_rejects_command() {
        let port = MockPort::new(vec![
            Exchange {
                expect: "AT AT",
                respond: b"OK\r\n",
            },
            Exchange {
                expect: "AT+BOGUS",
                respond: b"ERROR\r\n",
            },
        ]);
        let mut transport = Transport::negotiate(Box::new(port), None).unwrap();
        let err = transport.send_command("AT+BOGUS").unwrap_err();
        assert!(matches!(err, Error::CommandFailed(_)));
    }

    #[test]
    fn test_shell_mode_command_strips_shell_noise() {
        let port = MockPort::new(vec![
            Exchange {
                expect: "at AT AT",
                respond: b"ERROR\r\n",
            },
            Exchange {
                expect: "at AT+CGMR",
                respond: b"uart:~$ at AT+CGMR\r\n\
                    [00:00:03.123,456] <inf> at_host: AT command received\r\n\
                    mfw_nrf9160_1.3.2\r\nOK\r\n",
            },
        ]);
        let mut transport = Transport::negotiate(Box::new(port), None).unwrap();
        assert_eq!(transport.mode(), TransportMode::Shell);

        let response = transport.send_command("AT+CGMR").unwrap();
        assert_eq!(response, "mfw_nrf9160_1.3.2\nOK");
    }

    #[test]
    fn test_commands_are_prefixed_in_shell_mode() {
        let port = MockPort::new(vec![
            Exchange {
                expect: "at AT AT",
                respond: b"OK\r\n",
            },
            Exchange {
                expect: "at AT+CFUN?",
                respond: b"+CFUN: 1\r\nOK\r\n",
            },
        ]);
        let mut transport = Transport::negotiate(Box::new(port), None).unwrap();
        let response = transport.send_command("AT+CFUN?").unwrap();
        assert!(response.contains("+CFUN: 1"));
    }

    #[test]
    fn test_connect_any_without_usable_ports() {
        let paths = [
            "/dev/nonexistent-port-a".to_string(),
            "/dev/nonexistent-port-b".to_string(),
        ];
        let err = connect_any(&paths, 115_200).unwrap_err();
        assert!(matches!(err, Error::NoCompatiblePort));
    }

    #[test]
    fn test_connect_any_with_empty_candidate_list() {
        let err = connect_any(&[], 115_200).unwrap_err();
        assert!(matches!(err, Error::NoCompatiblePort));
    }

    #[test]
    fn test_close_releases_port_claim() {
        let claim = claim_port("mock-close-claim");
        let port = MockPort::new(vec![Exchange {
            expect: "AT AT",
            respond: b"OK\r\n",
        }]);
        let mut transport = Transport::negotiate(Box::new(port), Some(claim)).unwrap();
        assert!(crate::port::claim_exists("mock-close-claim"));

        transport.close();
        assert!(!crate::port::claim_exists("mock-close-claim"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let port = MockPort::new(vec![Exchange {
            expect: "AT AT",
            respond: b"OK\r\n",
        }]);
        let mut transport = Transport::negotiate(Box::new(port), None).unwrap();
        transport.close();
        transport.close();
        assert!(transport.port_name().is_none());
        assert!(transport.send_command("AT").is_err());
    }
}
