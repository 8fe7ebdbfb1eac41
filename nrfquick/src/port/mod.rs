//! Serial port abstraction for the transport layer.
//!
//! The design separates I/O from protocol logic: the transport negotiator
//! and verification runner are written against the [`Port`] trait, so tests
//! can script exchanges without hardware while native builds use the
//! `serialport` crate via [`NativePort`].
//!
//! The module also owns the in-process port claim registry. Exactly one
//! transport session may own a given port path at a time; claiming an
//! already-claimed path reclaims it from the previous owner (overwrite
//! semantics), and the stale owner's release becomes a no-op.

pub mod native;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use log::debug;

use crate::error::Result;

/// Serial port configuration.
///
/// The baud rate is fixed for the lifetime of a session; there is
/// deliberately no way to renegotiate it on an open port.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port path (e.g., "/dev/ttyACM0", "COM7").
    pub path: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

/// Default baud rate for Nordic kit virtual COM ports.
pub const DEFAULT_BAUD: u32 = 115_200;

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(50),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port path and baud rate.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Unified port trait for serial communication.
///
/// Implementations must be safe to poll with short read timeouts: a read
/// that times out returns `Ok(0)` or `ErrorKind::TimedOut`, never blocks
/// indefinitely.
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Clear input/output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

static CLAIMS: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

fn claims() -> &'static Mutex<HashMap<String, u64>> {
    CLAIMS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// An exclusive in-process claim on a serial port path.
///
/// Dropping the claim releases the path unless a newer claim has already
/// overwritten it.
#[derive(Debug)]
pub struct PortClaim {
    path: String,
    generation: u64,
}

impl PortClaim {
    /// Claimed port path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        if let Ok(mut map) = claims().lock() {
            if map.get(&self.path) == Some(&self.generation) {
                map.remove(&self.path);
                debug!("Released port claim on {}", self.path);
            }
        }
    }
}

/// Claim a serial port path for a new session.
///
/// If the path is already claimed, the previous owner is overwritten: its
/// eventual release becomes a no-op and this claim takes over. Only one
/// session may hold a given physical port, and a fresh session always wins
/// over a stale one.
pub fn claim_port(path: &str) -> PortClaim {
    let mut map = claims().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let generation = map.values().max().copied().unwrap_or(0) + 1;
    if map.insert(path.to_string(), generation).is_some() {
        debug!("Reclaimed port {path} from a previous session");
    }
    PortClaim {
        path: path.to_string(),
        generation,
    }
}

// Re-export the native implementation
pub use native::NativePort;

#[cfg(test)]
pub(crate) fn claim_exists(path: &str) -> bool {
    claims()
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .contains_key(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyACM0", 115_200).with_timeout(Duration::from_secs(1));
        assert_eq!(config.path, "/dev/ttyACM0");
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_claim_release_frees_path() {
        let claim = claim_port("test-port-release");
        drop(claim);

        // A fresh claim after release must succeed and own the path.
        let again = claim_port("test-port-release");
        assert_eq!(again.path(), "test-port-release");
    }

    #[test]
    fn test_overwrite_claim_invalidates_previous_release() {
        let old = claim_port("test-port-overwrite");
        let new = claim_port("test-port-overwrite");

        // Dropping the stale claim must not release the new owner.
        drop(old);
        let map = claims().lock().unwrap();
        assert!(map.contains_key("test-port-overwrite"));
        drop(map);

        drop(new);
        let map = claims().lock().unwrap();
        assert!(!map.contains_key("test-port-overwrite"));
    }
}
