//! # nrfquick
//!
//! A library for programming and verifying Nordic Semiconductor development
//! kits.
//!
//! This crate provides the orchestration core behind a guided kit
//! quickstart flow:
//!
//! - Compilation of programming "choices" (batch firmware bundles or
//!   ordered action lists) into executable pipelines
//! - Sequential, fail-fast pipeline execution against a device toolkit,
//!   with per-step progress aggregation and reset-only retry
//! - Serial transport negotiation (shell mode vs. plain line mode) over a
//!   kit's virtual COM ports
//! - Scripted AT-command verification of freshly flashed firmware
//!
//! The device toolkit itself (flash/recover/reset primitives) is an
//! external collaborator accessed through the [`program::Toolkit`] trait.
//!
//! ## Example
//!
//! ```rust,no_run
//! use nrfquick::program::{self, Choice, CompileOptions};
//! use nrfquick::device::{Core, Firmware, Kit};
//!
//! fn run(toolkit: &mut dyn program::Toolkit, kit: &Kit) -> nrfquick::Result<()> {
//!     let choice = Choice::Batch {
//!         name: "Hello World".to_string(),
//!         documentation: None,
//!         firmware_note: None,
//!         firmware: vec![Firmware::new(Core::Application, "hello.hex")],
//!     };
//!
//!     let pipeline = program::compile(&choice);
//!     program::run_pipeline(toolkit, kit, &pipeline, &CompileOptions::default(), &mut |event| {
//!         println!("step {:?}: {}%", event.step, event.percentage);
//!     })
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
pub mod format;
pub mod port;
pub mod program;
pub mod transport;
pub mod verify;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Pipelines poll
/// it between steps; an in-flight toolkit operation still runs to completion.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupt_requested() -> bool {
    INTERRUPT_CHECKER.get().is_some_and(|checker| checker())
}

/// Serializes tests that toggle the process-global interrupt flag.
#[cfg(test)]
pub(crate) fn interrupt_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
pub use {
    device::{Core, DetectedPort, Firmware, InterfaceKind, Kit, ResourceLink},
    error::{Error, Result},
    format::format_response,
    port::{NativePort, Port, PortInfo, SerialConfig},
    program::{
        Action, ActionEntry, Choice, CompileOptions, Pipeline, ProgramEvent, ProgramSession,
        ProgramState, ProgressEvent, ResetKind, StepId, TaskKind, Toolkit, compile, retry_reset,
        run_pipeline,
    },
    transport::{Transport, TransportMode, connect, connect_any},
    verify::{AtCommand, VerifySession, VerifyState, run_legacy_verification, run_verification},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        let _guard = interrupt_test_lock();
        test_set_interrupted(false);
        assert!(!is_interrupt_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        let _guard = interrupt_test_lock();
        test_set_interrupted(true);
        assert!(is_interrupt_requested());

        test_set_interrupted(false);
        assert!(!is_interrupt_requested());
    }
}
