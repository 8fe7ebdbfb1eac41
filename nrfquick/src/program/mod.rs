//! Programming choices, pipeline compilation and execution.
//!
//! A device guide offers named "choices": either a batch of firmware images
//! flashed through the toolkit's recover/program/reset sequence, or an
//! ordered action list for devices that need custom step sequencing (modem
//! firmware with version checks, settle delays between images). [`compile`]
//! turns a choice into a [`Pipeline`] of executable steps plus the
//! human-visible action entries; [`run_pipeline`] executes it against a
//! [`Toolkit`].

mod compile;
mod engine;
mod fsm;

use std::time::Duration;

use crate::device::{Firmware, ResourceLink};

pub use compile::{CompiledStep, Pipeline, compile};
pub use engine::{ProgressTracker, Toolkit, retry_reset, run_pipeline};
pub use fsm::{ProgramEvent, ProgramSession, ProgramState};

/// A named programming option offered by a device guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// A firmware bundle flashed via recover, program per image, reset.
    Batch {
        /// Display name of the choice.
        name: String,
        /// Optional documentation URL for the bundle.
        documentation: Option<String>,
        /// Optional note shown alongside the firmware list.
        firmware_note: Option<String>,
        /// Images to flash, in order.
        firmware: Vec<Firmware>,
    },
    /// An explicit ordered sequence of actions.
    ActionList {
        /// Display name of the choice.
        name: String,
        /// Actions to execute, in order.
        actions: Vec<Action>,
    },
}

impl Choice {
    /// Display name of the choice.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Batch { name, .. } | Self::ActionList { name, .. } => name,
        }
    }
}

/// One entry of an action-list choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Flash one firmware image.
    Program(Firmware),
    /// Flash modem firmware, skipping the flash when the installed version
    /// already matches.
    ProgramModemFirmware {
        /// Modem firmware bundle to flash.
        firmware: Firmware,
        /// Target version substring checked against `AT+CGMR` output.
        version: String,
        /// Index into the kit's virtual COM port list for the AT check.
        vcom_index: usize,
    },
    /// Let the hardware settle for a fixed duration.
    Wait(Duration),
    /// Reset the device.
    Reset,
    /// Do nothing. Guides may carry entries this build does not act on;
    /// they pass through as explicit non-failures.
    NoOp,
}

/// Stable identifier of one pipeline step, minted at compile time.
///
/// Progress and entry updates are keyed by `StepId` rather than raw list
/// position, so an entry row can never be updated from a step it does not
/// belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(u32);

impl StepId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position of the step within its pipeline.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One human-visible row in the programming progress view, produced 1:1
/// per pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    /// Step this entry tracks.
    pub id: StepId,
    /// Row title ("Erase device", "Application core", "Reset device").
    pub title: String,
    /// Optional link shown next to the row.
    pub link: Option<ResourceLink>,
}

/// Kind of hardware task a pipeline step performs, used to phrase task
/// failures and to distinguish the reset-only retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Core recovery / mass erase.
    Erase,
    /// Firmware flashing.
    Flash,
    /// Device reset.
    Reset,
}

impl TaskKind {
    /// Verb used in "Failed to `<verb>` the `<label>`" messages.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Erase => "erase",
            Self::Flash => "program",
            Self::Reset => "reset",
        }
    }
}

/// Reset line used by a reset step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetKind {
    /// Soft reset through the debug interface.
    #[default]
    System,
    /// Hard reset via the reset pin.
    Pin,
}

/// Options affecting pipeline execution.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Flash modem firmware unconditionally, skipping the `AT+CGMR`
    /// version check.
    pub always_program: bool,
}

/// One progress update for a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Step the update belongs to.
    pub step: StepId,
    /// Completion percentage, 0 to 100.
    pub percentage: u8,
}
