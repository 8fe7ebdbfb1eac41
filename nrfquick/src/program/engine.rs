//! Pipeline execution against the device toolkit.
//!
//! The engine runs compiled steps strictly in order and halts on the first
//! failure; there is no parallel flashing even for independent cores, since
//! they may share bus and debugger resources. Progress is aggregated
//! through a [`ProgressTracker`] that keeps per-step percentages monotonic
//! within a run, so a late or repeated toolkit callback can never walk a
//! progress row backwards.

use std::collections::HashMap;
use std::path::Path;
use std::thread;

use log::{debug, info, warn};

use crate::device::{Core, Kit};
use crate::error::{Error, Result};
use crate::is_interrupt_requested;

use super::compile::{CompiledStep, Pipeline, StepOp};
use super::{CompileOptions, ProgressEvent, ResetKind, StepId, TaskKind};

/// Hardware primitives of the external device toolkit.
///
/// Implementations talk to real programmers (`nrfutil device` in the CLI);
/// tests script the calls. All operations are synchronous and run to
/// completion; the engine never cancels an in-flight call.
pub trait Toolkit {
    /// Whether the kit is currently attached and reachable.
    fn is_connected(&mut self, kit: &Kit) -> bool;

    /// Recover (mass-erase and unlock) one core.
    fn recover(&mut self, kit: &Kit, core: Core) -> Result<()>;

    /// Flash one image to a core, reporting raw percentages through
    /// `progress`.
    fn program(
        &mut self,
        kit: &Kit,
        file: &Path,
        core: Core,
        progress: &mut dyn FnMut(u8),
    ) -> Result<()>;

    /// Reset the device.
    fn reset(&mut self, kit: &Kit, mode: ResetKind) -> Result<()>;

    /// Query the installed modem firmware version (`AT+CGMR`) over the
    /// given virtual COM port index.
    fn query_modem_version(&mut self, kit: &Kit, vcom_index: usize) -> Result<String>;
}

/// Per-step progress aggregation with monotonicity within a run.
///
/// Percentages only move forward for a given step; an update at or below
/// the last reported value is dropped. [`prepare`](Self::prepare) resets
/// the tracker for a new run.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    reported: HashMap<StepId, u8>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all reported progress, ahead of a fresh run.
    pub fn prepare(&mut self) {
        self.reported.clear();
    }

    /// Report progress for a step, forwarding to `reporter` only when the
    /// percentage advances.
    pub fn report(
        &mut self,
        step: StepId,
        percentage: u8,
        reporter: &mut dyn FnMut(ProgressEvent),
    ) {
        let percentage = percentage.min(100);
        let last = self.reported.get(&step).copied();
        if last.is_some_and(|prev| percentage <= prev) {
            return;
        }
        self.reported.insert(step, percentage);
        reporter(ProgressEvent { step, percentage });
    }
}

/// Execute a compiled pipeline against the toolkit.
///
/// Checks connectivity once before touching hardware, then runs each step
/// in order, fail-fast. Interruption is polled between steps; an in-flight
/// toolkit call always runs to completion.
pub fn run_pipeline(
    toolkit: &mut dyn Toolkit,
    kit: &Kit,
    pipeline: &Pipeline,
    options: &CompileOptions,
    reporter: &mut dyn FnMut(ProgressEvent),
) -> Result<()> {
    if !toolkit.is_connected(kit) {
        return Err(Error::DeviceNotConnected);
    }

    let mut tracker = ProgressTracker::new();
    tracker.prepare();

    for step in &pipeline.steps {
        if is_interrupt_requested() {
            warn!("Pipeline interrupted before step {}", step.id.index());
            return Err(Error::Interrupted);
        }
        run_step(toolkit, kit, step, options, &mut tracker, reporter)?;
    }

    info!("Pipeline completed: {} step(s)", pipeline.len());
    Ok(())
}

/// Re-run only the trailing reset step of a pipeline.
///
/// A reset failure leaves the device fully programmed, so retrying replays
/// just the reset rather than erasing and flashing again. A pipeline that
/// does not end in a reset step was compiled from inconsistent input.
pub fn retry_reset(
    toolkit: &mut dyn Toolkit,
    kit: &Kit,
    pipeline: &Pipeline,
    reporter: &mut dyn FnMut(ProgressEvent),
) -> Result<()> {
    let step = match pipeline.last_step() {
        Some(step @ CompiledStep { op: StepOp::Reset, .. }) => step,
        _ => {
            return Err(Error::Config(
                "Reset retry on a pipeline without a trailing reset step".to_string(),
            ));
        },
    };

    if !toolkit.is_connected(kit) {
        return Err(Error::DeviceNotConnected);
    }

    let mut tracker = ProgressTracker::new();
    tracker.prepare();
    run_step(toolkit, kit, step, &CompileOptions::default(), &mut tracker, reporter)
}

fn run_step(
    toolkit: &mut dyn Toolkit,
    kit: &Kit,
    step: &CompiledStep,
    options: &CompileOptions,
    tracker: &mut ProgressTracker,
    reporter: &mut dyn FnMut(ProgressEvent),
) -> Result<()> {
    let id = step.id;

    match &step.op {
        StepOp::Recover(cores) => {
            let total = cores.len();
            for (index, core) in cores.iter().enumerate() {
                info!("Recovering {} core", core.label());
                toolkit.recover(kit, *core).map_err(|e| task_error(e, TaskKind::Erase, "device"))?;

                // One aggregate entry covers all cores; apportion its
                // percentage as (i+1)/(n+1)*100 so 100% is only reported
                // once the whole erase step is done.
                let percentage = u8::try_from((index + 1) * 100 / (total + 1)).unwrap_or(100);
                tracker.report(id, percentage, reporter);
            }
            tracker.report(id, 100, reporter);
        },
        StepOp::Program(fw) => {
            info!("Programming {} core from {}", fw.core.label(), fw.file.display());
            let label = format!("{} core", fw.core.label());
            toolkit
                .program(kit, &fw.file, fw.core, &mut |pct| {
                    tracker.report(id, pct, reporter);
                })
                .map_err(|e| task_error(e, TaskKind::Flash, &label))?;
            tracker.report(id, 100, reporter);
        },
        StepOp::ProgramModem {
            firmware,
            version,
            vcom_index,
        } => {
            run_modem_step(
                toolkit, kit, firmware, version, *vcom_index, options, id, tracker, reporter,
            )?;
        },
        StepOp::Wait(duration) => {
            debug!("Waiting {} ms", duration.as_millis());
            thread::sleep(*duration);
            tracker.report(id, 100, reporter);
        },
        StepOp::Reset => {
            info!("Resetting device");
            tracker.report(id, 20, reporter);
            toolkit
                .reset(kit, ResetKind::default())
                .map_err(|e| task_error(e, TaskKind::Reset, "device"))?;
            tracker.report(id, 100, reporter);
        },
        StepOp::NoOp => {
            tracker.report(id, 100, reporter);
        },
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_modem_step(
    toolkit: &mut dyn Toolkit,
    kit: &Kit,
    firmware: &crate::device::Firmware,
    version: &str,
    vcom_index: usize,
    options: &CompileOptions,
    id: StepId,
    tracker: &mut ProgressTracker,
    reporter: &mut dyn FnMut(ProgressEvent),
) -> Result<()> {
    let label = format!("{} core", firmware.core.label());

    if !options.always_program {
        // 20% of the row is notionally reserved for the version check; pin
        // the display at half of that while it runs.
        tracker.report(id, 10, reporter);

        match toolkit.query_modem_version(kit, vcom_index) {
            Ok(installed) if installed.contains(version) => {
                info!("Modem already runs {version}, skipping flash");
                tracker.report(id, 100, reporter);
                return Ok(());
            },
            Ok(installed) => {
                debug!("Installed modem version {installed:?} does not match {version:?}");
            },
            Err(e) => {
                // The check is an optimization, not a gate.
                debug!("Modem version check failed, programming anyway: {e}");
            },
        }
    }

    info!("Programming modem firmware from {}", firmware.file.display());
    toolkit
        .program(kit, &firmware.file, firmware.core, &mut |pct| {
            // Flash progress occupies the 20-100 band of the row.
            let scaled = u8::try_from(20 + u32::from(pct.min(100)) * 80 / 100).unwrap_or(100);
            tracker.report(id, scaled, reporter);
        })
        .map_err(|e| task_error(e, TaskKind::Flash, &label))?;
    tracker.report(id, 100, reporter);
    Ok(())
}

/// Wrap a toolkit failure as a task error, unless it already carries a
/// task context or is the pre-flight connectivity failure.
fn task_error(error: Error, kind: TaskKind, label: &str) -> Error {
    match error {
        Error::Task { .. } | Error::DeviceNotConnected | Error::Interrupted => error,
        other => {
            debug!("{kind:?} task on {label} failed: {other}");
            Error::Task {
                kind,
                label: label.to_string(),
            }
        },
    }
}
