//! Compilation of a programming choice into an executable pipeline.

use log::debug;

use crate::device::Core;

use super::{Action, ActionEntry, Choice, StepId};

/// Executable operation of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepOp {
    /// Recover the listed cores, in order, against one aggregate entry.
    Recover(Vec<Core>),
    /// Flash one firmware image.
    Program(crate::device::Firmware),
    /// Flash modem firmware with an optional installed-version check.
    ProgramModem {
        firmware: crate::device::Firmware,
        version: String,
        vcom_index: usize,
    },
    /// Sleep for the given duration.
    Wait(std::time::Duration),
    /// Reset the device.
    Reset,
    /// Do nothing, report complete.
    NoOp,
}

/// One compiled pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStep {
    pub(crate) id: StepId,
    pub(crate) op: StepOp,
}

impl CompiledStep {
    /// Stable identifier of this step.
    #[must_use]
    pub fn id(&self) -> StepId {
        self.id
    }
}

/// A compiled programming pipeline: executable steps plus their 1:1
/// human-visible entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub(crate) steps: Vec<CompiledStep>,
    entries: Vec<ActionEntry>,
}

impl Pipeline {
    /// Progress rows, one per step, in execution order.
    #[must_use]
    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The trailing step, if any.
    pub(crate) fn last_step(&self) -> Option<&CompiledStep> {
        self.steps.last()
    }
}

/// Builder keeping steps and entries in lockstep.
struct PipelineBuilder {
    steps: Vec<CompiledStep>,
    entries: Vec<ActionEntry>,
}

impl PipelineBuilder {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, op: StepOp, title: String, link: Option<crate::device::ResourceLink>) {
        let id = StepId::new(u32::try_from(self.steps.len()).unwrap_or(u32::MAX));
        self.steps.push(CompiledStep { id, op });
        self.entries.push(ActionEntry { id, title, link });
    }

    fn build(self) -> Pipeline {
        Pipeline {
            steps: self.steps,
            entries: self.entries,
        }
    }
}

/// Compile a choice into an executable pipeline.
///
/// Batch choices compile to one "Erase device" recover step covering the
/// distinct recoverable cores, one program step per firmware image, and one
/// trailing "Reset device" step. Action-list choices compile one step per
/// action, in declared order.
#[must_use]
pub fn compile(choice: &Choice) -> Pipeline {
    let mut builder = PipelineBuilder::new();

    match choice {
        Choice::Batch { name, firmware, .. } => {
            debug!("Compiling batch choice {name:?} with {} image(s)", firmware.len());

            let mut cores: Vec<Core> = Vec::new();
            for fw in firmware {
                let core = fw.core.recover_via();
                if !cores.contains(&core) {
                    cores.push(core);
                }
            }

            builder.push(StepOp::Recover(cores), "Erase device".to_string(), None);

            for fw in firmware {
                builder.push(
                    StepOp::Program(fw.clone()),
                    format!("{} core", fw.core.label()),
                    fw.link.clone(),
                );
            }

            builder.push(StepOp::Reset, "Reset device".to_string(), None);
        },
        Choice::ActionList { name, actions } => {
            debug!("Compiling action list {name:?} with {} action(s)", actions.len());

            for action in actions {
                match action {
                    Action::Program(fw) => builder.push(
                        StepOp::Program(fw.clone()),
                        format!("{} core", fw.core.label()),
                        fw.link.clone(),
                    ),
                    Action::ProgramModemFirmware {
                        firmware,
                        version,
                        vcom_index,
                    } => builder.push(
                        StepOp::ProgramModem {
                            firmware: firmware.clone(),
                            version: version.clone(),
                            vcom_index: *vcom_index,
                        },
                        format!("{} core", firmware.core.label()),
                        firmware.link.clone(),
                    ),
                    Action::Wait(duration) => builder.push(
                        StepOp::Wait(*duration),
                        format!("Wait {} ms", duration.as_millis()),
                        None,
                    ),
                    Action::Reset => {
                        builder.push(StepOp::Reset, "Reset device".to_string(), None);
                    },
                    Action::NoOp => {
                        builder.push(StepOp::NoOp, String::new(), None);
                    },
                }
            }
        },
    }

    builder.build()
}
