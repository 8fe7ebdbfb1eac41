//! Device guide files.
//!
//! A guide is a TOML file describing one kit: the programming choices it
//! offers (firmware bundles or action lists) and the AT commands used to
//! verify a freshly flashed device. Firmware paths in a guide are resolved
//! relative to the guide file itself.
//!
//! Unknown choice or action kinds are hard deserialization errors: a guide
//! written for a newer tool version fails loudly instead of silently
//! skipping steps. Guides that want an explicit passthrough use the
//! `no-op` action kind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use nrfquick::device::{Core, Firmware, ResourceLink};
use nrfquick::program::{Action, Choice};
use nrfquick::verify::AtCommand;
use serde::Deserialize;

/// One firmware image entry in a guide.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuideFirmware {
    /// Target core.
    pub core: Core,
    /// Image path, relative to the guide file.
    pub file: PathBuf,
    /// Optional link shown next to the progress row.
    #[serde(default)]
    pub link: Option<ResourceLink>,
}

impl GuideFirmware {
    fn into_firmware(self, base: &Path) -> Firmware {
        Firmware {
            core: self.core,
            file: resolve(base, self.file),
            link: self.link,
        }
    }
}

/// One action entry of an action-list choice.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum GuideAction {
    /// Flash one firmware image.
    Program {
        /// Target core.
        core: Core,
        /// Image path, relative to the guide file.
        file: PathBuf,
        /// Optional link shown next to the progress row.
        #[serde(default)]
        link: Option<ResourceLink>,
    },
    /// Flash modem firmware unless the installed version already matches.
    ProgramModemFirmware {
        /// Modem firmware bundle path, relative to the guide file.
        file: PathBuf,
        /// Target version substring checked against `AT+CGMR` output.
        version: String,
        /// Index into the kit's virtual COM port list for the AT check.
        #[serde(default)]
        vcom_index: usize,
        /// Optional link shown next to the progress row.
        #[serde(default)]
        link: Option<ResourceLink>,
    },
    /// Let the hardware settle.
    Wait {
        /// Delay in milliseconds.
        duration_ms: u64,
    },
    /// Reset the device.
    Reset,
    /// Explicit passthrough step.
    NoOp,
}

impl GuideAction {
    fn into_action(self, base: &Path) -> Action {
        match self {
            Self::Program { core, file, link } => Action::Program(Firmware {
                core,
                file: resolve(base, file),
                link,
            }),
            Self::ProgramModemFirmware {
                file,
                version,
                vcom_index,
                link,
            } => Action::ProgramModemFirmware {
                firmware: Firmware {
                    core: Core::Modem,
                    file: resolve(base, file),
                    link,
                },
                version,
                vcom_index,
            },
            Self::Wait { duration_ms } => Action::Wait(Duration::from_millis(duration_ms)),
            Self::Reset => Action::Reset,
            Self::NoOp => Action::NoOp,
        }
    }
}

/// One programming choice offered by a guide.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum GuideChoice {
    /// A firmware bundle flashed via the erase/program/reset sequence.
    Batch {
        /// Display name.
        name: String,
        /// Optional documentation URL.
        #[serde(default)]
        documentation: Option<String>,
        /// Optional note shown alongside the firmware list.
        #[serde(default)]
        firmware_note: Option<String>,
        /// Images to flash, in order.
        #[serde(default)]
        firmware: Vec<GuideFirmware>,
    },
    /// An explicit ordered sequence of actions.
    Actions {
        /// Display name.
        name: String,
        /// Actions to execute, in order.
        #[serde(default)]
        actions: Vec<GuideAction>,
    },
}

impl GuideChoice {
    /// Display name of the choice.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Batch { name, .. } | Self::Actions { name, .. } => name,
        }
    }

    /// Short kind label for listings.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Batch { .. } => "batch",
            Self::Actions { .. } => "actions",
        }
    }

    fn to_choice(&self, base: &Path) -> Choice {
        match self.clone() {
            Self::Batch {
                name,
                documentation,
                firmware_note,
                firmware,
            } => Choice::Batch {
                name,
                documentation,
                firmware_note,
                firmware: firmware
                    .into_iter()
                    .map(|fw| fw.into_firmware(base))
                    .collect(),
            },
            Self::Actions { name, actions } => Choice::ActionList {
                name,
                actions: actions
                    .into_iter()
                    .map(|action| action.into_action(base))
                    .collect(),
            },
        }
    }
}

/// A loaded device guide.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Guide {
    /// Kit display name (e.g. "nRF9151 DK").
    pub name: String,
    /// Programming choices.
    #[serde(default)]
    pub choices: Vec<GuideChoice>,
    /// Verification command list.
    #[serde(default)]
    pub verify: Vec<AtCommand>,
    /// Legacy single-command verification for guides predating command
    /// lists.
    #[serde(default)]
    pub legacy_verify: Option<AtCommand>,

    /// Directory the guide was loaded from; firmware paths resolve against
    /// it.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Guide {
    /// Load and parse a guide file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read guide file {}", path.display()))?;
        let mut guide: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse guide file {}", path.display()))?;
        guide.base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Ok(guide)
    }

    /// Names of the offered choices, in guide order.
    #[must_use]
    pub fn choice_names(&self) -> Vec<&str> {
        self.choices.iter().map(GuideChoice::name).collect()
    }

    /// Compile-ready choice by name, with firmware paths resolved.
    #[must_use]
    pub fn find_choice(&self, name: &str) -> Option<Choice> {
        self.choices
            .iter()
            .find(|choice| choice.name() == name)
            .map(|choice| choice.to_choice(&self.base_dir))
    }
}

fn resolve(base: &Path, file: PathBuf) -> PathBuf {
    if file.is_absolute() {
        file
    } else {
        base.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUIDE: &str = r#"
name = "nRF9151 DK"

[[choices]]
kind = "batch"
name = "Hello World"
documentation = "https://example.com/hello"

[[choices.firmware]]
core = "application"
file = "hello.hex"

[choices.firmware.link]
label = "Source code"
href = "https://example.com/hello/src"

[[choices]]
kind = "actions"
name = "AT Client"

[[choices.actions]]
kind = "program-modem-firmware"
file = "mfw_nrf91x1_2.0.2.zip"
version = "mfw_nrf91x1_2.0.2"
vcom_index = 0

[[choices.actions]]
kind = "wait"
duration_ms = 500

[[choices.actions]]
kind = "program"
core = "application"
file = "at_client.hex"

[[choices.actions]]
kind = "reset"

[[verify]]
title = "Manufacturer"
command = "AT+CGMI"
response_regex = "(.*)"

[[verify]]
title = "IMEI"
command = "AT+CGSN=1"
response_regex = '\+CGSN: "(\d+)"'
copiable = true
"#;

    fn parse(content: &str) -> Guide {
        let mut guide: Guide = toml::from_str(content).unwrap();
        guide.base_dir = PathBuf::from("/guides/nrf9151dk");
        guide
    }

    #[test]
    fn test_parse_full_guide() {
        let guide = parse(GUIDE);
        assert_eq!(guide.name, "nRF9151 DK");
        assert_eq!(guide.choice_names(), ["Hello World", "AT Client"]);
        assert_eq!(guide.verify.len(), 2);
        assert!(guide.verify[1].copiable);
        assert!(guide.legacy_verify.is_none());
    }

    #[test]
    fn test_batch_choice_resolves_relative_paths() {
        let guide = parse(GUIDE);
        let Some(Choice::Batch { firmware, .. }) = guide.find_choice("Hello World") else {
            panic!("Expected batch choice");
        };
        assert_eq!(firmware.len(), 1);
        assert_eq!(
            firmware[0].file,
            PathBuf::from("/guides/nrf9151dk/hello.hex")
        );
        assert_eq!(firmware[0].link.as_ref().unwrap().label, "Source code");
    }

    #[test]
    fn test_action_choice_converts_all_kinds() {
        let guide = parse(GUIDE);
        let Some(Choice::ActionList { actions, .. }) = guide.find_choice("AT Client") else {
            panic!("Expected action list");
        };
        assert_eq!(actions.len(), 4);
        assert!(matches!(
            &actions[0],
            Action::ProgramModemFirmware { vcom_index: 0, .. }
        ));
        assert_eq!(actions[1], Action::Wait(Duration::from_millis(500)));
        assert!(matches!(&actions[2], Action::Program(fw) if fw.core == Core::Application));
        assert_eq!(actions[3], Action::Reset);
    }

    #[test]
    fn test_unknown_choice_kind_is_an_error() {
        let content = r#"
name = "DK"

[[choices]]
kind = "hologram"
name = "Future"
"#;
        assert!(toml::from_str::<Guide>(content).is_err());
    }

    #[test]
    fn test_unknown_action_kind_is_an_error() {
        let content = r#"
name = "DK"

[[choices]]
kind = "actions"
name = "List"

[[choices.actions]]
kind = "levitate"
"#;
        assert!(toml::from_str::<Guide>(content).is_err());
    }

    #[test]
    fn test_explicit_noop_action_parses() {
        let content = r#"
name = "DK"

[[choices]]
kind = "actions"
name = "List"

[[choices.actions]]
kind = "no-op"
"#;
        let guide = parse(content);
        let Some(Choice::ActionList { actions, .. }) = guide.find_choice("List") else {
            panic!("Expected action list");
        };
        assert_eq!(actions, [Action::NoOp]);
    }

    #[test]
    fn test_legacy_verify_command() {
        let content = r#"
name = "Thingy:91"

[legacy_verify]
title = "Modem version"
command = "AT+CGMR"
response_regex = "(mfw_[0-9a-z_.]+)"
"#;
        let guide = parse(content);
        assert_eq!(guide.legacy_verify.unwrap().command, "AT+CGMR");
    }

    #[test]
    fn test_find_choice_unknown_name() {
        let guide = parse(GUIDE);
        assert!(guide.find_choice("Nope").is_none());
    }
}
