//! Choices command implementation.

use std::path::Path;

use anyhow::Result;
use console::style;
use serde::Serialize;

use crate::guide::{Guide, GuideChoice};

#[derive(Serialize)]
struct ChoiceEntry<'a> {
    name: &'a str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_count: Option<usize>,
}

/// Choices command implementation.
pub(crate) fn cmd_choices(guide_path: &Path, json: bool) -> Result<()> {
    let guide = Guide::load(guide_path)?;

    let entries: Vec<ChoiceEntry<'_>> = guide
        .choices
        .iter()
        .map(|choice| match choice {
            GuideChoice::Batch { name, firmware, .. } => ChoiceEntry {
                name,
                kind: choice.kind(),
                firmware_count: Some(firmware.len()),
                action_count: None,
            },
            GuideChoice::Actions { name, actions } => ChoiceEntry {
                name,
                kind: choice.kind(),
                firmware_count: None,
                action_count: Some(actions.len()),
            },
        })
        .collect();

    if json {
        // Stdout carries only the JSON document.
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    eprintln!(
        "{} {} offers {} choice(s):",
        style("📋").cyan(),
        style(&guide.name).bold(),
        entries.len()
    );
    for entry in &entries {
        let detail = match (entry.firmware_count, entry.action_count) {
            (Some(n), _) => format!("{n} image(s)"),
            (_, Some(n)) => format!("{n} action(s)"),
            _ => String::new(),
        };
        eprintln!(
            "  {:<32} {:<8} {}",
            style(entry.name).bold(),
            entry.kind,
            style(detail).dim()
        );
    }

    Ok(())
}
