//! Verify command implementation.

use std::io::IsTerminal;
use std::path::Path;

use anyhow::Result;
use console::style;
use dialoguer::{Select, theme::ColorfulTheme};
use log::warn;
use nrfquick::transport;
use nrfquick::verify::{AtCommand, VerifySession, run_legacy_verification};
use serde::Serialize;

use crate::config::Config;
use crate::guide::Guide;
use crate::serial::{ask_remember_port, candidate_ports, map_prompt_error};
use crate::{Cli, CliError, was_interrupted};

#[derive(Serialize)]
struct VerifiedValue<'a> {
    title: &'a str,
    value: &'a str,
    copiable: bool,
}

/// Verify command implementation.
pub(crate) fn cmd_verify(
    cli: &Cli,
    config: &mut Config,
    guide_path: &Path,
    json: bool,
) -> Result<()> {
    let guide = Guide::load(guide_path)?;

    let commands: Vec<AtCommand> = if guide.verify.is_empty() {
        match &guide.legacy_verify {
            Some(command) => vec![command.clone()],
            None => {
                return Err(CliError::Usage(
                    "Guide defines no verification commands".to_string(),
                )
                .into());
            },
        }
    } else {
        guide.verify.clone()
    };
    let legacy = guide.verify.is_empty();

    let ports = candidate_ports(
        cli.port.as_deref(),
        cli.serial_number.as_deref(),
        config,
        cli.non_interactive,
    )?;

    let mut session = VerifySession::new();

    let connected_port = loop {
        if !cli.quiet {
            eprintln!("{} Verifying device...", style("🔍").cyan());
        }

        // Each attempt gets a fresh transport; a failed run may have left
        // the previous session in an unusable state.
        let mut transport = transport::connect_any(&ports, cli.baud)?;
        let port = transport.port_name().map(str::to_string);

        let result = if legacy {
            session.start();
            match run_legacy_verification(&commands[0], &mut transport) {
                Ok(value) => {
                    session.complete(vec![value]);
                    Ok(())
                },
                Err(e) => {
                    session.fail();
                    Err(e)
                },
            }
        } else {
            session.run(&commands, &mut transport).map(|_| ())
        };
        transport.close();

        match result {
            Ok(()) => break port,
            Err(e) => {
                if was_interrupted() {
                    return Err(CliError::Cancelled("Interrupted".to_string()).into());
                }
                eprintln!("{} Verification failed: {e}", style("✗").red().bold());

                if cli.non_interactive || !std::io::stdin().is_terminal() {
                    return Err(e.into());
                }

                match prompt_retry(&session)? {
                    Followup::Retry => {},
                    Followup::Skip => {
                        warn!("Verification skipped");
                        eprintln!("{} Verification skipped", style("⚠").yellow().bold());
                        return Ok(());
                    },
                    Followup::Abort => return Err(e.into()),
                }
            },
        }
    };

    let values: Vec<VerifiedValue<'_>> = commands
        .iter()
        .zip(session.responses())
        .map(|(cmd, value)| VerifiedValue {
            title: &cmd.title,
            value,
            copiable: cmd.copiable,
        })
        .collect();

    if json {
        // Stdout carries only the JSON document.
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        eprintln!("\n{} Device verified", style("✓").green().bold());
        let width = values.iter().map(|v| v.title.len()).max().unwrap_or(0);
        for v in &values {
            let shown = if v.value.is_empty() { "-" } else { v.value };
            eprintln!("  {:>width$}  {}", style(v.title).cyan(), style(shown).bold());
        }
    }

    let may_remember = cli.port.is_none()
        && config.connection.port.is_none()
        && !cli.non_interactive
        && std::io::stdin().is_terminal();
    if may_remember {
        if let Some(port) = connected_port {
            ask_remember_port(&port, config)?;
        }
    }

    Ok(())
}

enum Followup {
    Retry,
    Skip,
    Abort,
}

fn prompt_retry(session: &VerifySession) -> Result<Followup> {
    let mut items = vec!["Retry"];
    if session.show_skip() {
        items.push("Skip verification");
    }
    items.push("Abort");

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Verification failed")
        .items(&items)
        .default(0)
        .interact()
        .map_err(map_prompt_error)?;

    Ok(match items[selection] {
        "Retry" => Followup::Retry,
        "Skip verification" => Followup::Skip,
        _ => Followup::Abort,
    })
}
