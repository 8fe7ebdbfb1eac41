//! Program command implementation.

use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use nrfquick::device::check_firmware_file;
use nrfquick::program::{
    Action, Choice, CompileOptions, Pipeline, ProgramEvent, ProgramSession, ProgressEvent,
    compile, retry_reset, run_pipeline,
};

use crate::config::Config;
use crate::guide::Guide;
use crate::serial::{map_prompt_error, select_kit};
use crate::toolkit::NrfutilToolkit;
use crate::{Cli, CliError, use_fancy_output, was_interrupted};

fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

/// Program command implementation.
pub(crate) fn cmd_program(
    cli: &Cli,
    config: &mut Config,
    guide_path: &Path,
    choice_name: Option<&str>,
    always_program_modem: bool,
    retries: u8,
) -> Result<()> {
    let guide = Guide::load(guide_path)?;

    if !cli.quiet {
        eprintln!(
            "{} Loaded guide for {}",
            style("📋").cyan(),
            style(&guide.name).bold()
        );
    }

    let choice = select_choice(&guide, choice_name, cli.non_interactive)?;
    check_firmware_files(&choice)?;
    if !cli.quiet {
        eprintln!("{} Programming {}", style("⚙").cyan(), style(choice.name()).bold());
    }

    let kit = select_kit(cli.serial_number.as_deref(), config, cli.non_interactive)?;
    if !cli.quiet {
        eprintln!(
            "{} Using kit {}",
            style("🔌").cyan(),
            style(&kit.serial_number).bold()
        );
    }

    let pipeline = compile(&choice);
    let options = CompileOptions {
        always_program: always_program_modem || config.program.always_program_modem,
    };
    let mut toolkit = NrfutilToolkit::new(cli.baud);
    let mut session = ProgramSession::new();

    let bars = build_progress_bars(cli, &pipeline);
    let mut reporter = |event: ProgressEvent| {
        if let Some(bar) = bars.get(event.step.index()) {
            bar.set_position(u64::from(event.percentage));
            if event.percentage >= 100 {
                bar.finish();
            }
        }
    };

    session.apply(ProgramEvent::Start);
    let mut result = run_pipeline(&mut toolkit, &kit, &pipeline, &options, &mut reporter);
    let mut auto_retries = retries;

    loop {
        match result {
            Ok(()) => {
                session.apply(ProgramEvent::Succeed);
                break;
            },
            Err(e) => {
                ensure_not_interrupted()?;
                session.apply(ProgramEvent::Fail {
                    reset_failed: e.is_reset_failure(),
                });

                let retry = if auto_retries > 0 {
                    auto_retries -= 1;
                    eprintln!(
                        "{} {e} ({auto_retries} automatic retr{} left)",
                        style("✗").red().bold(),
                        if auto_retries == 1 { "y" } else { "ies" }
                    );
                    true
                } else {
                    offer_retry(cli, &e)?
                };
                if !retry {
                    return Err(e.into());
                }

                // A trailing reset failure leaves the device programmed;
                // replay only the reset instead of the whole pipeline.
                let reset_only = session.reset_retry_pending();
                session.apply(ProgramEvent::Retry);
                debug!("Retrying (reset-only: {reset_only})");
                result = if reset_only {
                    retry_reset(&mut toolkit, &kit, &pipeline, &mut reporter)
                } else {
                    run_pipeline(&mut toolkit, &kit, &pipeline, &options, &mut reporter)
                };
            },
        }
    }

    if !cli.quiet {
        eprintln!("\n{} Programming complete", style("🎉").green().bold());
    }

    Ok(())
}

/// Validate every referenced image before touching the hardware.
fn check_firmware_files(choice: &Choice) -> Result<()> {
    match choice {
        Choice::Batch { firmware, .. } => {
            for fw in firmware {
                check_firmware_file(&fw.file)?;
            }
        },
        Choice::ActionList { actions, .. } => {
            for action in actions {
                match action {
                    Action::Program(fw) => check_firmware_file(&fw.file)?,
                    Action::ProgramModemFirmware { firmware, .. } => {
                        check_firmware_file(&firmware.file)?;
                    },
                    Action::Wait(_) | Action::Reset | Action::NoOp => {},
                }
            }
        },
    }
    Ok(())
}

fn select_choice(
    guide: &Guide,
    choice_name: Option<&str>,
    non_interactive: bool,
) -> Result<Choice> {
    if let Some(name) = choice_name {
        return guide
            .find_choice(name)
            .with_context(|| format!("Guide offers no choice named {name:?}"))
            .map_err(|e| CliError::Usage(format!("{e:#}")).into());
    }

    let names = guide.choice_names();
    match names.len() {
        0 => Err(CliError::Usage("Guide offers no programming choices".to_string()).into()),
        1 => guide
            .find_choice(names[0])
            .context("Guide choice disappeared")
            .map_err(Into::into),
        _ if non_interactive => Err(CliError::Usage(
            "Multiple choices available; pass --choice to pick one".to_string(),
        )
        .into()),
        _ => {
            if !(std::io::stdin().is_terminal() && std::io::stderr().is_terminal()) {
                return Err(CliError::Usage(
                    "Interactive selection requires a terminal; pass --choice".to_string(),
                )
                .into());
            }
            let selection = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select what to program")
                .items(&names)
                .default(0)
                .interact()
                .map_err(map_prompt_error)?;
            guide
                .find_choice(names[selection])
                .context("Guide choice disappeared")
                .map_err(Into::into)
        },
    }
}

fn offer_retry(cli: &Cli, error: &nrfquick::Error) -> Result<bool> {
    eprintln!("{} {error}", style("✗").red().bold());

    if cli.non_interactive || !std::io::stdin().is_terminal() {
        return Ok(false);
    }

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Retry?")
        .default(true)
        .interact()
        .map_err(map_prompt_error)
}

fn build_progress_bars(cli: &Cli, pipeline: &Pipeline) -> Vec<ProgressBar> {
    if cli.quiet || !use_fancy_output() {
        return pipeline.entries().iter().map(|_| ProgressBar::hidden()).collect();
    }

    let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
    let template = "{prefix:>24.cyan} [{bar:40.cyan/blue}] {pos}%";
    pipeline
        .entries()
        .iter()
        .map(|entry| {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(template)
                    .unwrap()
                    .progress_chars("#>-"),
            );
            let prefix = if entry.title.is_empty() {
                "…".to_string()
            } else {
                entry.title.clone()
            };
            bar.set_prefix(prefix);
            bar
        })
        .collect()
}
