//! nrfquick CLI - guided programming and verification of Nordic development
//! kits.
//!
//! ## Features
//!
//! - Program firmware bundles or action lists from a device guide
//! - Verify flashed firmware over AT commands
//! - Interactive kit and serial port selection
//! - Shell completion generation
//! - Environment variable support

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use env_logger::Env;
use log::debug;

mod commands;
mod config;
mod guide;
mod serial;
mod toolkit;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Whether Ctrl-C has been received.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Check whether the user requested interruption.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// User-facing failure classes mapped to distinct exit codes.
#[derive(Debug)]
pub enum CliError {
    /// Misuse of the CLI or unusable environment (exit code 2).
    Usage(String),
    /// Operation cancelled by the user (exit code 130).
    Cancelled(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(msg) | Self::Cancelled(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for CliError {}

/// nrfquick - program and verify Nordic Semiconductor development kits.
///
/// Environment variables:
///   NRFQUICK_PORT              - Default serial port for verification
///   NRFQUICK_BAUD              - Default baud rate (default: 115200)
///   NRFQUICK_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "nrfquick")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "NRFQUICK_PORT")]
    port: Option<String>,

    /// Baud rate for AT command transports.
    #[arg(
        short,
        long,
        global = true,
        default_value = "115200",
        env = "NRFQUICK_BAUD"
    )]
    baud: u32,

    /// Kit debugger serial number (auto-detected if not specified).
    #[arg(short = 's', long, global = true, env = "NRFQUICK_SERIAL_NUMBER")]
    serial_number: Option<String>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "NRFQUICK_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Program a kit from a device guide.
    Program {
        /// Path to the device guide (TOML).
        guide: PathBuf,

        /// Programming choice to run (interactive selection if omitted).
        #[arg(long)]
        choice: Option<String>,

        /// Flash modem firmware even if the installed version matches.
        #[arg(long)]
        always_program_modem: bool,

        /// Automatic retry attempts after a failure (before prompting).
        #[arg(long, default_value_t = 0)]
        retries: u8,

        /// Run verification after programming succeeds.
        #[arg(long)]
        verify: bool,
    },

    /// Verify flashed firmware with the guide's AT commands.
    Verify {
        /// Path to the device guide (TOML).
        guide: PathBuf,

        /// Output extracted values as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List detected serial ports and kits.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List the programming choices offered by a device guide.
    Choices {
        /// Path to the device guide (TOML).
        guide: PathBuf,

        /// Output choice list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (auto-detected from $SHELL when omitted with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Install the completion script into your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

fn main() {
    match run() {
        Ok(()) => {},
        Err(e) => {
            let code = match e.downcast_ref::<CliError>() {
                Some(CliError::Usage(_)) => 2,
                Some(CliError::Cancelled(_)) => 130,
                None => 1,
            };
            eprintln!("{} {e:#}", console::style("Error:").red().bold());
            std::process::exit(code);
        },
    }
}

fn run() -> Result<()> {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if std::env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "nrfquick v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Pipelines poll this between steps; an in-flight operation still runs
    // to completion.
    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)).ok();
    nrfquick::set_interrupt_checker(was_interrupted);

    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Program {
            guide,
            choice,
            always_program_modem,
            retries,
            verify,
        } => {
            commands::program::cmd_program(
                &cli,
                &mut config,
                guide,
                choice.as_deref(),
                *always_program_modem,
                *retries,
            )?;
            if *verify {
                eprintln!();
                commands::verify::cmd_verify(&cli, &mut config, guide, false)?;
            }
            Ok(())
        },
        Commands::Verify { guide, json } => {
            commands::verify::cmd_verify(&cli, &mut config, guide, *json)
        },
        Commands::ListPorts { json } => {
            commands::list_ports::cmd_list_ports(*json);
            Ok(())
        },
        Commands::Choices { guide, json } => commands::choices::cmd_choices(guide, *json),
        Commands::Completions { shell, install } => {
            commands::completions::cmd_completions(*shell, *install)
        },
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_program() {
        let cli = Cli::try_parse_from([
            "nrfquick",
            "program",
            "guide.toml",
            "--choice",
            "Hello World",
            "--always-program-modem",
        ])
        .unwrap();
        if let Commands::Program {
            guide,
            choice,
            always_program_modem,
            retries,
            verify,
        } = cli.command
        {
            assert_eq!(guide.to_str().unwrap(), "guide.toml");
            assert_eq!(choice.as_deref(), Some("Hello World"));
            assert!(always_program_modem);
            assert_eq!(retries, 0);
            assert!(!verify);
        } else {
            panic!("Expected Program command");
        }
    }

    #[test]
    fn test_cli_parse_verify() {
        let cli = Cli::try_parse_from([
            "nrfquick",
            "--port",
            "/dev/ttyACM0",
            "verify",
            "guide.toml",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert!(matches!(cli.command, Commands::Verify { json: false, .. }));
    }

    #[test]
    fn test_cli_parse_list_ports_json() {
        let cli = Cli::try_parse_from(["nrfquick", "list-ports", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_cli_parse_choices() {
        let cli = Cli::try_parse_from(["nrfquick", "choices", "guide.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Choices { json: false, .. }));
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["nrfquick", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["nrfquick", "list-ports"]).unwrap();
        assert_eq!(cli.baud, 115_200);
        assert!(cli.port.is_none());
        assert!(cli.serial_number.is_none());
        assert!(!cli.quiet);
        assert!(!cli.non_interactive);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["nrfquick"]).is_err());
    }
}
