//! Shell completion generation and installation.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;

use crate::{Cli, CliError};

/// Completions command implementation.
///
/// Without `--install` the script is written to stdout for manual sourcing;
/// with it, the script lands in the shell's conventional completion
/// directory.
pub(crate) fn cmd_completions(shell: Option<Shell>, install: bool) -> Result<()> {
    if install {
        return install_completions(shell);
    }

    let Some(shell) = shell else {
        return Err(CliError::Usage(
            "Specify a shell (e.g. `nrfquick completions bash`) or use --install".to_string(),
        )
        .into());
    };

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn install_completions(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(shell) => shell,
        None => detect_shell().ok_or_else(|| {
            CliError::Usage(
                "Could not detect your shell; specify it explicitly, e.g. \
                 `nrfquick completions --install bash`"
                    .to_string(),
            )
        })?,
    };

    let path = install_path(shell)?;

    let mut script = Vec::new();
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut script);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(&path, &script)
        .with_context(|| format!("Failed to write completion script {}", path.display()))?;

    eprintln!(
        "{} Installed {shell} completions to {}",
        style("✓").green().bold(),
        style(path.display()).cyan()
    );
    match shell {
        Shell::Zsh => {
            eprintln!("Make sure ~/.zfunc is on your fpath, then restart your shell.");
        },
        Shell::Bash | Shell::Fish | Shell::Elvish => {
            eprintln!("Completions load automatically in new shell sessions.");
        },
        _ => {},
    }
    Ok(())
}

/// Best-effort shell detection from the environment.
fn detect_shell() -> Option<Shell> {
    if let Ok(path) = env::var("SHELL") {
        return shell_from_path(&path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

fn shell_from_path(shell_path: &str) -> Option<Shell> {
    match Path::new(shell_path).file_name().and_then(|n| n.to_str()) {
        Some("bash") => Some(Shell::Bash),
        Some("zsh") => Some(Shell::Zsh),
        Some("fish") => Some(Shell::Fish),
        Some("elvish") => Some(Shell::Elvish),
        Some("pwsh" | "powershell") => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Conventional per-user completion script location for a shell.
fn install_path(shell: Shell) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => data_dir()
            .join("bash-completion")
            .join("completions")
            .join("nrfquick"),
        Shell::Zsh => home_dir()?.join(".zfunc").join("_nrfquick"),
        Shell::Fish => config_dir().join("fish").join("completions").join("nrfquick.fish"),
        Shell::Elvish => config_dir().join("elvish").join("lib").join("nrfquick.elv"),
        Shell::PowerShell => config_dir()
            .join("powershell")
            .join("completions")
            .join("nrfquick.ps1"),
        _ => anyhow::bail!("Completion install is not supported for this shell"),
    };
    Ok(path)
}

fn home_dir() -> Result<PathBuf> {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .context("Could not determine home directory")
}

fn config_dir() -> PathBuf {
    env::var("XDG_CONFIG_HOME").map_or_else(
        |_| home_dir().unwrap_or_default().join(".config"),
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    env::var("XDG_DATA_HOME").map_or_else(
        |_| home_dir().unwrap_or_default().join(".local").join("share"),
        PathBuf::from,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_from_path_known_shells() {
        assert_eq!(shell_from_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(shell_from_path("/usr/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(shell_from_path("/usr/local/bin/fish"), Some(Shell::Fish));
        assert_eq!(shell_from_path("/usr/bin/elvish"), Some(Shell::Elvish));
        assert_eq!(shell_from_path("/usr/bin/pwsh"), Some(Shell::PowerShell));
        assert_eq!(shell_from_path("zsh"), Some(Shell::Zsh));
    }

    #[test]
    fn test_shell_from_path_unknown() {
        assert_eq!(shell_from_path("/usr/bin/tcsh"), None);
        assert_eq!(shell_from_path(""), None);
    }

    #[test]
    fn test_install_paths_end_in_tool_name() {
        let bash = install_path(Shell::Bash).unwrap();
        assert!(bash.to_str().unwrap().ends_with("nrfquick"));

        let zsh = install_path(Shell::Zsh).unwrap();
        assert!(zsh.to_str().unwrap().ends_with("_nrfquick"));

        let fish = install_path(Shell::Fish).unwrap();
        assert!(fish.to_str().unwrap().ends_with("nrfquick.fish"));
    }

    #[test]
    fn test_generated_bash_script_mentions_binary() {
        let mut script = Vec::new();
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(Shell::Bash, &mut cmd, name, &mut script);
        let output = String::from_utf8(script).unwrap();
        assert!(output.contains("nrfquick"));
    }

    #[test]
    fn test_detect_shell_does_not_panic() {
        let _ = detect_shell();
    }
}
