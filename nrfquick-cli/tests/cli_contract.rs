//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("nrfquick")
}

const GUIDE: &str = r#"
name = "nRF9151 DK"

[[choices]]
kind = "batch"
name = "Hello World"

[[choices.firmware]]
core = "application"
file = "hello.hex"

[[choices]]
kind = "actions"
name = "AT Client"

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
"#;

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("nrfquick"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("nrfquick"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nrfquick"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains("nrfquick"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn list_ports_json_returns_valid_json() {
    // In environments without serial ports this still exercises the JSON
    // path with an empty array.
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    let stdout = String::from_utf8_lossy(&output.stdout);
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&stdout) {
        assert!(parsed.is_array(), "should be a JSON array");
    }
}

#[test]
fn choices_lists_guide_choices_as_json() {
    let dir = tempdir().expect("tempdir should be created");
    let guide = dir.path().join("guide.toml");
    fs::write(&guide, GUIDE).expect("write guide");

    let mut cmd = cli_cmd();
    let output = cmd
        .arg("choices")
        .arg("--json")
        .arg(&guide)
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be pure JSON");
    let entries = parsed.as_array().expect("should be a JSON array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "Hello World");
    assert_eq!(entries[0]["kind"], "batch");
    assert_eq!(entries[1]["name"], "AT Client");
    assert_eq!(entries[1]["kind"], "actions");
}

#[test]
fn choices_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("not_exists.toml");

    let mut cmd = cli_cmd();
    cmd.arg("choices")
        .arg("--json")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn unknown_guide_choice_kind_is_rejected() {
    let dir = tempdir().expect("tempdir should be created");
    let guide = dir.path().join("guide.toml");
    fs::write(
        &guide,
        "name = \"DK\"\n\n[[choices]]\nkind = \"hologram\"\nname = \"Future\"\n",
    )
    .expect("write guide");

    let mut cmd = cli_cmd();
    cmd.arg("choices")
        .arg(&guide)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn non_interactive_program_with_multiple_choices_fails_fast() {
    let dir = tempdir().expect("tempdir should be created");
    let guide = dir.path().join("guide.toml");
    fs::write(&guide, GUIDE).expect("write guide");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("program")
        .arg(&guide)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--choice"));
}

#[test]
fn program_unknown_choice_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let guide = dir.path().join("guide.toml");
    fs::write(&guide, GUIDE).expect("write guide");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("program")
        .arg(&guide)
        .args(["--choice", "Nope"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Nope"));
}

#[test]
fn program_missing_firmware_file_fails_before_touching_hardware() {
    let dir = tempdir().expect("tempdir should be created");
    let guide = dir.path().join("guide.toml");
    fs::write(&guide, GUIDE).expect("write guide");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("program")
        .arg(&guide)
        .args(["--choice", "Hello World"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Firmware file not found"));
}

#[test]
fn verify_without_commands_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let guide = dir.path().join("guide.toml");
    fs::write(&guide, "name = \"DK\"\n").expect("write guide");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("verify")
        .arg(&guide)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("verification"));
}

#[test]
fn verify_with_unusable_port_fails() {
    let dir = tempdir().expect("tempdir should be created");
    let guide = dir.path().join("guide.toml");
    fs::write(&guide, GUIDE).expect("write guide");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .args(["-p", "INVALID_PORT_NAME_XYZ"])
        .arg("verify")
        .arg(&guide)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn exit_code_zero_on_success() {
    let mut cmd = cli_cmd();
    cmd.arg("--help").assert().success().code(0);

    let mut cmd = cli_cmd();
    cmd.arg("--version").assert().success().code(0);

    // completions needs no hardware
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"]).assert().success().code(0);
}

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz").assert().failure().code(2);
}

#[test]
fn exit_code_two_for_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz").assert().failure().code(2);
}

#[test]
fn unknown_flag_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("list-ports")
        .arg("--jason") // typo for --json
        .assert()
        .failure()
        .stderr(predicate::str::contains("json").or(predicate::str::contains("did you mean")));
}

// ============================================================================
// stdout/stderr Separation Tests
// ============================================================================

#[test]
fn program_errors_go_to_stderr_only() {
    let dir = tempdir().expect("tempdir should be created");
    let guide = dir.path().join("guide.toml");
    fs::write(&guide, GUIDE).expect("write guide");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("program")
        .arg(&guide)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn completions_without_shell_is_usage_error() {
    let mut cmd = cli_cmd();
    cmd.arg("completions")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_nrfquick()"));
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn invalid_local_config_warns_but_does_not_abort() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir.path().join("nrfquick.toml");
    fs::write(&config, "invalid toml [[[").expect("write invalid config");

    let mut cmd = cli_cmd();
    let output = cmd
        .current_dir(dir.path())
        .arg("list-ports")
        .output()
        .expect("command should execute");
    assert!(
        output.status.success(),
        "command should succeed despite config warning"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("parse config"),
        "should warn about the unparseable config"
    );
}

// ============================================================================
// Non-Interactive Mode Tests
// ============================================================================

#[test]
fn non_interactive_flag_is_recognized() {
    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive").arg("--version").assert().success();
}

#[test]
fn non_interactive_environment_variable_works() {
    let mut cmd = cli_cmd();
    cmd.env("NRFQUICK_NON_INTERACTIVE", "true")
        .arg("--version")
        .assert()
        .success();
}

// ============================================================================
// TTY Detection Tests
// ============================================================================

#[test]
fn colors_disabled_when_not_tty() {
    let mut cmd = cli_cmd();
    let output = cmd.arg("--help").assert().success().get_output().clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(
        !stdout.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}
