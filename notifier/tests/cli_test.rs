//! Integration tests for the command-line binaries.
//!
//! Each test runs the compiled binary against a fresh base directory, so no
//! process-wide environment is touched.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const NOTIFIER: &str = env!("CARGO_BIN_EXE_beads-notifier");
const NOTIFY: &str = env!("CARGO_BIN_EXE_beads-notify");

fn run(bin: &str, base: &Path, args: &[&str]) -> Output {
    Command::new(bin)
        .args(args)
        .env("AI_CODING_UTILS_BASE", base)
        .env_remove("SLACK_WEBHOOK_URL")
        .env_remove("BEADS_ISSUE_ID")
        .env("BEADS_AGENT_ID", "test-agent")
        .output()
        .expect("binary should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_notify_check_fails_without_webhook() {
    let base = TempDir::new().unwrap();
    let output = run(NOTIFY, base.path(), &["check"]);

    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("Agent ID: test-agent"));
    assert!(out.contains("Webhook URL: NOT CONFIGURED"));
}

#[test]
fn test_notify_check_succeeds_with_secrets_file() {
    let base = TempDir::new().unwrap();
    let secrets = base.path().join(".secrets");
    fs::create_dir_all(&secrets).unwrap();
    fs::write(
        secrets.join("slack_webhook"),
        "# webhook\nhttps://hooks.slack.com/services/T0123/B0456/abcdefSECRET\n",
    )
    .unwrap();

    let output = run(NOTIFY, base.path(), &["check"]);

    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("Configuration OK!"));
    assert!(!out.contains("abcdefSECRET"), "webhook leaked: {out}");
}

#[test]
fn test_notify_message_fails_without_webhook() {
    let base = TempDir::new().unwrap();
    let output = run(NOTIFY, base.path(), &["blocked", "waiting on credentials"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No Slack webhook URL configured"));
}

#[test]
fn test_init_secret_creates_placeholder() {
    let base = TempDir::new().unwrap();
    let output = run(NOTIFIER, base.path(), &["init-secret"]);

    assert_eq!(output.status.code(), Some(0));
    let path = base.path().join(".secrets/slack_webhook");
    assert!(path.exists());
    assert!(stdout(&output).contains("Created secrets file"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    let again = run(NOTIFIER, base.path(), &["init-secret"]);
    assert_eq!(again.status.code(), Some(0));
    assert!(stdout(&again).contains("already exists"));
}

#[test]
fn test_notifier_check_fails_without_webhook() {
    let base = TempDir::new().unwrap();
    let output = run(NOTIFIER, base.path(), &["check"]);

    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("Configuration check:"));
    assert!(out.contains("NOT CONFIGURED"));
    assert!(out.contains("30 notifications per 60s"));
}

#[test]
fn test_notifier_check_reports_malformed_config() {
    let base = TempDir::new().unwrap();
    let beads = base.path().join(".beads");
    fs::create_dir_all(&beads).unwrap();
    fs::write(beads.join("slack_config.yaml"), "notify_on: [unclosed\n").unwrap();

    let output = run(NOTIFIER, base.path(), &["check"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("ERROR"));
}

#[test]
fn test_notify_check_keeps_secrets_webhook_despite_bad_config() {
    let base = TempDir::new().unwrap();
    let secrets = base.path().join(".secrets");
    fs::create_dir_all(&secrets).unwrap();
    fs::write(
        secrets.join("slack_webhook"),
        "https://hooks.slack.com/services/T0123/B0456/abcdefSECRET\n",
    )
    .unwrap();
    let beads = base.path().join(".beads");
    fs::create_dir_all(&beads).unwrap();
    fs::write(
        beads.join("slack_config.yaml"),
        "notify_on: {created: yes-please}\n",
    )
    .unwrap();

    let output = run(NOTIFY, base.path(), &["check"]);

    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("Config file: ERROR"));
    assert!(out.contains("Configuration OK!"));
    assert!(!out.contains("abcdefSECRET"), "webhook leaked: {out}");
}
