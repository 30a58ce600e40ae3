//! Beads Notifier - issue store watcher daemon.
//!
//! This binary watches `.beads/issues.jsonl` and posts a chat notification
//! whenever an issue is created, started or completed.
//!
//! # Commands
//!
//! - `beads-notifier daemon`: Start the watcher in the background
//! - `beads-notifier foreground`: Run the watcher attached to the terminal
//! - `beads-notifier check`: Show the resolved configuration and send a test message
//! - `beads-notifier init-secret`: Create the webhook secrets file
//!
//! # Environment Variables
//!
//! See the [`config`](beads_notifier::config) module for available options.

use std::path::PathBuf;
use std::process::{ExitCode, Stdio};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, trace, warn};

use beads_notifier::config::{Config, Paths};
use beads_notifier::dispatch::Dispatcher;
use beads_notifier::logging::{init_logging, LogTarget};
use beads_notifier::pidfile::PidFile;
use beads_notifier::rate_limit::{DEFAULT_MAX, DEFAULT_WINDOW};
use beads_notifier::redact::{mask_url, redact};
use beads_notifier::secrets::{self, InitOutcome, REQUIRED_FILE_MODE};
use beads_notifier::service::NotifierService;
use beads_notifier::transport::{Payload, Transport, WebhookTransport};
use beads_notifier::types::EventKind;
use beads_notifier::utils::ScanGate;
use beads_notifier::watcher::FileWatcher;

/// Text of the message sent by `check`.
const TEST_MESSAGE: &str = "Beads Slack Notifier - Configuration test (hardened)";

/// Capacity of the trigger channel between the watcher and the scan loop.
const TRIGGER_CHANNEL_CAPACITY: usize = 16;

/// Beads Notifier - issue store watcher.
///
/// Watches the issue store and sends rate-limited chat notifications for
/// lifecycle changes.
#[derive(Parser, Debug)]
#[command(name = "beads-notifier")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    AI_CODING_UTILS_BASE   Base directory for .beads/ and .secrets/ (default: current dir)
    SLACK_WEBHOOK_URL      Webhook URL, used when neither the secrets file nor the config provides one
    RUST_LOG               Log filter (default: info)

EXAMPLES:
    # Create the secrets file, then paste the webhook URL into it
    beads-notifier init-secret

    # Verify the configuration and send a test message
    beads-notifier check

    # Start watching in the background
    beads-notifier daemon
")]
struct Cli {
    /// Path to the YAML config file (default: .beads/slack_config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the issue store (default: .beads/issues.jsonl).
    #[arg(long, global = true)]
    issues: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the watcher as a background process.
    ///
    /// Output goes to .beads/slack_notifier.log.
    Daemon,

    /// Run the watcher in the foreground, logging to stderr.
    Foreground {
        /// Write logs to this file instead of stderr.
        #[arg(long, hide = true)]
        log_file: Option<PathBuf>,
    },

    /// Check the configuration and send a test message.
    Check,

    /// Create the webhook secrets file with owner-only permissions.
    InitSecret,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut paths = Paths::from_env();
    if let Some(config) = cli.config {
        paths.config = config;
    }
    if let Some(issues) = cli.issues {
        paths.issues = issues;
    }

    match cli.command {
        Command::InitSecret => Ok(exit_code(run_init_secret(&paths))),
        Command::Check => {
            let runtime = build_runtime()?;
            Ok(exit_code(runtime.block_on(run_check(&paths))))
        }
        Command::Daemon => run_daemon(&paths),
        Command::Foreground { log_file } => {
            let target = log_file.map_or(LogTarget::Stderr, LogTarget::File);
            init_logging(&target).context("Failed to initialize logging")?;

            let runtime = build_runtime()?;
            runtime.block_on(run_watcher(paths))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Re-launches this executable detached, in foreground mode with file
/// logging, and reports its PID.
fn run_daemon(paths: &Paths) -> Result<ExitCode> {
    let exe = std::env::current_exe().context("Failed to locate the notifier executable")?;

    let mut command = std::process::Command::new(exe);
    command
        .arg("--config")
        .arg(&paths.config)
        .arg("--issues")
        .arg(&paths.issues)
        .arg("foreground")
        .arg("--log-file")
        .arg(&paths.log)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn().context("Failed to start background notifier")?;
    println!("Beads Slack Notifier started (PID: {})", child.id());
    println!("Logs: {}", paths.log.display());
    Ok(ExitCode::SUCCESS)
}

/// Runs the watcher loop until a shutdown signal arrives.
async fn run_watcher(paths: Paths) -> Result<()> {
    info!("Starting Beads Slack Notifier (hardened)");

    let config = Config::load_or_skip_file(&paths.secrets, &paths.config);

    info!(
        issues = %paths.issues.display(),
        webhook_configured = config.webhook_url.is_some(),
        rate_limit_max = DEFAULT_MAX,
        rate_limit_window_secs = DEFAULT_WINDOW.as_secs(),
        "Configuration loaded"
    );
    if config.webhook_url.is_none() {
        warn!("No Slack webhook URL configured - notifications will be skipped");
    }

    let dispatcher = Dispatcher::from_config(&config).context("Failed to create HTTP client")?;
    let mut service = NotifierService::new(&paths.issues, &paths.state, dispatcher);
    service.initialize();

    let mut pid_file = PidFile::create(&paths.pid)
        .with_context(|| format!("Failed to write PID file {}", paths.pid.display()))?;

    if let Some(parent) = paths.issues.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let (tx, mut rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
    let _watcher =
        FileWatcher::new(paths.issues.clone(), tx).context("Failed to start file watcher")?;
    info!("File watcher started");

    let mut gate = ScanGate::default();
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }

            trigger = rx.recv() => {
                if trigger.is_none() {
                    warn!("File watcher stopped");
                    break;
                }
                if !gate.admit(Instant::now()) {
                    trace!("Scan trigger inside debounce window, dropped");
                    continue;
                }
                if let Err(e) = service.scan().await {
                    warn!(error = %e, "Skipping scan");
                }
            }
        }
    }

    if let Err(e) = service.persist() {
        error!(error = %e, "Failed to save state on shutdown");
    }
    pid_file.remove();
    info!("Notifier stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Creates the secrets file. Returns `true` on success.
fn run_init_secret(paths: &Paths) -> bool {
    match secrets::init_secrets_file(&paths.secrets) {
        Ok(InitOutcome::Created) => {
            println!("Created secrets file: {}", paths.secrets.display());
            println!("Permissions set to {REQUIRED_FILE_MODE:#o}");
            println!("\nNext steps:");
            println!("  1. Edit {}", paths.secrets.display());
            println!("  2. Replace the placeholder with your Slack webhook URL");
            println!("  3. Run: beads-notifier check");
            true
        }
        Ok(InitOutcome::AlreadyExists { tightened }) => {
            println!("Secrets file already exists: {}", paths.secrets.display());
            if tightened {
                println!("Permissions tightened to {REQUIRED_FILE_MODE:#o}.");
            } else {
                println!("Permissions verified.");
            }
            true
        }
        Err(e) => {
            eprintln!("{e}");
            false
        }
    }
}

/// Prints the resolved configuration and sends a test message. Returns
/// `true` if the message was delivered.
async fn run_check(paths: &Paths) -> bool {
    println!("Configuration check:");
    println!("  Config file: {}", paths.config.display());
    println!("  Exists: {}", paths.config.exists());

    println!("\n  Secrets file: {}", paths.secrets.display());
    println!("  Exists: {}", paths.secrets.exists());
    if let Ok(mode) = secrets::file_mode(&paths.secrets) {
        let verdict = if mode & 0o077 == 0 {
            "(OK)"
        } else {
            "(INSECURE - should be 0o600)"
        };
        println!("  Permissions: {mode:#o} {verdict}");
    }

    let config = match Config::load(&paths.secrets, &paths.config) {
        Ok(config) => config,
        Err(e) => {
            println!("\n  ERROR: {}", redact(&e.to_string()));
            return false;
        }
    };

    let shown_url = config
        .webhook_url
        .as_deref()
        .map_or_else(|| "NOT CONFIGURED".to_string(), mask_url);
    println!("\n  Webhook URL: {shown_url}");
    if let Some(source) = config.webhook_source {
        println!("  Source: {source}");
    }
    println!("  Channel: {}", config.channel.as_deref().unwrap_or("(default)"));
    println!(
        "\n  Rate limit: {DEFAULT_MAX} notifications per {}s",
        DEFAULT_WINDOW.as_secs()
    );
    println!("\n  Notifications enabled:");
    for kind in EventKind::ALL {
        println!("    - {kind}: {}", config.policy.allows(kind));
    }

    let Ok(url) = config.require_webhook() else {
        println!("\n  WARNING: No webhook URL configured!");
        println!("  Run: beads-notifier init-secret");
        return false;
    };

    println!("\n  Testing webhook connection...");
    let transport = match WebhookTransport::new(url) {
        Ok(transport) => transport,
        Err(e) => {
            println!("  FAILED: {e}");
            return false;
        }
    };

    let mut payload = Payload::text(TEST_MESSAGE);
    payload.channel = config.channel.clone();
    match transport.deliver(&payload).await {
        Ok(()) => {
            println!("  SUCCESS: Test message sent to Slack!");
            true
        }
        Err(e) => {
            println!("  FAILED: {}", redact(&e.to_string()));
            false
        }
    }
}
