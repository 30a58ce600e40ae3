//! One-shot notifications from agents.
//!
//! ```text
//! beads-notify review "PR ready for review" --issue X-12
//! beads-notify blocked "Waiting on database credentials"
//! beads-notify check
//! ```
//!
//! The agent name comes from `BEADS_AGENT_ID` (default: hostname) and the
//! issue from `--issue` or `BEADS_ISSUE_ID`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use beads_notifier::config::{agent_id, current_issue, Config, Paths};
use beads_notifier::dispatch::{DispatchOutcome, Dispatcher, SkipReason};
use beads_notifier::format::AgentUpdate;
use beads_notifier::logging::{init_logging, LogTarget};
use beads_notifier::redact::{mask_url, redact};
use beads_notifier::secrets;

/// Send a one-shot notification to the team channel.
#[derive(Parser, Debug)]
#[command(name = "beads-notify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request human review.
    Review(MessageArgs),

    /// Report a blocker.
    Blocked(MessageArgs),

    /// Send a status update.
    Message(MessageArgs),

    /// Report work complete.
    Complete(MessageArgs),

    /// Check configuration.
    Check,
}

#[derive(clap::Args, Debug)]
struct MessageArgs {
    /// Message text.
    message: String,

    /// Issue ID (overrides BEADS_ISSUE_ID).
    #[arg(short, long)]
    issue: Option<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let paths = Paths::from_env();

    let (update, args) = match cli.command {
        Command::Check => return Ok(run_check(&paths)),
        Command::Review(args) => (AgentUpdate::ReviewRequest, args),
        Command::Blocked(args) => (AgentUpdate::Blocked, args),
        Command::Message(args) => (AgentUpdate::StatusUpdate, args),
        Command::Complete(args) => (AgentUpdate::WorkComplete, args),
    };

    init_logging(&LogTarget::Stderr).context("Failed to initialize logging")?;

    let config = Config::load_or_skip_file(&paths.secrets, &paths.config);
    if config.webhook_url.is_none() {
        eprintln!("Error: No Slack webhook URL configured");
        return Ok(ExitCode::FAILURE);
    }

    let issue = args.issue.or_else(current_issue);
    let notification = update.render(&agent_id(), issue.as_deref(), &args.message);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let outcome = runtime.block_on(async {
        let mut dispatcher =
            Dispatcher::from_config(&config).context("Failed to create HTTP client")?;
        Ok::<_, anyhow::Error>(dispatcher.send(update.event_kind(), notification).await)
    })?;

    Ok(match outcome {
        DispatchOutcome::Delivered => {
            println!("Notification sent successfully");
            ExitCode::SUCCESS
        }
        DispatchOutcome::Skipped(SkipReason::Disabled) => {
            println!("Notification disabled by configuration, not sent");
            ExitCode::SUCCESS
        }
        DispatchOutcome::Skipped(_) | DispatchOutcome::Failed(_) => {
            eprintln!("Failed to send notification");
            ExitCode::FAILURE
        }
    })
}

/// Prints the resolved identity and webhook. Succeeds only if a webhook is
/// configured.
fn run_check(paths: &Paths) -> ExitCode {
    println!("Agent ID: {}", agent_id());
    println!(
        "Current Issue: {}",
        current_issue().as_deref().unwrap_or("(not set)")
    );

    println!("Secrets file: {}", paths.secrets.display());
    println!("  Exists: {}", paths.secrets.exists());
    if let Ok(mode) = secrets::file_mode(&paths.secrets) {
        let verdict = if mode & 0o077 == 0 { "(OK)" } else { "(INSECURE)" };
        println!("  Permissions: {mode:#o} {verdict}");
    }

    if let Err(e) = Config::load(&paths.secrets, &paths.config) {
        println!("Config file: ERROR: {}", redact(&e.to_string()));
    }

    let webhook = Config::load_or_skip_file(&paths.secrets, &paths.config).webhook_url;
    match webhook {
        Some(url) => {
            println!("Webhook URL: {}", mask_url(&url));
            println!("\nConfiguration OK!");
            ExitCode::SUCCESS
        }
        None => {
            println!("Webhook URL: NOT CONFIGURED");
            println!("\nTo configure:");
            println!("  beads-notifier init-secret");
            ExitCode::FAILURE
        }
    }
}
