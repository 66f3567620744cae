// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod daemon;
pub mod errors;
pub mod logging;
pub mod os;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod tracker;
pub mod types;

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cli::{Action, CliArgs};
use crate::config::loader::{load_or_default, resolve_config_path, resolve_home_dir};
use crate::control::{Outcome, Payload, Supervisor};
use crate::daemon::DaemonOptions;
use crate::reconcile::Reconciler;
use crate::record::Record;

/// High-level entry point used by `main.rs`.
///
/// Resolves home and config, wires a [`Supervisor`] and dispatches the
/// subcommand. Returns `Ok(false)` when the outcome was a hard failure.
pub async fn run(args: CliArgs) -> Result<bool> {
    let home_dir = resolve_home_dir(args.home.as_deref());
    let config_path = resolve_config_path(args.config.as_deref(), &home_dir);
    let cfg = load_or_default(&config_path, &home_dir)
        .with_context(|| format!("loading config {config_path:?}"))?;
    debug!(home = ?cfg.home_dir, store = ?cfg.paths.store, "configuration loaded");

    let supervisor = Supervisor::from_config(&cfg)?;

    let outcome = match args.action {
        Action::Daemon => {
            let options = DaemonOptions::new(&cfg.home_dir, &config_path)?;
            daemon::run(supervisor, options).await?;
            return Ok(true);
        }
        Action::Reconcile { once } => {
            let reconciler = Arc::new(Reconciler::new(supervisor, cfg.reconciler.interval));
            if once {
                let outcomes = tokio::task::spawn_blocking(move || reconciler.pass()).await?;
                Outcome::batch("reconcile", "autorun_enabled", outcomes)
            } else {
                run_reconciler(reconciler).await?;
                return Ok(true);
            }
        }
        action => {
            let json = args.json;
            let outcome = tokio::task::spawn_blocking(move || dispatch(&supervisor, action)).await??;
            print!("{}", render(&outcome, json)?);
            return Ok(!outcome.hard_failure);
        }
    };

    print!("{}", render(&outcome, args.json)?);
    Ok(!outcome.hard_failure)
}

/// Run a short-lived control verb.
fn dispatch(supervisor: &Supervisor, action: Action) -> Result<Outcome> {
    let outcome = match action {
        Action::New(new) => supervisor.create(new.to_spec(), new.overwrite),
        Action::Ls { target } => supervisor.list(&target),
        Action::Start { target } => supervisor.start(&target),
        Action::Stop { target } => supervisor.stop(&target),
        Action::Restart { target } => supervisor.restart(&target),
        Action::Rm { target } => supervisor.remove(&target),
        Action::Reset { target } => supervisor.reset(&target),
        Action::Status { target } => supervisor.status(&target),
        Action::Rename { target, name } => supervisor.rename(&target, &name),
        Action::Dump { file } => {
            let outcome = supervisor.dump();
            if let Some(path) = file.filter(|_| !outcome.hard_failure) {
                let json = serde_json::to_string_pretty(outcome.records())?;
                std::fs::write(&path, json).with_context(|| format!("writing {path:?}"))?;
                Outcome::ok(format!("dumped {} record(s) to {path:?}", outcome.records().len()))
            } else {
                outcome
            }
        }
        Action::Daemon | Action::Reconcile { .. } => {
            anyhow::bail!("long-running commands are not control verbs")
        }
    };
    Ok(outcome)
}

/// Run the reconciler (with its own reaper) until SIGINT or SIGTERM.
async fn run_reconciler(reconciler: Arc<Reconciler>) -> Result<()> {
    let reaper = Arc::clone(reconciler.supervisor().tracker()).spawn_reaper();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = daemon::shutdown_signal().await {
            warn!(error = %e, "signal handling failed; shutting down");
        }
        let _ = shutdown_tx.send(true);
    });

    reconciler.run(shutdown_rx).await;
    reaper.abort();
    Ok(())
}

/// Render an outcome for stdout.
pub fn render(outcome: &Outcome, json: bool) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(outcome)?;
        out.push('\n');
        return Ok(out);
    }

    let mut out = String::new();
    render_plain(&mut out, outcome, 0)?;
    Ok(out)
}

fn render_plain(out: &mut String, outcome: &Outcome, depth: usize) -> std::fmt::Result {
    let indent = "  ".repeat(depth);
    let tag = if outcome.hard_failure {
        "error: "
    } else if outcome.warning {
        "warning: "
    } else {
        ""
    };
    writeln!(out, "{indent}{tag}{}", outcome.message)?;

    match &outcome.payload {
        Payload::Records(records) => {
            for record in records {
                writeln!(out, "{indent}  {}", record_line(record))?;
            }
        }
        Payload::Batch(items) => {
            for item in items {
                render_plain(out, item, depth + 1)?;
            }
        }
        Payload::None | Payload::Record(_) | Payload::Termination { .. } => {}
    }
    Ok(())
}

fn record_line(record: &Record) -> String {
    let state = match record.pid {
        Some(pid) => format!("running pid={pid}"),
        None => "stopped".to_string(),
    };
    format!(
        "{:>4}  {:<20} {:<20} restart={}/{} autorun={}  {}",
        record.id,
        record.name,
        state,
        record.restart,
        record.max_restart,
        record.autorun_status(),
        record.command
    )
}
