//! Commands that drive the chat client: each one is a task-runner run.
//!
//! Status lines go to stderr as they arrive; the final report goes to stdout.
//! Ctrl-C asks the engine to stop at its next check.
//!
//! CHANGELOG:
//! - 10/12/2026 - history and members
//! - 10/05/2026 - Initial implementation

use anyhow::{anyhow, bail, Context, Result};
use bainian_core::contacts::DeliveryStatus;
use bainian_core::runner::RunOutcome;
use bainian_core::{AutomationSurface, Command, RunEvent, RunReport, ScriptedSurface, TaskRunner};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::output::OutputControls;

/// Build the automation surface for this invocation.
pub fn load_surface(fixture: Option<&Path>) -> Result<Arc<dyn AutomationSurface>> {
    let path = fixture.ok_or_else(|| {
        anyhow!(
            "No automation backend is available on this platform; \
             pass --surface <fixture.json> to run against a scripted client"
        )
    })?;
    let surface = ScriptedSurface::from_fixture_file(path)
        .with_context(|| format!("Failed to load surface fixture {}", path.display()))?;
    Ok(Arc::new(surface))
}

/// Run one command to completion on a fresh runtime and print its report.
pub fn run(runner: &TaskRunner, command: Command, output: &OutputControls) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let report = runtime.block_on(drive(runner, command))?;
    print_report(&report, output);
    Ok(())
}

async fn drive(runner: &TaskRunner, command: Command) -> Result<RunReport> {
    let mut handle = runner.start(command)?;
    debug!(run_id = %handle.id(), "Run started");
    let stop = runner.stop_flag();

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut stop_requested = false;
    let mut report = None;
    let mut failure = None;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(RunEvent::Status(text)) => eprintln!("{}", text),
                Some(RunEvent::Finished(r)) => report = Some(r),
                Some(RunEvent::Failed(message)) => failure = Some(message),
                Some(RunEvent::Completed) | None => break,
            },
            _ = &mut ctrl_c, if !stop_requested => {
                eprintln!("Stopping after the current step...");
                stop.request_stop();
                stop_requested = true;
            }
        }
    }

    handle.join().await?;
    if let Some(message) = failure {
        bail!(message);
    }
    report.ok_or_else(|| anyhow!("Run ended without a result"))
}

fn print_report(report: &RunReport, output: &OutputControls) {
    if output.json {
        output.print(report);
        return;
    }

    match &report.outcome {
        RunOutcome::Check { window } => println!("Chat window '{}' is ready", window),
        RunOutcome::Harvest(h) => {
            println!(
                "Harvested {} contacts ({} pages, {} skipped, {} duplicates)",
                h.records.len(),
                h.pages,
                h.skipped,
                h.duplicates
            );
            if let Some(ref path) = h.output {
                println!("  table: {}", path.display());
            }
            if h.quota_reached {
                println!("  stopped at quota");
            } else if h.stopped {
                println!("  stopped early");
            }
        }
        RunOutcome::Dispatch(d) => {
            let mode = if d.dry_run { " (dry run)" } else { "" };
            println!(
                "Delivered {} of {} recipients, {} failed{} ({} rows skipped)",
                d.delivered, d.planned, d.failed, mode, d.skipped_rows
            );
            for outcome in d.outcomes.iter().filter(|o| o.status == DeliveryStatus::Error) {
                println!("  E {}", outcome.task.navigation_name());
            }
            if let Some(ref path) = d.log_path {
                println!("  log: {}", path.display());
            }
            if d.stopped {
                println!("  stopped early");
            }
        }
        RunOutcome::NoteToSelf { sent } => println!("Sent {} notes to yourself", sent),
        RunOutcome::History { records } => {
            for record in records {
                println!("[{:?}] {}: {}", record.kind, record.sender, record.text);
            }
        }
        RunOutcome::Members { members } => {
            for member in members {
                println!("{}", member);
            }
        }
    }
}
