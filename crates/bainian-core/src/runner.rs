//! Task runner: executes one engine command at a time on a blocking worker
//! and streams its progress back over a bounded channel.
//!
//! Events arrive in emission order; `Completed` is always the last event of
//! a run. Starting a run while another is in flight is rejected.
//!
//! CHANGELOG:
//! - 10/12/2026 - History and members commands
//! - 10/05/2026 - Initial implementation

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::cancel::StopFlag;
use crate::config::Config;
use crate::dispatch::{self, DispatchReport, DispatchRequest, Dispatcher};
use crate::error::{AutomationError, BatchError};
use crate::harvest::{HarvestReport, HarvestRequest, Harvester};
use crate::history::{ChatRecord, HistoryReader};
use crate::session::Session;
use crate::surface::AutomationSurface;

/// Capacity of a run's event channel.
const EVENT_BUFFER: usize = 64;

/// Receives human-readable progress lines from an engine.
pub trait StatusSink: Send + Sync {
    fn status(&self, text: &str);
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn status(&self, text: &str) {
        self(text)
    }
}

/// One unit of work for the runner.
#[derive(Debug, Clone)]
pub enum Command {
    /// Attach to the main window and report.
    Check,
    Harvest(HarvestRequest),
    Dispatch(DispatchRequest),
    NoteToSelf { messages: Vec<String> },
    /// Read the history of `chat` (or the focused conversation).
    History { chat: Option<String>, pages: u32 },
    Members { chat: Option<String> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Check => "check",
            Command::Harvest(_) => "harvest",
            Command::Dispatch(_) => "dispatch",
            Command::NoteToSelf { .. } => "note_to_self",
            Command::History { .. } => "history",
            Command::Members { .. } => "members",
        }
    }
}

/// What a successful command produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Check { window: String },
    Harvest(HarvestReport),
    Dispatch(DispatchReport),
    NoteToSelf { sent: usize },
    History { records: Vec<ChatRecord> },
    Members { members: Vec<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub command: &'static str,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    Status(String),
    Finished(RunReport),
    Failed(String),
    Completed,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("A run is already in progress")]
    Busy,

    #[error("{0}")]
    Failed(String),

    #[error("Run worker ended unexpectedly: {0}")]
    WorkerLost(String),
}

// ============================================================================
// Execution
// ============================================================================

/// Run `command` to completion on the calling thread.
pub fn execute(
    surface: Arc<dyn AutomationSurface>,
    config: &Config,
    stop: &StopFlag,
    status: &dyn StatusSink,
    command: Command,
) -> Result<RunOutcome, BatchError> {
    let attach = || Session::attach(Arc::clone(&surface), &config.window, config.timing.clone());

    match command {
        Command::Check => {
            attach()?;
            status.status(&format!("Found chat window {:?}", config.window.name));
            Ok(RunOutcome::Check {
                window: config.window.name.clone(),
            })
        }
        Command::Harvest(request) => {
            let session = attach()?;
            Harvester::new(&session, config, stop, status)
                .harvest(&request)
                .map(RunOutcome::Harvest)
        }
        Command::Dispatch(request) => {
            // The table and log name are checked before the chat client is touched.
            let Some(prepared) = dispatch::prepare(&request, config, status)? else {
                return Ok(RunOutcome::Dispatch(DispatchReport {
                    dry_run: request.dry_run,
                    ..Default::default()
                }));
            };
            let session = attach()?;
            let report = Dispatcher::new(&session, config, stop, status).run(
                &request.template,
                prepared,
                request.dry_run,
            )?;
            finish_sending(&session, config);
            Ok(RunOutcome::Dispatch(report))
        }
        Command::NoteToSelf { messages } => {
            let session = attach()?;
            let sent = Dispatcher::new(&session, config, stop, status)
                .send_to_file_transfer(&messages)?;
            finish_sending(&session, config);
            Ok(RunOutcome::NoteToSelf { sent })
        }
        Command::History { chat, pages } => {
            let session = attach()?;
            open_chat(&session, chat.as_deref())?;
            let records = HistoryReader::new(&session).read_chat_records(pages)?;
            status.status(&format!("Read {} chat records", records.len()));
            Ok(RunOutcome::History { records })
        }
        Command::Members { chat } => {
            let session = attach()?;
            open_chat(&session, chat.as_deref())?;
            let members = HistoryReader::new(&session).group_members()?;
            status.status(&format!("Found {} members", members.len()));
            Ok(RunOutcome::Members { members })
        }
    }
}

fn open_chat(session: &Session, chat: Option<&str>) -> Result<(), BatchError> {
    let Some(name) = chat else {
        return Ok(());
    };
    if session.goto_chat(name)? {
        Ok(())
    } else {
        Err(BatchError::Navigation {
            what: "conversation",
            source: AutomationError::ElementNotFound(format!("no conversation named {:?}", name)),
        })
    }
}

fn finish_sending(session: &Session, config: &Config) {
    if config.window.minimize_after_run {
        if let Err(e) = session.minimize() {
            warn!("Failed to minimize chat window: {}", e);
        }
    }
}

// ============================================================================
// Runner
// ============================================================================

struct ChannelSink(mpsc::Sender<RunEvent>);

impl StatusSink for ChannelSink {
    fn status(&self, text: &str) {
        // A dropped receiver only means nobody is listening.
        let _ = self.0.blocking_send(RunEvent::Status(text.to_string()));
    }
}

/// Clears the busy flag even if the worker panics.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct TaskRunner {
    surface: Arc<dyn AutomationSurface>,
    config: Arc<Config>,
    stop: StopFlag,
    busy: Arc<AtomicBool>,
}

impl TaskRunner {
    pub fn new(surface: Arc<dyn AutomationSurface>, config: Config) -> Self {
        Self {
            surface,
            config: Arc::new(config),
            stop: StopFlag::new(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start `command` on a blocking worker. Must be called inside a tokio runtime.
    pub fn start(&self, command: Command) -> Result<RunHandle, RunnerError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunnerError::Busy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));
        self.stop.reset();

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let run_id = Uuid::new_v4();
        let name = command.name();
        let surface = Arc::clone(&self.surface);
        let config = Arc::clone(&self.config);
        let stop = self.stop.clone();

        let worker = tokio::task::spawn_blocking(move || {
            let span = info_span!("run", id = %run_id, command = name);
            let _entered = span.enter();
            info!("Run started");

            let started_at = Local::now();
            let sink = ChannelSink(tx.clone());
            let event = match execute(surface, &config, &stop, &sink, command) {
                Ok(outcome) => {
                    info!("Run finished");
                    RunEvent::Finished(RunReport {
                        run_id,
                        command: name,
                        started_at,
                        finished_at: Local::now(),
                        outcome,
                    })
                }
                Err(e) => {
                    error!("Run failed: {}", e);
                    RunEvent::Failed(e.to_string())
                }
            };
            let _ = tx.blocking_send(event);

            // Free the runner before the final event so a listener can start
            // the next run as soon as it sees `Completed`.
            drop(guard);
            let _ = tx.blocking_send(RunEvent::Completed);
        });

        Ok(RunHandle {
            id: run_id,
            events: rx,
            stop: self.stop.clone(),
            worker,
        })
    }
}

/// The caller's side of one run.
pub struct RunHandle {
    id: Uuid,
    events: mpsc::Receiver<RunEvent>,
    stop: StopFlag,
    worker: JoinHandle<()>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the engine to stop at its next check.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Next event, or `None` once the worker has gone away.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Wait for the worker itself to exit.
    pub async fn join(self) -> Result<(), RunnerError> {
        self.worker
            .await
            .map_err(|e| RunnerError::WorkerLost(e.to_string()))
    }

    /// Drain events until `Completed`, passing status lines to `on_status`.
    pub async fn wait(mut self, mut on_status: impl FnMut(&str)) -> Result<RunReport, RunnerError> {
        let mut result = None;
        while let Some(event) = self.next_event().await {
            match event {
                RunEvent::Status(text) => on_status(&text),
                RunEvent::Finished(report) => result = Some(Ok(report)),
                RunEvent::Failed(message) => result = Some(Err(RunnerError::Failed(message))),
                RunEvent::Completed => break,
            }
        }
        self.join().await?;
        result.unwrap_or_else(|| {
            Err(RunnerError::WorkerLost(
                "worker ended without a result".to_string(),
            ))
        })
    }
}
