//! Greeting dispatcher: replays one templated message to every recipient
//! of a contact table and logs the outcome of each attempt.
//!
//! Per recipient: open the conversation (skipped when it is already
//! focused), replace the input box content through the clipboard, submit.
//! Failures are recorded as `E` and the run moves on; only a missing main
//! window or an unreadable table aborts a run.
//!
//! CHANGELOG:
//! - 10/18/2026 - Log name resolved before the first send
//! - 10/12/2026 - Note-to-self via the file transfer conversation
//! - 10/07/2026 - Dry-run pastes an empty clipboard
//! - 10/04/2026 - Initial implementation

pub mod template;

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cancel::StopFlag;
use crate::config::{Config, RowDefaults};
use crate::contacts::record::{DeliveryStatus, OutcomeLogEntry};
use crate::contacts::table::{self, ContactTable, Plan};
use crate::error::{AutomationError, BatchError};
use crate::filename;
use crate::runner::StatusSink;
use crate::session::Session;
use crate::surface::{labels, Clipboard, Control, ControlQuery, KeyCombo};

/// One dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Message template with `{称谓}`/`{敬语}` placeholders.
    pub template: String,
    pub table: PathBuf,
    /// Walk the full flow but paste an empty clipboard.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub planned: usize,
    pub skipped_rows: usize,
    pub delivered: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub stopped: bool,
    pub log_path: Option<PathBuf>,
    pub outcomes: Vec<OutcomeLogEntry>,
}

/// Why a single recipient was logged as `E`.
#[derive(Error, Debug)]
enum DeliveryError {
    #[error("no conversation named {0:?} in search results")]
    NotFound(String),

    #[error("stop requested")]
    Stopped,

    #[error("conversation {name:?} has no input box: {source}")]
    NoInput {
        name: String,
        #[source]
        source: AutomationError,
    },

    #[error("clipboard does not hold the message (found {0})")]
    ClipboardMismatch(&'static str),

    #[error(transparent)]
    Surface(#[from] AutomationError),
}

/// A checked request: the recipient plan and where its outcome log goes.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub plan: Plan,
    pub log_path: PathBuf,
}

/// Check the request, name its log and load its plan before any automation
/// happens.
///
/// Returns `Ok(None)` for an empty template: nothing to send.
pub fn prepare(
    request: &DispatchRequest,
    config: &Config,
    status: &dyn StatusSink,
) -> Result<Option<Prepared>, BatchError> {
    if request.template.trim().is_empty() {
        status.status("message is empty, nothing to send");
        return Ok(None);
    }
    let log_path = config
        .dispatch
        .log_dir()
        .join(filename::resolve(&config.dispatch.log_template)?);
    let plan = load_plan(&request.table, &config.defaults)?;
    Ok(Some(Prepared { plan, log_path }))
}

/// Read a contact table and build its recipient plan.
pub fn load_plan(path: &Path, defaults: &RowDefaults) -> Result<Plan, BatchError> {
    let table = ContactTable::read(path)?;
    Ok(table.plan(defaults))
}

pub struct Dispatcher<'a> {
    session: &'a Session,
    config: &'a Config,
    stop: &'a StopFlag,
    status: &'a dyn StatusSink,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        session: &'a Session,
        config: &'a Config,
        stop: &'a StopFlag,
        status: &'a dyn StatusSink,
    ) -> Self {
        Self {
            session,
            config,
            stop,
            status,
        }
    }

    /// Prepare and run in one go.
    pub fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReport, BatchError> {
        match prepare(request, self.config, self.status)? {
            Some(prepared) => self.run(&request.template, prepared, request.dry_run),
            None => Ok(DispatchReport {
                dry_run: request.dry_run,
                ..Default::default()
            }),
        }
    }

    /// Deliver `template` to every task of the plan, then write the outcome log.
    #[instrument(skip_all, fields(recipients = prepared.plan.tasks.len(), dry_run = dry_run))]
    pub fn run(
        &self,
        template: &str,
        prepared: Prepared,
        dry_run: bool,
    ) -> Result<DispatchReport, BatchError> {
        let Prepared { plan, log_path } = prepared;
        let mut report = DispatchReport {
            planned: plan.tasks.len(),
            skipped_rows: plan.skipped(),
            dry_run,
            ..Default::default()
        };
        self.status.status(&format!(
            "Sending to {} recipients ({} rows skipped)",
            report.planned, report.skipped_rows
        ));

        for task in plan.tasks {
            if self.stop.is_stopped() {
                info!("Stop requested, ending dispatch");
                break;
            }

            let message = template::render(template, &task.title, &task.honorific);
            let name = task.navigation_name().to_string();

            let status = match self.deliver(&name, &message, dry_run) {
                Ok(()) => {
                    report.delivered += 1;
                    self.status.status(&format!(
                        "Processed {}: {} succeeded so far",
                        name, report.delivered
                    ));
                    DeliveryStatus::Delivered
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Delivery to {:?} failed: {}", name, e);
                    self.status.status(&format!(
                        "Failed {}: {} ({} succeeded so far)",
                        name, e, report.delivered
                    ));
                    DeliveryStatus::Error
                }
            };
            report.outcomes.push(OutcomeLogEntry {
                task,
                status,
                message,
            });
        }

        report.stopped = self.stop.is_stopped();
        if !report.outcomes.is_empty() {
            table::write_log(&log_path, &report.outcomes)?;
            info!("Wrote outcome log {:?}", log_path);
            self.status
                .status(&format!("Outcome log written to {}", log_path.display()));
            report.log_path = Some(log_path);
        }

        Ok(report)
    }

    fn deliver(&self, name: &str, message: &str, dry_run: bool) -> Result<(), DeliveryError> {
        let surface = self.session.surface();
        let window = self.session.window();
        let timing = self.session.timing();

        let focused = self.session.current_panel_name()?;
        if focused.as_deref() == Some(name) {
            debug!("Conversation already focused");
        } else if !self.session.goto_chat(name)? {
            return Err(DeliveryError::NotFound(name.to_string()));
        }
        if self.stop.is_stopped() {
            return Err(DeliveryError::Stopped);
        }

        let input = surface
            .find_control(window, &ControlQuery::edit().named(name))
            .map_err(|source| DeliveryError::NoInput {
                name: name.to_string(),
                source,
            })?;
        let payload = if dry_run { "" } else { message };
        self.replace_input(input, payload)?;
        if self.stop.is_stopped() {
            return Err(DeliveryError::Stopped);
        }

        self.session.press(window, KeyCombo::ENTER, timing.submit_ms)?;
        Ok(())
    }

    /// Clear the input box and paste `text` through the clipboard.
    fn replace_input(&self, input: Control, text: &str) -> Result<(), DeliveryError> {
        let surface = self.session.surface();
        let timing = self.session.timing();

        self.session.press(input, KeyCombo::ctrl('a'), timing.key_wait_ms)?;
        self.session.press(input, KeyCombo::DELETE, 0)?;
        surface.set_clipboard_text(text)?;
        match surface.clipboard()? {
            Clipboard::Text(held) if held == text => {}
            Clipboard::Empty if text.is_empty() => {}
            Clipboard::Text(_) => return Err(DeliveryError::ClipboardMismatch("other text")),
            Clipboard::Empty => return Err(DeliveryError::ClipboardMismatch("nothing")),
            Clipboard::Bitmap { .. } => return Err(DeliveryError::ClipboardMismatch("an image")),
        }
        self.session
            .press(input, KeyCombo::ctrl('v'), timing.clipboard_paste_ms)?;
        Ok(())
    }

    /// Send each non-empty message to the file transfer conversation.
    ///
    /// Returns how many were submitted.
    #[instrument(skip_all, fields(messages = messages.len()))]
    pub fn send_to_file_transfer(&self, messages: &[String]) -> Result<usize, BatchError> {
        let window = self.session.window();
        self.session.goto_file_transfer()?;
        let input = self
            .session
            .surface()
            .find_control(window, &ControlQuery::edit().named(labels::FILE_TRANSFER))?;

        let mut sent = 0;
        for message in messages.iter().filter(|m| !m.is_empty()) {
            if self.stop.is_stopped() {
                info!("Stop requested, ending note-to-self");
                break;
            }
            match self.replace_input(input, message) {
                Ok(()) => {}
                Err(DeliveryError::Surface(e)) => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping note: {}", e);
                    continue;
                }
            }
            self.session
                .press(window, KeyCombo::ENTER, self.session.timing().submit_ms)?;
            sent += 1;
            self.status.status(&format!("Noted {} of {}", sent, messages.len()));
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Timing, WindowConfig};
    use crate::contacts::record::RecipientTask;
    use crate::surface::scripted::{Fixture, FixtureContact, ScriptedSurface, SentMessage};
    use std::fs;
    use std::sync::{Arc, Mutex};

    const TABLE: &str = "昵称,备注名,微信名,地区,标签,称谓,敬语,标志\n\
                         张三,张总,zhangsan,,,张总,您,Y\n\
                         李四,,lisi,,,,,Y\n\
                         王五,王老师,wangwu,,,王老师,老师,Y\n";

    struct Rig {
        surface: Arc<ScriptedSurface>,
        session: Session,
        config: Config,
        stop: StopFlag,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        Fixture {
            contacts: vec![
                FixtureContact::new("张三", "张总", "zhangsan"),
                FixtureContact::new("李四", "", "lisi"),
                FixtureContact::new("王五", "王老师", "wangwu"),
            ],
            ..Default::default()
        }
    }

    fn rig_with(surface: ScriptedSurface, stop: StopFlag) -> Rig {
        let surface = Arc::new(surface);
        let session = Session::attach(surface.clone(), &WindowConfig::default(), Timing::instant())
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.dispatch.log_dir = dir.path().join("logs").to_string_lossy().to_string();
        fs::write(dir.path().join("contacts.csv"), TABLE).unwrap();
        Rig {
            surface,
            session,
            config,
            stop,
            dir,
        }
    }

    fn rig(fixture: Fixture) -> Rig {
        rig_with(ScriptedSurface::new(fixture), StopFlag::new())
    }

    impl Rig {
        fn request(&self, template: &str, dry_run: bool) -> DispatchRequest {
            DispatchRequest {
                template: template.to_string(),
                table: self.dir.path().join("contacts.csv"),
                dry_run,
            }
        }

        fn dispatch(&self, request: &DispatchRequest) -> (DispatchReport, Vec<String>) {
            let statuses = Mutex::new(Vec::new());
            let sink = |s: &str| statuses.lock().unwrap().push(s.to_string());
            let report = Dispatcher::new(&self.session, &self.config, &self.stop, &sink)
                .dispatch(request)
                .unwrap();
            (report, statuses.into_inner().unwrap())
        }

        fn log_files(&self) -> Vec<PathBuf> {
            match fs::read_dir(self.dir.path().join("logs")) {
                Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    fn statuses(report: &DispatchReport) -> Vec<&'static str> {
        report.outcomes.iter().map(|o| o.status.tag()).collect()
    }

    #[test]
    fn test_unreachable_recipient_logged_as_error() {
        let mut fx = fixture();
        fx.unreachable = vec!["李四".to_string()];
        let rig = rig(fx);

        let (report, lines) = rig.dispatch(&rig.request("新年好{称谓}，祝{敬语}安康", false));

        assert_eq!(statuses(&report), vec!["D", "E", "D"]);
        assert!(lines
            .iter()
            .any(|l| l.starts_with("Failed 李四") && l.ends_with("(1 succeeded so far)")));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(
            rig.surface.sent(),
            vec![
                SentMessage {
                    recipient: "张总".to_string(),
                    text: "新年好张总，祝您安康".to_string()
                },
                SentMessage {
                    recipient: "王老师".to_string(),
                    text: "新年好王老师，祝老师安康".to_string()
                },
            ]
        );

        let log = fs::read_to_string(report.log_path.unwrap()).unwrap();
        let lines: Vec<&str> = log.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines[0], "昵称,备注名,微信名,地区,标签,称谓,敬语,标志,已发送信息");
        assert_eq!(lines[2], "李四,,lisi,,,您,您,E,新年好您，祝您安康");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_log_name_follows_template() {
        let rig = rig(fixture());
        let (report, _) = rig.dispatch(&rig.request("hi", false));

        let name = report
            .log_path
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert!(name.starts_with("_log"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "_log20240210-080000.csv".len());
    }

    #[test]
    fn test_empty_template_sends_nothing() {
        let rig = rig(fixture());
        let (report, statuses) = rig.dispatch(&rig.request("  ", false));

        assert_eq!(report.planned, 0);
        assert!(report.outcomes.is_empty());
        assert!(rig.surface.journal().iter().all(|j| !j.starts_with("keys")));
        assert!(statuses.iter().any(|s| s.contains("message is empty")));
        assert!(rig.log_files().is_empty());
    }

    #[test]
    fn test_stop_before_start_writes_no_log() {
        let stop = StopFlag::new();
        stop.request_stop();
        let rig = rig_with(ScriptedSurface::new(fixture()), stop);

        let (report, _) = rig.dispatch(&rig.request("hi", false));

        assert!(report.outcomes.is_empty());
        assert!(report.stopped);
        assert_eq!(report.log_path, None);
        assert!(rig.surface.sent().is_empty());
        assert!(rig.log_files().is_empty());
    }

    #[test]
    fn test_stop_after_first_delivery() {
        let stop = StopFlag::new();
        let hook_stop = stop.clone();
        let surface =
            ScriptedSurface::new(fixture()).with_sent_hook(move |_| hook_stop.request_stop());
        let rig = rig_with(surface, stop);

        let (report, _) = rig.dispatch(&rig.request("hi", false));

        assert_eq!(statuses(&report), vec!["D"]);
        assert!(report.stopped);
        assert_eq!(rig.log_files().len(), 1);
    }

    #[test]
    fn test_dry_run_pastes_empty_clipboard() {
        let rig = rig(fixture());
        let (report, _) = rig.dispatch(&rig.request("新年好", true));

        assert!(rig.surface.sent().is_empty());
        assert_eq!(statuses(&report), vec!["D", "D", "D"]);
        assert!(report.dry_run);
        // The rendered message is still logged.
        assert_eq!(report.outcomes[0].message, "新年好");
        let journal = rig.surface.journal();
        assert!(journal.iter().any(|j| j == "clipboard <- \"\""));
        assert!(!journal.iter().any(|j| j == "clipboard <- \"新年好\""));
    }

    #[test]
    fn test_missing_input_box_is_error() {
        let mut fx = fixture();
        fx.missing_input = vec!["张总".to_string()];
        let rig = rig(fx);

        let (report, _) = rig.dispatch(&rig.request("hi", false));

        assert_eq!(statuses(&report), vec!["E", "D", "D"]);
    }

    #[test]
    fn test_focused_conversation_skips_search() {
        let mut fx = fixture();
        fx.current_chat = Some("张总".to_string());
        let rig = rig(fx);
        let plan = Plan {
            tasks: vec![RecipientTask {
                nickname: "张三".to_string(),
                namecomment: "张总".to_string(),
                wechat_id: "zhangsan".to_string(),
                region: String::new(),
                tag: String::new(),
                title: "张总".to_string(),
                honorific: "您".to_string(),
                mark: Some("Y".to_string()),
            }],
            ..Default::default()
        };
        let sink = |_: &str| {};

        let prepared = Prepared {
            plan,
            log_path: rig.dir.path().join("log.csv"),
        };

        let report = Dispatcher::new(&rig.session, &rig.config, &rig.stop, &sink)
            .run("hi", prepared, false)
            .unwrap();

        assert_eq!(statuses(&report), vec!["D"]);
        assert!(!rig.surface.journal().iter().any(|j| j.contains("Ctrl+F")));
        assert_eq!(rig.surface.sent().len(), 1);
    }

    #[test]
    fn test_malformed_table_is_fatal() {
        let rig = rig(fixture());
        fs::write(rig.dir.path().join("bad.csv"), "昵称,备注名\n张三,张总\n").unwrap();
        let sink = |_: &str| {};
        let request = DispatchRequest {
            template: "hi".to_string(),
            table: rig.dir.path().join("bad.csv"),
            dry_run: false,
        };

        let err = Dispatcher::new(&rig.session, &rig.config, &rig.stop, &sink)
            .dispatch(&request)
            .unwrap_err();

        assert!(matches!(err, BatchError::Table(_)));
        assert!(rig.surface.journal().iter().all(|j| !j.starts_with("keys")));
    }

    #[test]
    fn test_bad_log_template_sends_nothing() {
        let mut rig = rig(fixture());
        rig.config.dispatch.log_template = "_log[%Q].csv".to_string();
        let sink = |_: &str| {};

        let err = Dispatcher::new(&rig.session, &rig.config, &rig.stop, &sink)
            .dispatch(&rig.request("hi", false))
            .unwrap_err();

        assert!(matches!(err, BatchError::FilenameTemplate { .. }));
        assert!(rig.surface.sent().is_empty());
        assert!(rig.surface.journal().iter().all(|j| !j.starts_with("keys")));
        assert!(rig.log_files().is_empty());
    }

    #[test]
    fn test_note_to_self() {
        let rig = rig(fixture());
        let sink = |_: &str| {};
        let messages = vec!["第一条".to_string(), String::new(), "第二条".to_string()];

        let sent = Dispatcher::new(&rig.session, &rig.config, &rig.stop, &sink)
            .send_to_file_transfer(&messages)
            .unwrap();

        assert_eq!(sent, 2);
        let delivered = rig.surface.sent();
        assert!(delivered.iter().all(|m| m.recipient == labels::FILE_TRANSFER));
        assert_eq!(delivered[1].text, "第二条");
    }
}
