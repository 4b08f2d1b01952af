//! Chat history reader and group member listing for the focused conversation.
//!
//! Message bubbles are classified from their visible text plus the sender
//! buttons and detail texts inside each bubble.
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial implementation

use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::Timing;
use crate::error::{AutomationError, BatchError};
use crate::session::Session;
use crate::surface::{labels, Control, ControlQuery, SurfaceExt};

/// Wheel ticks per page of history.
const WHEEL_TICKS_PER_PAGE: u32 = 15;

const SYSTEM_SENDER: &str = "System";

const SYSTEM_NOTICES: [&str; 3] = [
    "以下为新消息",
    "查看更多消息",
    "该类型文件可能存在安全风险，建议先检查文件安全性后再打开。",
];

const PAYMENT_NOTICES: [&str; 4] = [
    "发出红包，请在手机上查看",
    "收到红包，请在手机上查看",
    "你发送了一次转账收款提醒，请在手机上查看",
    "你收到了一次转账收款提醒，请在手机上查看",
];

const RECALL_MARKERS: [&str; 2] = ["撤回了一条消息", "尝试撤回上一条消息"];
const RED_ENVELOPE_CLAIMED: &str = "领取了你的红包";
const FILE_BUBBLE: &str = "[文件]";
const TRANSFER_BUBBLE: &str = "微信转账";
const FORWARDED_RECORDS: &str = "[聊天记录]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChatRecordKind {
    Time,
    System,
    Recall,
    RedEnvelope,
    File,
    Cited,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRecord {
    pub kind: ChatRecordKind,
    pub sender: String,
    pub text: String,
}

impl ChatRecord {
    fn new(kind: ChatRecordKind, sender: &str, text: impl Into<String>) -> Self {
        Self {
            kind,
            sender: sender.to_string(),
            text: text.into(),
        }
    }
}

/// What one message bubble shows. Missing parts are empty strings.
#[derive(Debug, Clone, Default)]
pub struct Bubble {
    pub text: String,
    /// Name of the bubble's pane; only time separators carry one.
    pub time: String,
    pub sender: String,
    pub second_sender: String,
    /// Texts inside the pane, in order.
    pub details: Vec<String>,
}

impl Bubble {
    fn detail(&self, n: usize) -> &str {
        self.details.get(n - 1).map(String::as_str).unwrap_or("")
    }
}

/// Classify one bubble. Empty bubbles yield `None`.
pub fn classify(bubble: &Bubble) -> Option<ChatRecord> {
    use ChatRecordKind::*;

    let text = bubble.text.as_str();
    if text.is_empty() {
        return None;
    }
    if !bubble.time.is_empty() {
        return Some(ChatRecord::new(Time, SYSTEM_SENDER, bubble.time.clone()));
    }
    if text.contains("你已添加了") && text.contains("现在可以开始聊天了") {
        return Some(ChatRecord::new(System, SYSTEM_SENDER, text));
    }
    if SYSTEM_NOTICES.contains(&text) {
        return Some(ChatRecord::new(System, SYSTEM_SENDER, text));
    }
    if RECALL_MARKERS.iter().any(|m| text.contains(m)) {
        // Sender is everything before the last space, with its spaces dropped.
        let (sender, notice) = match text.rsplit_once(' ') {
            Some((head, last)) => (head.replace(' ', ""), last),
            None => (String::new(), text),
        };
        return Some(ChatRecord::new(Recall, &sender, notice));
    }
    if PAYMENT_NOTICES.contains(&text) {
        return Some(ChatRecord::new(RedEnvelope, SYSTEM_SENDER, text));
    }
    if text.contains(RED_ENVELOPE_CLAIMED) {
        let mut parts = text.split(RED_ENVELOPE_CLAIMED);
        let claimer = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("");
        return Some(ChatRecord::new(RedEnvelope, claimer, rest));
    }

    let sender = bubble.sender.as_str();
    if text == FILE_BUBBLE {
        let summary = format!(
            "size: {}  ---  file_name: {}",
            bubble.detail(2),
            bubble.detail(1)
        );
        return Some(ChatRecord::new(File, sender, summary));
    }
    if text == TRANSFER_BUBBLE {
        let summary = format!("{}    {}    {}", text, bubble.detail(2), bubble.detail(3));
        return Some(ChatRecord::new(RedEnvelope, sender, summary));
    }
    if text.contains("引用") && text.contains("的消息") {
        return Some(ChatRecord::new(Cited, sender, text));
    }
    if text == FORWARDED_RECORDS && sender.is_empty() {
        return Some(ChatRecord::new(Content, &bubble.second_sender, text));
    }
    Some(ChatRecord::new(Content, sender, text))
}

pub struct HistoryReader<'a> {
    session: &'a Session,
}

impl<'a> HistoryReader<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Scroll back `pages` pages, then classify everything in the message list.
    #[instrument(skip(self))]
    pub fn read_chat_records(&self, pages: u32) -> Result<Vec<ChatRecord>, BatchError> {
        let surface = self.session.surface();
        let list = surface
            .find_control(self.session.window(), &ControlQuery::list().named(labels::MESSAGES))
            .map_err(|source| BatchError::Navigation {
                what: "message list",
                source,
            })?;

        for _ in 0..pages {
            surface.scroll_up(list, WHEEL_TICKS_PER_PAGE)?;
        }

        let mut records = Vec::new();
        for item in surface.children(list)? {
            if let Some(record) = classify(&self.read_bubble(item)?) {
                records.push(record);
            }
        }
        debug!(count = records.len(), "Read chat records");
        Ok(records)
    }

    fn read_bubble(&self, item: Control) -> Result<Bubble, AutomationError> {
        let surface = self.session.surface();
        let text = surface.text_of(item)?;
        if text.is_empty() {
            return Ok(Bubble::default());
        }

        let mut bubble = Bubble {
            text,
            sender: lookup(surface.text_at(item, &ControlQuery::button()))?,
            second_sender: lookup(surface.text_at(item, &ControlQuery::button().nth(2)))?,
            ..Default::default()
        };
        if let Some(pane) = surface.try_find(item, &ControlQuery::pane())? {
            bubble.time = surface.text_of(pane)?;
            for n in 1..=3 {
                match surface.try_find(pane, &ControlQuery::text().nth(n))? {
                    Some(text) => bubble.details.push(surface.text_of(text)?),
                    None => break,
                }
            }
        }
        Ok(bubble)
    }

    /// Member names of the focused group chat; empty for one-to-one chats.
    #[instrument(skip(self))]
    pub fn group_members(&self) -> Result<Vec<String>, BatchError> {
        let surface = self.session.surface();
        let window = self.session.window();
        let members_query = ControlQuery::list().named(labels::CHAT_MEMBERS);

        surface.click_control(window, &ControlQuery::button().named(labels::CHAT_INFO))?;
        Timing::pause(self.session.timing().chat_info_ms);

        let Some(mut list) = surface.try_find(window, &members_query)? else {
            debug!("No member list, not a group chat");
            return Ok(Vec::new());
        };
        let view_more = ControlQuery::button().named(labels::VIEW_MORE);
        if let Some(more) = surface.try_find(window, &view_more)? {
            surface.click(more)?;
            Timing::pause(self.session.timing().chat_info_ms);
            // The expanded list replaces the preview.
            list = surface.find_control(window, &members_query)?;
        }

        let mut members = Vec::new();
        for item in surface.children(list)? {
            members.push(surface.text_at(item, &ControlQuery::button())?);
        }
        Ok(members)
    }
}

fn lookup(result: Result<String, AutomationError>) -> Result<String, AutomationError> {
    match result {
        Err(e) if e.is_not_found() => Ok(String::new()),
        other => other,
    }
}
