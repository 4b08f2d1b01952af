//! Scripted automation surface: an in-memory simulation of the chat client.
//!
//! Built from a JSON fixture describing contacts, chats and fault points.
//! It keeps a real control tree (lists that page, detail views that open
//! and close, search results that repopulate, stale handles that go
//! detached) so the engines run unchanged against it. Used for rehearsal
//! runs from the CLI and by the engine tests.
//!
//! CHANGELOG:
//! - 10/12/2026 - Chat histories, group members, file transfer button
//! - 10/06/2026 - Fault points (unreachable, missing_input, manager_unavailable)
//! - 10/03/2026 - Initial implementation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

use super::labels;
use super::{
    AutomationSurface, Clipboard, Control, ControlKind, ControlQuery, Key, KeyCombo, WindowHint,
};
use crate::error::AutomationError;

const MANAGER_WINDOW: &str = "通讯录管理";
const SEARCH_HEADER: &str = "联系人";
const SESSIONS: &str = "会话";
/// Members shown before "view more" is clicked.
const MEMBERS_PREVIEW: usize = 4;

// ============================================================================
// Fixture
// ============================================================================

/// JSON description of the simulated client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub window_name: String,
    pub window_present: bool,
    /// Entries visible per page of the management list.
    pub page_size: usize,
    /// Force the management list's scrollability; auto when absent.
    pub scrollable: Option<bool>,
    /// Each PageDown also reverses the order of the visible entries.
    pub reorder_on_scroll: bool,
    /// The management window cannot be opened.
    pub manager_unavailable: bool,
    pub contacts: Vec<FixtureContact>,
    /// Navigation names that never show up in search results.
    pub unreachable: Vec<String>,
    /// Chats that open without a message input box.
    pub missing_input: Vec<String>,
    /// Conversation focused at start.
    pub current_chat: Option<String>,
    pub histories: BTreeMap<String, Vec<FixtureMessage>>,
    /// Group chat name -> member names.
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            window_name: "微信".to_string(),
            window_present: true,
            page_size: 8,
            scrollable: None,
            reorder_on_scroll: false,
            manager_unavailable: false,
            contacts: Vec::new(),
            unreachable: Vec::new(),
            missing_input: Vec::new(),
            current_chat: None,
            histories: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureContact {
    pub nickname: String,
    pub remark_name: String,
    /// `None` leaves the detail view without a wechat id row.
    pub wechat_id: Option<String>,
    pub region: Option<String>,
    pub tags: Vec<String>,
}

impl FixtureContact {
    pub fn new(nickname: &str, remark_name: &str, wechat_id: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            remark_name: remark_name.to_string(),
            wechat_id: Some(wechat_id.to_string()),
            ..Default::default()
        }
    }

    pub fn navigation_name(&self) -> &str {
        if self.remark_name.is_empty() {
            &self.nickname
        } else {
            &self.remark_name
        }
    }
}

/// One message bubble in a chat history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureMessage {
    pub text: String,
    pub sender: Option<String>,
    /// Time separators carry their label here.
    pub time: Option<String>,
    /// Texts inside the bubble pane (file name/size, transfer details).
    pub details: Vec<String>,
}

impl Fixture {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AutomationError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AutomationError::PlatformError(format!(
                "Failed to read surface fixture {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AutomationError::PlatformError(format!("Failed to parse surface fixture: {}", e))
        })
    }
}

/// A message that reached a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub recipient: String,
    pub text: String,
}

// ============================================================================
// Control tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Role {
    Plain,
    ContactsTab,
    OpenManager,
    ManagerWindow,
    TagToggle,
    TagPane(String),
    ManagerList,
    EntryOpen(usize),
    SearchEdit,
    SearchHit(String),
    ChatInput,
    FileTransfer,
    ChatInfo,
    ViewMore,
}

#[derive(Debug)]
struct Node {
    kind: ControlKind,
    name: String,
    role: Role,
    parent: Option<usize>,
    children: Vec<usize>,
    attached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Focus {
    None,
    Search,
    Chat,
}

#[derive(Debug)]
struct Manager {
    window: usize,
    list: usize,
    tag_panes: Vec<usize>,
    detail: Vec<usize>,
    filter: Option<String>,
    offset: usize,
    reversed: bool,
}

struct State {
    fixture: Fixture,
    nodes: Vec<Node>,
    main: usize,
    panel_title: usize,
    search_edit: usize,
    search_results: usize,
    message_list: usize,
    chat_input: Option<usize>,
    members: Option<usize>,
    manager: Option<Manager>,
    foreground: usize,
    focus: Focus,
    current_chat: Option<String>,
    clipboard: Clipboard,
    contents: HashMap<usize, String>,
    sent: Vec<SentMessage>,
    journal: Vec<String>,
}

/// Events the test hooks observe.
type SentHook = Box<dyn Fn(&SentMessage) + Send + Sync>;
type DetailHook = Box<dyn Fn(&str) + Send + Sync>;

/// In-memory chat client driven by a [`Fixture`].
pub struct ScriptedSurface {
    state: Mutex<State>,
    sent_hook: Option<SentHook>,
    detail_hook: Option<DetailHook>,
}

impl ScriptedSurface {
    pub fn new(fixture: Fixture) -> Self {
        let mut state = State {
            fixture,
            nodes: Vec::new(),
            main: 0,
            panel_title: 0,
            search_edit: 0,
            search_results: 0,
            message_list: 0,
            chat_input: None,
            members: None,
            manager: None,
            foreground: 0,
            focus: Focus::None,
            current_chat: None,
            clipboard: Clipboard::Empty,
            contents: HashMap::new(),
            sent: Vec::new(),
            journal: Vec::new(),
        };
        state.build_main_window();
        if let Some(chat) = state.fixture.current_chat.clone() {
            state.open_chat(&chat);
        }

        Self {
            state: Mutex::new(state),
            sent_hook: None,
            detail_hook: None,
        }
    }

    pub fn from_fixture_file<P: AsRef<Path>>(path: P) -> Result<Self, AutomationError> {
        Ok(Self::new(Fixture::load(path)?))
    }

    /// Called after every delivered message.
    pub fn with_sent_hook(mut self, hook: impl Fn(&SentMessage) + Send + Sync + 'static) -> Self {
        self.sent_hook = Some(Box::new(hook));
        self
    }

    /// Called with the navigation name whenever a contact detail view opens.
    pub fn with_detail_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.detail_hook = Some(Box::new(hook));
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Every action performed, in order.
    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    pub fn current_chat(&self) -> Option<String> {
        self.lock().current_chat.clone()
    }

    pub fn manager_open(&self) -> bool {
        self.lock().manager.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn add(&mut self, parent: Option<usize>, kind: ControlKind, name: &str, role: Role) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            name: name.to_string(),
            role,
            parent,
            children: Vec::new(),
            attached: true,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    fn detach(&mut self, id: usize) {
        if let Some(p) = self.nodes[id].parent {
            self.nodes[p].children.retain(|&c| c != id);
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            self.nodes[n].attached = false;
            stack.extend(self.nodes[n].children.iter().copied());
        }
    }

    fn build_main_window(&mut self) {
        let name = self.fixture.window_name.clone();
        let main = self.add(None, ControlKind::Window, &name, Role::Plain);
        self.main = main;
        self.foreground = main;

        self.panel_title = self.add(Some(main), ControlKind::Text, "", Role::Plain);
        self.add(Some(main), ControlKind::Button, labels::CONTACTS_TAB, Role::ContactsTab);
        let contacts = self.add(Some(main), ControlKind::List, labels::CONTACTS_LIST, Role::Plain);
        if !self.fixture.manager_unavailable {
            self.add(
                Some(contacts),
                ControlKind::Button,
                labels::CONTACTS_MANAGER,
                Role::OpenManager,
            );
        }
        self.search_edit =
            self.add(Some(main), ControlKind::Edit, labels::SEARCH, Role::SearchEdit);
        self.search_results = self.add(Some(main), ControlKind::List, "", Role::Plain);
        self.add(Some(main), ControlKind::List, SESSIONS, Role::Plain);
        self.add(Some(main), ControlKind::Button, labels::FILE_TRANSFER, Role::FileTransfer);
        self.message_list = self.add(Some(main), ControlKind::List, labels::MESSAGES, Role::Plain);
        self.add(Some(main), ControlKind::Button, labels::CHAT_INFO, Role::ChatInfo);
    }

    fn check(&self, control: Control) -> Result<usize, AutomationError> {
        let id = control.id() as usize;
        match self.nodes.get(id) {
            None => Err(AutomationError::ElementNotFound(format!("no control #{}", id))),
            Some(node) if !node.attached => Err(AutomationError::ElementDetached(format!(
                "#{} ({:?} {:?})",
                id, node.kind, node.name
            ))),
            Some(_) => Ok(id),
        }
    }

    fn note(&mut self, entry: String) {
        trace!(action = %entry, "scripted surface");
        self.journal.push(entry);
    }

    fn label(&self, id: usize) -> String {
        let node = &self.nodes[id];
        if node.name.is_empty() {
            format!("{:?}#{}", node.kind, id)
        } else {
            node.name.clone()
        }
    }

    // ------------------------------------------------------------------------
    // Chats and search
    // ------------------------------------------------------------------------

    fn open_chat(&mut self, name: &str) {
        self.current_chat = Some(name.to_string());
        self.nodes[self.panel_title].name = name.to_string();

        if let Some(old) = self.chat_input.take() {
            self.detach(old);
        }
        if let Some(old) = self.members.take() {
            self.detach(old);
        }
        if !self.fixture.missing_input.iter().any(|n| n == name) {
            let main = self.main;
            let input = self.add(Some(main), ControlKind::Edit, name, Role::ChatInput);
            self.contents.insert(input, String::new());
            self.chat_input = Some(input);
        }
        self.focus = Focus::Chat;

        let list = self.message_list;
        for child in self.nodes[list].children.clone() {
            self.detach(child);
        }
        let history = self.fixture.histories.get(name).cloned().unwrap_or_default();
        for msg in history {
            let item = self.add(Some(list), ControlKind::ListItem, &msg.text, Role::Plain);
            self.add(
                Some(item),
                ControlKind::Button,
                msg.sender.as_deref().unwrap_or(""),
                Role::Plain,
            );
            let pane = self.add(
                Some(item),
                ControlKind::Pane,
                msg.time.as_deref().unwrap_or(""),
                Role::Plain,
            );
            for detail in &msg.details {
                self.add(Some(pane), ControlKind::Text, detail, Role::Plain);
            }
        }
    }

    fn search_candidates(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .fixture
            .contacts
            .iter()
            .map(|c| c.navigation_name().to_string())
            .collect();
        names.extend(self.fixture.groups.keys().cloned());
        names.push(labels::FILE_TRANSFER.to_string());
        names.retain(|n| !n.is_empty() && !self.fixture.unreachable.contains(n));
        names.dedup();
        names
    }

    fn refresh_search(&mut self) {
        let list = self.search_results;
        for child in self.nodes[list].children.clone() {
            self.detach(child);
        }

        let query = self.contents.get(&self.search_edit).cloned().unwrap_or_default();
        if query.is_empty() {
            return;
        }

        self.add(Some(list), ControlKind::Text, SEARCH_HEADER, Role::Plain);
        let mut seen = Vec::new();
        for name in self.search_candidates() {
            if name.contains(&query) && !seen.contains(&name) {
                self.add(Some(list), ControlKind::Button, &name, Role::SearchHit(name.clone()));
                seen.push(name);
            }
        }
        // Trailing "search the network" row carries no name.
        self.add(Some(list), ControlKind::Button, "", Role::Plain);
    }

    fn edit_target(&self, id: usize) -> Option<usize> {
        if id == self.main {
            match self.focus {
                Focus::Search => Some(self.search_edit),
                Focus::Chat => self.chat_input,
                Focus::None => None,
            }
        } else if matches!(self.nodes[id].role, Role::SearchEdit | Role::ChatInput) {
            Some(id)
        } else {
            None
        }
    }

    fn paste(&mut self, target: usize) {
        let text = match &self.clipboard {
            Clipboard::Text(t) => t.clone(),
            _ => String::new(),
        };
        self.contents.entry(target).or_default().push_str(&text);
        if target == self.search_edit {
            self.refresh_search();
        }
    }

    fn clear(&mut self, target: usize) {
        self.contents.insert(target, String::new());
        if target == self.search_edit {
            self.refresh_search();
        }
    }

    fn submit(&mut self) -> Option<SentMessage> {
        let input = self.chat_input?;
        let text = self.contents.get(&input).cloned().unwrap_or_default();
        if text.is_empty() {
            return None;
        }
        self.contents.insert(input, String::new());
        let msg = SentMessage {
            recipient: self.current_chat.clone().unwrap_or_default(),
            text,
        };
        self.sent.push(msg.clone());
        Some(msg)
    }

    // ------------------------------------------------------------------------
    // Contacts management window
    // ------------------------------------------------------------------------

    fn open_manager(&mut self) {
        if self.manager.is_some() {
            return;
        }
        let window = self.add(None, ControlKind::Window, MANAGER_WINDOW, Role::ManagerWindow);
        self.add(Some(window), ControlKind::Button, labels::MAXIMIZE, Role::Plain);
        self.add(Some(window), ControlKind::Button, labels::TAG_PANEL, Role::TagToggle);
        let list = self.add(Some(window), ControlKind::List, "", Role::ManagerList);
        self.manager = Some(Manager {
            window,
            list,
            tag_panes: Vec::new(),
            detail: Vec::new(),
            filter: None,
            offset: 0,
            reversed: false,
        });
        self.foreground = window;
        self.refresh_entries();
    }

    fn close_manager(&mut self) {
        if let Some(manager) = self.manager.take() {
            self.detach(manager.window);
            self.foreground = self.main;
        }
    }

    fn visible_contacts(&self) -> Vec<usize> {
        let filter = self.manager.as_ref().and_then(|m| m.filter.clone());
        self.fixture
            .contacts
            .iter()
            .enumerate()
            .filter(|(_, c)| filter.as_ref().map_or(true, |tag| c.tags.contains(tag)))
            .map(|(i, _)| i)
            .collect()
    }

    fn scrollable(&self) -> bool {
        self.fixture
            .scrollable
            .unwrap_or_else(|| self.visible_contacts().len() > self.fixture.page_size)
    }

    fn refresh_entries(&mut self) {
        let (list, offset, reversed) = match self.manager.as_ref() {
            Some(m) => (m.list, m.offset, m.reversed),
            None => return,
        };
        for child in self.nodes[list].children.clone() {
            self.detach(child);
        }

        let visible = self.visible_contacts();
        let mut page: Vec<usize> = if self.scrollable() {
            visible.into_iter().skip(offset).take(self.fixture.page_size.max(1)).collect()
        } else {
            visible
        };
        if reversed {
            page.reverse();
        }

        for idx in page {
            let contact = self.fixture.contacts[idx].clone();
            let entry = self.add(
                Some(list),
                ControlKind::ListItem,
                contact.navigation_name(),
                Role::Plain,
            );
            self.add(Some(entry), ControlKind::Button, &contact.nickname, Role::EntryOpen(idx));
            self.add(Some(entry), ControlKind::Text, &contact.nickname, Role::Plain);
            self.add(Some(entry), ControlKind::Button, &contact.remark_name, Role::EntryOpen(idx));
            self.add(Some(entry), ControlKind::Button, &contact.tags.join(","), Role::Plain);
        }
    }

    fn page_down(&mut self) {
        let total = self.visible_contacts().len();
        let page = self.fixture.page_size.max(1);
        let reorder = self.fixture.reorder_on_scroll;
        if let Some(manager) = self.manager.as_mut() {
            manager.offset = (manager.offset + page).min(total.saturating_sub(page));
            manager.reversed ^= reorder;
        }
        self.refresh_entries();
    }

    fn toggle_tag_panel(&mut self) {
        let Some(manager) = self.manager.as_mut() else {
            return;
        };
        let window = manager.window;
        let panes = std::mem::take(&mut manager.tag_panes);
        if !panes.is_empty() {
            for pane in panes {
                self.detach(pane);
            }
            return;
        }

        let mut tags: Vec<String> = self
            .fixture
            .contacts
            .iter()
            .flat_map(|c| c.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        let created: Vec<usize> = tags
            .iter()
            .map(|tag| self.add(Some(window), ControlKind::Pane, tag, Role::TagPane(tag.clone())))
            .collect();
        if let Some(manager) = self.manager.as_mut() {
            manager.tag_panes = created;
        }
    }

    fn select_tag(&mut self, tag: &str) {
        if let Some(manager) = self.manager.as_mut() {
            manager.filter = Some(tag.to_string());
            manager.offset = 0;
        }
        self.refresh_entries();
    }

    fn close_detail(&mut self) -> bool {
        let detail = match self.manager.as_mut() {
            Some(m) if !m.detail.is_empty() => std::mem::take(&mut m.detail),
            _ => return false,
        };
        for node in detail {
            self.detach(node);
        }
        true
    }

    fn open_detail(&mut self, idx: usize) -> String {
        self.close_detail();
        let contact = self.fixture.contacts[idx].clone();
        let Some(window) = self.manager.as_ref().map(|m| m.window) else {
            return contact.navigation_name().to_string();
        };

        let mut rows: Vec<(&str, String)> = Vec::new();
        if let Some(id) = contact.wechat_id.clone() {
            rows.push((labels::WECHAT_ID_LABEL, id));
        }
        if let Some(region) = contact.region.clone() {
            rows.push((labels::REGION_LABEL, region));
        }
        if !contact.tags.is_empty() {
            rows.push((labels::TAG_LABEL, contact.tags.join(",")));
        }

        // Title row, always present.
        let mut created = vec![self.add(
            Some(window),
            ControlKind::Text,
            &contact.nickname,
            Role::Plain,
        )];
        for (label, value) in rows {
            created.push(self.add(Some(window), ControlKind::Text, label, Role::Plain));
            created.push(self.add(Some(window), ControlKind::Text, &value, Role::Plain));
        }
        if let Some(manager) = self.manager.as_mut() {
            manager.detail = created;
        }
        contact.navigation_name().to_string()
    }

    // ------------------------------------------------------------------------
    // Group chat info
    // ------------------------------------------------------------------------

    fn show_members(&mut self, all: bool) {
        let Some(chat) = self.current_chat.clone() else {
            return;
        };
        let Some(members) = self.fixture.groups.get(&chat).cloned() else {
            return;
        };
        if let Some(old) = self.members.take() {
            self.detach(old);
        }

        let main = self.main;
        let list = self.add(Some(main), ControlKind::List, labels::CHAT_MEMBERS, Role::Plain);
        let shown = if all { members.len() } else { members.len().min(MEMBERS_PREVIEW) };
        for member in &members[..shown] {
            let item = self.add(Some(list), ControlKind::ListItem, member, Role::Plain);
            self.add(Some(item), ControlKind::Button, member, Role::Plain);
        }
        if !all && members.len() > MEMBERS_PREVIEW {
            self.add(Some(main), ControlKind::Button, labels::VIEW_MORE, Role::ViewMore);
        }
        self.members = Some(list);
    }
}

// ============================================================================
// AutomationSurface
// ============================================================================

impl AutomationSurface for ScriptedSurface {
    fn find_window(
        &self,
        hint: &WindowHint,
        timeout: Duration,
    ) -> Result<Control, AutomationError> {
        let state = self.lock();
        if !state.fixture.window_present {
            return Err(AutomationError::Timeout(format!(
                "window {:?} did not appear within {:?}",
                hint.name, timeout
            )));
        }
        if hint.name == state.nodes[state.main].name {
            return Ok(Control::new(state.main as u64));
        }
        if let Some(ref manager) = state.manager {
            if hint.name == MANAGER_WINDOW {
                return Ok(Control::new(manager.window as u64));
            }
        }
        Err(AutomationError::Timeout(format!(
            "window {:?} did not appear within {:?}",
            hint.name, timeout
        )))
    }

    fn activate(&self, window: Control) -> Result<(), AutomationError> {
        let mut state = self.lock();
        let id = state.check(window)?;
        state.foreground = id;
        let label = state.label(id);
        state.note(format!("activate {}", label));
        Ok(())
    }

    fn minimize(&self, window: Control) -> Result<(), AutomationError> {
        let mut state = self.lock();
        let id = state.check(window)?;
        let label = state.label(id);
        state.note(format!("minimize {}", label));
        Ok(())
    }

    fn foreground(&self) -> Result<Control, AutomationError> {
        let state = self.lock();
        Ok(Control::new(state.foreground as u64))
    }

    fn find_control(
        &self,
        root: Control,
        query: &ControlQuery,
    ) -> Result<Control, AutomationError> {
        let state = self.lock();
        let root_id = state.check(root)?;

        let mut seen = 0;
        let mut stack: Vec<usize> = state.nodes[root_id].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &state.nodes[id];
            if query.matches(node.kind, &node.name) {
                seen += 1;
                if seen == query.index {
                    return Ok(Control::new(id as u64));
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }

        Err(AutomationError::ElementNotFound(format!(
            "{} under {}",
            query,
            state.label(root_id)
        )))
    }

    fn children(&self, control: Control) -> Result<Vec<Control>, AutomationError> {
        let state = self.lock();
        let id = state.check(control)?;
        Ok(state.nodes[id]
            .children
            .iter()
            .map(|&c| Control::new(c as u64))
            .collect())
    }

    fn next_sibling(&self, control: Control) -> Result<Control, AutomationError> {
        let state = self.lock();
        let id = state.check(control)?;
        let parent = state.nodes[id].parent.ok_or_else(|| {
            AutomationError::ElementNotFound(format!("{} has no parent", state.label(id)))
        })?;
        let siblings = &state.nodes[parent].children;
        siblings
            .iter()
            .position(|&c| c == id)
            .and_then(|pos| siblings.get(pos + 1))
            .map(|&c| Control::new(c as u64))
            .ok_or_else(|| {
                AutomationError::ElementNotFound(format!("sibling after {}", state.label(id)))
            })
    }

    fn is_scrollable(&self, control: Control) -> Result<bool, AutomationError> {
        let state = self.lock();
        let id = state.check(control)?;
        Ok(state.nodes[id].role == Role::ManagerList && state.scrollable())
    }

    fn click(&self, control: Control) -> Result<(), AutomationError> {
        let mut opened_detail = None;
        {
            let mut state = self.lock();
            let id = state.check(control)?;
            let label = state.label(id);
            state.note(format!("click {}", label));

            match state.nodes[id].role.clone() {
                Role::OpenManager => state.open_manager(),
                Role::TagToggle => state.toggle_tag_panel(),
                Role::TagPane(tag) => state.select_tag(&tag),
                Role::EntryOpen(idx) => opened_detail = Some(state.open_detail(idx)),
                Role::SearchHit(name) => state.open_chat(&name),
                Role::FileTransfer => state.open_chat(labels::FILE_TRANSFER),
                Role::ChatInfo => state.show_members(false),
                Role::ViewMore => {
                    state.show_members(true);
                    state.detach(id);
                }
                Role::SearchEdit => state.focus = Focus::Search,
                Role::ChatInput => state.focus = Focus::Chat,
                Role::ContactsTab | Role::ManagerWindow | Role::ManagerList | Role::Plain => {}
            }
        }

        if let (Some(name), Some(hook)) = (opened_detail, self.detail_hook.as_ref()) {
            hook(&name);
        }
        Ok(())
    }

    fn send_keys(&self, control: Control, keys: KeyCombo) -> Result<(), AutomationError> {
        let delivered = {
            let mut state = self.lock();
            let id = state.check(control)?;
            let label = state.label(id);
            state.note(format!("keys {} -> {}", keys, label));

            let mut delivered = None;
            match (keys.ctrl, keys.key) {
                (true, Key::Char('f')) => {
                    if id == state.main {
                        state.focus = Focus::Search;
                    }
                }
                (true, Key::Char('a')) => {}
                (true, Key::Char('v')) => {
                    if let Some(target) = state.edit_target(id) {
                        state.paste(target);
                    }
                }
                (false, Key::Delete) => {
                    if let Some(target) = state.edit_target(id) {
                        state.clear(target);
                    }
                }
                (false, Key::Enter) => {
                    delivered = state.submit();
                }
                (false, Key::Escape) => {
                    if !state.close_detail() {
                        state.close_manager();
                    }
                }
                (false, Key::PageDown) => {
                    if state.nodes[id].role == Role::ManagerList {
                        state.page_down();
                    }
                }
                _ => {}
            }
            delivered
        };

        if let Some(msg) = delivered {
            debug!(recipient = %msg.recipient, "scripted surface delivered message");
            if let Some(hook) = self.sent_hook.as_ref() {
                hook(&msg);
            }
        }
        Ok(())
    }

    fn scroll_up(&self, control: Control, wheel_times: u32) -> Result<(), AutomationError> {
        let mut state = self.lock();
        let id = state.check(control)?;
        let label = state.label(id);
        state.note(format!("wheel up x{} -> {}", wheel_times, label));
        Ok(())
    }

    fn set_clipboard_text(&self, text: &str) -> Result<(), AutomationError> {
        let mut state = self.lock();
        state.clipboard = Clipboard::Text(text.to_string());
        state.note(format!("clipboard <- {:?}", text));
        Ok(())
    }

    fn clipboard(&self) -> Result<Clipboard, AutomationError> {
        Ok(self.lock().clipboard.clone())
    }

    fn text_of(&self, control: Control) -> Result<String, AutomationError> {
        let state = self.lock();
        let id = state.check(control)?;
        Ok(state.nodes[id].name.clone())
    }
}
