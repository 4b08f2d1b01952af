//! Automation surface: the seam between the engines and the chat client.
//!
//! Any backend that can find, click and read controls and drive the
//! clipboard can stand in for the real accessibility layer. Every call is
//! fallible; callers decide whether a not-found is per-item or run-aborting.
//!
//! CHANGELOG:
//! - 10/12/2026 - scroll_up and minimize for the history reader
//! - 10/02/2026 - Initial implementation

pub mod labels;
pub mod scripted;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::AutomationError;

/// Opaque handle to a control, issued by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Control(u64);

impl Control {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Control types the engines search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Window,
    Button,
    List,
    ListItem,
    Text,
    Edit,
    Pane,
}

/// Descendant lookup: kind, optional exact name, and a 1-based match index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlQuery {
    pub kind: ControlKind,
    pub name: Option<String>,
    pub index: usize,
}

impl ControlQuery {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            name: None,
            index: 1,
        }
    }

    pub fn button() -> Self {
        Self::new(ControlKind::Button)
    }

    pub fn list() -> Self {
        Self::new(ControlKind::List)
    }

    pub fn text() -> Self {
        Self::new(ControlKind::Text)
    }

    pub fn edit() -> Self {
        Self::new(ControlKind::Edit)
    }

    pub fn pane() -> Self {
        Self::new(ControlKind::Pane)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pick the n-th match (1-based) in depth-first order.
    pub fn nth(mut self, index: usize) -> Self {
        self.index = index.max(1);
        self
    }

    pub fn matches(&self, kind: ControlKind, name: &str) -> bool {
        self.kind == kind && self.name.as_deref().map_or(true, |n| n == name)
    }
}

impl fmt::Display for ControlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ref name) = self.name {
            write!(f, "[name={:?}]", name)?;
        }
        if self.index > 1 {
            write!(f, "#{}", self.index)?;
        }
        Ok(())
    }
}

/// Keys the engines press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Delete,
    Enter,
    Escape,
    PageDown,
}

/// A key, optionally with Ctrl held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCombo {
    pub ctrl: bool,
    pub key: Key,
}

impl KeyCombo {
    pub const DELETE: KeyCombo = KeyCombo::plain(Key::Delete);
    pub const ENTER: KeyCombo = KeyCombo::plain(Key::Enter);
    pub const ESCAPE: KeyCombo = KeyCombo::plain(Key::Escape);
    pub const PAGE_DOWN: KeyCombo = KeyCombo::plain(Key::PageDown);

    pub const fn plain(key: Key) -> Self {
        Self { ctrl: false, key }
    }

    pub const fn ctrl(c: char) -> Self {
        Self {
            ctrl: true,
            key: Key::Char(c),
        }
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        match self.key {
            Key::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            other => write!(f, "{:?}", other),
        }
    }
}

/// What the clipboard currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clipboard {
    Empty,
    Text(String),
    Bitmap { width: u32, height: u32 },
}

/// Window lookup hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHint {
    pub name: String,
    pub class_name: Option<String>,
}

/// Operations the engines need from the chat client's UI.
///
/// Implementations are driven by one worker at a time; the engines never
/// interleave calls from several threads.
pub trait AutomationSurface: Send + Sync {
    /// Find a top-level window, waiting up to `timeout` for it to appear.
    fn find_window(&self, hint: &WindowHint, timeout: Duration)
        -> Result<Control, AutomationError>;

    /// Bring a window to the foreground.
    fn activate(&self, window: Control) -> Result<(), AutomationError>;

    fn minimize(&self, window: Control) -> Result<(), AutomationError>;

    /// The window that currently has focus.
    fn foreground(&self) -> Result<Control, AutomationError>;

    fn find_control(&self, root: Control, query: &ControlQuery)
        -> Result<Control, AutomationError>;

    /// Direct children in display order.
    fn children(&self, control: Control) -> Result<Vec<Control>, AutomationError>;

    fn next_sibling(&self, control: Control) -> Result<Control, AutomationError>;

    fn is_scrollable(&self, control: Control) -> Result<bool, AutomationError>;

    fn click(&self, control: Control) -> Result<(), AutomationError>;

    fn send_keys(&self, control: Control, keys: KeyCombo) -> Result<(), AutomationError>;

    /// Mouse-wheel up over a control.
    fn scroll_up(&self, control: Control, wheel_times: u32) -> Result<(), AutomationError>;

    fn set_clipboard_text(&self, text: &str) -> Result<(), AutomationError>;

    fn clipboard(&self) -> Result<Clipboard, AutomationError>;

    /// The control's accessible name.
    fn text_of(&self, control: Control) -> Result<String, AutomationError>;
}

/// Convenience lookups shared by the engines.
pub trait SurfaceExt: AutomationSurface {
    /// Find a control and return its name.
    fn text_at(&self, root: Control, query: &ControlQuery) -> Result<String, AutomationError> {
        let control = self.find_control(root, query)?;
        self.text_of(control)
    }

    /// Name of the control following the labelled one (label/value pairs).
    fn value_after_label(&self, root: Control, label: &str) -> Result<String, AutomationError> {
        let label = self.find_control(root, &ControlQuery::text().named(label))?;
        let value = self.next_sibling(label)?;
        self.text_of(value)
    }

    /// Find-then-click in one call.
    fn click_control(&self, root: Control, query: &ControlQuery) -> Result<(), AutomationError> {
        let control = self.find_control(root, query)?;
        self.click(control)
    }

    /// Lookup that maps "not there" to `None` and keeps real failures.
    fn try_find(
        &self,
        root: Control,
        query: &ControlQuery,
    ) -> Result<Option<Control>, AutomationError> {
        match self.find_control(root, query) {
            Ok(control) => Ok(Some(control)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<S: AutomationSurface + ?Sized> SurfaceExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_matches() {
        let query = ControlQuery::button().named("通讯录");
        assert!(query.matches(ControlKind::Button, "通讯录"));
        assert!(!query.matches(ControlKind::Text, "通讯录"));
        assert!(!query.matches(ControlKind::Button, "搜索"));
        assert!(ControlQuery::text().matches(ControlKind::Text, ""));
    }

    #[test]
    fn test_nth_is_one_based() {
        assert_eq!(ControlQuery::list().nth(0).index, 1);
        assert_eq!(ControlQuery::list().nth(2).index, 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ControlQuery::button().named("标签").nth(2).to_string(),
            "Button[name=\"标签\"]#2"
        );
        assert_eq!(KeyCombo::ctrl('v').to_string(), "Ctrl+V");
        assert_eq!(KeyCombo::ESCAPE.to_string(), "Escape");
    }
}
