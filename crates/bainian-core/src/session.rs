//! A session attached to the chat client's main window.
//!
//! Holds the surface, the main window handle and the pause timings, plus the
//! navigation helpers both engines share (current panel name, search-and-open
//! a conversation).
//!
//! CHANGELOG:
//! - 10/04/2026 - goto_chat and current_panel_name moved here from dispatch
//! - 10/02/2026 - Initial implementation

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{Timing, WindowConfig};
use crate::error::{AutomationError, BatchError};
use crate::surface::{
    labels, AutomationSurface, Control, ControlQuery, KeyCombo, SurfaceExt, WindowHint,
};

/// How many leading text controls to probe for the conversation title.
const PANEL_TITLE_PROBES: usize = 9;

pub struct Session {
    surface: Arc<dyn AutomationSurface>,
    window: Control,
    timing: Timing,
}

impl Session {
    /// Find and activate the main window within the configured bound.
    ///
    /// Not finding it is the one lookup failure that aborts a run.
    #[instrument(level = "debug", skip_all, fields(window = %window.name))]
    pub fn attach(
        surface: Arc<dyn AutomationSurface>,
        window: &WindowConfig,
        timing: Timing,
    ) -> Result<Self, BatchError> {
        let hint = WindowHint {
            name: window.name.clone(),
            class_name: Some(window.class_name.clone()).filter(|c| !c.is_empty()),
        };

        let handle = surface
            .find_window(&hint, window.timeout())
            .map_err(|source| BatchError::WindowNotFound {
                name: window.name.clone(),
                timeout_ms: window.timeout_ms,
                source,
            })?;

        if let Err(e) = surface.activate(handle) {
            warn!("Could not bring chat window to the foreground: {}", e);
        }
        info!("Attached to chat window");

        Ok(Self {
            surface,
            window: handle,
            timing,
        })
    }

    pub fn surface(&self) -> &dyn AutomationSurface {
        self.surface.as_ref()
    }

    pub fn window(&self) -> Control {
        self.window
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Send a key combo, then wait `wait_ms`.
    pub fn press(
        &self,
        control: Control,
        keys: KeyCombo,
        wait_ms: u64,
    ) -> Result<(), AutomationError> {
        self.surface.send_keys(control, keys)?;
        Timing::pause(wait_ms);
        Ok(())
    }

    /// Minimize the main window (end-of-run courtesy).
    pub fn minimize(&self) -> Result<(), AutomationError> {
        self.surface.minimize(self.window)
    }

    /// Title of the focused conversation: the first non-empty text control.
    pub fn current_panel_name(&self) -> Result<Option<String>, AutomationError> {
        for idx in 1..=PANEL_TITLE_PROBES {
            match self.surface.text_at(self.window, &ControlQuery::text().nth(idx)) {
                Ok(name) if !name.is_empty() => return Ok(Some(name)),
                Ok(_) => continue,
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Search for `name` and open its conversation.
    ///
    /// Returns `Ok(false)` when the search lists no exact match. The first
    /// result row is a section header; an unnamed row ends the matches.
    #[instrument(level = "debug", skip(self))]
    pub fn goto_chat(&self, name: &str) -> Result<bool, AutomationError> {
        if name.is_empty() {
            warn!("Refusing to open a conversation with an empty name");
            return Ok(false);
        }

        let timing = &self.timing;
        self.press(self.window, KeyCombo::ctrl('f'), timing.search_focus_ms)?;
        self.press(self.window, KeyCombo::ctrl('a'), timing.key_wait_ms)?;
        self.press(self.window, KeyCombo::DELETE, 0)?;
        self.surface.set_clipboard_text(name)?;
        self.press(self.window, KeyCombo::ctrl('v'), timing.key_wait_ms)?;

        let results = self.surface.find_control(self.window, &ControlQuery::list().nth(2))?;
        for (idx, item) in self.surface.children(results)?.into_iter().enumerate() {
            if idx == 0 {
                continue;
            }
            let item_name = self.surface.text_of(item)?;
            if item_name.is_empty() {
                break;
            }
            if item_name == name {
                self.surface.click(item)?;
                Timing::pause(timing.after_select_ms);
                debug!("Opened conversation");
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Open the built-in file transfer conversation.
    pub fn goto_file_transfer(&self) -> Result<(), AutomationError> {
        self.surface
            .click_control(self.window, &ControlQuery::button().named(labels::FILE_TRANSFER))?;
        Timing::pause(self.timing.after_select_ms);
        Ok(())
    }
}
