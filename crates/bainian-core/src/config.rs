//! Engine configuration: window hint, pauses, row defaults, file templates.
//!
//! Every field has a default, so a config file only needs the keys it
//! overrides.
//!
//! CHANGELOG:
//! - 10/09/2026 - BAINIAN_CONFIG env var and tilde expansion
//! - 10/02/2026 - Initial implementation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Env var pointing at a config file.
pub const CONFIG_ENV: &str = "BAINIAN_CONFIG";

/// Greeting used when the caller supplies no template.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "龙腾万里，福禄双全。在这龙年新春开启之时，给{称谓}拜年！[抱拳][抱拳]祝愿{敬语}身体健康，财源广进；事业蒸蒸日上，阖家幸福美满。新年快乐！[福][福][福][烟花][烟花][烟花]";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub timing: Timing,
    pub defaults: RowDefaults,
    pub harvest: HarvestConfig,
    pub dispatch: DispatchConfig,
}

/// How to find the chat client's main window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub name: String,
    pub class_name: String,
    /// Bounded wait for the main window; exceeding it aborts the run.
    pub timeout_ms: u64,
    /// Minimize the window once a sending run ends.
    pub minimize_after_run: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            name: "微信".to_string(),
            class_name: "WeChatMainWndForPC".to_string(),
            timeout_ms: 3000,
            minimize_after_run: false,
        }
    }
}

impl WindowConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Blocking pauses (milliseconds) that let the foreign UI settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub key_wait_ms: u64,
    pub search_focus_ms: u64,
    pub after_select_ms: u64,
    pub clipboard_paste_ms: u64,
    pub submit_ms: u64,
    pub detail_open_ms: u64,
    pub tag_select_ms: u64,
    pub scroll_settle_ms: u64,
    pub chat_info_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            key_wait_ms: 100,
            search_focus_ms: 200,
            after_select_ms: 500,
            clipboard_paste_ms: 100,
            submit_ms: 200,
            detail_open_ms: 200,
            tag_select_ms: 300,
            scroll_settle_ms: 200,
            chat_info_ms: 500,
        }
    }
}

impl Timing {
    /// All pauses zero. Used against the scripted surface.
    pub fn instant() -> Self {
        Self {
            key_wait_ms: 0,
            search_focus_ms: 0,
            after_select_ms: 0,
            clipboard_paste_ms: 0,
            submit_ms: 0,
            detail_open_ms: 0,
            tag_select_ms: 0,
            scroll_settle_ms: 0,
            chat_info_ms: 0,
        }
    }

    /// Block the current worker for `ms` milliseconds.
    pub fn pause(ms: u64) {
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }
}

/// Values written for the operator-editable columns, and used when they are blank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RowDefaults {
    pub title: String,
    pub honorific: String,
    /// Sentinel meaning "no instruction yet".
    pub mark: String,
}

impl Default for RowDefaults {
    fn default() -> Self {
        Self {
            title: "您".to_string(),
            honorific: "您".to_string(),
            mark: "Y".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub quota: usize,
    /// Output path; may contain one bracketed strftime token.
    pub output_template: String,
    /// Skip entries whose navigation name was already collected this run.
    pub dedupe_across_pages: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            quota: 200,
            output_template: "friends[%Y%m%d-%H%M%S].csv".to_string(),
            dedupe_across_pages: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub log_template: String,
    pub log_dir: String,
    pub message_template: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            log_template: "_log[%Y%m%d-%H%M%S].csv".to_string(),
            log_dir: ".".to_string(),
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn log_dir(&self) -> PathBuf {
        expand_path(&self.log_dir)
    }
}

/// Expand a leading `~` in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Default config file location.
///
/// Tries in order:
/// 1. BAINIAN_CONFIG env var
/// 2. <config dir>/bainian/config.json, if it exists
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(expand_path(&path));
    }

    dirs::config_dir()
        .map(|dir| dir.join("bainian").join("config.json"))
        .filter(|path| path.exists())
}

impl Config {
    /// Load a config file. Missing keys keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from an explicit path, else the default location, else built-in defaults.
    pub fn resolve(explicit: Option<&str>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(expand_path(path)),
            None => match default_config_path() {
                Some(path) => Self::load(path),
                None => Ok(Self::default()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"window": {{"timeout_ms": 5000}}, "defaults": {{"title": "老师"}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.window.timeout_ms, 5000);
        assert_eq!(config.window.name, "微信");
        assert_eq!(config.defaults.title, "老师");
        assert_eq!(config.defaults.honorific, "您");
        assert_eq!(config.harvest.quota, 200);
        assert!(config.harvest.dedupe_across_pages);
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Config::resolve(Some("/nonexistent/bainian.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_path("~/logs");
        assert!(!expanded.to_string_lossy().starts_with('~') || dirs::home_dir().is_none());
    }
}
