//! Output formatting for the `--json` / `--compact` flags.
//!
//! CHANGELOG:
//! - 10/05/2026 - Initial implementation

use serde::Serialize;
use serde_json::json;

/// Output control settings from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct OutputControls {
    pub json: bool,
    pub compact: bool,
}

impl OutputControls {
    /// Serialize `data` as pretty or compact JSON.
    pub fn emit<T: Serialize>(&self, data: &T) -> String {
        let value = serde_json::to_value(data).unwrap_or(json!(null));
        if self.compact {
            serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string())
        } else {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
        }
    }

    /// Print data to stdout according to output controls.
    pub fn print<T: Serialize>(&self, data: &T) {
        println!("{}", self.emit(data));
    }
}

/// Format error as JSON.
pub fn format_error(error: &str) -> String {
    serde_json::to_string(&json!({
        "error": error,
        "success": false
    }))
    .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_has_no_newlines() {
        let output = OutputControls {
            json: true,
            compact: true,
        };
        assert_eq!(output.emit(&json!({"sent": 2})), r#"{"sent":2}"#);
    }

    #[test]
    fn test_format_error() {
        let value: serde_json::Value = serde_json::from_str(&format_error("无窗口")).unwrap();
        assert_eq!(value["error"], "无窗口");
        assert_eq!(value["success"], false);
    }
}
