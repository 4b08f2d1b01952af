//! Bracketed timestamp tokens in output file names.
//!
//! `_log[%Y%m%d-%H%M%S].csv` becomes `_log20260101-093000.csv`: the text
//! between the first `[` and the first `]` is a strftime pattern formatted
//! with the current local time. Templates without such a pair are used as-is.
//!
//! CHANGELOG:
//! - 10/02/2026 - Initial implementation

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use std::fmt::{Display, Write};

use crate::error::BatchError;

/// Resolve the bracketed token against the current local time.
pub fn resolve(template: &str) -> Result<String, BatchError> {
    resolve_at(template, &Local::now())
}

/// Resolve the bracketed token against a fixed instant.
pub fn resolve_at<Tz>(template: &str, at: &DateTime<Tz>) -> Result<String, BatchError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let (open, close) = match (template.find('['), template.find(']')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Ok(template.to_string()),
    };

    let pattern = &template[open + 1..close];
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(BatchError::FilenameTemplate {
            template: template.to_string(),
            reason: format!("bad strftime pattern '{}'", pattern),
        });
    }

    let mut resolved = String::with_capacity(template.len() + 16);
    resolved.push_str(&template[..open]);
    write!(resolved, "{}", at.format_with_items(items.into_iter())).map_err(|_| {
        BatchError::FilenameTemplate {
            template: template.to_string(),
            reason: "timestamp could not be formatted".to_string(),
        }
    })?;
    resolved.push_str(&template[close + 1..]);

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, 8, 30, 5).unwrap()
    }

    #[test]
    fn test_log_template() {
        assert_eq!(
            resolve_at("_log[%Y%m%d-%H%M%S].csv", &fixed()).unwrap(),
            "_log20240210-083005.csv"
        );
    }

    #[test]
    fn test_no_brackets_is_verbatim() {
        assert_eq!(resolve_at("friends.csv", &fixed()).unwrap(), "friends.csv");
    }

    #[test]
    fn test_reversed_brackets_is_verbatim() {
        assert_eq!(resolve_at("a]b[c", &fixed()).unwrap(), "a]b[c");
    }

    #[test]
    fn test_only_first_pair_is_used() {
        assert_eq!(
            resolve_at("[%Y]-[%m].csv", &fixed()).unwrap(),
            "2024-[%m].csv"
        );
    }

    #[test]
    fn test_bad_pattern_is_error() {
        let err = resolve_at("log[%Q].csv", &fixed()).unwrap_err();
        assert!(matches!(err, BatchError::FilenameTemplate { .. }));
    }
}
