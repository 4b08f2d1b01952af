//! Row types: harvested contacts, planned recipients, outcome log entries.
//!
//! CHANGELOG:
//! - 10/02/2026 - Initial implementation

use serde::Serialize;

use crate::config::RowDefaults;

/// One harvested contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactRecord {
    pub nickname: String,
    pub remark_name: String,
    pub wechat_id: String,
    pub region: String,
    pub tag: String,
}

impl ContactRecord {
    /// Contact-table row with the operator columns at their defaults.
    pub fn to_row(&self, defaults: &RowDefaults) -> Vec<String> {
        vec![
            self.nickname.clone(),
            self.remark_name.clone(),
            self.wechat_id.clone(),
            self.region.clone(),
            self.tag.clone(),
            defaults.title.clone(),
            defaults.honorific.clone(),
            defaults.mark.clone(),
        ]
    }
}

/// A fully defaulted recipient, built once per included table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientTask {
    pub nickname: String,
    pub namecomment: String,
    pub wechat_id: String,
    pub region: String,
    pub tag: String,
    pub title: String,
    pub honorific: String,
    /// `None` when the table has no mark column (or the row is short).
    pub mark: Option<String>,
}

impl RecipientTask {
    pub fn navigation_name(&self) -> &str {
        navigation_name(&self.nickname, &self.namecomment)
    }
}

/// Per-recipient result tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryStatus {
    #[serde(rename = "D")]
    Delivered,
    #[serde(rename = "E")]
    Error,
}

impl DeliveryStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "D",
            DeliveryStatus::Error => "E",
        }
    }
}

/// One line of the outcome log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeLogEntry {
    pub task: RecipientTask,
    pub status: DeliveryStatus,
    pub message: String,
}

impl OutcomeLogEntry {
    pub fn to_row(&self) -> Vec<String> {
        let t = &self.task;
        vec![
            t.nickname.clone(),
            t.namecomment.clone(),
            t.wechat_id.clone(),
            t.region.clone(),
            t.tag.clone(),
            t.title.clone(),
            t.honorific.clone(),
            self.status.tag().to_string(),
            self.message.clone(),
        ]
    }
}

/// Name used to find a contact: remark if set, else nickname.
pub(crate) fn navigation_name<'a>(nickname: &'a str, remark_name: &'a str) -> &'a str {
    if remark_name.trim().is_empty() {
        nickname
    } else {
        remark_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_prefers_remark() {
        assert_eq!(navigation_name("小王", "王经理"), "王经理");
    }

    #[test]
    fn test_blank_remark_falls_back() {
        assert_eq!(navigation_name("小王", "  "), "小王");
        assert_eq!(navigation_name("小王", ""), "小王");
    }

    #[test]
    fn test_contact_row_has_eight_columns() {
        let row = ContactRecord::default().to_row(&RowDefaults::default());
        assert_eq!(row.len(), 8);
        assert_eq!(&row[5..], &["您", "您", "Y"]);
    }
}
