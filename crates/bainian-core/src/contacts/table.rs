//! Contact tables and outcome logs on disk.
//!
//! Both are CSV, UTF-8 with a byte-order mark, header first. Columns are
//! matched by their (localized) header names, so operators may reorder or
//! add columns. Building the recipient plan is a single table-driven pass:
//! each column has a required flag and a default.
//!
//! CHANGELOG:
//! - 10/07/2026 - Short rows treated as missing trailing cells
//! - 10/02/2026 - Initial implementation

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use super::record::{ContactRecord, OutcomeLogEntry, RecipientTask};
use crate::config::RowDefaults;
use crate::error::TableError;

const BOM: &[u8] = b"\xEF\xBB\xBF";

// ============================================================================
// Columns
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Nickname,
    RemarkName,
    WechatId,
    Region,
    Tag,
    Title,
    Honorific,
    Mark,
    Message,
}

impl Column {
    pub fn header(&self) -> &'static str {
        match self {
            Column::Nickname => "昵称",
            Column::RemarkName => "备注名",
            Column::WechatId => "微信名",
            Column::Region => "地区",
            Column::Tag => "标签",
            Column::Title => "称谓",
            Column::Honorific => "敬语",
            Column::Mark => "标志",
            Column::Message => "已发送信息",
        }
    }
}

/// Header written by the harvester and expected by dispatch.
pub const CONTACT_COLUMNS: [Column; 8] = [
    Column::Nickname,
    Column::RemarkName,
    Column::WechatId,
    Column::Region,
    Column::Tag,
    Column::Title,
    Column::Honorific,
    Column::Mark,
];

/// Header of the outcome log; the status tag goes in the mark column.
pub const LOG_COLUMNS: [Column; 9] = [
    Column::Nickname,
    Column::RemarkName,
    Column::WechatId,
    Column::Region,
    Column::Tag,
    Column::Title,
    Column::Honorific,
    Column::Mark,
    Column::Message,
];

/// What a blank or missing cell becomes.
#[derive(Debug, Clone, Copy)]
enum Fallback {
    Empty,
    Title,
    Honorific,
}

struct ColumnRule {
    column: Column,
    required: bool,
    fallback: Fallback,
}

const RULES: [ColumnRule; 7] = [
    ColumnRule { column: Column::Nickname, required: true, fallback: Fallback::Empty },
    ColumnRule { column: Column::RemarkName, required: true, fallback: Fallback::Empty },
    ColumnRule { column: Column::WechatId, required: true, fallback: Fallback::Empty },
    ColumnRule { column: Column::Region, required: false, fallback: Fallback::Empty },
    ColumnRule { column: Column::Tag, required: false, fallback: Fallback::Empty },
    ColumnRule { column: Column::Title, required: false, fallback: Fallback::Title },
    ColumnRule { column: Column::Honorific, required: false, fallback: Fallback::Honorific },
];

/// Value given to `mark` that drops a row from the plan.
pub const SKIP_MARK: &str = "N";

fn header_of(columns: &[Column]) -> Vec<&'static str> {
    columns.iter().map(Column::header).collect()
}

// ============================================================================
// Reading
// ============================================================================

/// A contact table loaded into memory.
#[derive(Debug)]
pub struct ContactTable {
    columns: HashMap<Column, usize>,
    rows: Vec<csv::StringRecord>,
}

/// The filtered, defaulted recipients of one dispatch run.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub tasks: Vec<RecipientTask>,
    /// Rows dropped because `mark == "N"`.
    pub skipped_marked: usize,
    /// Rows dropped because both name columns are blank.
    pub skipped_nameless: usize,
}

impl Plan {
    pub fn skipped(&self) -> usize {
        self.skipped_marked + self.skipped_nameless
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, TableError> {
    let mut bytes = std::fs::read(path).map_err(|source| TableError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.starts_with(BOM) {
        bytes.drain(..BOM.len());
    }
    Ok(bytes)
}

fn column_positions(header: &csv::StringRecord) -> HashMap<Column, usize> {
    let mut positions = HashMap::new();
    for column in LOG_COLUMNS {
        if let Some(pos) = header.iter().position(|h| h.trim() == column.header()) {
            positions.insert(column, pos);
        }
    }
    positions
}

fn check_required(path: &Path, positions: &HashMap<Column, usize>) -> Result<(), TableError> {
    let missing: Vec<String> = RULES
        .iter()
        .filter(|rule| rule.required && !positions.contains_key(&rule.column))
        .map(|rule| rule.column.header().to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TableError::MissingColumns {
            path: path.to_path_buf(),
            missing,
        })
    }
}

impl ContactTable {
    /// Load a table, rejecting it if a required column is missing.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let path = path.as_ref();
        let bytes = read_bytes(path)?;
        let csv_err = |source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let header = reader.headers().map_err(csv_err)?.clone();
        if header.is_empty() || header.iter().all(|h| h.trim().is_empty()) {
            return Err(TableError::MissingHeader {
                path: path.to_path_buf(),
            });
        }

        let columns = column_positions(&header);
        check_required(path, &columns)?;

        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(csv_err)?;
        debug!(rows = rows.len(), "Loaded contact table {:?}", path);

        Ok(Self {
            columns,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn cell<'a>(&self, row: &'a csv::StringRecord, column: Column) -> Option<&'a str> {
        self.columns.get(&column).and_then(|&idx| row.get(idx))
    }

    /// Build the recipient plan in file order.
    pub fn plan(&self, defaults: &RowDefaults) -> Plan {
        let mut plan = Plan::default();

        for row in &self.rows {
            let mark = self.cell(row, Column::Mark).map(str::to_string);
            if mark.as_deref() == Some(SKIP_MARK) {
                plan.skipped_marked += 1;
                debug!("skip (marked N): {:?}", row);
                continue;
            }

            let mut values: HashMap<Column, String> = HashMap::new();
            for rule in &RULES {
                let raw = self.cell(row, rule.column).unwrap_or("");
                let value = if raw.trim().is_empty() {
                    match rule.fallback {
                        Fallback::Empty => raw.to_string(),
                        Fallback::Title => defaults.title.clone(),
                        Fallback::Honorific => defaults.honorific.clone(),
                    }
                } else {
                    raw.to_string()
                };
                values.insert(rule.column, value);
            }
            let mut take = |column| values.remove(&column).unwrap_or_default();

            let nickname = take(Column::Nickname);
            let namecomment = take(Column::RemarkName);
            if nickname.trim().is_empty() && namecomment.trim().is_empty() {
                plan.skipped_nameless += 1;
                debug!("skip (nameless): {:?}", row);
                continue;
            }

            plan.tasks.push(RecipientTask {
                nickname,
                namecomment,
                wechat_id: take(Column::WechatId),
                region: take(Column::Region),
                tag: take(Column::Tag),
                title: take(Column::Title),
                honorific: take(Column::Honorific),
                mark,
            });
        }

        plan
    }
}

// ============================================================================
// Writing
// ============================================================================

fn write_table<I>(path: &Path, columns: &[Column], rows: I) -> Result<(), TableError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let write_err = |source| TableError::Write {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut file = File::create(path).map_err(write_err)?;
    file.write_all(BOM).map_err(write_err)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(header_of(columns)).map_err(csv_err)?;
    for row in rows {
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer.flush().map_err(write_err)?;
    Ok(())
}

/// Write harvested contacts as one 8-column table.
pub fn write_contacts<P: AsRef<Path>>(
    path: P,
    records: &[ContactRecord],
    defaults: &RowDefaults,
) -> Result<(), TableError> {
    write_table(
        path.as_ref(),
        &CONTACT_COLUMNS,
        records.iter().map(|r| r.to_row(defaults)),
    )
}

/// Write a dispatch outcome log.
pub fn write_log<P: AsRef<Path>>(path: P, entries: &[OutcomeLogEntry]) -> Result<(), TableError> {
    write_table(path.as_ref(), &LOG_COLUMNS, entries.iter().map(OutcomeLogEntry::to_row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::record::DeliveryStatus;

    fn table_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BOM).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const HEADER: &str = "昵称,备注名,微信名,地区,标签,称谓,敬语,标志\n";

    #[test]
    fn test_marked_rows_excluded() {
        let file = table_file(&format!(
            "{}a,,wx_a,,,,,Y\nb,,wx_b,,,,,N\nc,,wx_c,,,,,\nd,,wx_d,,,,,N\n",
            HEADER
        ));
        let plan = ContactTable::read(file.path()).unwrap().plan(&RowDefaults::default());

        let names: Vec<&str> = plan.tasks.iter().map(|t| t.nickname.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(plan.skipped_marked, 2);
        assert_eq!(plan.skipped(), 2);
    }

    #[test]
    fn test_nameless_rows_excluded_regardless_of_mark() {
        let file = table_file(&format!(
            "{}  , ,wx_a,,,,,Y\n,,wx_b,,,,,\na,,wx_c,,,,,\n",
            HEADER
        ));
        let plan = ContactTable::read(file.path()).unwrap().plan(&RowDefaults::default());

        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.skipped_nameless, 2);
    }

    #[test]
    fn test_blank_title_and_honorific_get_defaults() {
        let file = table_file(&format!("{}a,阿王,wx_a,北京,同事, ,,Y\n", HEADER));
        let plan = ContactTable::read(file.path()).unwrap().plan(&RowDefaults::default());

        let task = &plan.tasks[0];
        assert_eq!(task.title, "您");
        assert_eq!(task.honorific, "您");
        assert_eq!(task.navigation_name(), "阿王");
        assert_eq!(task.mark.as_deref(), Some("Y"));
    }

    #[test]
    fn test_missing_mark_column_includes_all() {
        let file = table_file("昵称,备注名,微信名\na,,wx_a\nb,,wx_b\n");
        let plan = ContactTable::read(file.path()).unwrap().plan(&RowDefaults::default());

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].mark, None);
        assert_eq!(plan.tasks[0].title, "您");
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let file = table_file(&format!("{}a,b\n", HEADER));
        let plan = ContactTable::read(file.path()).unwrap().plan(&RowDefaults::default());

        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].wechat_id, "");
        assert_eq!(plan.tasks[0].mark, None);
    }

    #[test]
    fn test_missing_wechat_id_column_rejected() {
        let file = table_file("昵称,备注名,地区\na,,北京\n");
        let err = ContactTable::read(file.path()).unwrap_err();

        match err {
            TableError::MissingColumns { missing, .. } => assert_eq!(missing, vec!["微信名"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(ContactTable::read(file.path())
            .unwrap_err()
            .to_string()
            .contains("微信名"));
    }

    #[test]
    fn test_reordered_columns() {
        let file = table_file("标志,微信名,备注名,昵称\nN,wx_a,,a\nY,wx_b,,b\n");
        let plan = ContactTable::read(file.path()).unwrap().plan(&RowDefaults::default());

        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].wechat_id, "wx_b");
    }

    #[test]
    fn test_contacts_round_trip_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("friends.csv");
        let records = vec![ContactRecord {
            nickname: "小李".to_string(),
            remark_name: "李老师".to_string(),
            wechat_id: "li_laoshi".to_string(),
            region: "上海".to_string(),
            tag: "老师".to_string(),
        }];
        write_contacts(&path, &records, &RowDefaults::default()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(BOM));
        let text = String::from_utf8(bytes[BOM.len()..].to_vec()).unwrap();
        assert!(text.starts_with("昵称,备注名,微信名,地区,标签,称谓,敬语,标志"));

        let plan = ContactTable::read(&path).unwrap().plan(&RowDefaults::default());
        assert_eq!(plan.tasks[0].navigation_name(), "李老师");
        assert_eq!(plan.tasks[0].mark.as_deref(), Some("Y"));
    }

    #[test]
    fn test_log_header_and_status_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let entry = OutcomeLogEntry {
            task: RecipientTask {
                nickname: "a".to_string(),
                namecomment: String::new(),
                wechat_id: "wx".to_string(),
                region: String::new(),
                tag: String::new(),
                title: "您".to_string(),
                honorific: "您".to_string(),
                mark: None,
            },
            status: DeliveryStatus::Error,
            message: "新年好, 您".to_string(),
        };
        write_log(&path, &[entry]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8(bytes[BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "昵称,备注名,微信名,地区,标签,称谓,敬语,标志,已发送信息"
        );
        assert_eq!(lines.next().unwrap(), "a,,wx,,,您,您,E,\"新年好, 您\"");
    }
}
