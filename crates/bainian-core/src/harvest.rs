//! Contact harvester: pages through the contacts management window and
//! writes one contact table.
//!
//! End of list is detected when the first visible entry stops changing
//! between page reads, or when a page holds nothing new. Entries whose
//! navigation name was already collected this run are skipped before their
//! detail view is opened.
//!
//! CHANGELOG:
//! - 10/18/2026 - End paging on a page with no new entries
//! - 10/08/2026 - Cross-page de-duplication by navigation name
//! - 10/03/2026 - Initial implementation

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

use crate::cancel::StopFlag;
use crate::config::{Config, Timing};
use crate::contacts::record::{navigation_name, ContactRecord};
use crate::contacts::table;
use crate::error::{AutomationError, BatchError};
use crate::filename;
use crate::runner::StatusSink;
use crate::session::Session;
use crate::surface::{labels, Control, ControlQuery, KeyCombo, SurfaceExt};

/// What to harvest and where to put it.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    /// Restrict to contacts carrying this tag.
    pub tag: Option<String>,
    /// Output path; may contain one bracketed strftime token.
    pub output: String,
    /// Maximum number of entries to process.
    pub quota: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub output: Option<PathBuf>,
    pub records: Vec<ContactRecord>,
    pub pages: usize,
    /// Entries whose detail view could not be read.
    pub skipped: usize,
    /// Entries already collected from an earlier page.
    pub duplicates: usize,
    pub quota_reached: bool,
    pub stopped: bool,
}

struct ScrollState {
    last_seen_key: Option<String>,
    remaining_quota: usize,
    still_has_pages: bool,
}

#[derive(Default)]
struct Collected {
    records: Vec<ContactRecord>,
    seen: HashSet<String>,
    skipped: usize,
    duplicates: usize,
}

pub struct Harvester<'a> {
    session: &'a Session,
    config: &'a Config,
    stop: &'a StopFlag,
    status: &'a dyn StatusSink,
}

impl<'a> Harvester<'a> {
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

    /// Harvest contacts into a table at `request.output`.
    #[instrument(skip_all, fields(tag = ?request.tag, quota = request.quota))]
    pub fn harvest(&self, request: &HarvestRequest) -> Result<HarvestReport, BatchError> {
        let output = PathBuf::from(filename::resolve(&request.output)?);
        self.status
            .status(&format!("Harvesting contacts, target count: {}", request.quota));

        let manager = self.open_manager()?;
        if let Some(tag) = request.tag.as_deref().filter(|t| !t.trim().is_empty()) {
            self.filter_by_tag(manager, tag);
        }

        let surface = self.session.surface();
        let list = surface
            .find_control(manager, &ControlQuery::list())
            .map_err(|source| BatchError::Navigation {
                what: "contact list",
                source,
            })?;
        let scrollable = surface.is_scrollable(list).unwrap_or_else(|e| {
            warn!("Could not query list scrollability, assuming single page: {}", e);
            false
        });

        let mut scroll = ScrollState {
            last_seen_key: None,
            remaining_quota: request.quota,
            still_has_pages: true,
        };
        let mut collected = Collected::default();
        let pages = if scrollable {
            self.harvest_pages(manager, list, &mut scroll, &mut collected)
        } else {
            self.harvest_single_page(manager, list, &mut scroll, &mut collected);
            1
        };

        if let Err(e) = surface.send_keys(manager, KeyCombo::ESCAPE) {
            warn!("Failed to close contacts manager: {}", e);
        }

        table::write_contacts(&output, &collected.records, &self.config.defaults)?;
        info!(count = collected.records.len(), "Wrote contact table {:?}", output);
        self.status.status(&format!(
            "Harvested {} contacts into {}",
            collected.records.len(),
            output.display()
        ));

        let quota_reached = scroll.remaining_quota == 0;
        Ok(HarvestReport {
            output: Some(output),
            records: collected.records,
            pages,
            skipped: collected.skipped,
            duplicates: collected.duplicates,
            quota_reached,
            stopped: self.stop.is_stopped() && !quota_reached,
        })
    }

    fn open_manager(&self) -> Result<Control, BatchError> {
        let surface = self.session.surface();
        let window = self.session.window();

        let opened = (|| -> Result<Control, AutomationError> {
            surface.click_control(window, &ControlQuery::button().named(labels::CONTACTS_TAB))?;
            let contacts = surface
                .find_control(window, &ControlQuery::list().named(labels::CONTACTS_LIST))?;
            surface.click_control(
                contacts,
                &ControlQuery::button().named(labels::CONTACTS_MANAGER),
            )?;
            let manager = surface.foreground()?;
            surface.click_control(manager, &ControlQuery::button().named(labels::MAXIMIZE))?;
            Ok(manager)
        })();

        opened.map_err(|source| {
            self.status
                .status(&format!("Automation failed opening contacts manager: {}", source));
            BatchError::Navigation {
                what: "contacts manager",
                source,
            }
        })
    }

    /// Best effort: a missing tag leaves the list unfiltered.
    fn filter_by_tag(&self, manager: Control, tag: &str) {
        let surface = self.session.surface();
        let toggle = ControlQuery::button().named(labels::TAG_PANEL);

        if let Err(e) = surface.click_control(manager, &toggle) {
            warn!("Tag panel not available: {}", e);
            self.status
                .status(&format!("Tag panel not available ({}), harvesting all contacts", e));
            return;
        }

        match surface.click_control(manager, &ControlQuery::pane().named(tag)) {
            Ok(()) => Timing::pause(self.session.timing().tag_select_ms),
            Err(e) => {
                warn!("Tag {:?} not found: {}", tag, e);
                self.status
                    .status(&format!("Tag '{}' not found ({}), harvesting all contacts", tag, e));
            }
        }

        if let Err(e) = surface.click_control(manager, &toggle) {
            warn!("Failed to close tag panel: {}", e);
        }
    }

    fn harvest_single_page(
        &self,
        manager: Control,
        list: Control,
        scroll: &mut ScrollState,
        collected: &mut Collected,
    ) {
        let entries = match self.session.surface().children(list) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read contact list: {}", e);
                return;
            }
        };

        for entry in entries {
            if self.quota_exhausted(scroll) || self.stop.is_stopped() {
                break;
            }
            self.collect(manager, entry, scroll, collected);
        }
        self.quota_exhausted(scroll);
    }

    fn harvest_pages(
        &self,
        manager: Control,
        list: Control,
        scroll: &mut ScrollState,
        collected: &mut Collected,
    ) -> usize {
        let surface = self.session.surface();
        let mut pages = 0;

        while scroll.still_has_pages && !self.stop.is_stopped() {
            let entries = match surface.children(list) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Failed to read contact page, ending harvest: {}", e);
                    self.status.status(&format!("Failed to read contact page: {}", e));
                    break;
                }
            };

            let Some(&first) = entries.first() else {
                break;
            };
            let first_key = match self.entry_names(first) {
                Ok((nick, remark)) => navigation_name(&nick, &remark).to_string(),
                Err(e) => {
                    warn!("Failed to read leading entry, ending harvest: {}", e);
                    break;
                }
            };
            if scroll.last_seen_key.as_deref() == Some(first_key.as_str()) {
                debug!("Leading entry {:?} repeated, end of list", first_key);
                scroll.still_has_pages = false;
                break;
            }
            scroll.last_seen_key = Some(first_key);
            pages += 1;

            let attempted = collected.records.len() + collected.skipped;
            for entry in entries {
                if self.quota_exhausted(scroll) || self.stop.is_stopped() {
                    break;
                }
                self.collect(manager, entry, scroll, collected);
            }

            if self.quota_exhausted(scroll) || self.stop.is_stopped() {
                break;
            }
            // A reordered list can dodge the leading-entry check forever.
            if collected.records.len() + collected.skipped == attempted {
                debug!("Page held no new entries, end of list");
                scroll.still_has_pages = false;
                break;
            }
            if let Err(e) = self.session.press(
                list,
                KeyCombo::PAGE_DOWN,
                self.session.timing().scroll_settle_ms,
            ) {
                warn!("Failed to page contact list, ending harvest: {}", e);
                break;
            }
        }

        pages
    }

    /// Quota exhaustion ends paging and raises the stop flag.
    fn quota_exhausted(&self, scroll: &mut ScrollState) -> bool {
        if scroll.remaining_quota == 0 {
            if scroll.still_has_pages {
                debug!("Quota reached");
                scroll.still_has_pages = false;
                self.stop.request_stop();
            }
            return true;
        }
        false
    }

    fn collect(
        &self,
        manager: Control,
        entry: Control,
        scroll: &mut ScrollState,
        collected: &mut Collected,
    ) {
        let (nickname, remark_name) = match self.entry_names(entry) {
            Ok(names) => names,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                collected.skipped += 1;
                scroll.remaining_quota = scroll.remaining_quota.saturating_sub(1);
                return;
            }
        };
        let key = navigation_name(&nickname, &remark_name).to_string();

        if self.config.harvest.dedupe_across_pages && collected.seen.contains(&key) {
            debug!("Already collected {:?}", key);
            collected.duplicates += 1;
            return;
        }
        scroll.remaining_quota = scroll.remaining_quota.saturating_sub(1);

        match self.read_detail(manager, entry, nickname, remark_name, &key) {
            Ok(record) => {
                collected.seen.insert(key.clone());
                collected.records.push(record);
                self.status.status(&format!(
                    "Harvested {} ({} so far)",
                    key,
                    collected.records.len()
                ));
            }
            Err(e) => {
                warn!("Skipping entry {:?}: {}", key, e);
                collected.skipped += 1;
            }
        }
    }

    /// Nickname (first text) and remark (second button) from a summary row.
    fn entry_names(&self, entry: Control) -> Result<(String, String), AutomationError> {
        let surface = self.session.surface();
        let nickname = surface.text_at(entry, &ControlQuery::text())?;
        let remark_name = match surface.text_at(entry, &ControlQuery::button().nth(2)) {
            Ok(name) => name,
            Err(e) if e.is_not_found() => String::new(),
            Err(e) => return Err(e),
        };
        Ok((nickname, remark_name))
    }

    /// Open the entry's detail view, read it, and dismiss it again.
    fn read_detail(
        &self,
        manager: Control,
        entry: Control,
        nickname: String,
        remark_name: String,
        key: &str,
    ) -> Result<ContactRecord, AutomationError> {
        let surface = self.session.surface();
        surface.click_control(entry, &ControlQuery::button().named(key))?;
        Timing::pause(self.session.timing().detail_open_ms);

        let read = || -> Result<ContactRecord, AutomationError> {
            let wechat_id = surface.value_after_label(manager, labels::WECHAT_ID_LABEL)?;
            let region = surface.value_after_label(manager, labels::REGION_LABEL);
            let tag = surface.value_after_label(manager, labels::TAG_LABEL);
            Ok(ContactRecord {
                nickname,
                remark_name,
                wechat_id,
                region: optional_field(region, key, "region"),
                tag: optional_field(tag, key, "tag"),
            })
        };
        let result = read();

        if let Err(e) = surface.send_keys(manager, KeyCombo::ESCAPE) {
            warn!("Failed to dismiss detail view for {:?}: {}", key, e);
        }
        result
    }
}

fn optional_field(value: Result<String, AutomationError>, key: &str, field: &str) -> String {
    value.unwrap_or_else(|e| {
        debug!("{:?} has no {}: {}", key, field, e);
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use crate::contacts::ContactTable;
    use crate::surface::scripted::{Fixture, FixtureContact, ScriptedSurface};
    use std::sync::{Arc, Mutex};

    struct Rig {
        surface: Arc<ScriptedSurface>,
        session: Session,
        config: Config,
        stop: StopFlag,
        dir: tempfile::TempDir,
    }

    fn rig(surface: ScriptedSurface) -> Rig {
        let surface = Arc::new(surface);
        let session = Session::attach(surface.clone(), &WindowConfig::default(), Timing::instant())
            .unwrap();
        Rig {
            surface,
            session,
            config: Config::default(),
            stop: StopFlag::new(),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn contacts(n: usize) -> Vec<FixtureContact> {
        (0..n)
            .map(|i| FixtureContact::new(&format!("friend{:02}", i), "", &format!("wx{:02}", i)))
            .collect()
    }

    impl Rig {
        fn run(&self, tag: Option<&str>, quota: usize) -> HarvestReport {
            let statuses = Mutex::new(Vec::new());
            let sink = |s: &str| statuses.lock().unwrap().push(s.to_string());
            let harvester = Harvester::new(&self.session, &self.config, &self.stop, &sink);
            harvester
                .harvest(&HarvestRequest {
                    tag: tag.map(str::to_string),
                    output: self.dir.path().join("friends.csv").to_string_lossy().to_string(),
                    quota,
                })
                .unwrap()
        }

        fn ids(report: &HarvestReport) -> Vec<String> {
            report.records.iter().map(|r| r.wechat_id.clone()).collect()
        }
    }

    #[test]
    fn test_single_page_harvest_writes_table() {
        let mut list = contacts(3);
        list[1].remark_name = "老李".to_string();
        list[1].region = Some("广东 深圳".to_string());
        list[1].tags = vec!["同事".to_string()];
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: list,
            ..Default::default()
        }));

        let report = rig.run(None, 200);

        assert_eq!(Rig::ids(&report), vec!["wx00", "wx01", "wx02"]);
        assert_eq!(report.pages, 1);
        let lee = &report.records[1];
        assert_eq!(lee.remark_name, "老李");
        assert_eq!(lee.region, "广东 深圳");
        assert_eq!(lee.tag, "同事");
        assert!(!rig.surface.manager_open());

        let table = ContactTable::read(report.output.unwrap()).unwrap();
        let plan = table.plan(&rig.config.defaults);
        assert_eq!(plan.tasks.len(), 3);
        assert_eq!(plan.tasks[1].navigation_name(), "老李");
        assert_eq!(plan.tasks[1].mark.as_deref(), Some("Y"));
    }

    #[test]
    fn test_paging_stops_on_repeated_leading_entry() {
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: contacts(10),
            page_size: 4,
            ..Default::default()
        }));

        let report = rig.run(None, 200);

        let expected: Vec<String> = (0..10).map(|i| format!("wx{:02}", i)).collect();
        assert_eq!(Rig::ids(&report), expected);
        // Pages start at 0, 4 and 6; the last one overlaps the second.
        assert_eq!(report.pages, 3);
        assert_eq!(report.duplicates, 2);
        assert!(!report.quota_reached);
        assert!(!report.stopped);
    }

    #[test]
    fn test_without_dedupe_overlap_is_kept() {
        let mut rig = rig(ScriptedSurface::new(Fixture {
            contacts: contacts(10),
            page_size: 4,
            ..Default::default()
        }));
        rig.config.harvest.dedupe_across_pages = false;

        let report = rig.run(None, 200);

        assert_eq!(report.records.len(), 12);
        assert_eq!(report.pages, 3);
    }

    #[test]
    fn test_same_page_twice_adds_nothing() {
        // A list that never advances: the second read repeats the first entry.
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: contacts(3),
            page_size: 3,
            scrollable: Some(true),
            ..Default::default()
        }));

        let report = rig.run(None, 200);

        assert_eq!(Rig::ids(&report), vec!["wx00", "wx01", "wx02"]);
        assert_eq!(report.pages, 1);
        assert_eq!(report.duplicates, 0);
    }

    #[test]
    fn test_reordering_list_ends_when_page_adds_nothing() {
        // The leading entry alternates on every PageDown and never repeats.
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: contacts(2),
            page_size: 2,
            scrollable: Some(true),
            reorder_on_scroll: true,
            ..Default::default()
        }));

        let report = rig.run(None, 5);

        assert_eq!(Rig::ids(&report), vec!["wx00", "wx01"]);
        assert_eq!(report.pages, 2);
        assert_eq!(report.duplicates, 2);
        assert!(!report.quota_reached);
        assert!(!report.stopped);
        assert!(!rig.stop.is_stopped());
    }

    #[test]
    fn test_quota_stops_and_raises_flag() {
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: contacts(10),
            page_size: 4,
            ..Default::default()
        }));

        let report = rig.run(None, 5);

        assert_eq!(Rig::ids(&report), vec!["wx00", "wx01", "wx02", "wx03", "wx04"]);
        assert!(report.quota_reached);
        assert!(!report.stopped);
        assert!(rig.stop.is_stopped());
    }

    #[test]
    fn test_entry_without_wechat_id_skipped() {
        let mut list = contacts(3);
        list[1].wechat_id = None;
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: list,
            ..Default::default()
        }));

        let report = rig.run(None, 200);

        assert_eq!(Rig::ids(&report), vec!["wx00", "wx02"]);
        assert_eq!(report.skipped, 1);
        // Detail view was dismissed after the failure, manager closed at the end.
        assert!(!rig.surface.manager_open());
    }

    #[test]
    fn test_tag_filter() {
        let mut list = contacts(4);
        list[0].tags = vec!["家人".to_string()];
        list[3].tags = vec!["家人".to_string(), "同学".to_string()];
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: list,
            ..Default::default()
        }));

        let report = rig.run(Some("家人"), 200);

        assert_eq!(Rig::ids(&report), vec!["wx00", "wx03"]);
        assert_eq!(report.records[1].tag, "家人,同学");
    }

    #[test]
    fn test_unknown_tag_harvests_everything() {
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: contacts(3),
            ..Default::default()
        }));

        let report = rig.run(Some("不存在"), 200);

        assert_eq!(report.records.len(), 3);
    }

    #[test]
    fn test_stop_mid_harvest() {
        let stop = StopFlag::new();
        let hook_stop = stop.clone();
        let surface = ScriptedSurface::new(Fixture {
            contacts: contacts(10),
            page_size: 4,
            ..Default::default()
        })
        .with_detail_hook(move |name| {
            if name == "friend02" {
                hook_stop.request_stop();
            }
        });
        let mut rig = rig(surface);
        rig.stop = stop;

        let report = rig.run(None, 200);

        assert_eq!(Rig::ids(&report), vec!["wx00", "wx01", "wx02"]);
        assert!(report.stopped);
        assert!(report.output.unwrap().exists());
    }

    #[test]
    fn test_manager_unavailable_aborts() {
        let rig = rig(ScriptedSurface::new(Fixture {
            contacts: contacts(2),
            manager_unavailable: true,
            ..Default::default()
        }));
        let sink = |_: &str| {};
        let harvester = Harvester::new(&rig.session, &rig.config, &rig.stop, &sink);
        let output = rig.dir.path().join("friends.csv");

        let err = harvester
            .harvest(&HarvestRequest {
                tag: None,
                output: output.to_string_lossy().to_string(),
                quota: 10,
            })
            .unwrap_err();

        assert!(matches!(err, BatchError::Navigation { what: "contacts manager", .. }));
        assert!(!output.exists());
    }
}
