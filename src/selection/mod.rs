//! Course sync selector: builds the content tree for the account, applies
//! selection/collapse mutations with bidirectional propagation, publishes
//! derived size/count observers, and persists the final selection by id.

pub mod entry;

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::watch;

use crate::state::{FileStatus, StateDb, StateError};
use crate::store::{use_cases, Store, StoreError};

pub use entry::{CourseSyncEntry, FileEntry, SelectionState, TabEntry, TabKind};

/// Address of one node in the selector tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef<'a> {
    Course { course: &'a str },
    Tab { course: &'a str, kind: TabKind },
    File { course: &'a str, file: &'a str },
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Unknown selector node: {0}")]
    UnknownNode(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Owner of the in-memory selection tree. The selector is the only writer
/// of selection/collapse state; the downloader reads it through the state
/// database after [`CourseSyncSelector::save_selection`].
pub struct CourseSyncSelector {
    entries: Vec<CourseSyncEntry>,
    size_tx: watch::Sender<u64>,
    count_tx: watch::Sender<usize>,
}

impl CourseSyncSelector {
    pub fn new(entries: Vec<CourseSyncEntry>) -> Self {
        let size: u64 = entries.iter().map(|e| e.selected_size()).sum();
        let count: usize = entries.iter().map(|e| e.selected_count()).sum();
        let (size_tx, _) = watch::channel(size);
        let (count_tx, _) = watch::channel(count);
        Self {
            entries,
            size_tx,
            count_tx,
        }
    }

    pub fn entries(&self) -> &[CourseSyncEntry] {
        &self.entries
    }

    /// Sum of selected files' byte sizes across all courses.
    pub fn selected_size(&self) -> u64 {
        self.entries.iter().map(|e| e.selected_size()).sum()
    }

    pub fn selected_count(&self) -> usize {
        self.entries.iter().map(|e| e.selected_count()).sum()
    }

    /// Derived stream republished after every selection mutation.
    pub fn observe_selected_size(&self) -> watch::Receiver<u64> {
        self.size_tx.subscribe()
    }

    pub fn observe_selected_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Toggle one node, propagating to descendants (a course selects its
    /// tabs and files; the Files tab selects its files) and ancestors
    /// (deselecting the last selected file deselects the Files tab).
    pub fn set_selected(&mut self, node: NodeRef<'_>, selected: bool) -> Result<(), SelectionError> {
        match node {
            NodeRef::Course { course } => {
                let entry = self.entry_mut(course)?;
                for tab in &mut entry.tabs {
                    tab.selected = selected;
                }
                for file in &mut entry.files {
                    file.selected = selected;
                }
            }
            NodeRef::Tab { course, kind } => {
                let entry = self.entry_mut(course)?;
                let tab = entry
                    .tab_mut(kind)
                    .ok_or_else(|| SelectionError::UnknownNode(format!("{course}/{}", kind.as_str())))?;
                tab.selected = selected;
                if kind == TabKind::Files {
                    for file in &mut entry.files {
                        file.selected = selected;
                    }
                }
            }
            NodeRef::File { course, file } => {
                let entry = self.entry_mut(course)?;
                let f = entry
                    .files
                    .iter_mut()
                    .find(|f| f.id == file)
                    .ok_or_else(|| SelectionError::UnknownNode(format!("{course}/file-{file}")))?;
                f.selected = selected;
                let any_selected = entry.files.iter().any(|f| f.selected);
                if let Some(tab) = entry.tab_mut(TabKind::Files) {
                    tab.selected = any_selected;
                }
            }
        }
        self.republish();
        Ok(())
    }

    /// Re-apply persisted node ids onto a freshly loaded tree.
    ///
    /// Unlike [`CourseSyncSelector::set_selected`], a `tab:files` node marks
    /// only the tab itself; the saved `file:` nodes alone decide which files
    /// come back selected, so a partial file selection survives the
    /// save/restore round trip instead of widening to every file. Returns
    /// the node ids that no longer resolve against the current tree.
    pub fn restore_selection(
        &mut self,
        course: &str,
        nodes: &[String],
    ) -> Result<Vec<String>, SelectionError> {
        let mut stale = Vec::new();
        {
            let entry = self.entry_mut(course)?;
            for node in nodes {
                let applied = if let Some(tab) = node.strip_prefix("tab:") {
                    TabKind::parse(tab)
                        .and_then(|kind| entry.tab_mut(kind))
                        .map(|t| t.selected = true)
                        .is_some()
                } else if let Some(file) = node.strip_prefix("file:") {
                    entry
                        .files
                        .iter_mut()
                        .find(|f| f.id == file)
                        .map(|f| f.selected = true)
                        .is_some()
                } else {
                    false
                };
                if !applied {
                    stale.push(node.clone());
                }
            }
            // Saved selections always carry tab:files alongside file nodes,
            // but reconcile anyway so the tab invariant holds.
            if entry.files.iter().any(|f| f.selected) {
                if let Some(tab) = entry.tab_mut(TabKind::Files) {
                    tab.selected = true;
                }
            }
        }
        self.republish();
        Ok(stale)
    }

    /// Pure UI-state mutation; never affects selection or size.
    pub fn set_collapsed(
        &mut self,
        node: NodeRef<'_>,
        collapsed: bool,
    ) -> Result<(), SelectionError> {
        match node {
            NodeRef::Course { course } => {
                self.entry_mut(course)?.collapsed = collapsed;
            }
            NodeRef::Tab { course, kind } => {
                let entry = self.entry_mut(course)?;
                let tab = entry
                    .tab_mut(kind)
                    .ok_or_else(|| SelectionError::UnknownNode(format!("{course}/{}", kind.as_str())))?;
                tab.collapsed = collapsed;
            }
            NodeRef::File { course, file } => {
                return Err(SelectionError::UnknownNode(format!(
                    "{course}/file-{file} is not collapsible"
                )));
            }
        }
        Ok(())
    }

    /// Bulk select or deselect every node in the tree.
    pub fn toggle_all_courses_selection(&mut self, selected: bool) {
        for entry in &mut self.entries {
            for tab in &mut entry.tabs {
                tab.selected = selected;
            }
            for file in &mut entry.files {
                file.selected = selected;
            }
        }
        self.republish();
    }

    /// Persist the selection by id to durable per-user state, and record
    /// the deselected-file cleanup list the downloader consumes. The
    /// cleanup list is written before sync starts so a crash between
    /// download and cleanup is recoverable on the next pass.
    pub async fn save_selection(&self, db: &dyn StateDb) -> Result<(), SelectionError> {
        for entry in &self.entries {
            let mut node_ids: Vec<String> = Vec::new();
            for tab in entry.tabs.iter().filter(|t| t.selected) {
                node_ids.push(format!("tab:{}", tab.kind.as_str()));
            }
            let selected_files: HashSet<&str> = entry
                .files
                .iter()
                .filter(|f| f.selected)
                .map(|f| f.id.as_str())
                .collect();
            for id in &selected_files {
                node_ids.push(format!("file:{id}"));
            }
            db.replace_selection(&entry.id, &node_ids).await?;

            // Previously-downloaded files no longer selected become the
            // durable cleanup list for this course.
            let stale: Vec<String> = db
                .get_course_file_records(&entry.id)
                .await?
                .into_iter()
                .filter(|r| {
                    r.status == FileStatus::Downloaded
                        && !selected_files.contains(r.file_id.as_str())
                })
                .map(|r| r.file_id)
                .collect();
            db.replace_pending_cleanup(&entry.id, &stale).await?;
        }
        Ok(())
    }

    fn entry_mut(&mut self, course: &str) -> Result<&mut CourseSyncEntry, SelectionError> {
        self.entries
            .iter_mut()
            .find(|e| e.id == course)
            .ok_or_else(|| SelectionError::UnknownNode(course.to_string()))
    }

    fn republish(&self) {
        let size = self.selected_size();
        let count = self.selected_count();
        self.size_tx.send_replace(size);
        self.count_tx.send_replace(count);
    }
}

/// Build the selector tree for the account scope: every active course, or
/// a single course when `course_id` is given. List-fetch failures here are
/// terminal; the caller surfaces a retryable error.
pub async fn load_course_sync_entries(
    store: &Store,
    course_id: Option<&str>,
    ignore_cache: bool,
) -> Result<Vec<CourseSyncEntry>, StoreError> {
    let courses = store
        .get_entities(&use_cases::GetCourses, ignore_cache, true)
        .await?;

    let mut entries = Vec::new();
    for course in courses {
        let id = course.id.to_string();
        if let Some(scope) = course_id {
            if scope != id {
                continue;
            }
        }

        let mut entry = CourseSyncEntry::new(id.clone(), course.name.clone());

        let tabs = store
            .get_entities(
                &use_cases::GetCourseTabs {
                    course_id: id.clone(),
                },
                ignore_cache,
                true,
            )
            .await?;
        for tab in tabs {
            match TabKind::parse(&tab.id) {
                Some(kind) => entry.tabs.push(TabEntry::new(kind, tab.label)),
                None => tracing::debug!(course = %id, tab = %tab.id, "dropping unmodeled tab"),
            }
        }

        if entry.tab(TabKind::Files).is_some() {
            let files = store
                .get_entities(
                    &use_cases::GetCourseFiles {
                        course_id: id.clone(),
                    },
                    ignore_cache,
                    true,
                )
                .await?;
            for file in files {
                entry.files.push(FileEntry {
                    id: file.id.to_string(),
                    display_name: file.display_name,
                    size_bytes: file.size,
                    selected: false,
                    updated_at: file.updated_at,
                    url: file.url,
                });
            }
        }

        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SqliteStateDb;
    use std::sync::Arc;

    fn file(id: &str, size: u64) -> FileEntry {
        FileEntry {
            id: id.into(),
            display_name: format!("{id}.pdf"),
            size_bytes: size,
            selected: false,
            updated_at: None,
            url: None,
        }
    }

    fn selector() -> CourseSyncSelector {
        let mut c1 = CourseSyncEntry::new("c1", "Biology");
        c1.tabs.push(TabEntry::new(TabKind::Files, "Files"));
        c1.tabs.push(TabEntry::new(TabKind::Modules, "Modules"));
        c1.files.push(file("1", 1000));
        c1.files.push(file("2", 250));

        let mut c2 = CourseSyncEntry::new("c2", "Chemistry");
        c2.tabs.push(TabEntry::new(TabKind::Grades, "Grades"));
        CourseSyncSelector::new(vec![c1, c2])
    }

    #[test]
    fn selecting_course_selects_every_descendant() {
        let mut s = selector();
        s.set_selected(NodeRef::Course { course: "c1" }, true).unwrap();
        let c1 = &s.entries()[0];
        assert!(c1.tabs.iter().all(|t| t.selected));
        assert!(c1.files.iter().all(|f| f.selected));
        assert_eq!(c1.selection_state(), SelectionState::All);
    }

    #[test]
    fn selecting_files_tab_selects_all_files() {
        let mut s = selector();
        s.set_selected(
            NodeRef::Tab {
                course: "c1",
                kind: TabKind::Files,
            },
            true,
        )
        .unwrap();
        assert!(s.entries()[0].files.iter().all(|f| f.selected));
    }

    #[test]
    fn deselecting_last_file_deselects_files_tab() {
        let mut s = selector();
        s.set_selected(
            NodeRef::Tab {
                course: "c1",
                kind: TabKind::Files,
            },
            true,
        )
        .unwrap();
        s.set_selected(NodeRef::File { course: "c1", file: "1" }, false)
            .unwrap();
        assert!(s.entries()[0].tab(TabKind::Files).unwrap().selected);
        s.set_selected(NodeRef::File { course: "c1", file: "2" }, false)
            .unwrap();
        assert!(!s.entries()[0].tab(TabKind::Files).unwrap().selected);
        assert_eq!(s.entries()[0].selection_state(), SelectionState::Empty);
    }

    #[test]
    fn selected_size_tracks_mutations_and_ignores_collapse() {
        let mut s = selector();
        let rx = s.observe_selected_size();
        assert_eq!(*rx.borrow(), 0);

        s.set_selected(NodeRef::File { course: "c1", file: "1" }, true)
            .unwrap();
        assert_eq!(*rx.borrow(), 1000);

        s.set_collapsed(NodeRef::Course { course: "c1" }, true).unwrap();
        assert_eq!(*rx.borrow(), 1000, "collapse must not change size");

        s.set_selected(NodeRef::File { course: "c1", file: "2" }, true)
            .unwrap();
        assert_eq!(*rx.borrow(), 1250);

        s.set_selected(NodeRef::File { course: "c1", file: "1" }, false)
            .unwrap();
        assert_eq!(*rx.borrow(), 250);
    }

    #[test]
    fn selected_count_counts_tabs_and_files() {
        let mut s = selector();
        let rx = s.observe_selected_count();
        s.set_selected(NodeRef::Course { course: "c1" }, true).unwrap();
        // 2 tabs + 2 files
        assert_eq!(*rx.borrow(), 4);
    }

    #[test]
    fn toggle_all_selects_and_clears_everything() {
        let mut s = selector();
        s.toggle_all_courses_selection(true);
        assert_eq!(s.entries()[0].selection_state(), SelectionState::All);
        assert!(s.entries()[1].tab(TabKind::Grades).unwrap().selected);

        s.toggle_all_courses_selection(false);
        assert_eq!(s.selected_size(), 0);
        assert_eq!(s.selected_count(), 0);
    }

    #[test]
    fn unknown_node_is_an_error() {
        let mut s = selector();
        assert!(matches!(
            s.set_selected(NodeRef::Course { course: "zzz" }, true),
            Err(SelectionError::UnknownNode(_))
        ));
        assert!(matches!(
            s.set_selected(NodeRef::File { course: "c1", file: "99" }, true),
            Err(SelectionError::UnknownNode(_))
        ));
    }

    #[tokio::test]
    async fn save_selection_persists_ids_not_objects() {
        let db = Arc::new(SqliteStateDb::open_in_memory().unwrap());
        let mut s = selector();
        s.set_selected(
            NodeRef::Tab {
                course: "c1",
                kind: TabKind::Files,
            },
            true,
        )
        .unwrap();
        s.set_selected(NodeRef::File { course: "c1", file: "2" }, false)
            .unwrap();
        s.save_selection(db.as_ref()).await.unwrap();

        let nodes = db.get_selection("c1").await.unwrap();
        assert!(nodes.contains(&"tab:files".to_string()));
        assert!(nodes.contains(&"file:1".to_string()));
        assert!(!nodes.contains(&"file:2".to_string()));
    }

    #[tokio::test]
    async fn partial_file_selection_survives_a_save_restore_round_trip() {
        let db = Arc::new(SqliteStateDb::open_in_memory().unwrap());

        // File 1 of 2 selected; save_selection also persists tab:files.
        let mut s = selector();
        s.set_selected(NodeRef::File { course: "c1", file: "1" }, true)
            .unwrap();
        s.save_selection(db.as_ref()).await.unwrap();
        let nodes = db.get_selection("c1").await.unwrap();
        assert!(nodes.contains(&"tab:files".to_string()));

        // Restoring onto a fresh tree must not widen the selection.
        let mut fresh = selector();
        let stale = fresh.restore_selection("c1", &nodes).unwrap();
        assert!(stale.is_empty());
        let selected: Vec<&str> = fresh.entries()[0]
            .files
            .iter()
            .filter(|f| f.selected)
            .map(|f| f.id.as_str())
            .collect();
        assert_eq!(selected, vec!["1"]);
        assert!(fresh.entries()[0].tab(TabKind::Files).unwrap().selected);
        assert_eq!(fresh.selected_size(), 1000);

        // Saving again keeps the same id set.
        fresh.save_selection(db.as_ref()).await.unwrap();
        let nodes = db.get_selection("c1").await.unwrap();
        assert!(!nodes.contains(&"file:2".to_string()));
    }

    #[test]
    fn restore_reports_nodes_missing_from_the_current_tree() {
        let mut s = selector();
        let stale = s
            .restore_selection(
                "c1",
                &["file:99".to_string(), "tab:files".to_string()],
            )
            .unwrap();
        assert_eq!(stale, vec!["file:99".to_string()]);
        assert!(s.entries()[0].tab(TabKind::Files).unwrap().selected);
        assert!(s.entries()[0].files.iter().all(|f| !f.selected));
    }

    #[tokio::test]
    async fn save_selection_records_deselected_downloads_for_cleanup() {
        let db = Arc::new(SqliteStateDb::open_in_memory().unwrap());
        db.mark_file_downloaded("c1", "2", std::path::Path::new("/x/2.pdf"), 250, None)
            .await
            .unwrap();

        let mut s = selector();
        s.set_selected(NodeRef::File { course: "c1", file: "1" }, true)
            .unwrap();
        s.save_selection(db.as_ref()).await.unwrap();

        assert_eq!(
            db.get_pending_cleanup("c1").await.unwrap(),
            vec!["2".to_string()]
        );
    }
}
