//! In-memory course content tree the selector mutates.

use serde::{Deserialize, Serialize};

/// Syncable course sections. Closed set: tabs the server reports that are
/// not modeled here are dropped at tree-build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TabKind {
    Assignments,
    Announcements,
    Discussions,
    Grades,
    Files,
    Modules,
    Pages,
    People,
    Quizzes,
    Syllabus,
}

impl TabKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignments => "assignments",
            Self::Announcements => "announcements",
            Self::Discussions => "discussions",
            Self::Grades => "grades",
            Self::Files => "files",
            Self::Modules => "modules",
            Self::Pages => "pages",
            Self::People => "people",
            Self::Quizzes => "quizzes",
            Self::Syllabus => "syllabus",
        }
    }

    /// Parse a server tab id.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assignments" => Some(Self::Assignments),
            "announcements" => Some(Self::Announcements),
            "discussions" => Some(Self::Discussions),
            "grades" => Some(Self::Grades),
            "files" => Some(Self::Files),
            "modules" => Some(Self::Modules),
            "pages" | "wiki" => Some(Self::Pages),
            "people" => Some(Self::People),
            "quizzes" => Some(Self::Quizzes),
            "syllabus" => Some(Self::Syllabus),
            _ => None,
        }
    }
}

/// Aggregate selection state of a node with children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    /// Every child selected.
    All,
    /// Some but not all children selected.
    Partial,
    /// Nothing selected.
    Empty,
}

/// One course section in the selector tree.
#[derive(Debug, Clone)]
pub struct TabEntry {
    pub kind: TabKind,
    pub label: String,
    pub selected: bool,
    pub collapsed: bool,
}

impl TabEntry {
    pub fn new(kind: TabKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            selected: false,
            collapsed: false,
        }
    }
}

/// One course file eligible for offline download.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: String,
    pub display_name: String,
    pub size_bytes: u64,
    pub selected: bool,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub url: Option<String>,
}

/// Root unit of sync selection for one course.
#[derive(Debug, Clone)]
pub struct CourseSyncEntry {
    pub id: String,
    pub name: String,
    pub tabs: Vec<TabEntry>,
    /// Children of the Files tab.
    pub files: Vec<FileEntry>,
    pub collapsed: bool,
}

impl CourseSyncEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tabs: Vec::new(),
            files: Vec::new(),
            collapsed: false,
        }
    }

    pub fn tab(&self, kind: TabKind) -> Option<&TabEntry> {
        self.tabs.iter().find(|t| t.kind == kind)
    }

    pub fn tab_mut(&mut self, kind: TabKind) -> Option<&mut TabEntry> {
        self.tabs.iter_mut().find(|t| t.kind == kind)
    }

    /// Derived all/some/none state over the course's tabs and files.
    pub fn selection_state(&self) -> SelectionState {
        let total = self.tabs.len() + self.files.len();
        if total == 0 {
            return SelectionState::Empty;
        }
        let selected = self.tabs.iter().filter(|t| t.selected).count()
            + self.files.iter().filter(|f| f.selected).count();
        if selected == 0 {
            SelectionState::Empty
        } else if selected == total {
            SelectionState::All
        } else {
            SelectionState::Partial
        }
    }

    /// Byte size of the current selection: selected files only; tabs
    /// without file content contribute nothing.
    pub fn selected_size(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.selected)
            .map(|f| f.size_bytes)
            .sum()
    }

    /// Number of selected items (tabs plus files).
    pub fn selected_count(&self) -> usize {
        self.tabs.iter().filter(|t| t.selected).count()
            + self.files.iter().filter(|f| f.selected).count()
    }
}
