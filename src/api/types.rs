//! Serde models for the server resources the sync engine consumes.
//!
//! Decoding is exhaustive and typed: unknown JSON fields are tolerated
//! (serde's default), but a shape mismatch on a field we do read surfaces
//! as [`super::error::ApiError::Decode`], never as a silent `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub workflow_state: Option<String>,
}

/// One syncable course section as reported by the tabs endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseTab {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub hidden: Option<bool>,
    #[serde(default)]
    pub position: Option<i32>,
}

/// A course file eligible for offline download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileItem {
    pub id: i64,
    pub display_name: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// Byte size as reported by the server.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Authenticated download URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "content-type")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub folder_id: Option<i64>,
    #[serde(default)]
    pub locked_for_user: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub position: Option<i32>,
    /// Lock state: `locked`, `unlocked`, `started`, `completed`.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub unlock_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerequisite_module_ids: Vec<i64>,
    #[serde(default)]
    pub items_count: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleItemType {
    Assignment,
    Quiz,
    Page,
    File,
    Discussion,
    ExternalUrl,
    ExternalTool,
    SubHeader,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequirement {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDetails {
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked_for_user: Option<bool>,
    #[serde(default)]
    pub lock_explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleItem {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: ModuleItemType,
    #[serde(default)]
    pub position: Option<i32>,
    /// Server id of the associated content object (file, quiz, discussion).
    #[serde(default)]
    pub content_id: Option<i64>,
    /// Slug of the associated wiki page, for `Page` items.
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub completion_requirement: Option<CompletionRequirement>,
    #[serde(default)]
    pub content_details: Option<ContentDetails>,
}

/// Typed reference to a module item's associated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Page { slug: String },
    File { id: i64 },
    Quiz { id: i64 },
    Discussion { id: i64 },
}

impl ModuleItem {
    /// Resolve the associated-content reference, if this item has one that
    /// the offline pipeline knows how to fetch.
    pub fn content_ref(&self) -> Option<ContentRef> {
        match self.item_type {
            ModuleItemType::Page => self
                .page_url
                .clone()
                .map(|slug| ContentRef::Page { slug }),
            ModuleItemType::File => self.content_id.map(|id| ContentRef::File { id }),
            ModuleItemType::Quiz => self.content_id.map(|id| ContentRef::Quiz { id }),
            ModuleItemType::Discussion => self.content_id.map(|id| ContentRef::Discussion { id }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub question_count: Option<u32>,
}

/// A course roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sortable_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_item_tolerates_unknown_fields() {
        let json = r#"{
            "id": 7, "display_name": "syllabus.pdf", "size": 1000,
            "updated_at": "2024-09-01T10:00:00Z",
            "url": "https://x.test/files/7/download",
            "content-type": "application/pdf",
            "uuid": "abc", "thumbnail_url": null, "modified_at": "2024-09-01T10:00:00Z"
        }"#;
        let f: FileItem = serde_json::from_str(json).unwrap();
        assert_eq!(f.id, 7);
        assert_eq!(f.size, 1000);
        assert_eq!(f.content_type.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn file_item_wrong_shape_is_an_error() {
        // `size` as a string is a shape mismatch, not a silent default.
        let json = r#"{"id": 7, "display_name": "f", "size": "big"}"#;
        assert!(serde_json::from_str::<FileItem>(json).is_err());
    }

    #[test]
    fn module_item_page_content_ref() {
        let json = r#"{"id": 1, "title": "Welcome", "type": "Page", "page_url": "welcome"}"#;
        let item: ModuleItem = serde_json::from_str(json).unwrap();
        assert_eq!(
            item.content_ref(),
            Some(ContentRef::Page {
                slug: "welcome".into()
            })
        );
    }

    #[test]
    fn module_item_file_content_ref() {
        let json = r#"{"id": 2, "title": "Handout", "type": "File", "content_id": 99}"#;
        let item: ModuleItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.content_ref(), Some(ContentRef::File { id: 99 }));
    }

    #[test]
    fn module_item_unknown_type_maps_to_other() {
        let json = r#"{"id": 3, "title": "X", "type": "HologramDeck"}"#;
        let item: ModuleItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.item_type, ModuleItemType::Other);
        assert_eq!(item.content_ref(), None);
    }

    #[test]
    fn subheader_has_no_content_ref() {
        let json = r#"{"id": 4, "title": "Week 1", "type": "SubHeader"}"#;
        let item: ModuleItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.content_ref(), None);
    }

    #[test]
    fn module_lock_state_decodes() {
        let json = r#"{"id": 5, "name": "M1", "state": "locked",
                       "prerequisite_module_ids": [2, 3], "items_count": 4}"#;
        let m: Module = serde_json::from_str(json).unwrap();
        assert_eq!(m.state.as_deref(), Some("locked"));
        assert_eq!(m.prerequisite_module_ids, vec![2, 3]);
    }
}
