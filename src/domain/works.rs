//! Portfolio document (`.obsidian-log/works.json`).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

const GENERATED_SUFFIX_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkCategory {
    Personal,
    Professional,
    Sidejob,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coming_soon: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub category: WorkCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksData {
    #[serde(default)]
    pub items: Vec<WorkItem>,
}

impl WorksData {
    pub fn by_category(&self, category: WorkCategory) -> Vec<WorkItem> {
        self.items
            .iter()
            .filter(|item| item.category == category)
            .cloned()
            .collect()
    }

    pub fn to_pretty_json(&self) -> Result<String, DomainError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| DomainError::invariant(format!("works serialization failed: {err}")))
    }
}

/// A work item as submitted by a caller; the id is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemInput {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub coming_soon: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub category: WorkCategory,
}

impl WorkItemInput {
    pub fn into_item(self) -> WorkItem {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_work_id);
        WorkItem {
            id,
            title: self.title,
            start_date: self.start_date,
            end_date: self.end_date,
            is_current: self.is_current,
            coming_soon: self.coming_soon,
            description: self.description,
            href: self.href,
            tags: self.tags,
            thumbnail: self.thumbnail,
            category: self.category,
        }
    }
}

/// `work-{unix millis}-{random}`.
pub fn generate_work_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let random = Uuid::new_v4().simple().to_string();
    format!("work-{millis}-{}", &random[..GENERATED_SUFFIX_LEN])
}
