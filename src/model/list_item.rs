use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a List System item taken at the start of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: String,
    /// Item title. Linked items carry the issue link marker at the front.
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Containing bucket; `None` when the item sits outside any section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<String>,
    /// 1 (normal) through 4 (most urgent).
    pub priority: u8,
    /// `None` when the remote did not report a timestamp or it failed to parse.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

impl ListItem {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Payload for creating a List item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewListItem {
    pub title: String,
    pub description: String,
    pub container_id: String,
    pub bucket_id: Option<String>,
    pub labels: Vec<String>,
    pub priority: u8,
    pub due: Option<NaiveDate>,
}

/// Partial update of a List item. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due: Option<NaiveDate>,
}

impl ListItemUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.due.is_none()
    }
}
