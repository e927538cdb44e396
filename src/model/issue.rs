use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Workflow status of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub name: String,
    /// True when the status belongs to the "done" category.
    #[serde(default)]
    pub terminal: bool,
}

/// Snapshot of an Issue System item taken at the start of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueItem {
    pub key: String,
    pub summary: String,
    /// Plain text; conversion from the remote document format happens in the client.
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IssueStatus>,
    /// Resolution name, present once the issue has been resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub in_active_sprint: bool,
}

impl IssueItem {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some() || self.status.as_ref().is_some_and(|s| s.terminal)
    }

    pub fn status_name(&self) -> &str {
        self.status.as_ref().map(|s| s.name.as_str()).unwrap_or_default()
    }
}

/// A workflow transition available from an issue's current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    /// Name of the status the transition leads to.
    pub to: String,
}

/// Payload for creating an issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewIssue {
    pub project: String,
    pub summary: String,
    pub description: String,
    pub issue_type: String,
    pub due: Option<NaiveDate>,
}

/// Identity of a freshly created issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    pub key: String,
}

/// Partial update of an issue. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssueUpdate {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub due: Option<NaiveDate>,
}

impl IssueUpdate {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.description.is_none() && self.due.is_none()
    }
}
