pub mod jira;
pub mod todoist;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::issue::{CreatedIssue, IssueItem, IssueUpdate, NewIssue, Transition};
use crate::model::list_item::{ListItem, ListItemUpdate, NewListItem};
use crate::model::{Bucket, Comment, Container};

/// Client for the bucket-organised List System.
#[async_trait]
pub trait ListSystem: Send + Sync {
    fn name(&self) -> &str;
    async fn find_container(&self, name: &str) -> Result<Container>;
    async fn list_buckets(&self, container_id: &str) -> Result<Vec<Bucket>>;
    async fn create_bucket(&self, container_id: &str, name: &str) -> Result<Bucket>;
    async fn list_items(&self, container_id: &str) -> Result<Vec<ListItem>>;
    async fn list_recently_completed(
        &self,
        container_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ListItem>>;
    async fn create_item(&self, item: &NewListItem) -> Result<ListItem>;
    async fn update_item(&self, id: &str, update: &ListItemUpdate) -> Result<ListItem>;
    async fn close_item(&self, id: &str) -> Result<()>;
    async fn move_item_to_bucket(&self, id: &str, bucket_id: &str) -> Result<()>;
    async fn list_comments(&self, item_id: &str) -> Result<Vec<Comment>>;
    async fn create_comment(&self, item_id: &str, body: &str) -> Result<Comment>;
}

/// Client for the workflow-based Issue System. Text crossing this boundary is
/// plain text; clients convert to and from the remote document format.
#[async_trait]
pub trait IssueSystem: Send + Sync {
    fn name(&self) -> &str;
    async fn search_issues(
        &self,
        query: &str,
        fields: &[&str],
        max_results: usize,
    ) -> Result<Vec<IssueItem>>;
    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue>;
    async fn update_issue(&self, key: &str, update: &IssueUpdate) -> Result<()>;
    async fn list_transitions(&self, key: &str) -> Result<Vec<Transition>>;
    async fn apply_transition(&self, key: &str, transition: &Transition) -> Result<()>;
    async fn list_comments(&self, key: &str) -> Result<Vec<Comment>>;
    async fn create_comment(&self, key: &str, body: &str) -> Result<Comment>;

    /// Move an issue to `status` using whichever available transition leads
    /// there, matched by transition name or target status name.
    async fn transition_to(&self, key: &str, status: &str) -> Result<()> {
        let transitions = self.list_transitions(key).await?;
        match find_transition(&transitions, status) {
            Some(t) => self.apply_transition(key, t).await,
            None => {
                let available: Vec<String> = transitions
                    .iter()
                    .map(|t| format!("{} (-> {})", t.name, t.to))
                    .collect();
                bail!("no transition to {status:?} on {key}, available: {available:?}")
            }
        }
    }
}

pub fn find_transition<'a>(transitions: &'a [Transition], status: &str) -> Option<&'a Transition> {
    transitions
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(status) || t.to.eq_ignore_ascii_case(status))
}

/// Turn a non-success response into an error carrying the status and a
/// bounded slice of the body.
pub(crate) async fn check_status(
    system: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = resp.status();
    tracing::trace!(
        system,
        url = %resp.url(),
        status = status.as_u16(),
        "http round trip"
    );
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(2000).collect();
    bail!("{system} API error {}: {body}", status.as_u16())
}

#[cfg(test)]
pub mod tests;
